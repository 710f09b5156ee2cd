//! Type-directed parameter binding: the host value's variant picks the C
//! buffer, the marker's SQL type picks how text and bytes travel.

use std::path::PathBuf;

use crate::cli::codes::{SQL_BLOB, SQL_CLOB, SQL_DBCLOB};
use crate::cli::{CType, ParamBinding, ParamBuffer};
use crate::error::{IbmDbError, Result};
use crate::protocol::types::{is_binary_param, is_lob_param};
use crate::protocol::Value;

use super::param_cache::{ParamDirection, ParamNode};

pub(crate) fn build_binding(node: &ParamNode) -> Result<ParamBinding> {
    let io = node.direction.io();
    let (c_type, buffer) = match (&node.value, node.direction) {
        (Value::Str(path), ParamDirection::File) => {
            (lob_c_type(node.sql_type), ParamBuffer::File(PathBuf::from(path)))
        }
        (other, ParamDirection::File) => {
            return Err(IbmDbError::Data(format!(
                "Binding Error: file parameter {} needs a file name, got {}",
                node.position,
                other.type_name()
            )))
        }
        (Value::Bool(b), _) => (CType::SLong, ParamBuffer::Long(i32::from(*b))),
        (Value::Int(v), _) => match i32::try_from(*v) {
            Ok(small) => (CType::SLong, ParamBuffer::Long(small)),
            Err(_) => (CType::SBigInt, ParamBuffer::BigInt(*v)),
        },
        (Value::Float(v), _) => (CType::Double, ParamBuffer::Double(*v)),
        (Value::Null, ParamDirection::Output) => (
            CType::Char,
            ParamBuffer::Text {
                data: Vec::new(),
                capacity: node.precision.max(1),
            },
        ),
        (Value::Null, _) => (CType::Char, ParamBuffer::Null),
        (Value::Str(s), _) => character_buffer(node, s.as_bytes().to_vec()),
        (Value::Bytes(b), _) => character_buffer(node, b.clone()),
        (Value::Unsupported(type_name), _) => {
            return Err(IbmDbError::Data(format!(
                "Binding Error: unsupported parameter type {} at position {}",
                type_name, node.position
            )))
        }
    };
    Ok(ParamBinding {
        io,
        c_type,
        sql_type: node.sql_type,
        column_size: node.precision,
        decimal_digits: node.scale,
        buffer,
    })
}

fn lob_c_type(sql_type: i16) -> CType {
    match sql_type {
        SQL_CLOB | SQL_DBCLOB => CType::Char,
        _ => CType::Binary,
    }
}

fn character_buffer(node: &ParamNode, mut data: Vec<u8>) -> (CType, ParamBuffer) {
    if let Some(size) = node.size {
        data.truncate(size);
    }
    let output = node.direction.is_output();
    let capacity = if output {
        data.len().max(node.precision).max(node.size.unwrap_or(0))
    } else {
        node.size.unwrap_or(data.len()).max(data.len())
    };

    if is_lob_param(node.sql_type) {
        let c_type = lob_c_type(node.sql_type);
        if !output {
            return (c_type, ParamBuffer::Deferred(data));
        }
        return match node.sql_type {
            SQL_BLOB => (c_type, ParamBuffer::Bytes { data, capacity }),
            _ => (c_type, ParamBuffer::Text { data, capacity }),
        };
    }
    if is_binary_param(node.sql_type) {
        return (CType::Binary, ParamBuffer::Bytes { data, capacity });
    }
    (CType::Char, ParamBuffer::Text { data, capacity })
}

/// Host value of a parameter buffer after execution.
pub(crate) fn output_value(buffer: ParamBuffer) -> Value {
    match buffer {
        ParamBuffer::Null => Value::Null,
        ParamBuffer::Long(v) => Value::Int(v as i64),
        ParamBuffer::BigInt(v) => Value::Int(v),
        ParamBuffer::Double(v) => Value::Float(v),
        ParamBuffer::Text { data, .. } | ParamBuffer::Deferred(data) => {
            let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
            Value::Str(String::from_utf8_lossy(&data[..end]).into_owned())
        }
        ParamBuffer::Bytes { data, .. } => Value::Bytes(data),
        ParamBuffer::File(path) => Value::Str(path.to_string_lossy().into_owned()),
    }
}
