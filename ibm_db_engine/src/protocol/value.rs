use serde::Serialize;

use crate::error::{IbmDbError, Result};

const TAG_NULL: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_INTEGER: u8 = 2;
const TAG_BIGINT: u8 = 3;
const TAG_DECIMAL: u8 = 4;
const TAG_BINARY: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BOOL: u8 = 7;
const TAG_UNSUPPORTED: u8 = 0xFF;

/// Host value crossing the binding boundary, both as a bind argument and as
/// a fetched column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// A host value of a type the binder has no strategy for; carries the type name.
    Unsupported(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Host type name used in binding error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Unsupported(name) => name,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut put = |tag: u8, payload: &[u8]| {
            out.push(tag);
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload);
        };
        match self {
            Value::Null => put(TAG_NULL, &[]),
            Value::Bool(b) => put(TAG_BOOL, &[u8::from(*b)]),
            Value::Int(n) => match i32::try_from(*n) {
                Ok(small) => put(TAG_INTEGER, &small.to_le_bytes()),
                Err(_) => put(TAG_BIGINT, &n.to_le_bytes()),
            },
            Value::Float(f) => put(TAG_DOUBLE, &f.to_le_bytes()),
            Value::Str(s) => put(TAG_STRING, s.as_bytes()),
            Value::Bytes(b) => put(TAG_BINARY, b),
            Value::Unsupported(name) => put(TAG_UNSUPPORTED, name.as_bytes()),
        }
        out
    }

    /// Decode one value; returns it with the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 5 {
            return Err(IbmDbError::Argument(
                "Value buffer too short".to_string(),
            ));
        }
        let tag = data[0];
        let len = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
        let consumed = 5usize.saturating_add(len);
        if data.len() < consumed {
            return Err(IbmDbError::Argument("Value buffer truncated".to_string()));
        }
        let payload = &data[5..consumed];

        let text = |what: &str| {
            std::str::from_utf8(payload)
                .map(str::to_string)
                .map_err(|_| IbmDbError::Argument(format!("Invalid UTF-8 in {} value", what)))
        };
        let fixed = |expected: usize, what: &str| {
            if len == expected {
                Ok(())
            } else {
                Err(IbmDbError::Argument(format!(
                    "{} value expected {} bytes",
                    what, expected
                )))
            }
        };

        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_STRING => Value::Str(text("string")?),
            TAG_DECIMAL => Value::Str(text("decimal")?),
            TAG_INTEGER => {
                fixed(4, "Integer")?;
                Value::Int(i64::from(i32::from_le_bytes([
                    payload[0], payload[1], payload[2], payload[3],
                ])))
            }
            TAG_BIGINT => {
                fixed(8, "BigInt")?;
                let mut b = [0u8; 8];
                b.copy_from_slice(payload);
                Value::Int(i64::from_le_bytes(b))
            }
            TAG_DOUBLE => {
                fixed(8, "Double")?;
                let mut b = [0u8; 8];
                b.copy_from_slice(payload);
                Value::Float(f64::from_le_bytes(b))
            }
            TAG_BOOL => {
                fixed(1, "Bool")?;
                Value::Bool(payload[0] != 0)
            }
            TAG_BINARY => Value::Bytes(payload.to_vec()),
            TAG_UNSUPPORTED => Value::Unsupported(text("type name")?),
            _ => {
                return Err(IbmDbError::Argument(format!(
                    "Unknown value tag: {}",
                    tag
                )))
            }
        };
        Ok((value, consumed))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

pub fn decode_values(data: &[u8]) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (v, n) = Value::decode(&data[offset..])?;
        out.push(v);
        offset += n;
    }
    Ok(out)
}

pub fn encode_values(values: &[Value]) -> Vec<u8> {
    values.iter().flat_map(Value::encode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_int_uses_four_byte_payload() {
        let enc = Value::Int(42).encode();
        assert_eq!(enc[0], TAG_INTEGER);
        assert_eq!(enc.len(), 9);
        assert_eq!(Value::decode(&enc).unwrap(), (Value::Int(42), 9));
    }

    #[test]
    fn test_large_int_promotes_to_bigint() {
        let big = i64::from(i32::MAX) + 1;
        let enc = Value::Int(big).encode();
        assert_eq!(enc[0], TAG_BIGINT);
        assert_eq!(Value::decode(&enc).unwrap().0, Value::Int(big));
    }

    #[test]
    fn test_mixed_sequence_decodes_in_order() {
        let values = vec![
            Value::Int(1),
            Value::from("a"),
            Value::Null,
            Value::Float(2.5),
            Value::Bool(true),
            Value::Bytes(vec![0, 0xff]),
            Value::Unsupported("dict".to_string()),
        ];
        let enc = encode_values(&values);
        assert_eq!(decode_values(&enc).unwrap(), values);
        assert!(decode_values(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_decimal_tag_decodes_as_string() {
        let mut enc = vec![TAG_DECIMAL];
        enc.extend_from_slice(&4u32.to_le_bytes());
        enc.extend_from_slice(b"3.14");
        assert_eq!(Value::decode(&enc).unwrap().0, Value::from("3.14"));
    }

    #[test]
    fn test_deserialize_rejects_bad_input() {
        assert!(Value::decode(&[0u8, 0, 0]).is_err());
        assert!(Value::decode(&[TAG_STRING, 10, 0, 0, 0, b'a']).is_err());
        assert!(Value::decode(&[TAG_INTEGER, 2, 0, 0, 0, 1, 2]).is_err());
        assert!(Value::decode(&[42, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_type_name_and_accessors() {
        assert_eq!(Value::Unsupported("dict".to_string()).type_name(), "dict");
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from("x").as_str(), Some("x"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&vec![
            Value::Null,
            Value::Int(3),
            Value::from("s"),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,3,"s"]"#);
    }
}
