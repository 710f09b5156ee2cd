//! Turning the current row of a result set into host values.

use std::collections::BTreeMap;

use crate::cli::{BoundData, CType, CliResult, CliStatement};
use crate::config::BinMode;
use crate::protocol::{ColumnKind, FetchShape, Row, RowKey, Value};

use super::metadata::{ColumnMeta, ReadPlan};
use super::options::CaseMode;

/// Values of the current row read with get-data, by 0-based column. The
/// driver hands such a value out once per row; cleared on every fetch.
pub(crate) type RowCache = BTreeMap<usize, Value>;

/// Read column `index` (0-based) of the current row.
pub(crate) fn read_column(
    cli: &mut dyn CliStatement,
    meta: &ColumnMeta,
    index: usize,
    bin_mode: BinMode,
    cache: &mut RowCache,
) -> CliResult<Value> {
    let number = (index + 1) as u16;
    let (c_type, size_hint) = match meta.plan {
        ReadPlan::Skipped => return Ok(skipped_value(meta.kind)),
        ReadPlan::Bound { c_type, capacity } => match cli.bound_data(number)? {
            BoundData::Null => return Ok(Value::Null),
            BoundData::Value(bytes) => return Ok(decode(meta.kind, c_type, bin_mode, bytes)),
            BoundData::Truncated => (c_type, Some(capacity)),
        },
        ReadPlan::Streamed { c_type } => (c_type, None),
    };
    if let Some(value) = cache.get(&index) {
        return Ok(value.clone());
    }
    let bytes = match size_hint {
        Some(capacity) => cli.get_data(number, c_type, capacity.saturating_mul(2))?,
        None => match cli.data_length(number, c_type)? {
            None => None,
            Some(len) => cli.get_data(number, c_type, len)?,
        },
    };
    let value = match bytes {
        None => Value::Null,
        Some(bytes) => decode(meta.kind, c_type, bin_mode, bytes),
    };
    cache.insert(index, value.clone());
    Ok(value)
}

fn skipped_value(kind: ColumnKind) -> Value {
    match kind {
        ColumnKind::Binary => Value::Str(String::new()),
        _ => Value::Null,
    }
}

fn text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn decode(kind: ColumnKind, c_type: CType, bin_mode: BinMode, bytes: Vec<u8>) -> Value {
    match c_type {
        CType::SShort => return Value::Int(i16::from_ne_bytes(fixed(&bytes)) as i64),
        CType::SLong => return Value::Int(i32::from_ne_bytes(fixed(&bytes)) as i64),
        CType::SBigInt => return Value::Int(i64::from_ne_bytes(fixed(&bytes))),
        CType::Double => return Value::Float(f64::from_ne_bytes(fixed(&bytes))),
        CType::Char => return Value::Str(text(&bytes)),
        CType::Binary => {}
    }
    match (kind, bin_mode) {
        (ColumnKind::Xml, _) => Value::Str(String::from_utf8_lossy(&bytes).into_owned()),
        (_, BinMode::Binary) => Value::Bytes(bytes),
        _ => Value::Str(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Materialize the current row in the requested shape. Name keys are
/// case-folded; every value is read exactly once.
pub(crate) fn build_row(
    cli: &mut dyn CliStatement,
    columns: &[ColumnMeta],
    shape: FetchShape,
    case_mode: CaseMode,
    bin_mode: BinMode,
    cache: &mut RowCache,
) -> CliResult<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for (index, meta) in columns.iter().enumerate() {
        values.push(read_column(cli, meta, index, bin_mode, cache)?);
    }

    let capacity = match shape {
        FetchShape::Both => columns.len() * 2,
        _ => columns.len(),
    };
    let mut row = Row::with_capacity(capacity);
    if shape.with_names() {
        for (meta, value) in columns.iter().zip(&values) {
            row.insert(RowKey::Name(case_mode.apply(&meta.name)), value.clone());
        }
    }
    if shape.with_indexes() {
        for (index, value) in values.into_iter().enumerate() {
            row.insert(RowKey::Index(index), value);
        }
    }
    Ok(row)
}
