use crate::cli::{CType, CliResult, CliStatement, ColumnDescription};
use crate::config::BinMode;
use crate::protocol::ColumnKind;

use super::options::CaseMode;

/// Widest column that is pre-bound; anything larger is read with get-data.
const MAX_BOUND_WIDTH: usize = 64 * 1024;

/// How a column's value is pulled out of the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPlan {
    /// Bound once per execution; each fetch fills the buffer.
    Bound { c_type: CType, capacity: usize },
    /// Sized with a zero-length read, then read in full.
    Streamed { c_type: CType },
    /// Not read at all.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: i16,
    pub size: usize,
    pub scale: i16,
    pub nullable: i16,
    pub kind: ColumnKind,
    pub plan: ReadPlan,
}

impl ColumnMeta {
    pub fn new(desc: ColumnDescription, bin_mode: BinMode) -> Self {
        let kind = ColumnKind::from_sql_type(desc.sql_type);
        let plan = read_plan(kind, desc.size, desc.scale, bin_mode);
        Self {
            name: desc.name,
            sql_type: desc.sql_type,
            size: desc.size,
            scale: desc.scale,
            nullable: desc.nullable,
            kind,
            plan,
        }
    }
}

fn bound_or_streamed(c_type: CType, capacity: usize, declared: usize) -> ReadPlan {
    if declared == 0 || capacity > MAX_BOUND_WIDTH {
        ReadPlan::Streamed { c_type }
    } else {
        ReadPlan::Bound { c_type, capacity }
    }
}

pub fn read_plan(kind: ColumnKind, size: usize, scale: i16, bin_mode: BinMode) -> ReadPlan {
    let fixed = |c_type: CType| ReadPlan::Bound {
        c_type,
        capacity: c_type.fixed_width().unwrap_or(8),
    };
    match kind {
        ColumnKind::Text | ColumnKind::Date | ColumnKind::Time | ColumnKind::Timestamp => {
            bound_or_streamed(CType::Char, size.saturating_add(1), size)
        }
        ColumnKind::WideText => {
            bound_or_streamed(CType::Char, size.saturating_mul(4).saturating_add(1), size)
        }
        ColumnKind::LongText | ColumnKind::Clob => ReadPlan::Streamed { c_type: CType::Char },
        ColumnKind::SmallInt => fixed(CType::SShort),
        ColumnKind::Integer => fixed(CType::SLong),
        ColumnKind::BigInt => fixed(CType::SBigInt),
        ColumnKind::Float => fixed(CType::Double),
        ColumnKind::Decimal => {
            let capacity = size + scale.max(0) as usize + 3;
            bound_or_streamed(CType::Char, capacity, size)
        }
        ColumnKind::Binary => match bin_mode {
            BinMode::Binary => bound_or_streamed(CType::Binary, size.saturating_add(1), size),
            BinMode::Convert => {
                bound_or_streamed(CType::Char, size.saturating_mul(2).saturating_add(1), size)
            }
            BinMode::Passthru => ReadPlan::Skipped,
        },
        ColumnKind::Blob => match bin_mode {
            BinMode::Binary => ReadPlan::Streamed { c_type: CType::Binary },
            BinMode::Convert => ReadPlan::Streamed { c_type: CType::Char },
            BinMode::Passthru => ReadPlan::Skipped,
        },
        ColumnKind::Xml => ReadPlan::Streamed { c_type: CType::Binary },
    }
}

/// Describe every column of the current result set and bind the ones that
/// can be pre-bound. An empty vector means the statement has no result set.
pub(crate) fn describe_and_bind(
    cli: &mut dyn CliStatement,
    count: u16,
    bin_mode: BinMode,
) -> CliResult<Vec<ColumnMeta>> {
    let mut columns = Vec::with_capacity(count as usize);
    for number in 1..=count {
        let meta = ColumnMeta::new(cli.describe_col(number)?, bin_mode);
        if let ReadPlan::Bound { c_type, capacity } = meta.plan {
            cli.bind_col(number, c_type, capacity)?;
        }
        columns.push(meta);
    }
    Ok(columns)
}

/// Column selector for `result` and field introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Name(String),
    /// 0-based position.
    Index(usize),
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::Name(name)
    }
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

/// 0-based position of the referenced column. Names match either the name the
/// driver reported or its case-folded form.
pub fn find_column(columns: &[ColumnMeta], column: &ColumnRef, case_mode: CaseMode) -> Option<usize> {
    match column {
        ColumnRef::Index(i) if *i < columns.len() => Some(*i),
        ColumnRef::Index(_) => None,
        ColumnRef::Name(name) => columns
            .iter()
            .position(|c| c.name == *name || case_mode.apply(&c.name) == *name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::codes::*;
    use crate::cli::mock::column;

    fn meta(name: &str, sql_type: i16, size: usize, bin_mode: BinMode) -> ColumnMeta {
        ColumnMeta::new(column(name, sql_type, size), bin_mode)
    }

    #[test]
    fn test_fixed_width_columns_are_bound() {
        let m = meta("ID", SQL_INTEGER, 10, BinMode::Binary);
        assert_eq!(
            m.plan,
            ReadPlan::Bound {
                c_type: CType::SLong,
                capacity: 4
            }
        );
        let m = meta("BIG", SQL_BIGINT, 19, BinMode::Binary);
        assert_eq!(
            m.plan,
            ReadPlan::Bound {
                c_type: CType::SBigInt,
                capacity: 8
            }
        );
    }

    #[test]
    fn test_character_capacities() {
        let m = meta("NAME", SQL_VARCHAR, 30, BinMode::Binary);
        assert_eq!(
            m.plan,
            ReadPlan::Bound {
                c_type: CType::Char,
                capacity: 31
            }
        );
        let mut desc = column("SALARY", SQL_DECIMAL, 9);
        desc.scale = 2;
        assert_eq!(
            ColumnMeta::new(desc, BinMode::Binary).plan,
            ReadPlan::Bound {
                c_type: CType::Char,
                capacity: 14
            }
        );
    }

    #[test]
    fn test_graphic_capacity_covers_utf8_expansion() {
        assert_eq!(
            meta("KANJI", SQL_GRAPHIC, 3, BinMode::Binary).plan,
            ReadPlan::Bound {
                c_type: CType::Char,
                capacity: 13
            }
        );
        assert_eq!(
            meta("W", SQL_WVARCHAR, 1 << 20, BinMode::Binary).plan,
            ReadPlan::Streamed { c_type: CType::Char }
        );
    }

    #[test]
    fn test_lobs_are_streamed() {
        assert_eq!(
            meta("DOC", SQL_CLOB, 1 << 20, BinMode::Binary).plan,
            ReadPlan::Streamed { c_type: CType::Char }
        );
        assert_eq!(
            meta("X", SQL_XML, 0, BinMode::Convert).plan,
            ReadPlan::Streamed {
                c_type: CType::Binary
            }
        );
        assert_eq!(
            meta("V", SQL_VARCHAR, 1 << 20, BinMode::Binary).plan,
            ReadPlan::Streamed { c_type: CType::Char }
        );
    }

    #[test]
    fn test_binary_follows_bin_mode() {
        assert_eq!(
            meta("B", SQL_VARBINARY, 8, BinMode::Binary).plan,
            ReadPlan::Bound {
                c_type: CType::Binary,
                capacity: 9
            }
        );
        assert_eq!(
            meta("B", SQL_VARBINARY, 8, BinMode::Convert).plan,
            ReadPlan::Bound {
                c_type: CType::Char,
                capacity: 17
            }
        );
        assert_eq!(meta("B", SQL_BINARY, 8, BinMode::Passthru).plan, ReadPlan::Skipped);
        assert_eq!(meta("P", SQL_BLOB, 100, BinMode::Passthru).plan, ReadPlan::Skipped);
    }

    #[test]
    fn test_find_column() {
        let cols = vec![
            meta("EMPNO", SQL_CHAR, 6, BinMode::Binary),
            meta("LASTNAME", SQL_VARCHAR, 15, BinMode::Binary),
        ];
        assert_eq!(find_column(&cols, &"LASTNAME".into(), CaseMode::Natural), Some(1));
        assert_eq!(find_column(&cols, &"lastname".into(), CaseMode::Lower), Some(1));
        assert_eq!(find_column(&cols, &"lastname".into(), CaseMode::Natural), None);
        assert_eq!(find_column(&cols, &ColumnRef::Index(0), CaseMode::Natural), Some(0));
        assert_eq!(find_column(&cols, &ColumnRef::Index(2), CaseMode::Natural), None);
    }
}
