use crate::cli::codes::{SQL_CURSOR_FORWARD_ONLY, SQL_CURSOR_KEYSET_DRIVEN};
use crate::cli::AttrValue;
use crate::error::{IbmDbError, Result};

/// Binding-level attribute: case folding of fetched column names.
pub const ATTR_CASE: i32 = 3271982;
pub const CASE_NATURAL: i64 = 0;
pub const CASE_LOWER: i64 = 1;
pub const CASE_UPPER: i64 = 2;

/// `resource_type` tag selecting the connection form of set/get option.
pub const RESOURCE_CONNECTION: i32 = 1;

pub(crate) const CASE_ERROR: &str =
    "ATTR_CASE attribute must be one of CASE_LOWER, CASE_UPPER, or CASE_NATURAL";
pub(crate) const HANDLE_KIND_ERROR: &str = "Connection or statement handle must be passed in.";
pub(crate) const INVALID_PARAMETER: &str = "Supplied parameter is invalid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMode {
    #[default]
    Natural,
    Lower,
    Upper,
}

impl CaseMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            CASE_NATURAL => Some(CaseMode::Natural),
            CASE_LOWER => Some(CaseMode::Lower),
            CASE_UPPER => Some(CaseMode::Upper),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            CaseMode::Natural => CASE_NATURAL,
            CaseMode::Lower => CASE_LOWER,
            CaseMode::Upper => CASE_UPPER,
        }
    }

    pub fn apply(self, name: &str) -> String {
        match self {
            CaseMode::Natural => name.to_string(),
            CaseMode::Lower => name.to_lowercase(),
            CaseMode::Upper => name.to_uppercase(),
        }
    }

    pub(crate) fn parse(value: &OptionValue) -> Result<Self> {
        match value {
            OptionValue::Int(code) => Self::from_code(*code),
            OptionValue::Str(_) => None,
        }
        .ok_or_else(|| IbmDbError::Argument(CASE_ERROR.to_string()))
    }
}

/// Host-visible cursor kind: 0 for forward-only, 1 for any scrollable cursor.
pub fn cursor_kind(cursor_attr: i64) -> i64 {
    if cursor_attr == SQL_CURSOR_FORWARD_ONLY {
        SQL_CURSOR_FORWARD_ONLY
    } else {
        SQL_CURSOR_KEYSET_DRIVEN
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Int(i64),
    Str(String),
}

impl OptionValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(v) => Some(*v),
            OptionValue::Str(_) => None,
        }
    }
}

impl From<&OptionValue> for AttrValue {
    fn from(value: &OptionValue) -> Self {
        match value {
            OptionValue::Int(v) => AttrValue::Int(*v),
            OptionValue::Str(s) => AttrValue::Str(s.clone()),
        }
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

/// Option map handed to connect/prepare/exec/set_option, applied in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    entries: Vec<(i32, OptionValue)>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: i32, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: i32, value: impl Into<OptionValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: i32) -> Option<&OptionValue> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i32, OptionValue)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Parse `{"<key>": <int|string|bool>, ...}`. Empty input is an empty map.
    pub fn from_json(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| IbmDbError::Argument(format!("Invalid options: {}", e)))?;
        let object = match parsed {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => return Ok(Self::new()),
            _ => return Err(IbmDbError::Argument("Options must be a JSON object".to_string())),
        };
        let mut options = Self::new();
        for (key, value) in object {
            let key: i32 = key
                .trim()
                .parse()
                .map_err(|_| IbmDbError::Argument(format!("Invalid option key: {}", key)))?;
            let value = match value {
                serde_json::Value::Number(n) => n.as_i64().map(OptionValue::Int),
                serde_json::Value::String(s) => Some(OptionValue::Str(s)),
                serde_json::Value::Bool(b) => Some(OptionValue::from(b)),
                _ => None,
            }
            .ok_or_else(|| {
                IbmDbError::Argument(format!("Invalid value for option {}", key))
            })?;
            options.insert(key, value);
        }
        Ok(options)
    }
}

impl FromIterator<(i32, OptionValue)> for Options {
    fn from_iter<I: IntoIterator<Item = (i32, OptionValue)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (key, value) in iter {
            options.insert(key, value);
        }
        options
    }
}
