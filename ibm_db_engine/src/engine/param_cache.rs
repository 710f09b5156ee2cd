use std::collections::BTreeMap;

use crate::cli::codes::{PARAM_FILE, SQL_PARAM_INPUT, SQL_PARAM_INPUT_OUTPUT, SQL_PARAM_OUTPUT};
use crate::cli::{ParamDescription, ParamIo};
use crate::error::{IbmDbError, Result};
use crate::protocol::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    /// Large-object input read from the file named by the bound value.
    File,
}

impl ParamDirection {
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            SQL_PARAM_INPUT => Ok(ParamDirection::Input),
            SQL_PARAM_OUTPUT => Ok(ParamDirection::Output),
            SQL_PARAM_INPUT_OUTPUT => Ok(ParamDirection::InputOutput),
            PARAM_FILE => Ok(ParamDirection::File),
            other => Err(IbmDbError::Argument(format!(
                "Invalid parameter direction: {}",
                other
            ))),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            ParamDirection::Input => SQL_PARAM_INPUT,
            ParamDirection::Output => SQL_PARAM_OUTPUT,
            ParamDirection::InputOutput => SQL_PARAM_INPUT_OUTPUT,
            ParamDirection::File => PARAM_FILE,
        }
    }

    pub fn io(self) -> ParamIo {
        match self {
            ParamDirection::Input | ParamDirection::File => ParamIo::Input,
            ParamDirection::Output => ParamIo::Output,
            ParamDirection::InputOutput => ParamIo::InputOutput,
        }
    }

    pub fn is_output(self) -> bool {
        matches!(self, ParamDirection::Output | ParamDirection::InputOutput)
    }
}

/// Caller overrides for `bind_param`; `None` fields come from describing the marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindOptions {
    pub direction: Option<ParamDirection>,
    pub sql_type: Option<i16>,
    pub precision: Option<usize>,
    pub scale: Option<i16>,
    /// Character values are truncated or NUL-padded to this many bytes.
    pub size: Option<usize>,
}

impl BindOptions {
    pub fn direction(mut self, direction: ParamDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn sql_type(mut self, sql_type: i16) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    pub fn precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn scale(mut self, scale: i16) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Type, precision and scale all given: the marker need not be described.
    pub fn fully_typed(&self) -> bool {
        self.sql_type.is_some() && self.precision.is_some() && self.scale.is_some()
    }
}

/// Everything remembered about one parameter marker between bind and execute.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamNode {
    pub position: u16,
    pub direction: ParamDirection,
    pub sql_type: i16,
    pub precision: usize,
    pub scale: i16,
    pub nullable: i16,
    pub size: Option<usize>,
    pub value: Value,
}

impl ParamNode {
    pub fn described(position: u16, desc: ParamDescription, value: Value) -> Self {
        Self {
            position,
            direction: ParamDirection::Input,
            sql_type: desc.sql_type,
            precision: desc.size,
            scale: desc.scale,
            nullable: desc.nullable,
            size: None,
            value,
        }
    }

    /// Overrides replace described fields one by one, only where supplied.
    pub fn apply(&mut self, options: &BindOptions) {
        if let Some(direction) = options.direction {
            self.direction = direction;
        }
        if let Some(sql_type) = options.sql_type {
            self.sql_type = sql_type;
        }
        if let Some(precision) = options.precision {
            self.precision = precision;
        }
        if let Some(scale) = options.scale {
            self.scale = scale;
        }
        self.size = options.size;
    }
}

/// Pre-bound parameters ordered by position; rebinding a position replaces it.
#[derive(Debug, Clone, Default)]
pub struct ParamCache {
    nodes: BTreeMap<u16, ParamNode>,
}

impl ParamCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, node: ParamNode) {
        self.nodes.insert(node.position, node);
    }

    pub fn get(&self, position: u16) -> Option<&ParamNode> {
        self.nodes.get(&position)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamNode> {
        self.nodes.values()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
