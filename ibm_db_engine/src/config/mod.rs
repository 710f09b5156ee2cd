//! Engine-wide defaults, optionally taken from the environment.

const BINMODE_ENV: &str = "IBM_DB_BINMODE";
const LOG_STATEMENTS_ENV: &str = "IBM_DB_LOG_STATEMENTS";

/// How binary column data is surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinMode {
    /// Raw bytes.
    #[default]
    Binary,
    /// Hex text, two characters per byte.
    Convert,
    /// Not read at all; binary columns come back empty.
    Passthru,
}

impl BinMode {
    pub const BINARY: i64 = 1;
    pub const CONVERT: i64 = 2;
    pub const PASSTHRU: i64 = 3;

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            Self::BINARY => Some(BinMode::Binary),
            Self::CONVERT => Some(BinMode::Convert),
            Self::PASSTHRU => Some(BinMode::Passthru),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            BinMode::Binary => Self::BINARY,
            BinMode::Convert => Self::CONVERT,
            BinMode::Passthru => Self::PASSTHRU,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(code) = value.parse::<i64>() {
            return Self::from_code(code);
        }
        match value.to_ascii_lowercase().as_str() {
            "binary" => Some(BinMode::Binary),
            "convert" => Some(BinMode::Convert),
            "passthru" => Some(BinMode::Passthru),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub bin_mode: BinMode,
    /// Emit prepare/execute records through the structured logger.
    pub log_statements: bool,
    /// Upper bound on persistent connections; `None` is unbounded.
    pub persistent_capacity: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bin_mode: BinMode::Binary,
            log_statements: false,
            persistent_capacity: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(BINMODE_ENV) {
            match BinMode::parse(&raw) {
                Some(mode) => config.bin_mode = mode,
                None => log::warn!("Ignoring invalid {}={:?}", BINMODE_ENV, raw),
            }
        }
        if let Some(raw) = lookup(LOG_STATEMENTS_ENV) {
            match parse_bool_flag(&raw) {
                Some(flag) => config.log_statements = flag,
                None => log::warn!("Ignoring invalid {}={:?}", LOG_STATEMENTS_ENV, raw),
            }
        }
        config
    }
}

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
