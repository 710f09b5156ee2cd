use log::Level;

/// Key=value event records routed through the `log` facade.
pub struct StructuredLogger {
    enabled: bool,
}

impl StructuredLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_statement(&self, level: Level, action: &str, sql: &str, fields: &[(&str, String)]) {
        if !self.enabled {
            return;
        }
        let mut message = format!("Statement {}: {}", action, sql);
        append_fields(&mut message, fields);
        log::log!(level, "{}", message);
    }

    pub fn log_connection(&self, level: Level, target: &str, action: &str) {
        if !self.enabled {
            return;
        }
        log::log!(level, "Connection {}: {}", action, redact_connection_string(target));
    }

    pub fn log_error(&self, error: &str, fields: &[(&str, String)]) {
        if !self.enabled {
            return;
        }
        let mut message = format!("Error: {}", error);
        append_fields(&mut message, fields);
        log::error!("{}", message);
    }
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(true)
    }
}

fn append_fields(message: &mut String, fields: &[(&str, String)]) {
    for (key, value) in fields {
        message.push_str(", ");
        message.push_str(key);
        message.push('=');
        message.push_str(value);
    }
}

/// Mask the value of every `PWD`/`PASSWORD` attribute of a `key=value;` string.
pub fn redact_connection_string(target: &str) -> String {
    target
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, _))
                if matches!(
                    key.trim().to_ascii_uppercase().as_str(),
                    "PWD" | "PASSWORD"
                ) =>
            {
                format!("{}=***", key)
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
