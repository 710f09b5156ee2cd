//! Process-wide "last error" snapshots and per-handle diagnostic cursors.

use crate::cli::{CliError, DiagRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Connection,
    Statement,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Snapshot {
    state: String,
    message: String,
}

/// Last connection-level and statement-level diagnostic, overwritten by each
/// failing call that copies its error to the context.
#[derive(Debug, Default)]
pub struct ErrorCache {
    conn: Snapshot,
    stmt: Snapshot,
}

impl ErrorCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: HandleKind) -> &mut Snapshot {
        match kind {
            HandleKind::Connection => &mut self.conn,
            HandleKind::Statement => &mut self.stmt,
        }
    }

    pub fn record(&mut self, kind: HandleKind, err: &CliError) {
        let snapshot = match err.record() {
            Some(rec) => Snapshot {
                state: rec.state_str(),
                message: rec.formatted(),
            },
            None => Snapshot {
                state: String::new(),
                message: err.formatted(),
            },
        };
        *self.slot(kind) = snapshot;
    }

    pub fn clear(&mut self, kind: HandleKind) {
        *self.slot(kind) = Snapshot::default();
    }

    pub fn state(&self, kind: HandleKind) -> &str {
        match kind {
            HandleKind::Connection => &self.conn.state,
            HandleKind::Statement => &self.stmt.state,
        }
    }

    pub fn message(&self, kind: HandleKind) -> &str {
        match kind {
            HandleKind::Connection => &self.conn.message,
            HandleKind::Statement => &self.stmt.message,
        }
    }
}

/// Independent SQLSTATE and message cursors over a handle's diagnostic
/// records. Reading a message drags the state cursor forward to it, and the
/// other way round, so alternating calls walk the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecnoTracker {
    error: i16,
    message: i16,
}

impl Default for RecnoTracker {
    fn default() -> Self {
        Self {
            error: 1,
            message: 1,
        }
    }
}

impl RecnoTracker {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn next_state(&mut self, read: impl Fn(i16) -> Option<DiagRecord>) -> String {
        let out = read(self.error).map(|r| r.state_str()).unwrap_or_default();
        if self.error - self.message >= 1 {
            self.message = self.error;
        }
        self.error = self.error.saturating_add(1);
        out
    }

    pub fn next_message(&mut self, read: impl Fn(i16) -> Option<DiagRecord>) -> String {
        let out = read(self.message).map(|r| r.formatted()).unwrap_or_default();
        if self.message - self.error >= 1 {
            self.error = self.message;
        }
        self.message = self.message.saturating_add(1);
        out
    }
}
