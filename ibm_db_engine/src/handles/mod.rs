use std::collections::HashMap;

use crate::engine::{Connection, Statement};
use crate::error::{IbmDbError, Result};

/// Integer ids handed across the C ABI. Connections and statements draw from
/// one counter, so an id names exactly one object of either kind.
pub struct HandleRegistry {
    connections: HashMap<u32, Connection>,
    statements: HashMap<u32, Statement>,
    next_id: u32,
}

/// What an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRef {
    Connection,
    Statement,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            statements: HashMap::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        id
    }

    pub fn insert_connection(&mut self, conn: Connection) -> u32 {
        let id = self.allocate_id();
        self.connections.insert(id, conn);
        id
    }

    pub fn insert_statement(&mut self, stmt: Statement) -> u32 {
        let id = self.allocate_id();
        self.statements.insert(id, stmt);
        id
    }

    pub fn connection(&self, id: u32) -> Result<Connection> {
        self.connections
            .get(&id)
            .cloned()
            .ok_or_else(|| IbmDbError::InvalidHandle(format!("Invalid connection handle: {}", id)))
    }

    pub fn statement_mut(&mut self, id: u32) -> Result<&mut Statement> {
        self.statements
            .get_mut(&id)
            .ok_or_else(|| IbmDbError::InvalidHandle(format!("Invalid statement handle: {}", id)))
    }

    pub fn kind(&self, id: u32) -> Option<HandleRef> {
        if self.connections.contains_key(&id) {
            Some(HandleRef::Connection)
        } else if self.statements.contains_key(&id) {
            Some(HandleRef::Statement)
        } else {
            None
        }
    }

    pub fn remove_connection(&mut self, id: u32) -> Result<Connection> {
        self.connections
            .remove(&id)
            .ok_or_else(|| IbmDbError::InvalidHandle(format!("Invalid connection handle: {}", id)))
    }

    pub fn remove_statement(&mut self, id: u32) -> Result<Statement> {
        self.statements
            .remove(&id)
            .ok_or_else(|| IbmDbError::InvalidHandle(format!("Invalid statement handle: {}", id)))
    }

    pub fn len(&self) -> usize {
        self.connections.len() + self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every statement before the connections they point at.
    pub fn clear(&mut self) {
        self.statements.clear();
        self.connections.clear();
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
