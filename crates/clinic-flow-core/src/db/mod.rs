//! Database layer for the clinic workflow.
//!
//! All cross-request ordering guarantees come from SQLite: conditional
//! writes checked via affected-row counts, unique keys for idempotent
//! upserts, and transactions for multi-statement units.

pub mod appointments;
pub mod invoices;
pub mod schema;
pub mod staff;
pub mod visits;

pub use schema::*;
#[allow(unused_imports)]
pub use appointments::*;
#[allow(unused_imports)]
pub use invoices::*;
#[allow(unused_imports)]
pub use staff::*;
#[allow(unused_imports)]
pub use visits::*;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Storage errors. `Constraint` also covers rows whose stored enum codes
/// no longer parse.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Handle to the clinic database: one connection, schema applied on open.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the clinic database at `path`, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Apply the idempotent schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Raw connection, for reads and the notification outbox.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction for a multi-statement workflow unit.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}
