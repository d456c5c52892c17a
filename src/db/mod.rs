//! SQLite database module for the badge pipeline
//!
//! This module is the system's persistent store: actors with their keypairs,
//! badge definitions and grants, the follower graph, and reply associations.
//!
//! ## Architecture
//!
//! - Grant stage transitions are single guarded UPDATE statements, so a
//!   lifecycle operation can never regress a grant another caller advanced
//! - Queue-shaped reads ("next grant awaiting stage X") live in `badges` and
//!   are driven by the explicit `stage` column plus a visibility timestamp
//! - Canonical note/grant documents live in the document archive on disk,
//!   not in SQLite; rows only carry their fingerprints
//!
//! ## Tables
//!
//! - `actors` - local federated identities (keypair PEM at rest)
//! - `badge_definitions` - issuable credential templates
//! - `badge_grants` - issued instances with lifecycle stage fields
//! - `followers` - remote subscribers per local actor
//! - `grant_comments` - inbound reply/badge-metadata associations

pub mod schema;
pub mod actors;
pub mod badges;
pub mod followers;
pub mod comments;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{LaurelError, Result};

/// SQLite database for the badge pipeline
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open or create the database
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("laurel.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| LaurelError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| LaurelError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| LaurelError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| LaurelError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock()
            .map_err(|e| LaurelError::Internal(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock()
            .map_err(|e| LaurelError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| LaurelError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                actor_count: count("SELECT COUNT(*) FROM actors")?,
                definition_count: count("SELECT COUNT(*) FROM badge_definitions")?,
                grant_count: count("SELECT COUNT(*) FROM badge_grants")?,
                awaiting_signature: count(
                    "SELECT COUNT(*) FROM badge_grants WHERE stage = 'accepted' AND fingerprint IS NULL",
                )?,
                awaiting_notification: count(
                    "SELECT COUNT(*) FROM badge_grants WHERE stage = 'signed' AND notified_at IS NULL",
                )?,
                follower_count: count("SELECT COUNT(*) FROM followers")?,
                comment_count: count("SELECT COUNT(*) FROM grant_comments")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub actor_count: u64,
    pub definition_count: u64,
    pub grant_count: u64,
    pub awaiting_signature: u64,
    pub awaiting_notification: u64,
    pub follower_count: u64,
    pub comment_count: u64,
}

// Re-exports
pub use actors::{ActorRow, CreateActorInput};
pub use badges::{BadgeDefinitionRow, BadgeGrantRow, CreateDefinitionInput, CreateGrantInput, GrantStage};
pub use comments::{CommentRow, CreateCommentInput};
pub use followers::FollowerRow;
