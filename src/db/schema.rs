//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::{LaurelError, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    ).map_err(|e| LaurelError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| LaurelError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| LaurelError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(ACTORS_SCHEMA)
        .map_err(|e| LaurelError::Internal(format!("Failed to create actor tables: {}", e)))?;

    conn.execute_batch(BADGES_SCHEMA)
        .map_err(|e| LaurelError::Internal(format!("Failed to create badge tables: {}", e)))?;

    conn.execute_batch(SOCIAL_SCHEMA)
        .map_err(|e| LaurelError::Internal(format!("Failed to create follower tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| LaurelError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
    // Add migration steps here as schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Local actor schema
const ACTORS_SCHEMA: &str = r#"
-- Local federated identities
-- Canonical URI and key id are derived from (username, domain), never stored
CREATE TABLE IF NOT EXISTS actors (
    id TEXT PRIMARY KEY NOT NULL,
    username TEXT NOT NULL,
    domain TEXT NOT NULL,
    display_name TEXT,
    summary TEXT,

    -- Ed25519 keypair, PKCS#8 PEM at rest
    public_key_pem TEXT NOT NULL,
    private_key_pem TEXT NOT NULL,

    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE (username, domain)
);
"#;

/// Badge definition and grant schema
const BADGES_SCHEMA: &str = r#"
-- Issuable credential templates
-- Immutable once referenced by a grant
CREATE TABLE IF NOT EXISTS badge_definitions (
    id TEXT PRIMARY KEY NOT NULL,
    actor_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    criteria TEXT,
    image_url TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    FOREIGN KEY (actor_id) REFERENCES actors(id) ON DELETE CASCADE
);

-- Issued grants with lifecycle stage fields
-- stage: created -> accepted -> signed -> notified (monotonic)
-- Broadcast completion is implicit in the persisted note document
CREATE TABLE IF NOT EXISTS badge_grants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    definition_id TEXT NOT NULL,
    actor_id TEXT NOT NULL,

    -- Recipient identity
    recipient_name TEXT NOT NULL,
    recipient_email TEXT,
    recipient_uri TEXT,

    -- Lifecycle state
    stage TEXT NOT NULL DEFAULT 'created',
    issued_at TEXT NOT NULL,
    accepted_at TEXT,
    signed_at TEXT,
    notified_at TEXT,
    fingerprint TEXT,

    -- Lane eligibility gate: a grant is invisible to the scheduler
    -- until this timestamp passes
    visible_after TEXT,

    FOREIGN KEY (definition_id) REFERENCES badge_definitions(id),
    FOREIGN KEY (actor_id) REFERENCES actors(id)
);
"#;

/// Follower and comment schema
const SOCIAL_SCHEMA: &str = r#"
-- Remote subscribers per local actor
CREATE TABLE IF NOT EXISTS followers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id TEXT NOT NULL,
    follower_uri TEXT NOT NULL,
    domain TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE (actor_id, follower_uri),
    FOREIGN KEY (actor_id) REFERENCES actors(id) ON DELETE CASCADE
);

-- Inbound reply and external-badge associations
-- note_uri uniqueness is the idempotence guarantee for ingestion
CREATE TABLE IF NOT EXISTS grant_comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    grant_id INTEGER,
    note_uri TEXT NOT NULL UNIQUE,
    author_uri TEXT NOT NULL,
    content TEXT,
    external INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    FOREIGN KEY (grant_id) REFERENCES badge_grants(id) ON DELETE CASCADE
);
"#;

/// Index definitions for queue and graph lookups
const INDEXES_SCHEMA: &str = r#"
-- Actor lookup by handle
CREATE INDEX IF NOT EXISTS idx_actors_username ON actors(username);

-- Grant queue predicates
CREATE INDEX IF NOT EXISTS idx_grants_stage ON badge_grants(stage);
CREATE INDEX IF NOT EXISTS idx_grants_actor_id ON badge_grants(actor_id);
CREATE INDEX IF NOT EXISTS idx_grants_definition_id ON badge_grants(definition_id);

-- Follower graph
CREATE INDEX IF NOT EXISTS idx_followers_actor_id ON followers(actor_id);
CREATE INDEX IF NOT EXISTS idx_followers_uri ON followers(follower_uri);

-- Comment lookups
CREATE INDEX IF NOT EXISTS idx_comments_grant_id ON grant_comments(grant_id);
"#;
