//! Follower rows: remote actors subscribed to a local actor

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Follower row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerRow {
    pub id: i64,
    pub actor_id: String,
    pub follower_uri: String,
    pub domain: String,
    pub created_at: String,
    pub updated_at: String,
}

impl FollowerRow {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            actor_id: row.get("actor_id")?,
            follower_uri: row.get("follower_uri")?,
            domain: row.get("domain")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Upsert a follower keyed by (local actor, follower URI)
///
/// Re-following refreshes metadata on the existing row instead of
/// duplicating it.
pub fn upsert_follower(conn: &Connection, actor_id: &str, follower_uri: &str, domain: &str) -> Result<FollowerRow> {
    let now = chrono::Utc::now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO followers (actor_id, follower_uri, domain, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(actor_id, follower_uri) DO UPDATE SET
        domain = excluded.domain,
        updated_at = excluded.updated_at
        "#,
        params![actor_id, follower_uri, domain, now, now],
    )?;

    get_follower(conn, actor_id, follower_uri)?.ok_or_else(|| {
        crate::error::LaurelError::Internal("Follower not found after upsert".to_string())
    })
}

/// Get one follower row
pub fn get_follower(conn: &Connection, actor_id: &str, follower_uri: &str) -> Result<Option<FollowerRow>> {
    let mut stmt = conn.prepare("SELECT * FROM followers WHERE actor_id = ? AND follower_uri = ?")?;
    let mut rows = stmt.query(params![actor_id, follower_uri])?;

    match rows.next()? {
        Some(row) => Ok(Some(FollowerRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// Remove a follower; returns false if no row existed
pub fn remove_follower(conn: &Connection, actor_id: &str, follower_uri: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM followers WHERE actor_id = ? AND follower_uri = ?",
        params![actor_id, follower_uri],
    )?;
    Ok(changed > 0)
}

/// Snapshot of all followers of a local actor, oldest first
///
/// Broadcast iterates this snapshot, so mid-broadcast follow or unfollow
/// activity cannot perturb an in-flight fan-out.
pub fn list_followers(conn: &Connection, actor_id: &str) -> Result<Vec<FollowerRow>> {
    let mut stmt = conn.prepare("SELECT * FROM followers WHERE actor_id = ? ORDER BY id")?;

    let followers: Vec<FollowerRow> = stmt
        .query_map(params![actor_id], |row| FollowerRow::from_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(followers)
}

/// Count followers of a local actor
pub fn count_followers(conn: &Connection, actor_id: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM followers WHERE actor_id = ?",
        params![actor_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}
