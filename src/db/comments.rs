//! Reply and external-badge comment associations

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Comment association row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: i64,
    /// Absent for externally issued badge comments with no local grant
    pub grant_id: Option<i64>,
    pub note_uri: String,
    pub author_uri: String,
    pub content: Option<String>,
    pub external: bool,
    pub created_at: String,
}

impl CommentRow {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            grant_id: row.get("grant_id")?,
            note_uri: row.get("note_uri")?,
            author_uri: row.get("author_uri")?,
            content: row.get("content")?,
            external: row.get::<_, i64>("external")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for recording a comment association
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    #[serde(default)]
    pub grant_id: Option<i64>,
    pub note_uri: String,
    pub author_uri: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub external: bool,
}

/// Record a comment association once per note URI
///
/// Returns false when the note was already recorded; duplicates are no-ops.
pub fn insert_comment(conn: &Connection, input: CreateCommentInput) -> Result<bool> {
    let changed = conn.execute(
        r#"
        INSERT OR IGNORE INTO grant_comments (grant_id, note_uri, author_uri, content, external)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            input.grant_id,
            input.note_uri,
            input.author_uri,
            input.content,
            input.external as i64,
        ],
    )?;
    Ok(changed > 0)
}

/// Check whether a note URI has already been recorded
pub fn note_seen(conn: &Connection, note_uri: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM grant_comments WHERE note_uri = ? LIMIT 1")?;
    let mut rows = stmt.query(params![note_uri])?;
    Ok(rows.next()?.is_some())
}

/// List comments attached to a grant, oldest first
pub fn list_comments_for_grant(conn: &Connection, grant_id: i64) -> Result<Vec<CommentRow>> {
    let mut stmt = conn.prepare("SELECT * FROM grant_comments WHERE grant_id = ? ORDER BY id")?;

    let comments: Vec<CommentRow> = stmt
        .query_map(params![grant_id], |row| CommentRow::from_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(comments)
}
