//! Badge definition and grant rows, stage transitions, and lane queues
//!
//! Grant rows move through a monotonic lifecycle: created -> accepted ->
//! signed -> notified. Every transition is a single guarded UPDATE keyed on
//! the previous state, so replaying an operation is a no-op rather than a
//! regressing write. The scheduler's lane eligibility ("next grant awaiting
//! stage X") is an explicit predicate on the row, mirrored by the SQL the
//! peek functions run.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::{LaurelError, Result};

/// Lifecycle stage of a badge grant
///
/// Ordered so later stages compare greater than earlier ones. Broadcast has
/// no stage of its own; completion is implicit in the persisted note document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStage {
    Created,
    Accepted,
    Signed,
    Notified,
}

impl GrantStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantStage::Created => "created",
            GrantStage::Accepted => "accepted",
            GrantStage::Signed => "signed",
            GrantStage::Notified => "notified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(GrantStage::Created),
            "accepted" => Some(GrantStage::Accepted),
            "signed" => Some(GrantStage::Signed),
            "notified" => Some(GrantStage::Notified),
            _ => None,
        }
    }
}

/// Badge definition row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeDefinitionRow {
    pub id: String,
    pub actor_id: String,
    pub title: String,
    pub description: Option<String>,
    pub criteria: Option<String>,
    pub image_url: Option<String>,
    pub created_at: String,
}

impl BadgeDefinitionRow {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            actor_id: row.get("actor_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            criteria: row.get("criteria")?,
            image_url: row.get("image_url")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Badge grant row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeGrantRow {
    pub id: i64,
    pub definition_id: String,
    pub actor_id: String,
    pub recipient_name: String,
    pub recipient_email: Option<String>,
    pub recipient_uri: Option<String>,
    pub stage: GrantStage,
    pub issued_at: String,
    pub accepted_at: Option<String>,
    pub signed_at: Option<String>,
    pub notified_at: Option<String>,
    pub fingerprint: Option<String>,
    pub visible_after: Option<String>,
}

impl BadgeGrantRow {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        let stage_text: String = row.get("stage")?;
        let stage = GrantStage::parse(&stage_text).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown grant stage: {}", stage_text).into(),
            )
        })?;

        Ok(Self {
            id: row.get("id")?,
            definition_id: row.get("definition_id")?,
            actor_id: row.get("actor_id")?,
            recipient_name: row.get("recipient_name")?,
            recipient_email: row.get("recipient_email")?,
            recipient_uri: row.get("recipient_uri")?,
            stage,
            issued_at: row.get("issued_at")?,
            accepted_at: row.get("accepted_at")?,
            signed_at: row.get("signed_at")?,
            notified_at: row.get("notified_at")?,
            fingerprint: row.get("fingerprint")?,
            visible_after: row.get("visible_after")?,
        })
    }

    /// Process-lane eligibility: accepted, unsigned, and past its
    /// visibility timestamp
    pub fn awaiting_signature(&self, now: &str) -> bool {
        self.stage == GrantStage::Accepted && self.fingerprint.is_none() && self.visible(now)
    }

    /// Notify-lane eligibility: signed, unnotified, and past its
    /// visibility timestamp
    pub fn awaiting_notification(&self, now: &str) -> bool {
        self.stage == GrantStage::Signed && self.notified_at.is_none() && self.visible(now)
    }

    fn visible(&self, now: &str) -> bool {
        match &self.visible_after {
            Some(after) => after.as_str() <= now,
            None => true,
        }
    }
}

/// Input for creating a badge definition
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDefinitionInput {
    pub id: String,
    pub actor_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Input for creating a badge grant
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGrantInput {
    pub definition_id: String,
    pub actor_id: String,
    pub recipient_name: String,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub recipient_uri: Option<String>,
}

/// Get definition by ID
pub fn get_definition(conn: &Connection, id: &str) -> Result<Option<BadgeDefinitionRow>> {
    let mut stmt = conn.prepare("SELECT * FROM badge_definitions WHERE id = ?")?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(BadgeDefinitionRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// Create a badge definition
pub fn create_definition(conn: &Connection, input: CreateDefinitionInput) -> Result<BadgeDefinitionRow> {
    conn.execute(
        r#"
        INSERT INTO badge_definitions (id, actor_id, title, description, criteria, image_url)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            input.id,
            input.actor_id,
            input.title,
            input.description,
            input.criteria,
            input.image_url,
        ],
    )?;

    get_definition(conn, &input.id)?
        .ok_or_else(|| LaurelError::Internal("Definition not found after insert".to_string()))
}

/// Get grant by ID
pub fn get_grant(conn: &Connection, id: i64) -> Result<Option<BadgeGrantRow>> {
    let mut stmt = conn.prepare("SELECT * FROM badge_grants WHERE id = ?")?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(BadgeGrantRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// Create a grant in the Created stage
pub fn create_grant(conn: &Connection, input: CreateGrantInput) -> Result<BadgeGrantRow> {
    let issued_at = chrono::Utc::now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO badge_grants (
            definition_id, actor_id, recipient_name, recipient_email,
            recipient_uri, stage, issued_at
        ) VALUES (?, ?, ?, ?, ?, 'created', ?)
        "#,
        params![
            input.definition_id,
            input.actor_id,
            input.recipient_name,
            input.recipient_email,
            input.recipient_uri,
            issued_at,
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_grant(conn, id)?
        .ok_or_else(|| LaurelError::Internal("Grant not found after insert".to_string()))
}

/// Mark a grant accepted by its recipient
///
/// Returns false if the grant was already past the Created stage.
pub fn accept_grant(conn: &Connection, id: i64) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE badge_grants SET stage = 'accepted', accepted_at = ? WHERE id = ? AND stage = 'created'",
        params![now, id],
    )?;
    Ok(changed > 0)
}

/// Record a signature: fingerprint plus signed timestamp
///
/// Guarded on the fingerprint column being unset, so a grant can never be
/// re-signed with a different fingerprint through this path. Returns false
/// when the guard rejects the write.
pub fn mark_signed(conn: &Connection, id: i64, fingerprint: &str) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn.execute(
        r#"
        UPDATE badge_grants SET stage = 'signed', signed_at = ?, fingerprint = ?
        WHERE id = ? AND stage = 'accepted' AND fingerprint IS NULL
        "#,
        params![now, fingerprint, id],
    )?;
    Ok(changed > 0)
}

/// Record that recipient notification was attempted
pub fn mark_notified(conn: &Connection, id: i64) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn.execute(
        r#"
        UPDATE badge_grants SET stage = 'notified', notified_at = ?
        WHERE id = ? AND stage = 'signed' AND notified_at IS NULL
        "#,
        params![now, id],
    )?;
    Ok(changed > 0)
}

/// Push a grant's lane visibility into the future (backoff after a failure)
pub fn defer_grant(conn: &Connection, id: i64, until: &str) -> Result<()> {
    conn.execute(
        "UPDATE badge_grants SET visible_after = ? WHERE id = ?",
        params![until, id],
    )?;
    Ok(())
}

/// Peek the next grant eligible for the process lane (accepted, unsigned)
pub fn next_grant_for_signing(conn: &Connection) -> Result<Option<i64>> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        r#"
        SELECT id FROM badge_grants
        WHERE stage = 'accepted' AND fingerprint IS NULL
          AND (visible_after IS NULL OR visible_after <= ?)
        ORDER BY id LIMIT 1
        "#,
    )?;
    let mut rows = stmt.query(params![now])?;

    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Peek the next grant eligible for the notify lane (signed, unnotified)
pub fn next_grant_for_notification(conn: &Connection) -> Result<Option<i64>> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        r#"
        SELECT id FROM badge_grants
        WHERE stage = 'signed' AND notified_at IS NULL
          AND (visible_after IS NULL OR visible_after <= ?)
        ORDER BY id LIMIT 1
        "#,
    )?;
    let mut rows = stmt.query(params![now])?;

    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}
