//! Reply and external-badge collection from inbound Create activities
//!
//! Two shapes of note matter: replies to a grant (the note's reply target
//! points at one of our grant URLs) and externally issued badge notes (the
//! note embeds its own badge metadata). Everything else is accepted and
//! dropped. Comment recording is idempotent on the note identifier, so a
//! re-delivered activity never produces a second row.

use std::sync::Arc;

use tracing::{debug, info};

use crate::activitypub::InboundNote;
use crate::db::{self, Db};
use crate::error::Result;
use crate::note_store::NoteStore;

pub struct ReplyCollector {
    db: Arc<Db>,
    notes: Arc<NoteStore>,
}

/// What an inbound note was recorded as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    /// Reply attached to a local grant
    ReplyRecorded { grant_id: i64 },
    /// Externally issued badge note recorded without a grant
    ExternalBadgeRecorded,
    /// Note identifier was already on record
    Duplicate,
    /// Nothing relevant to this service
    Ignored,
}

impl ReplyCollector {
    pub fn new(db: Arc<Db>, notes: Arc<NoteStore>) -> Self {
        Self { db, notes }
    }

    /// Classify and record one inbound note
    pub async fn collect(&self, author_uri: &str, note: &InboundNote) -> Result<CollectOutcome> {
        if let Some(reply_target) = &note.in_reply_to {
            return self.collect_reply(author_uri, note, reply_target);
        }

        if note.badge.is_some() {
            return self.collect_external_badge(author_uri, note).await;
        }

        debug!(note = %note.id, "Note has no reply target and no badge; ignoring");
        Ok(CollectOutcome::Ignored)
    }

    /// Attach a reply to the grant its target URI names
    ///
    /// The grant is resolved from the final path segment of the reply
    /// target. A target that does not name a known grant is dropped.
    fn collect_reply(
        &self,
        author_uri: &str,
        note: &InboundNote,
        reply_target: &str,
    ) -> Result<CollectOutcome> {
        let Some(grant_id) = final_segment_id(reply_target) else {
            debug!(target = %reply_target, "Reply target does not name a grant; ignoring");
            return Ok(CollectOutcome::Ignored);
        };

        let grant = self
            .db
            .with_conn(|conn| db::badges::get_grant(conn, grant_id))?;
        if grant.is_none() {
            debug!(grant_id, "Reply to unknown grant; ignoring");
            return Ok(CollectOutcome::Ignored);
        }

        let inserted = self.db.with_conn(|conn| {
            db::comments::insert_comment(
                conn,
                db::CreateCommentInput {
                    grant_id: Some(grant_id),
                    note_uri: note.id.clone(),
                    author_uri: author_uri.to_string(),
                    content: note.content.clone(),
                    external: false,
                },
            )
        })?;

        if !inserted {
            debug!(note = %note.id, "Reply already recorded");
            return Ok(CollectOutcome::Duplicate);
        }

        info!(grant_id, note = %note.id, author = %author_uri, "Recorded reply to grant");
        Ok(CollectOutcome::ReplyRecorded { grant_id })
    }

    /// Record a badge note issued elsewhere, unless it is one of our own
    /// notes echoed back
    async fn collect_external_badge(
        &self,
        author_uri: &str,
        note: &InboundNote,
    ) -> Result<CollectOutcome> {
        if let Some(key) = note.id.trim_end_matches('/').rsplit('/').next() {
            if self.notes.note_exists(key).await {
                debug!(note = %note.id, "Badge note is one of ours; ignoring echo");
                return Ok(CollectOutcome::Ignored);
            }
        }

        let inserted = self.db.with_conn(|conn| {
            db::comments::insert_comment(
                conn,
                db::CreateCommentInput {
                    grant_id: None,
                    note_uri: note.id.clone(),
                    author_uri: author_uri.to_string(),
                    content: note.content.clone(),
                    external: true,
                },
            )
        })?;

        if !inserted {
            debug!(note = %note.id, "External badge already recorded");
            return Ok(CollectOutcome::Duplicate);
        }

        info!(note = %note.id, author = %author_uri, "Recorded externally issued badge");
        Ok(CollectOutcome::ExternalBadgeRecorded)
    }
}

/// Parse the final path segment of a URI as a numeric identifier
fn final_segment_id(uri: &str) -> Option<i64> {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}
