//! Badge lifecycle engine: sign, notify, broadcast
//!
//! Owns the grant state machine. Each operation loads the grant, checks its
//! own precondition against the row (never trusting the caller's scheduling
//! discipline), computes values, and hands them to the store for a guarded
//! write. Delivery failures inside notify and broadcast are logged and
//! counted, never propagated; store failures abort the single operation.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::activitypub::{
    BadgeMetadata, CreateActivity, DocumentSignature, Note, RepliesCollection, Tag,
    ACTIVITYSTREAMS_CONTEXT, PUBLIC_AUDIENCE,
};
use crate::db::{self, ActorRow, BadgeDefinitionRow, BadgeGrantRow, Db, GrantStage};
use crate::error::{LaurelError, Result};
use crate::note_store::NoteStore;
use crate::services::delivery::Transport;
use crate::signing;

/// Result of a sign attempt
#[derive(Debug, Clone)]
pub enum SignOutcome {
    /// Note generated, archived, and fingerprint recorded
    Signed {
        note_key: String,
        note_uri: String,
        fingerprint: String,
    },
    /// Grant already carried a fingerprint; nothing regenerated
    AlreadySigned { fingerprint: String },
    /// Grant exists but is not yet accepted
    NotEligible { stage: GrantStage },
}

/// Result of a notify attempt
#[derive(Debug, Clone)]
pub enum NotifyOutcome {
    /// Notification attempted and recorded; `delivered` is false when the
    /// remote leg failed but the attempt was still marked
    Notified { delivered: bool },
    AlreadyNotified,
    NotEligible { stage: GrantStage },
}

/// Per-follower tally of a broadcast
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BroadcastOutcome {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Drives grants through sign -> notify -> broadcast
pub struct BadgeLifecycle {
    db: Arc<Db>,
    notes: Arc<NoteStore>,
    transport: Arc<dyn Transport>,
}

impl BadgeLifecycle {
    pub fn new(db: Arc<Db>, notes: Arc<NoteStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            db,
            notes,
            transport,
        }
    }

    /// Generate, archive, and fingerprint the canonical note for a grant
    ///
    /// Idempotent: a grant that already carries a fingerprint is left
    /// untouched, and generation is deterministic (the note's published
    /// timestamp comes from the grant, not the clock), so a replay can
    /// never archive a different document under the same identifier.
    pub async fn sign_and_generate(&self, grant_id: i64) -> Result<SignOutcome> {
        let grant = self.load_grant(grant_id)?;

        if let Some(fingerprint) = grant.fingerprint.clone() {
            debug!(grant_id, "Grant already signed");
            return Ok(SignOutcome::AlreadySigned { fingerprint });
        }

        if grant.stage != GrantStage::Accepted {
            debug!(grant_id, stage = grant.stage.as_str(), "Grant not eligible for signing");
            return Ok(SignOutcome::NotEligible { stage: grant.stage });
        }

        let definition = self.load_definition(&grant.definition_id)?;
        let actor = self.load_actor(&grant.actor_id)?;

        let note_key = NoteStore::derive_note_key(&actor.uri(), grant.id);
        let note_uri = format!("{}/notes/{}", actor.base_url(), note_key);
        let note = build_grant_note(&actor, &definition, &grant, &note_uri);

        let note_bytes = serde_json::to_vec(&note)?;
        self.notes.put_note(&note_key, &note_bytes).await?;

        let badge = note
            .badge
            .as_ref()
            .ok_or_else(|| LaurelError::Internal("Grant note missing badge metadata".to_string()))?;
        self.notes
            .put_grant_document(grant.id, &serde_json::to_vec(badge)?)
            .await?;

        let fingerprint = compute_fingerprint(&note_bytes, &grant, &definition);

        let marked = self
            .db
            .with_conn(|conn| db::badges::mark_signed(conn, grant.id, &fingerprint))?;
        if !marked {
            // Lost a race to another signer; the archived note is identical
            let current = self.load_grant(grant_id)?;
            return Ok(SignOutcome::AlreadySigned {
                fingerprint: current.fingerprint.unwrap_or(fingerprint),
            });
        }

        info!(grant_id, note_key = %note_key, fingerprint = %fingerprint, "Signed badge grant");

        Ok(SignOutcome::Signed {
            note_key,
            note_uri,
            fingerprint,
        })
    }

    /// Deliver a private notification note to the grant's recipient
    ///
    /// Best effort: any failure on the remote leg is logged and the grant is
    /// still marked notified, so it cannot wedge the notify lane.
    pub async fn notify(&self, grant_id: i64) -> Result<NotifyOutcome> {
        let grant = self.load_grant(grant_id)?;

        if grant.notified_at.is_some() {
            debug!(grant_id, "Grant already notified");
            return Ok(NotifyOutcome::AlreadyNotified);
        }

        if grant.stage != GrantStage::Signed {
            debug!(grant_id, stage = grant.stage.as_str(), "Grant not eligible for notification");
            return Ok(NotifyOutcome::NotEligible { stage: grant.stage });
        }

        let definition = self.load_definition(&grant.definition_id)?;
        let actor = self.load_actor(&grant.actor_id)?;

        let delivered = match &grant.recipient_uri {
            None => {
                info!(grant_id, "Grant has no recipient profile; nothing to deliver");
                false
            }
            Some(recipient_uri) => self
                .deliver_notification(&actor, &definition, &grant, recipient_uri)
                .await,
        };

        let marked = self
            .db
            .with_conn(|conn| db::badges::mark_notified(conn, grant.id))?;
        if !marked {
            return Ok(NotifyOutcome::AlreadyNotified);
        }

        info!(grant_id, delivered, "Recorded notification attempt");

        Ok(NotifyOutcome::Notified { delivered })
    }

    async fn deliver_notification(
        &self,
        actor: &ActorRow,
        definition: &BadgeDefinitionRow,
        grant: &BadgeGrantRow,
        recipient_uri: &str,
    ) -> bool {
        let profile = match self.transport.resolve_actor(recipient_uri).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(grant_id = grant.id, recipient = %recipient_uri, error = %e,
                      "Recipient profile resolution failed; marking notification attempted");
                return false;
            }
        };

        let note_key = NoteStore::derive_note_key(&actor.uri(), grant.id);
        let note_uri = format!("{}/notes/{}", actor.base_url(), note_key);
        let note = build_notification_note(actor, definition, grant, &note_uri, recipient_uri, profile.display_name());

        let activity = match self.signed_create(actor, note) {
            Ok(activity) => activity,
            Err(e) => {
                warn!(grant_id = grant.id, error = %e, "Failed to build notification activity");
                return false;
            }
        };

        match self.transport.deliver(actor, &profile.inbox, &activity).await {
            Ok(()) => true,
            Err(e) => {
                warn!(grant_id = grant.id, inbox = %profile.inbox, error = %e,
                      "Notification delivery failed; marking attempted");
                false
            }
        }
    }

    /// Deliver the archived note publicly to every follower of the issuer
    ///
    /// Reads the note back from the archive (never regenerates it) and walks
    /// an immutable snapshot of the follower list. Each follower is isolated:
    /// one failed resolution or delivery is logged and the fan-out continues.
    pub async fn broadcast(&self, grant_id: i64) -> Result<BroadcastOutcome> {
        let grant = self.load_grant(grant_id)?;
        let actor = self.load_actor(&grant.actor_id)?;

        let note_key = NoteStore::derive_note_key(&actor.uri(), grant.id);
        let note_bytes = self.notes.get_note(&note_key).await?;
        let note: Note = serde_json::from_slice(&note_bytes)?;

        let activity = self.signed_create(&actor, note)?;

        let followers = self
            .db
            .with_conn(|conn| db::followers::list_followers(conn, &actor.id))?;

        let mut outcome = BroadcastOutcome {
            attempted: followers.len(),
            ..Default::default()
        };

        if followers.is_empty() {
            debug!(grant_id, "No followers to broadcast to");
            return Ok(outcome);
        }

        for follower in &followers {
            match self.deliver_to_follower(&actor, &follower.follower_uri, &activity).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warn!(grant_id, follower = %follower.follower_uri, error = %e,
                          "Broadcast delivery failed; continuing with remaining followers");
                }
            }
        }

        info!(
            grant_id,
            attempted = outcome.attempted,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "Broadcast complete"
        );

        Ok(outcome)
    }

    async fn deliver_to_follower(
        &self,
        actor: &ActorRow,
        follower_uri: &str,
        activity: &Value,
    ) -> Result<()> {
        let profile = self.transport.resolve_actor(follower_uri).await?;
        self.transport.deliver(actor, &profile.inbox, activity).await
    }

    /// Wrap a note in a Create activity carrying a detached signature
    fn signed_create(&self, actor: &ActorRow, note: Note) -> Result<Value> {
        let mut create = CreateActivity::wrap(&actor.uri(), note);

        let unsigned = serde_json::to_vec(&create)?;
        let signature_value = signing::sign_document(&actor.private_key_pem, &unsigned)?;

        create.signature = Some(DocumentSignature {
            kind: "Ed25519Signature".to_string(),
            creator: actor.key_id(),
            created: chrono::Utc::now().to_rfc3339(),
            signature_value,
        });

        Ok(serde_json::to_value(&create)?)
    }

    fn load_grant(&self, id: i64) -> Result<BadgeGrantRow> {
        self.db
            .with_conn(|conn| db::badges::get_grant(conn, id))?
            .ok_or_else(|| LaurelError::NotFound(format!("grant {}", id)))
    }

    fn load_definition(&self, id: &str) -> Result<BadgeDefinitionRow> {
        self.db
            .with_conn(|conn| db::badges::get_definition(conn, id))?
            .ok_or_else(|| LaurelError::NotFound(format!("definition {}", id)))
    }

    fn load_actor(&self, id: &str) -> Result<ActorRow> {
        self.db
            .with_conn(|conn| db::actors::get_actor(conn, id))?
            .ok_or_else(|| LaurelError::NotFound(format!("actor {}", id)))
    }
}

/// Assemble the canonical public note for a grant
///
/// Deterministic: every field derives from stored rows, including the
/// published timestamp, so regenerating yields byte-identical output.
fn build_grant_note(
    actor: &ActorRow,
    definition: &BadgeDefinitionRow,
    grant: &BadgeGrantRow,
    note_uri: &str,
) -> Note {
    let issuer_name = actor.display_name.as_deref().unwrap_or(&actor.username);
    let grant_url = format!("{}/grants/{}", actor.base_url(), grant.id);

    let mut tags = Vec::new();
    if let Some(recipient_uri) = &grant.recipient_uri {
        tags.push(Tag::mention(recipient_uri, &grant.recipient_name));
    }

    Note {
        context: ACTIVITYSTREAMS_CONTEXT.to_string(),
        id: note_uri.to_string(),
        kind: "Note".to_string(),
        content: format!(
            "<p>{} has been awarded the badge <a href=\"{}\">{}</a> by {}.</p>",
            grant.recipient_name, grant_url, definition.title, issuer_name
        ),
        url: grant_url.clone(),
        attributed_to: actor.uri(),
        to: vec![PUBLIC_AUDIENCE.to_string()],
        cc: vec![actor.followers_uri()],
        published: grant.issued_at.clone(),
        tags,
        replies: RepliesCollection::for_note(note_uri),
        badge: Some(build_badge_metadata(actor, definition, grant, &grant_url)),
    }
}

/// Assemble the private notification note addressed to the recipient only
fn build_notification_note(
    actor: &ActorRow,
    definition: &BadgeDefinitionRow,
    grant: &BadgeGrantRow,
    note_uri: &str,
    recipient_uri: &str,
    recipient_display: &str,
) -> Note {
    let issuer_name = actor.display_name.as_deref().unwrap_or(&actor.username);
    let grant_url = format!("{}/grants/{}", actor.base_url(), grant.id);
    let notify_uri = format!("{}/notify", note_uri);

    Note {
        context: ACTIVITYSTREAMS_CONTEXT.to_string(),
        id: notify_uri.clone(),
        kind: "Note".to_string(),
        content: format!(
            "<p>@{} You have been awarded the badge <a href=\"{}\">{}</a> by {}.</p>",
            recipient_display, grant_url, definition.title, issuer_name
        ),
        url: grant_url.clone(),
        attributed_to: actor.uri(),
        to: vec![recipient_uri.to_string()],
        cc: vec![],
        published: chrono::Utc::now().to_rfc3339(),
        tags: vec![Tag::mention(recipient_uri, &grant.recipient_name)],
        replies: RepliesCollection::for_note(&notify_uri),
        badge: Some(build_badge_metadata(actor, definition, grant, &grant_url)),
    }
}

fn build_badge_metadata(
    actor: &ActorRow,
    definition: &BadgeDefinitionRow,
    grant: &BadgeGrantRow,
    grant_url: &str,
) -> BadgeMetadata {
    BadgeMetadata {
        id: grant_url.to_string(),
        kind: "BadgeAssertion".to_string(),
        name: definition.title.clone(),
        description: definition.description.clone(),
        criteria: definition.criteria.clone(),
        image: definition.image_url.clone(),
        issuer: actor.uri(),
        recipient: grant.recipient_name.clone(),
        issued_on: grant.issued_at.clone(),
    }
}

/// Fingerprint over the canonical note plus identifying grant metadata
fn compute_fingerprint(
    note_bytes: &[u8],
    grant: &BadgeGrantRow,
    definition: &BadgeDefinitionRow,
) -> String {
    let metadata = serde_json::json!({
        "grant": grant.id,
        "definition": definition.id,
        "recipient": grant.recipient_name,
        "issued": grant.issued_at,
    });

    let mut material = note_bytes.to_vec();
    material.push(b'\n');
    material.extend_from_slice(metadata.to_string().as_bytes());

    NoteStore::fingerprint(&material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{actors, badges, followers};
    use crate::services::delivery::testing::FakeTransport;
    use tempfile::TempDir;

    struct Fixture {
        db: Arc<Db>,
        transport: Arc<FakeTransport>,
        lifecycle: BadgeLifecycle,
        actor_id: String,
        _archive_dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let archive_dir = TempDir::new().unwrap();
        let notes = Arc::new(NoteStore::new(archive_dir.path()).await.unwrap());
        let transport = Arc::new(FakeTransport::new());

        let keys = signing::generate_keypair().unwrap();
        let actor = db
            .with_conn(|conn| {
                actors::create_actor(
                    conn,
                    actors::CreateActorInput {
                        id: "actor-1".to_string(),
                        username: "issuer".to_string(),
                        domain: "badges.example.org".to_string(),
                        display_name: Some("Badge Issuer".to_string()),
                        summary: None,
                        public_key_pem: keys.public_pem,
                        private_key_pem: keys.private_pem,
                    },
                )
            })
            .unwrap();

        db.with_conn(|conn| {
            badges::create_definition(
                conn,
                badges::CreateDefinitionInput {
                    id: "def-1".to_string(),
                    actor_id: actor.id.clone(),
                    title: "Rust Contributor".to_string(),
                    description: Some("Contributed to the project".to_string()),
                    criteria: None,
                    image_url: None,
                },
            )
        })
        .unwrap();

        let lifecycle = BadgeLifecycle::new(db.clone(), notes, transport.clone() as Arc<dyn Transport>);

        Fixture {
            db,
            transport,
            lifecycle,
            actor_id: actor.id,
            _archive_dir: archive_dir,
        }
    }

    fn seed_grant(fx: &Fixture, recipient_uri: Option<&str>) -> i64 {
        fx.db
            .with_conn(|conn| {
                badges::create_grant(
                    conn,
                    badges::CreateGrantInput {
                        definition_id: "def-1".to_string(),
                        actor_id: fx.actor_id.clone(),
                        recipient_name: "Ada".to_string(),
                        recipient_email: None,
                        recipient_uri: recipient_uri.map(|u| u.to_string()),
                    },
                )
            })
            .unwrap()
            .id
    }

    fn accept(fx: &Fixture, grant_id: i64) {
        fx.db
            .with_conn(|conn| badges::accept_grant(conn, grant_id))
            .unwrap();
    }

    #[tokio::test]
    async fn test_sign_archives_note_and_records_fingerprint() {
        let fx = fixture().await;
        let grant_id = seed_grant(&fx, Some("https://remote.example/users/ada"));
        accept(&fx, grant_id);

        let outcome = fx.lifecycle.sign_and_generate(grant_id).await.unwrap();
        let (note_key, fingerprint) = match outcome {
            SignOutcome::Signed {
                note_key,
                fingerprint,
                ..
            } => (note_key, fingerprint),
            other => panic!("expected Signed, got {:?}", other),
        };

        assert!(fingerprint.starts_with("sha256-"));

        let grant = fx
            .db
            .with_conn(|conn| badges::get_grant(conn, grant_id))
            .unwrap()
            .unwrap();
        assert_eq!(grant.stage, GrantStage::Signed);
        assert_eq!(grant.fingerprint.as_deref(), Some(fingerprint.as_str()));

        // The archived note is the canonical document: published comes from
        // the grant, addressing is public plus followers
        let stored = fx.lifecycle.notes.get_note(&note_key).await.unwrap();
        let note: Note = serde_json::from_slice(&stored).unwrap();
        assert_eq!(note.published, grant.issued_at);
        assert_eq!(note.to, vec![PUBLIC_AUDIENCE.to_string()]);
        assert!(note.badge.is_some());
    }

    #[tokio::test]
    async fn test_sign_twice_is_idempotent() {
        let fx = fixture().await;
        let grant_id = seed_grant(&fx, None);
        accept(&fx, grant_id);

        let first = fx.lifecycle.sign_and_generate(grant_id).await.unwrap();
        let first_fingerprint = match first {
            SignOutcome::Signed { fingerprint, .. } => fingerprint,
            other => panic!("expected Signed, got {:?}", other),
        };

        let second = fx.lifecycle.sign_and_generate(grant_id).await.unwrap();
        match second {
            SignOutcome::AlreadySigned { fingerprint } => {
                assert_eq!(fingerprint, first_fingerprint)
            }
            other => panic!("expected AlreadySigned, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sign_unaccepted_grant_is_a_noop() {
        let fx = fixture().await;
        let grant_id = seed_grant(&fx, None);

        let outcome = fx.lifecycle.sign_and_generate(grant_id).await.unwrap();
        assert!(matches!(
            outcome,
            SignOutcome::NotEligible {
                stage: GrantStage::Created
            }
        ));

        // No document was archived for the ineligible grant
        let grant = fx
            .db
            .with_conn(|conn| badges::get_grant(conn, grant_id))
            .unwrap()
            .unwrap();
        assert!(grant.fingerprint.is_none());
    }

    #[tokio::test]
    async fn test_sign_missing_grant_is_not_found() {
        let fx = fixture().await;
        let result = fx.lifecycle.sign_and_generate(9999).await;
        assert!(matches!(result, Err(LaurelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_notify_delivers_privately_to_recipient() {
        let fx = fixture().await;
        let recipient = "https://remote.example/users/ada";
        fx.transport.register(recipient);

        let grant_id = seed_grant(&fx, Some(recipient));
        accept(&fx, grant_id);
        fx.lifecycle.sign_and_generate(grant_id).await.unwrap();

        let outcome = fx.lifecycle.notify(grant_id).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Notified { delivered: true }));

        let deliveries = fx.transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].inbox_url, format!("{}/inbox", recipient));

        let activity = &deliveries[0].activity;
        assert_eq!(activity["type"], "Create");
        assert_eq!(activity["object"]["to"][0], recipient);
        assert!(activity["object"]["cc"].as_array().unwrap().is_empty());
        assert!(activity["signature"]["signatureValue"].is_string());

        let grant = fx
            .db
            .with_conn(|conn| badges::get_grant(conn, grant_id))
            .unwrap()
            .unwrap();
        assert_eq!(grant.stage, GrantStage::Notified);
        assert!(grant.notified_at.is_some());
    }

    #[tokio::test]
    async fn test_notify_failure_still_marks_attempted() {
        let fx = fixture().await;
        let recipient = "https://remote.example/users/ada";
        fx.transport.register(recipient);
        fx.transport.fail_inbox(&format!("{}/inbox", recipient));

        let grant_id = seed_grant(&fx, Some(recipient));
        accept(&fx, grant_id);
        fx.lifecycle.sign_and_generate(grant_id).await.unwrap();

        let outcome = fx.lifecycle.notify(grant_id).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Notified { delivered: false }));

        let grant = fx
            .db
            .with_conn(|conn| badges::get_grant(conn, grant_id))
            .unwrap()
            .unwrap();
        assert!(grant.notified_at.is_some());
    }

    #[tokio::test]
    async fn test_notify_without_recipient_profile() {
        let fx = fixture().await;
        let grant_id = seed_grant(&fx, None);
        accept(&fx, grant_id);
        fx.lifecycle.sign_and_generate(grant_id).await.unwrap();

        let outcome = fx.lifecycle.notify(grant_id).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Notified { delivered: false }));
        assert!(fx.transport.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_notify_before_sign_is_a_noop() {
        let fx = fixture().await;
        let grant_id = seed_grant(&fx, None);
        accept(&fx, grant_id);

        let outcome = fx.lifecycle.notify(grant_id).await.unwrap();
        assert!(matches!(
            outcome,
            NotifyOutcome::NotEligible {
                stage: GrantStage::Accepted
            }
        ));
    }

    #[tokio::test]
    async fn test_broadcast_without_archived_note_is_not_found() {
        let fx = fixture().await;
        let grant_id = seed_grant(&fx, None);
        accept(&fx, grant_id);

        let result = fx.lifecycle.broadcast(grant_id).await;
        assert!(matches!(result, Err(LaurelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_follower() {
        let fx = fixture().await;
        for uri in [
            "https://a.example/users/one",
            "https://b.example/users/two",
            "https://c.example/users/three",
        ] {
            fx.transport.register(uri);
            fx.db
                .with_conn(|conn| {
                    followers::upsert_follower(conn, &fx.actor_id, uri, uri.split('/').nth(2).unwrap())
                })
                .unwrap();
        }

        let grant_id = seed_grant(&fx, None);
        accept(&fx, grant_id);
        fx.lifecycle.sign_and_generate(grant_id).await.unwrap();

        let outcome = fx.lifecycle.broadcast(grant_id).await.unwrap();
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.delivered, 3);
        assert_eq!(outcome.failed, 0);

        let inboxes = fx.transport.delivered_inboxes();
        assert_eq!(inboxes.len(), 3);
        assert!(inboxes.contains(&"https://b.example/users/two/inbox".to_string()));
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failing_follower() {
        let fx = fixture().await;
        for uri in [
            "https://a.example/users/one",
            "https://b.example/users/two",
            "https://c.example/users/three",
        ] {
            fx.transport.register(uri);
            fx.db
                .with_conn(|conn| {
                    followers::upsert_follower(conn, &fx.actor_id, uri, uri.split('/').nth(2).unwrap())
                })
                .unwrap();
        }
        // Middle follower's profile becomes unresolvable
        fx.transport.fail_profile("https://b.example/users/two");

        let grant_id = seed_grant(&fx, None);
        accept(&fx, grant_id);
        fx.lifecycle.sign_and_generate(grant_id).await.unwrap();

        let outcome = fx.lifecycle.broadcast(grant_id).await.unwrap();
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.failed, 1);

        let inboxes = fx.transport.delivered_inboxes();
        assert!(inboxes.contains(&"https://a.example/users/one/inbox".to_string()));
        assert!(inboxes.contains(&"https://c.example/users/three/inbox".to_string()));
        assert!(!inboxes.contains(&"https://b.example/users/two/inbox".to_string()));
    }

    #[tokio::test]
    async fn test_broadcast_carries_archived_note_verbatim() {
        let fx = fixture().await;
        fx.transport.register("https://a.example/users/one");
        fx.db
            .with_conn(|conn| {
                followers::upsert_follower(conn, &fx.actor_id, "https://a.example/users/one", "a.example")
            })
            .unwrap();

        let grant_id = seed_grant(&fx, None);
        accept(&fx, grant_id);
        let signed = fx.lifecycle.sign_and_generate(grant_id).await.unwrap();
        let note_uri = match signed {
            SignOutcome::Signed { note_uri, .. } => note_uri,
            other => panic!("expected Signed, got {:?}", other),
        };

        fx.lifecycle.broadcast(grant_id).await.unwrap();

        let deliveries = fx.transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        let activity = &deliveries[0].activity;
        assert_eq!(activity["object"]["id"], note_uri);
        assert_eq!(activity["to"][0], PUBLIC_AUDIENCE);
    }
}
