//! Two-lane periodic grant scheduler
//!
//! One background task, one tick per poll interval, two lanes per tick in
//! fixed order: the process lane signs the next accepted grant and
//! immediately broadcasts it, then the notify lane delivers the next pending
//! recipient notification. Each lane touches at most one grant per tick.
//! Failures defer the grant's lane visibility instead of wedging the queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{self, Db};
use crate::services::lifecycle::{BadgeLifecycle, SignOutcome};

/// How far a grant's lane visibility is pushed after a failed attempt
const FAILURE_BACKOFF_SECS: i64 = 300;

/// Spawn the periodic scheduler task
///
/// The shutdown channel is checked while idle between ticks; a tick already
/// in flight runs to completion.
pub fn spawn_scheduler_task(
    db: Arc<Db>,
    lifecycle: Arc<BadgeLifecycle>,
    poll_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = poll_interval.as_secs(),
            "Grant scheduler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.recv() => {
                    info!("Grant scheduler stopping");
                    break;
                }
            }

            run_tick(&db, &lifecycle).await;
        }
    })
}

/// Run both lanes once
pub async fn run_tick(db: &Db, lifecycle: &BadgeLifecycle) {
    run_process_lane(db, lifecycle).await;
    run_notify_lane(db, lifecycle).await;
}

/// Sign the next accepted grant, then broadcast it to followers
async fn run_process_lane(db: &Db, lifecycle: &BadgeLifecycle) {
    let next = match db.with_conn(|conn| db::badges::next_grant_for_signing(conn)) {
        Ok(next) => next,
        Err(e) => {
            warn!(error = %e, "Process lane peek failed");
            return;
        }
    };

    let Some(grant_id) = next else {
        return;
    };

    debug!(grant_id, "Process lane picked up grant");

    match lifecycle.sign_and_generate(grant_id).await {
        Ok(SignOutcome::Signed { .. }) => {
            if let Err(e) = lifecycle.broadcast(grant_id).await {
                warn!(grant_id, error = %e, "Broadcast after signing failed");
            }
        }
        Ok(outcome) => {
            debug!(grant_id, ?outcome, "Grant no longer eligible for signing");
        }
        Err(e) => {
            warn!(grant_id, error = %e, "Signing failed; deferring grant");
            defer(db, grant_id);
        }
    }
}

/// Deliver the next pending recipient notification
async fn run_notify_lane(db: &Db, lifecycle: &BadgeLifecycle) {
    let next = match db.with_conn(|conn| db::badges::next_grant_for_notification(conn)) {
        Ok(next) => next,
        Err(e) => {
            warn!(error = %e, "Notify lane peek failed");
            return;
        }
    };

    let Some(grant_id) = next else {
        return;
    };

    debug!(grant_id, "Notify lane picked up grant");

    if let Err(e) = lifecycle.notify(grant_id).await {
        warn!(grant_id, error = %e, "Notification failed; deferring grant");
        defer(db, grant_id);
    }
}

fn defer(db: &Db, grant_id: i64) {
    let until = (chrono::Utc::now() + chrono::Duration::seconds(FAILURE_BACKOFF_SECS)).to_rfc3339();
    if let Err(e) = db.with_conn(|conn| db::badges::defer_grant(conn, grant_id, &until)) {
        warn!(grant_id, error = %e, "Could not defer grant");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{actors, badges, followers, GrantStage};
    use crate::note_store::NoteStore;
    use crate::services::delivery::testing::FakeTransport;
    use crate::services::delivery::Transport;
    use crate::signing;
    use tempfile::TempDir;

    struct Fixture {
        db: Arc<Db>,
        notes: Arc<NoteStore>,
        transport: Arc<FakeTransport>,
        lifecycle: Arc<BadgeLifecycle>,
        actor_id: String,
        actor_uri: String,
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
                        display_name: None,
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
                    description: None,
                    criteria: None,
                    image_url: None,
                },
            )
        })
        .unwrap();

        let lifecycle = Arc::new(BadgeLifecycle::new(
            db.clone(),
            notes.clone(),
            transport.clone() as Arc<dyn Transport>,
        ));

        Fixture {
            db,
            notes,
            transport,
            lifecycle,
            actor_uri: actor.uri(),
            actor_id: actor.id,
            _archive_dir: archive_dir,
        }
    }

    fn seed_accepted_grant(fx: &Fixture, recipient_uri: Option<&str>) -> i64 {
        fx.db
            .with_conn(|conn| {
                let grant = badges::create_grant(
                    conn,
                    badges::CreateGrantInput {
                        definition_id: "def-1".to_string(),
                        actor_id: fx.actor_id.clone(),
                        recipient_name: "Ada".to_string(),
                        recipient_email: None,
                        recipient_uri: recipient_uri.map(|u| u.to_string()),
                    },
                )?;
                badges::accept_grant(conn, grant.id)?;
                Ok(grant.id)
            })
            .unwrap()
    }

    fn stage_of(fx: &Fixture, grant_id: i64) -> GrantStage {
        fx.db
            .with_conn(|conn| badges::get_grant(conn, grant_id))
            .unwrap()
            .unwrap()
            .stage
    }

    #[tokio::test]
    async fn test_tick_signs_then_broadcasts_then_notifies() {
        let fx = fixture().await;
        let recipient = "https://remote.example/users/ada";
        let follower = "https://other.example/users/grace";
        fx.transport.register(recipient);
        fx.transport.register(follower);
        fx.db
            .with_conn(|conn| followers::upsert_follower(conn, &fx.actor_id, follower, "other.example"))
            .unwrap();

        let grant_id = seed_accepted_grant(&fx, Some(recipient));

        // First tick: process lane signs and broadcasts
        run_tick(&fx.db, &fx.lifecycle).await;
        assert_eq!(stage_of(&fx, grant_id), GrantStage::Signed);

        let inboxes = fx.transport.delivered_inboxes();
        assert!(inboxes.contains(&format!("{}/inbox", follower)));
        assert!(!inboxes.contains(&format!("{}/inbox", recipient)));

        // Second tick: notify lane reaches the recipient
        run_tick(&fx.db, &fx.lifecycle).await;
        assert_eq!(stage_of(&fx, grant_id), GrantStage::Notified);
        assert!(fx
            .transport
            .delivered_inboxes()
            .contains(&format!("{}/inbox", recipient)));
    }

    #[tokio::test]
    async fn test_lane_handles_one_grant_per_tick() {
        let fx = fixture().await;
        let first = seed_accepted_grant(&fx, None);
        let second = seed_accepted_grant(&fx, None);

        run_tick(&fx.db, &fx.lifecycle).await;
        assert_eq!(stage_of(&fx, first), GrantStage::Signed);
        assert_eq!(stage_of(&fx, second), GrantStage::Accepted);

        run_tick(&fx.db, &fx.lifecycle).await;
        assert_eq!(stage_of(&fx, second), GrantStage::Signed);
    }

    #[tokio::test]
    async fn test_empty_lanes_are_quiet() {
        let fx = fixture().await;
        run_tick(&fx.db, &fx.lifecycle).await;
        assert!(fx.transport.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_failed_signing_defers_the_grant() {
        let fx = fixture().await;
        let grant_id = seed_accepted_grant(&fx, None);

        // Poison the archive slot for this grant so signing hits the
        // integrity check
        let key = NoteStore::derive_note_key(&fx.actor_uri, grant_id);
        fx.notes.put_note(&key, b"not the note").await.unwrap();

        run_tick(&fx.db, &fx.lifecycle).await;

        let grant = fx
            .db
            .with_conn(|conn| badges::get_grant(conn, grant_id))
            .unwrap()
            .unwrap();
        assert_eq!(grant.stage, GrantStage::Accepted);
        let visible_after = grant.visible_after.unwrap();
        assert!(visible_after > chrono::Utc::now().to_rfc3339());

        // The deferred grant is out of the lane until the backoff elapses
        let next = fx
            .db
            .with_conn(|conn| badges::next_grant_for_signing(conn))
            .unwrap();
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn test_scheduler_task_stops_on_shutdown() {
        let fx = fixture().await;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = spawn_scheduler_task(
            fx.db.clone(),
            fx.lifecycle.clone(),
            Duration::from_millis(10),
            shutdown_rx,
        );

        shutdown_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok());
    }
}
