//! Follow and unfollow handling
//!
//! Follow: record the follower, then acknowledge with a signed Accept
//! delivered to the sender's inbox. Undo-of-Follow: drop the follower row
//! and acknowledge the undo the same way. The ledger write always lands
//! before the acknowledgement goes out, so a failed delivery leaves the
//! relationship recorded rather than lost.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::activitypub::{AcceptActivity, AcceptedObject, UndoTarget};
use crate::db::{self, ActorRow, Db};
use crate::error::Result;
use crate::services::delivery::Transport;

pub struct FollowService {
    db: Arc<Db>,
    transport: Arc<dyn Transport>,
}

impl FollowService {
    pub fn new(db: Arc<Db>, transport: Arc<dyn Transport>) -> Self {
        Self { db, transport }
    }

    /// Record a new follower and send back a signed Accept
    ///
    /// A Follow aimed at an actor this instance does not host is dropped
    /// silently. Re-following refreshes the existing row instead of
    /// duplicating it. Acknowledgement delivery is best effort.
    pub async fn handle_follow(
        &self,
        activity_id: Option<&str>,
        follower_uri: &str,
        target_uri: &str,
    ) -> Result<()> {
        let actor = match self.resolve_local_actor(target_uri)? {
            Some(actor) => actor,
            None => {
                debug!(target = %target_uri, "Follow target is not hosted here; ignoring");
                return Ok(());
            }
        };

        let domain = host_of(follower_uri);
        self.db.with_conn(|conn| {
            db::followers::upsert_follower(conn, &actor.id, follower_uri, &domain)
        })?;

        info!(actor = %actor.username, follower = %follower_uri, "Recorded follower");

        let accepted = AcceptedObject {
            id: activity_id.map(|id| id.to_string()),
            actor: follower_uri.to_string(),
            kind: "Follow".to_string(),
            object: actor.uri(),
        };
        self.acknowledge(&actor, follower_uri, accepted).await;

        Ok(())
    }

    /// Undo an earlier activity; only Undo-of-Follow carries state
    ///
    /// Removing an unknown follower is a no-op. Undo of anything other than
    /// a Follow is accepted and ignored.
    pub async fn handle_undo(&self, sender_uri: &str, target: &UndoTarget) -> Result<()> {
        if target.kind != "Follow" {
            debug!(sender = %sender_uri, kind = %target.kind, "Undo of unsupported activity; ignoring");
            return Ok(());
        }

        let Some(followed_uri) = target.object.as_deref() else {
            debug!(sender = %sender_uri, "Undo of Follow without a target actor; ignoring");
            return Ok(());
        };

        let actor = match self.resolve_local_actor(followed_uri)? {
            Some(actor) => actor,
            None => {
                debug!(target = %followed_uri, "Undo target is not hosted here; ignoring");
                return Ok(());
            }
        };

        let removed = self.db.with_conn(|conn| {
            db::followers::remove_follower(conn, &actor.id, sender_uri)
        })?;

        if removed {
            info!(actor = %actor.username, follower = %sender_uri, "Removed follower");
        } else {
            debug!(actor = %actor.username, follower = %sender_uri, "Undo for unknown follower");
        }

        let accepted = AcceptedObject {
            id: target.id.clone(),
            actor: sender_uri.to_string(),
            kind: "Undo".to_string(),
            object: actor.uri(),
        };
        self.acknowledge(&actor, sender_uri, accepted).await;

        Ok(())
    }

    /// Resolve the local actor a Follow points at, by the last path segment
    /// of the object URI
    fn resolve_local_actor(&self, target_uri: &str) -> Result<Option<ActorRow>> {
        let username = match target_uri.trim_end_matches('/').rsplit('/').next() {
            Some(segment) if !segment.is_empty() => segment.to_string(),
            _ => return Ok(None),
        };

        self.db
            .with_conn(|conn| db::actors::get_actor_by_username(conn, &username))
    }

    /// Resolve the remote inbox and deliver a signed Accept; failures are
    /// logged, never propagated
    async fn acknowledge(&self, actor: &ActorRow, remote_uri: &str, accepted: AcceptedObject) {
        let profile = match self.transport.resolve_actor(remote_uri).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(remote = %remote_uri, error = %e, "Could not resolve remote profile for Accept");
                return;
            }
        };

        let accept = AcceptActivity::new(&actor.uri(), accepted);
        let activity = match serde_json::to_value(&accept) {
            Ok(value) => value,
            Err(e) => {
                warn!(remote = %remote_uri, error = %e, "Could not serialize Accept");
                return;
            }
        };

        if let Err(e) = self.transport.deliver(actor, &profile.inbox, &activity).await {
            warn!(remote = %remote_uri, inbox = %profile.inbox, error = %e,
                  "Accept delivery failed");
        } else {
            debug!(remote = %remote_uri, "Delivered Accept");
        }
    }
}

fn host_of(uri: &str) -> String {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{actors, followers};
    use crate::services::delivery::testing::FakeTransport;
    use crate::signing;

    struct Fixture {
        db: Arc<Db>,
        transport: Arc<FakeTransport>,
        service: FollowService,
        actor_uri: String,
        actor_id: String,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Db::open_in_memory().unwrap());
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

        let service = FollowService::new(db.clone(), transport.clone() as Arc<dyn Transport>);

        Fixture {
            db,
            transport,
            service,
            actor_uri: actor.uri(),
            actor_id: actor.id,
        }
    }

    #[tokio::test]
    async fn test_follow_records_follower_and_delivers_accept() {
        let fx = fixture();
        let follower = "https://remote.example/users/ada";
        fx.transport.register(follower);

        fx.service
            .handle_follow(
                Some("https://remote.example/activities/1"),
                follower,
                &fx.actor_uri,
            )
            .await
            .unwrap();

        let row = fx
            .db
            .with_conn(|conn| followers::get_follower(conn, &fx.actor_id, follower))
            .unwrap()
            .unwrap();
        assert_eq!(row.domain, "remote.example");

        let deliveries = fx.transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].inbox_url, format!("{}/inbox", follower));

        let activity = &deliveries[0].activity;
        assert_eq!(activity["type"], "Accept");
        assert_eq!(activity["actor"], fx.actor_uri);
        assert_eq!(activity["object"]["type"], "Follow");
        assert_eq!(activity["object"]["id"], "https://remote.example/activities/1");
        assert_eq!(activity["object"]["actor"], follower);
        assert_eq!(activity["object"]["object"], fx.actor_uri);
    }

    #[tokio::test]
    async fn test_refollow_keeps_one_row() {
        let fx = fixture();
        let follower = "https://remote.example/users/ada";
        fx.transport.register(follower);

        for _ in 0..2 {
            fx.service
                .handle_follow(None, follower, &fx.actor_uri)
                .await
                .unwrap();
        }

        let count = fx
            .db
            .with_conn(|conn| followers::count_followers(conn, &fx.actor_id))
            .unwrap();
        assert_eq!(count, 1);

        // Each Follow is acknowledged, even the repeat
        assert_eq!(fx.transport.deliveries().len(), 2);
    }

    #[tokio::test]
    async fn test_follow_for_unknown_actor_is_ignored() {
        let fx = fixture();
        let follower = "https://remote.example/users/ada";
        fx.transport.register(follower);

        fx.service
            .handle_follow(None, follower, "https://badges.example.org/actors/nobody")
            .await
            .unwrap();

        let count = fx
            .db
            .with_conn(|conn| followers::count_followers(conn, &fx.actor_id))
            .unwrap();
        assert_eq!(count, 0);
        assert!(fx.transport.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_follower_survives_failed_accept_delivery() {
        let fx = fixture();
        let follower = "https://remote.example/users/ada";
        fx.transport.register(follower);
        fx.transport.fail_inbox(&format!("{}/inbox", follower));

        fx.service
            .handle_follow(None, follower, &fx.actor_uri)
            .await
            .unwrap();

        let row = fx
            .db
            .with_conn(|conn| followers::get_follower(conn, &fx.actor_id, follower))
            .unwrap();
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn test_undo_removes_follower_and_acknowledges() {
        let fx = fixture();
        let follower = "https://remote.example/users/ada";
        fx.transport.register(follower);

        fx.service
            .handle_follow(None, follower, &fx.actor_uri)
            .await
            .unwrap();

        fx.service
            .handle_undo(
                follower,
                &UndoTarget {
                    id: Some("https://remote.example/activities/1".to_string()),
                    kind: "Follow".to_string(),
                    actor: Some(follower.to_string()),
                    object: Some(fx.actor_uri.clone()),
                },
            )
            .await
            .unwrap();

        let count = fx
            .db
            .with_conn(|conn| followers::count_followers(conn, &fx.actor_id))
            .unwrap();
        assert_eq!(count, 0);

        let deliveries = fx.transport.deliveries();
        assert_eq!(deliveries.len(), 2);
        let undo_ack = &deliveries[1].activity;
        assert_eq!(undo_ack["type"], "Accept");
        assert_eq!(undo_ack["object"]["type"], "Undo");
    }

    #[tokio::test]
    async fn test_undo_of_non_follow_is_ignored() {
        let fx = fixture();
        let follower = "https://remote.example/users/ada";
        fx.transport.register(follower);

        fx.service
            .handle_follow(None, follower, &fx.actor_uri)
            .await
            .unwrap();

        fx.service
            .handle_undo(
                follower,
                &UndoTarget {
                    id: None,
                    kind: "Like".to_string(),
                    actor: Some(follower.to_string()),
                    object: Some(fx.actor_uri.clone()),
                },
            )
            .await
            .unwrap();

        // The follower row is untouched and no second Accept went out
        let count = fx
            .db
            .with_conn(|conn| followers::count_followers(conn, &fx.actor_id))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(fx.transport.deliveries().len(), 1);
    }
}
