//! Service layer between HTTP handlers and storage
//!
//! ## Architecture
//!
//! ```text
//! HTTP Routes (thin)
//!     ↓
//! Service Layer (follow ledger, reply collector, lifecycle engine)
//!     ↓
//! Persistent Store (db/*.rs) + Note Archive (note_store.rs)
//! ```
//!
//! All remote I/O goes through the [`delivery::Transport`] seam so services
//! can be exercised against an in-process fake.

pub mod delivery;
pub mod follows;
pub mod lifecycle;
pub mod replies;
pub mod scheduler;

pub use delivery::{DeliveryClient, Transport};
pub use follows::FollowService;
pub use lifecycle::{BadgeLifecycle, BroadcastOutcome, NotifyOutcome, SignOutcome};
pub use replies::{CollectOutcome, ReplyCollector};

use std::sync::Arc;

use crate::db::Db;
use crate::note_store::NoteStore;

/// Service container for dependency injection
///
/// Holds all services with shared storage handles. Pass this to HttpServer
/// for handler access.
pub struct Services {
    pub lifecycle: Arc<BadgeLifecycle>,
    pub follows: Arc<FollowService>,
    pub replies: Arc<ReplyCollector>,
    pub transport: Arc<dyn Transport>,
}

impl Services {
    /// Create all services over shared storage and one transport
    pub fn new(db: Arc<Db>, notes: Arc<NoteStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            lifecycle: Arc::new(BadgeLifecycle::new(
                db.clone(),
                notes.clone(),
                transport.clone(),
            )),
            follows: Arc::new(FollowService::new(db.clone(), transport.clone())),
            replies: Arc::new(ReplyCollector::new(db, notes)),
            transport,
        }
    }
}
