//! Laurel - federated badge-issuing actor
//!
//! Issues contribution badges as federation-protocol notes. Grants move
//! through a staged pipeline (created → accepted → signed → notified); the
//! canonical note for each signed grant is archived write-once and then
//! broadcast to every follower of the issuing actor.
//!
//! ## Architecture
//!
//! - **Persistent Store** (`db/`): actors with keypairs, badge definitions,
//!   grants with explicit lifecycle stage, followers, reply associations
//! - **Note Archive** (`note_store`): write-once canonical documents with
//!   fingerprint integrity checking
//! - **Services** (`services/`): follow ledger, reply collector, badge
//!   lifecycle engine, two-lane scheduler, signed delivery transport
//! - **HTTP** (`http` + `routes/`): the shared inbox plus public document
//!   retrieval and the administrative trigger surface
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/laurel/
//! ├── laurel.db              # SQLite: actors, definitions, grants, followers, comments
//! ├── documents/
//! │   ├── notes/             # Canonical note documents, write-once
//! │   └── grants/            # Public grant documents
//! └── config.toml            # Configuration
//! ```

pub mod activitypub;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod note_store;
pub mod routes;
pub mod services;
pub mod signing;

// Re-exports
pub use config::Config;
pub use error::{LaurelError, Result};
pub use http::{AppState, HttpServer};
pub use note_store::NoteStore;
pub use services::{BadgeLifecycle, DeliveryClient, Services};
