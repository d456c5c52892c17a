//! HTTP route handlers
//!
//! Thin request handlers over the service layer. Path matching and the
//! accept loop live in [`crate::http`]; each handler here takes the shared
//! state plus its already-extracted path parameters.

pub mod admin;
pub mod inbox;
pub mod objects;
pub mod response;
