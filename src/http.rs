//! HTTP API for the badge actor
//!
//! ## Federation surface
//! - `POST /inbox` - Receive an activity (Follow/Undo/Create; Delete gets 501)
//! - `GET /actors/{username}` - Actor document
//! - `GET /actors/{username}/followers` - Follower collection
//! - `GET /notes/{key}` - Canonical note document, verbatim
//! - `GET /notes/{key}/replies` - Reply collection for a note
//! - `GET /grants/{id}` - Canonical grant document, verbatim
//!
//! ## Administrative surface
//! - `POST /admin/grants/{id}/process` - Force sign + broadcast
//! - `POST /admin/grants/{id}/broadcast` - Force broadcast only
//! - `GET /health`, `GET /status`, `GET /version`
//!
//! ## Example Usage
//!
//! ```bash
//! # Follow the issuer from another instance's actor
//! curl -X POST -H "Content-Type: application/activity+json" \
//!      -d '{"actor":"https://remote.example/users/ada","type":"Follow","object":"https://badges.example.org/actors/badges"}' \
//!      http://localhost:8086/inbox
//!
//! # Fetch the issuer's actor document
//! curl http://localhost:8086/actors/badges
//!
//! # Force grant 42 through sign + broadcast
//! curl -X POST http://localhost:8086/admin/grants/42/process
//! ```

use crate::config::Config;
use crate::db::Db;
use crate::error::LaurelError;
use crate::note_store::NoteStore;
use crate::routes::{admin, inbox, objects, response};
use crate::routes::response::from_handler;
use crate::services::Services;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Shared state every handler sees
pub struct AppState {
    pub config: Config,
    pub db: Arc<Db>,
    pub notes: Arc<NoteStore>,
    pub services: Services,
}

/// HTTP server
pub struct HttpServer {
    state: Arc<AppState>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(state: Arc<AppState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), LaurelError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "Incoming request");

        let response = match (method, path.as_str()) {
            (Method::GET, "/health") => self.handle_health(),
            (Method::GET, "/status") => from_handler(admin::handle_status(&self.state).await),
            (Method::GET, "/version") => handle_version(),

            (Method::POST, "/inbox") => {
                let (parts, body) = req.into_parts();
                match body.collect().await {
                    Ok(collected) => from_handler(
                        inbox::handle_inbox(&self.state, &parts.headers, collected.to_bytes()).await,
                    ),
                    Err(e) => {
                        warn!(error = %e, "Failed to read inbox body");
                        response::bad_request("Failed to read request body")
                    }
                }
            }
            (_, "/inbox") => response::method_not_allowed(),

            (Method::GET, p) if p.starts_with("/actors/") => {
                let rest = p.strip_prefix("/actors/").unwrap_or("");
                match rest.split_once('/') {
                    None => from_handler(objects::handle_get_actor(&self.state, rest).await),
                    Some((username, "followers")) => {
                        from_handler(objects::handle_get_followers(&self.state, username).await)
                    }
                    Some(_) => response::not_found("Unknown actor resource"),
                }
            }

            (Method::GET, p) if p.starts_with("/notes/") => {
                let rest = p.strip_prefix("/notes/").unwrap_or("");
                match rest.split_once('/') {
                    None => from_handler(objects::handle_get_note(&self.state, rest).await),
                    Some((key, "replies")) => {
                        from_handler(objects::handle_get_replies(&self.state, key).await)
                    }
                    Some(_) => response::not_found("Unknown note resource"),
                }
            }

            (Method::GET, p) if p.starts_with("/grants/") => {
                let segment = p.strip_prefix("/grants/").unwrap_or("");
                from_handler(objects::handle_get_grant(&self.state, segment).await)
            }

            (Method::POST, p) if p.starts_with("/admin/grants/") => {
                let rest = p.strip_prefix("/admin/grants/").unwrap_or("");
                match rest.split_once('/') {
                    Some((id, "process")) => {
                        from_handler(admin::handle_process_grant(&self.state, id).await)
                    }
                    Some((id, "broadcast")) => {
                        from_handler(admin::handle_broadcast_grant(&self.state, id).await)
                    }
                    _ => response::not_found("Unknown admin action"),
                }
            }

            _ => response::not_found("Not found"),
        };

        Ok(response)
    }

    /// Liveness check
    fn handle_health(&self) -> Response<Full<Bytes>> {
        response::ok(&serde_json::json!({ "status": "ok" }))
    }
}

fn handle_version() -> Response<Full<Bytes>> {
    response::ok(&serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
