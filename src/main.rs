//! Laurel Daemon
//!
//! Runs the badge actor: inbox, document retrieval, and the background
//! grant scheduler.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! laurel
//!
//! # Start with custom config
//! laurel --config /path/to/config.toml
//!
//! # Federate under a public domain
//! laurel --domain badges.example.org --actor badges
//!
//! # Inbox-only instance (no background processing)
//! laurel --no-scheduler
//! ```
//!
//! ## HTTP API
//!
//! - `POST /inbox` - Receive an activity
//! - `GET /actors/{username}` - Actor document
//! - `GET /actors/{username}/followers` - Follower collection
//! - `GET /notes/{key}` - Canonical note document
//! - `GET /notes/{key}/replies` - Reply collection
//! - `GET /grants/{id}` - Canonical grant document
//! - `POST /admin/grants/{id}/process` - Force sign + broadcast
//! - `POST /admin/grants/{id}/broadcast` - Force broadcast
//! - `GET /health`, `GET /status`, `GET /version`

use clap::Parser;
use laurel::db::{actors, ActorRow, CreateActorInput, Db};
use laurel::http::AppState;
use laurel::services::{scheduler, DeliveryClient, Services, Transport};
use laurel::{signing, Config, HttpServer, LaurelError, NoteStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "laurel")]
#[command(about = "Federated badge-issuing actor")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory for the database and persisted documents
    #[arg(long, env = "LAUREL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Public domain this instance federates under
    #[arg(long, env = "LAUREL_DOMAIN")]
    domain: Option<String>,

    /// HTTP listen port
    #[arg(long, env = "LAUREL_HTTP_PORT")]
    http_port: Option<u16>,

    /// Username of the issuing actor
    #[arg(long, env = "LAUREL_ACTOR")]
    actor: Option<String>,

    /// Accept inbox posts without verifying HTTP signatures
    #[arg(long)]
    no_verify_inbox: bool,

    /// Disable the background scheduler (inbox-only mode)
    #[arg(long)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("laurel=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(domain) = args.domain {
        config.domain = domain;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(actor) = args.actor {
        config.actor_name = actor;
    }
    if args.no_verify_inbox {
        config.verify_inbox = false;
    }
    if args.no_scheduler {
        config.enable_scheduler = false;
    }

    info!(
        data_dir = %config.data_dir.display(),
        domain = %config.domain,
        http_port = config.http_port,
        "Starting laurel"
    );

    if !config.verify_inbox {
        warn!("Inbox signature verification is DISABLED; activities from any sender will be trusted");
    }

    // Ensure data directory exists
    tokio::fs::create_dir_all(&config.data_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    // Storage
    let db = Arc::new(Db::open(&config.data_dir)?);
    let notes = Arc::new(NoteStore::new(config.documents_dir()).await?);

    // Bootstrap the issuing actor on first run
    let actor = bootstrap_actor(&db, &config)?;
    info!(actor = %actor.uri(), "Issuing actor ready");

    // Services over the real delivery transport
    let transport: Arc<dyn Transport> =
        Arc::new(DeliveryClient::new(config.delivery_timeout_secs)?);
    let services = Services::new(db.clone(), notes.clone(), transport);

    let state = Arc::new(AppState {
        config: config.clone(),
        db: db.clone(),
        notes,
        services,
    });

    // Background scheduler with its own shutdown channel
    let scheduler_handle = if config.enable_scheduler {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let handle = scheduler::spawn_scheduler_task(
            db.clone(),
            state.services.lifecycle.clone(),
            std::time::Duration::from_secs(config.poll_interval_secs),
            shutdown_rx,
        );
        Some((handle, shutdown_tx))
    } else {
        info!("Scheduler disabled; grants only move via the admin surface");
        None
    };

    // Start HTTP server
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(state, http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Endpoints:");
    info!("  POST /inbox                          - Receive an activity");
    info!("  GET  /actors/{{username}}              - Actor document");
    info!("  GET  /actors/{{username}}/followers    - Follower collection");
    info!("  GET  /notes/{{key}}                    - Canonical note document");
    info!("  GET  /notes/{{key}}/replies            - Reply collection");
    info!("  GET  /grants/{{id}}                    - Canonical grant document");
    info!("  POST /admin/grants/{{id}}/process      - Force sign + broadcast");
    info!("  POST /admin/grants/{{id}}/broadcast    - Force broadcast");

    info!("Press Ctrl+C to stop.");

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    // Signal the scheduler to stop
    if let Some((handle, shutdown_tx)) = scheduler_handle {
        let _ = shutdown_tx.send(());
        let _ = handle.await;
    }

    // Print stats before exit
    if let Ok(stats) = db.stats() {
        info!(
            grants = stats.grant_count,
            followers = stats.follower_count,
            comments = stats.comment_count,
            "Final stats"
        );
    }

    Ok(())
}

/// Load the issuing actor, generating its keypair on first run
fn bootstrap_actor(db: &Db, config: &Config) -> Result<ActorRow, LaurelError> {
    if let Some(actor) =
        db.with_conn(|conn| actors::get_actor_by_username(conn, &config.actor_name))?
    {
        return Ok(actor);
    }

    info!(actor = %config.actor_name, "Generating keypair for new issuing actor");
    let keys = signing::generate_keypair()?;

    db.with_conn(|conn| {
        actors::create_actor(
            conn,
            CreateActorInput {
                id: uuid::Uuid::new_v4().to_string(),
                username: config.actor_name.clone(),
                domain: config.domain.clone(),
                display_name: Some(config.actor_display_name.clone()),
                summary: None,
                public_key_pem: keys.public_pem,
                private_key_pem: keys.private_pem,
            },
        )
    })
}
