//! Administrative trigger surface and operational counters
//!
//! Process and broadcast force a grant through the lifecycle engine without
//! waiting for the scheduler's next tick. These endpoints call the same
//! operations the scheduler does, so forcing them is always safe against
//! concurrent ticks.

use hyper::StatusCode;

use crate::error::LaurelError;
use crate::http::AppState;
use crate::routes::response::{json_response, ok, HandlerResult};
use crate::services::SignOutcome;

/// POST /admin/grants/{id}/process
///
/// Sign the grant, then broadcast it to followers. An already-signed grant
/// is re-broadcast without regeneration; an unaccepted grant is refused.
pub async fn handle_process_grant(state: &AppState, segment: &str) -> HandlerResult {
    let grant_id = parse_grant_id(segment)?;

    let outcome = state.services.lifecycle.sign_and_generate(grant_id).await?;
    let (signed_now, fingerprint) = match outcome {
        SignOutcome::Signed { fingerprint, .. } => (true, fingerprint),
        SignOutcome::AlreadySigned { fingerprint } => (false, fingerprint),
        SignOutcome::NotEligible { stage } => {
            return Ok(json_response(
                StatusCode::CONFLICT,
                &serde_json::json!({
                    "error": format!(
                        "Grant {} is not eligible for processing (stage {})",
                        grant_id,
                        stage.as_str()
                    ),
                }),
            ));
        }
    };

    let broadcast = state.services.lifecycle.broadcast(grant_id).await?;

    Ok(ok(&serde_json::json!({
        "grant": grant_id,
        "signed": signed_now,
        "fingerprint": fingerprint,
        "broadcast": broadcast,
    })))
}

/// POST /admin/grants/{id}/broadcast
///
/// Re-deliver the archived note to every current follower. Fails with 404
/// when the grant has not been signed yet (no archived note).
pub async fn handle_broadcast_grant(state: &AppState, segment: &str) -> HandlerResult {
    let grant_id = parse_grant_id(segment)?;

    let broadcast = state.services.lifecycle.broadcast(grant_id).await?;

    Ok(ok(&serde_json::json!({
        "grant": grant_id,
        "broadcast": broadcast,
    })))
}

/// GET /status
pub async fn handle_status(state: &AppState) -> HandlerResult {
    let stats = state.db.stats()?;
    Ok(ok(&stats))
}

fn parse_grant_id(segment: &str) -> Result<i64, LaurelError> {
    segment
        .parse()
        .map_err(|_| LaurelError::NotFound(format!("grant {}", segment)))
}
