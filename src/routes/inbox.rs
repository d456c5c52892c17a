//! POST /inbox: validate, verify, classify, dispatch
//!
//! The single shared inbox for the instance. Activities are verified
//! against the sender's published key (when verification is enabled),
//! classified into a typed variant, and dispatched to the follow handler or
//! reply collector. Delete is answered with 501; unsupported types are
//! accepted and ignored.

use bytes::Bytes;
use hyper::{HeaderMap, Response, StatusCode};
use http_body_util::Full;
use tracing::{debug, info};

use crate::activitypub::{classify, ActivityEnvelope, InboundActivity};
use crate::error::{LaurelError, Result};
use crate::http::AppState;
use crate::routes::response::{activity_json, HandlerResult};
use crate::signing;

pub async fn handle_inbox(state: &AppState, headers: &HeaderMap, body: Bytes) -> HandlerResult {
    let verified_sender = if state.config.verify_inbox {
        Some(verify_signature(state, headers, &body).await?)
    } else {
        None
    };

    let envelope: ActivityEnvelope = serde_json::from_slice(&body)
        .map_err(|e| LaurelError::InvalidActivity(format!("Unparseable activity: {}", e)))?;
    let activity = classify(envelope)?;

    // The signature authenticates its key owner, not the claimed actor;
    // the two must be the same identity.
    if let Some(sender) = &verified_sender {
        if activity.actor() != sender.as_str() {
            return Err(LaurelError::Signature(format!(
                "Activity actor {} does not match signing key owner {}",
                activity.actor(),
                sender
            )));
        }
    }

    match activity {
        InboundActivity::Delete { actor } => {
            debug!(actor = %actor, "Rejecting Delete activity");
            Err(LaurelError::NotImplemented(
                "Delete activities are not supported".to_string(),
            ))
        }
        InboundActivity::Follow { id, actor, object } => {
            info!(actor = %actor, target = %object, "Inbox received Follow");
            state
                .services
                .follows
                .handle_follow(id.as_deref(), &actor, &object)
                .await?;
            Ok(accepted())
        }
        InboundActivity::Undo { actor, object } => {
            info!(actor = %actor, "Inbox received Undo");
            state.services.follows.handle_undo(&actor, &object).await?;
            Ok(accepted())
        }
        InboundActivity::Create { actor, note } => {
            debug!(actor = %actor, note = %note.id, "Inbox received Create");
            state.services.replies.collect(&actor, &note).await?;
            Ok(accepted())
        }
        InboundActivity::Other { actor, kind } => {
            debug!(actor = %actor, kind = %kind, "Ignoring unsupported activity type");
            Ok(accepted())
        }
    }
}

fn accepted() -> Response<Full<Bytes>> {
    activity_json(StatusCode::OK, &serde_json::json!({ "status": "accepted" }))
}

/// Verify the draft-cavage signature on an inbound request
///
/// The signer's public key is fetched from its published profile via the
/// transport. The body digest is checked first so a tampered payload fails
/// before any network round trip. Returns the key owner URI the signature
/// authenticated, which the caller matches against the activity's actor.
async fn verify_signature(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<String> {
    let signature_value = header_str(headers, "signature")
        .ok_or_else(|| LaurelError::Signature("Missing Signature header".to_string()))?;
    let signature = signing::parse_signature_header(&signature_value)?;

    let digest = header_str(headers, "digest")
        .ok_or_else(|| LaurelError::Signature("Missing Digest header".to_string()))?;
    signing::verify_digest(&digest, body)?;

    let owner = signature.key_owner().to_string();
    let profile = state
        .services
        .transport
        .resolve_actor(&owner)
        .await
        .map_err(|e| LaurelError::Signature(format!("Could not resolve key owner {}: {}", owner, e)))?;
    let key = profile
        .public_key
        .ok_or_else(|| LaurelError::Signature(format!("{} publishes no public key", owner)))?;

    signing::verify_request(&key.public_key_pem, &signature, "post", "/inbox", |name| {
        header_str(headers, name)
    })?;

    debug!(owner = %owner, "Inbox signature verified");
    Ok(owner)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
