//! Delivery transport: remote profile resolution and signed outbound posts
//!
//! One shared reqwest client with a bounded per-request timeout, so a single
//! unreachable peer cannot stall a scheduler tick. Every outbound post
//! carries Date, Digest, and Signature headers computed over the exact bytes
//! sent. The `Transport` trait is the seam the lifecycle and follow services
//! test against.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde_json::Value;
use tracing::debug;

use crate::activitypub::{RemoteActor, ACTIVITY_CONTENT_TYPE};
use crate::db::ActorRow;
use crate::error::{LaurelError, Result};
use crate::signing;

/// Outbound federation operations
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve a remote actor URI into its profile (name, inbox, key)
    async fn resolve_actor(&self, uri: &str) -> Result<RemoteActor>;

    /// Sign an activity with the sender's key and post it to a remote inbox
    async fn deliver(&self, sender: &ActorRow, inbox_url: &str, activity: &Value) -> Result<()>;
}

/// HTTP transport backed by reqwest
pub struct DeliveryClient {
    client: reqwest::Client,
}

impl DeliveryClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LaurelError::Delivery(format!("HTTP client construction failed: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for DeliveryClient {
    async fn resolve_actor(&self, uri: &str) -> Result<RemoteActor> {
        debug!(uri = %uri, "Resolving remote actor profile");

        let response = self
            .client
            .get(uri)
            .header(header::ACCEPT, ACTIVITY_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| LaurelError::Delivery(format!("Profile fetch failed for {}: {}", uri, e)))?;

        if !response.status().is_success() {
            return Err(LaurelError::Delivery(format!(
                "Profile fetch for {} returned {}",
                uri,
                response.status()
            )));
        }

        response
            .json::<RemoteActor>()
            .await
            .map_err(|e| LaurelError::Delivery(format!("Profile for {} did not parse: {}", uri, e)))
    }

    async fn deliver(&self, sender: &ActorRow, inbox_url: &str, activity: &Value) -> Result<()> {
        let body = serde_json::to_vec(activity)?;
        let target = url::Url::parse(inbox_url)
            .map_err(|e| LaurelError::Delivery(format!("Bad inbox URL {}: {}", inbox_url, e)))?;

        let signed = signing::sign_request(
            &sender.key_id(),
            &sender.private_key_pem,
            "POST",
            &target,
            &body,
        )?;

        debug!(inbox = %inbox_url, sender = %sender.username, "Delivering signed activity");

        let response = self
            .client
            .post(inbox_url)
            .header(header::CONTENT_TYPE, ACTIVITY_CONTENT_TYPE)
            .header(header::DATE, signed.date)
            .header("Digest", signed.digest)
            .header("Signature", signed.signature)
            .body(body)
            .send()
            .await
            .map_err(|e| LaurelError::Delivery(format!("Delivery to {} failed: {}", inbox_url, e)))?;

        if !response.status().is_success() {
            return Err(LaurelError::Delivery(format!(
                "Delivery to {} returned {}",
                inbox_url,
                response.status()
            )));
        }

        Ok(())
    }
}
