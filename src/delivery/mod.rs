//! Delivery collaborator
//!
//! Hands directives to the external messaging transport. The transport has
//! at-least-once delivery semantics; this layer only waits for acceptance
//! and never retries a rejection.

use crate::models::InterventionDirective;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Collaborator acknowledgement; `Rejected` terminates the cycle for that
/// directive without retry at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAck {
    Accepted,
    Rejected { reason: String },
}

/// Trait for the external message delivery collaborator
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &'static str;
    async fn dispatch(&self, directive: &InterventionDirective) -> Result<DispatchAck>;
}

//
// ================= Recording (dev/test) =================
//

/// Accepts everything and records what was dispatched.
pub struct RecordingDelivery {
    dispatched: Arc<RwLock<Vec<InterventionDirective>>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self {
            dispatched: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn dispatched(&self) -> Vec<InterventionDirective> {
        self.dispatched.read().await.clone()
    }
}

impl Default for RecordingDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingDelivery {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn dispatch(&self, directive: &InterventionDirective) -> Result<DispatchAck> {
        self.dispatched.write().await.push(directive.clone());
        Ok(DispatchAck::Accepted)
    }
}

/// Rejects everything; used to exercise the FAILED terminal state.
pub struct RejectingDelivery {
    pub reason: String,
}

#[async_trait]
impl DeliveryChannel for RejectingDelivery {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    async fn dispatch(&self, _directive: &InterventionDirective) -> Result<DispatchAck> {
        Ok(DispatchAck::Rejected {
            reason: self.reason.clone(),
        })
    }
}

//
// ================= HTTP-backed =================
//

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    accepted: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Posts directives to the messaging gateway.
pub struct HttpDelivery {
    client: Client,
    base_url: String,
}

impl HttpDelivery {
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build from `DELIVERY_API_BASE_URL` (or `MESSAGING_API_BASE_URL`);
    /// `None` when neither is configured.
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("DELIVERY_API_BASE_URL")
            .or_else(|_| env::var("MESSAGING_API_BASE_URL"))
            .ok()?;
        Self::new(base_url).ok()
    }
}

#[async_trait]
impl DeliveryChannel for HttpDelivery {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn dispatch(&self, directive: &InterventionDirective) -> Result<DispatchAck> {
        let url = format!("{}/api/v1/messages/dispatch", self.base_url);

        let response = self.client.post(url).json(directive).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(DispatchAck::Rejected {
                reason: format!("gateway returned {}", status),
            });
        }

        let body: DispatchResponse = response.json().await?;
        if body.accepted {
            Ok(DispatchAck::Accepted)
        } else {
            Ok(DispatchAck::Rejected {
                reason: body.reason.unwrap_or_else(|| "unspecified".to_string()),
            })
        }
    }
}
