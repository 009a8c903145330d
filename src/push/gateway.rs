//! Push gateway client.
//!
//! Sends one notification to one push token per call and classifies the
//! gateway's response. Exactly one network attempt is made here; retry
//! policy belongs to [`crate::push::retry`], which keeps the backoff
//! curve independently testable.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::GatewayConfig;
use crate::error::Result;

/// Gateway error code that marks a token as permanently invalid. The
/// sole signal for pruning; every other error shape is transient.
const DEVICE_NOT_REGISTERED: &str = "DeviceNotRegistered";

/// Classified result of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// Gateway accepted the message for this token.
    Delivered,
    /// Network error, non-2xx status, or an item-level error not
    /// identified as permanent. Eligible for retry.
    TransientFailure(String),
    /// Gateway explicitly flagged the token as unregistered. Never
    /// retried; the dispatcher prunes the device.
    TokenInvalid,
}

/// Notification content handed to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub body: String,
    /// Opaque payload forwarded to the client app.
    pub data: Value,
}

impl PushMessage {
    /// Build a message; `data` defaults to an empty object when `None`.
    pub fn new(title: &str, body: &str, data: Option<Value>) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            data: data.unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}

/// One-shot delivery to a single push token.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Make exactly one delivery attempt and classify the result.
    async fn send(&self, push_token: &str, message: &PushMessage) -> GatewayOutcome;
}

/// Wire request for the Expo push API.
#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    sound: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a Value,
}

/// Gateway response: a per-item ticket array.
#[derive(Debug, Deserialize)]
struct TicketResponse {
    data: Vec<Ticket>,
}

#[derive(Debug, Deserialize)]
struct Ticket {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<TicketDetails>,
}

#[derive(Debug, Deserialize)]
struct TicketDetails {
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for an Expo-style push gateway.
pub struct ExpoClient {
    http_client: Client,
    config: GatewayConfig,
}

impl ExpoClient {
    /// Create a new gateway client.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// The configured gateway endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Classify a 2xx ticket response.
    ///
    /// An unparseable success body counts as "could not determine" and is
    /// reported transient rather than silently treated as delivered.
    fn classify_tickets(body: &[u8]) -> GatewayOutcome {
        let response: TicketResponse = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Unrecognized gateway response body");
                return GatewayOutcome::TransientFailure(
                    "unrecognized gateway response".to_string(),
                );
            }
        };

        for ticket in &response.data {
            if ticket.status == "error" {
                let code = ticket
                    .details
                    .as_ref()
                    .and_then(|d| d.error.as_deref())
                    .unwrap_or("");
                if code == DEVICE_NOT_REGISTERED {
                    return GatewayOutcome::TokenInvalid;
                }
                let detail = ticket
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("gateway item error: {code}"));
                return GatewayOutcome::TransientFailure(detail);
            }
        }

        GatewayOutcome::Delivered
    }
}

#[async_trait]
impl PushGateway for ExpoClient {
    async fn send(&self, push_token: &str, message: &PushMessage) -> GatewayOutcome {
        let request = PushRequest {
            to: push_token,
            sound: &self.config.sound,
            title: &message.title,
            body: &message.body,
            data: &message.data,
        };

        let response = match self
            .http_client
            .post(&self.config.url)
            .header("accept", "application/json")
            .header("accept-encoding", "gzip, deflate")
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Push gateway request failed");
                return GatewayOutcome::TransientFailure(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Push gateway returned non-success status");
            return GatewayOutcome::TransientFailure(format!("gateway status {status}"));
        }

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Failed to read gateway response body");
                return GatewayOutcome::TransientFailure(e.to_string());
            }
        };

        let outcome = Self::classify_tickets(&body);
        match &outcome {
            GatewayOutcome::Delivered => trace!("Gateway accepted notification"),
            GatewayOutcome::TokenInvalid => debug!("Gateway reported token as unregistered"),
            GatewayOutcome::TransientFailure(detail) => {
                debug!(detail = %detail, "Gateway reported item-level error");
            }
        }
        outcome
    }
}
