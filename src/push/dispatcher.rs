//! Fan-out dispatcher.
//!
//! Resolves a target (one user, all users, or a filtered user set) into
//! devices and drives concurrent delivery across them, with a semaphore
//! bounding in-flight gateway requests. Per-device failures never abort
//! the fan-out; outcomes are assembled into a single report in registry
//! list order regardless of real-time completion order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::push::gateway::{PushGateway, PushMessage};
use crate::push::retry::{deliver_with_backoff, DeliveryErrorKind, RetryConfig};
use crate::registry::{Device, DeviceRegistry};

/// Default bound on concurrent in-flight deliveries per dispatch call.
pub const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Resolves an opaque filter predicate to user identifiers. The
/// predicate's evaluation is entirely the resolver's concern.
#[async_trait]
pub trait UserResolver: Send + Sync {
    /// Users matching the filter, in the order dispatch should visit them.
    async fn resolve(&self, filter: &Value) -> Result<Vec<String>>;
}

/// Result of one device's delivery within a dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    /// The device this outcome belongs to.
    pub device_id: Uuid,
    /// Whether the gateway accepted the message.
    pub success: bool,
    /// Failure classification when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DeliveryErrorKind>,
    /// Total gateway attempts made for this device.
    pub attempts: u32,
}

/// Aggregate report returned to the caller.
///
/// `success` is true iff at least one device outcome succeeded; a target
/// that resolved to zero devices yields a failure report with empty
/// outcomes and no gateway contact.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub success: bool,
    pub message: String,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    fn no_targets(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            outcomes: Vec::new(),
        }
    }

    fn from_outcomes(outcomes: Vec<DeliveryOutcome>) -> Self {
        let delivered = outcomes.iter().filter(|o| o.success).count();
        let total = outcomes.len();
        let (success, message) = if delivered > 0 {
            (true, format!("Delivered to {delivered} of {total} devices"))
        } else {
            (false, format!("All {total} deliveries failed"))
        };
        Self {
            success,
            message,
            outcomes,
        }
    }
}

/// Push notification fan-out dispatcher.
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    gateway: Arc<dyn PushGateway>,
    resolver: Option<Arc<dyn UserResolver>>,
    retry: RetryConfig,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    cancelled: Arc<AtomicBool>,
    metrics: Option<Metrics>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and gateway client.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        gateway: Arc<dyn PushGateway>,
        retry: RetryConfig,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            registry,
            gateway,
            resolver: None,
            retry,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            cancelled: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    /// Attach a user resolver for filtered dispatch.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn UserResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Attach metrics recording.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Send a notification to every device of one user.
    pub async fn send_to_user(&self, user_id: &str, message: &PushMessage) -> Result<DispatchReport> {
        if let Some(ref m) = self.metrics {
            m.record_dispatch("user");
        }

        let devices = self.registry.list_by_user(user_id).await?;
        if devices.is_empty() {
            debug!(user_id, "No devices registered for user");
            return Ok(DispatchReport::no_targets(
                "No devices registered for this user",
            ));
        }

        let outcomes = self.deliver_all(&devices, message).await;
        Ok(DispatchReport::from_outcomes(outcomes))
    }

    /// Broadcast a notification to every registered device.
    pub async fn send_to_all(&self, message: &PushMessage) -> Result<DispatchReport> {
        if let Some(ref m) = self.metrics {
            m.record_dispatch("all");
        }

        let devices = self.registry.list_all().await?;
        if devices.is_empty() {
            debug!("No devices registered");
            return Ok(DispatchReport::no_targets("No devices registered"));
        }

        let outcomes = self.deliver_all(&devices, message).await;
        Ok(DispatchReport::from_outcomes(outcomes))
    }

    /// Send a notification to every device of every user matching a
    /// filter predicate.
    ///
    /// Outcomes are concatenated in resolver-provided user order, device
    /// order within each user as the registry lists them.
    pub async fn send_by_filter(
        &self,
        filter: &Value,
        message: &PushMessage,
    ) -> Result<DispatchReport> {
        if let Some(ref m) = self.metrics {
            m.record_dispatch("filter");
        }

        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| Error::Internal("no user resolver configured".to_string()))?;

        let users = resolver.resolve(filter).await?;
        if users.is_empty() {
            debug!("No users match the filter");
            return Ok(DispatchReport::no_targets(
                "No users match the specified criteria",
            ));
        }

        let mut outcomes = Vec::new();
        for user_id in &users {
            let devices = self.registry.list_by_user(user_id).await?;
            outcomes.extend(self.deliver_all(&devices, message).await);
        }

        if outcomes.is_empty() {
            return Ok(DispatchReport::no_targets(
                "No devices registered for matched users",
            ));
        }
        info!(users = users.len(), devices = outcomes.len(), "Filtered dispatch complete");
        Ok(DispatchReport::from_outcomes(outcomes))
    }

    /// Advisory cancellation: in-flight attempts finish, but no further
    /// backoff waits are started.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Cancel and wait for all in-flight deliveries to complete. Used
    /// during graceful shutdown.
    pub async fn wait_for_completion(&self) {
        self.cancel();

        let mut permits = Vec::with_capacity(self.max_concurrent);
        for _ in 0..self.max_concurrent {
            if let Ok(permit) = self.semaphore.acquire().await {
                permits.push(permit);
            }
        }
        debug!("All in-flight deliveries completed");
    }

    /// Deliver to each device concurrently, bounded by the semaphore,
    /// and return outcomes in the order the devices were listed.
    async fn deliver_all(&self, devices: &[Device], message: &PushMessage) -> Vec<DeliveryOutcome> {
        join_all(devices.iter().map(|device| self.deliver(device, message))).await
    }

    /// The shared per-device delivery primitive: retry loop around the
    /// gateway call, registry bookkeeping on the terminal outcome.
    async fn deliver(&self, device: &Device, message: &PushMessage) -> DeliveryOutcome {
        let permit = match self.semaphore.acquire().await {
            Ok(p) => p,
            Err(_) => {
                warn!("Delivery semaphore closed");
                return DeliveryOutcome {
                    device_id: device.id,
                    success: false,
                    error: Some(DeliveryErrorKind::Transient),
                    attempts: 0,
                };
            }
        };

        let gateway = self.gateway.as_ref();
        let metrics = self.metrics.as_ref();
        let token = device.push_token.as_str();
        let outcome = deliver_with_backoff(&self.retry, &self.cancelled, move || async move {
            let start = Instant::now();
            let result = gateway.send(token, message).await;
            if let Some(m) = metrics {
                m.observe_push_duration(start.elapsed().as_secs_f64());
            }
            result
        })
        .await;
        drop(permit);

        if let Some(ref m) = self.metrics {
            m.record_push_retries(outcome.attempts.saturating_sub(1));
        }

        match (outcome.success, outcome.error) {
            (true, _) => {
                self.registry.mark_delivered(&device.push_token).await;
                if let Some(ref m) = self.metrics {
                    m.record_push_delivered();
                }
            }
            (false, Some(DeliveryErrorKind::TokenInvalid)) => {
                // Prune failures are swallowed; the delivery outcome stands.
                self.registry.prune(&device.push_token).await;
                if let Some(ref m) = self.metrics {
                    m.record_push_failed("token_invalid");
                }
            }
            (false, _) => {
                if let Some(ref m) = self.metrics {
                    m.record_push_failed("transient");
                }
            }
        }

        DeliveryOutcome {
            device_id: device.id,
            success: outcome.success,
            error: outcome.error,
            attempts: outcome.attempts,
        }
    }
}
