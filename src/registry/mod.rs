//! Device registry: CRUD over push-token rows behind a store abstraction.

pub mod device;
pub mod store;

pub use device::{Device, Platform};
pub use store::{DeviceStore, MemoryStore, RegisterOutcome};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics::Metrics;

/// Registry of push-capable devices.
///
/// A thin domain layer over a [`DeviceStore`]: input validation, logging
/// and metrics live here; atomicity lives in the store. The store handle
/// is passed in at construction; whoever wires the registry owns the
/// backend's lifecycle.
pub struct DeviceRegistry {
    store: Arc<dyn DeviceStore>,
    metrics: Option<Metrics>,
}

impl DeviceRegistry {
    /// Create a registry over the given store.
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    /// Attach metrics recording.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a device token for a user.
    ///
    /// An existing token owned by another user is reassigned rather than
    /// duplicated; an existing token owned by the same user only gets its
    /// `last_used_at` refreshed. The outcome tells the caller which case
    /// applied.
    pub async fn register(
        &self,
        user_id: &str,
        push_token: &str,
        platform: Platform,
    ) -> Result<(Device, RegisterOutcome)> {
        validate_id(user_id, "user id")?;
        validate_id(push_token, "push token")?;

        let (device, outcome) = self.store.register(user_id, push_token, platform).await?;

        match outcome {
            RegisterOutcome::Created => {
                info!(user_id, platform = %platform, "Registered new device");
            }
            RegisterOutcome::Updated => {
                info!(user_id, "Reassigned device token to user");
            }
            RegisterOutcome::AlreadyRegistered => {
                debug!(user_id, "Device already registered, refreshed last_used_at");
            }
        }
        if let Some(ref m) = self.metrics {
            m.record_device_registered(outcome);
        }

        Ok((device, outcome))
    }

    /// Replace a device's token (token rotation).
    pub async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        platform: Platform,
    ) -> Result<Device> {
        validate_id(old_token, "old push token")?;
        validate_id(new_token, "new push token")?;

        let device = self.store.rotate(old_token, new_token, platform).await?;

        info!(user_id = %device.user_id, "Rotated device token");
        if let Some(ref m) = self.metrics {
            m.record_device_rotated();
        }

        Ok(device)
    }

    /// Remove a device by token. A second removal reports `NotFound`,
    /// which callers treat as "already gone".
    pub async fn remove(&self, push_token: &str) -> Result<Device> {
        validate_id(push_token, "push token")?;

        let device = self.store.remove(push_token).await?;

        info!(user_id = %device.user_id, "Removed device");
        if let Some(ref m) = self.metrics {
            m.record_device_removed("client");
        }

        Ok(device)
    }

    /// Remove a device whose token the gateway reported as permanently
    /// invalid. An already-gone token is swallowed; any other fault is
    /// logged and swallowed too, since pruning must never change the
    /// delivery outcome it follows.
    pub async fn prune(&self, push_token: &str) {
        match self.store.remove(push_token).await {
            Ok(device) => {
                info!(user_id = %device.user_id, "Pruned unregistered device");
                if let Some(ref m) = self.metrics {
                    m.record_device_removed("pruned");
                }
            }
            Err(Error::NotFound(_)) => {
                debug!("Device to prune was already gone");
            }
            Err(e) => {
                warn!(error = %e, "Failed to prune device");
            }
        }
    }

    /// Refresh `last_used_at` after a successful delivery. Best effort.
    pub async fn mark_delivered(&self, push_token: &str) {
        if let Err(e) = self.store.touch(push_token).await {
            debug!(error = %e, "Failed to refresh last_used_at");
        }
    }

    /// All devices owned by a user. Empty is a valid, non-error result.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Device>> {
        validate_id(user_id, "user id")?;
        self.store.find_by_user(user_id).await
    }

    /// Snapshot of every registered device, for broadcast.
    pub async fn list_all(&self) -> Result<Vec<Device>> {
        self.store.all().await
    }
}

fn validate_id(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}
