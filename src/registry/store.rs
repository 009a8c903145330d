//! Storage abstraction for device registrations.
//!
//! The registry talks to a [`DeviceStore`]; any backend works as long as
//! it keeps `push_token` unique and performs each mutation atomically with
//! respect to that constraint. [`MemoryStore`] is the bundled backend: a
//! `BTreeMap` keyed by token behind an async `RwLock`, so the map key is
//! both the uniqueness constraint and the serialization point.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::registry::device::{Device, Platform};

/// How a register call resolved. Callers use this to pick an HTTP status
/// (created vs. updated vs. no-op refresh).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// First-time registration of this token.
    Created,
    /// Token existed under a different user; ownership was reassigned.
    Updated,
    /// Token already registered to this user; only `last_used_at` moved.
    AlreadyRegistered,
}

/// Durable table of devices keyed by push token.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Atomically create or claim the row for `push_token`.
    async fn register(
        &self,
        user_id: &str,
        push_token: &str,
        platform: Platform,
    ) -> Result<(Device, RegisterOutcome)>;

    /// Atomically replace `old_token` with `new_token`, keeping the row's
    /// identity and owner. `NotFound` if `old_token` is absent;
    /// `Validation` if `new_token` is already held by another device.
    async fn rotate(&self, old_token: &str, new_token: &str, platform: Platform)
        -> Result<Device>;

    /// Delete the row for `push_token`. `NotFound` if absent.
    async fn remove(&self, push_token: &str) -> Result<Device>;

    /// Refresh `last_used_at` for `push_token`; a miss is not an error.
    async fn touch(&self, push_token: &str) -> Result<()>;

    /// All devices owned by `user_id`. Empty is a valid result.
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Device>>;

    /// Snapshot of every device. Readers tolerate concurrent mutation;
    /// a device removed mid-scan is reconciled on its next delivery.
    async fn all(&self) -> Result<Vec<Device>>;
}

/// In-memory device store.
///
/// List results come back in token order, which makes fan-out reports
/// deterministic.
#[derive(Default)]
pub struct MemoryStore {
    devices: RwLock<BTreeMap<String, Device>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether the store has no devices.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn register(
        &self,
        user_id: &str,
        push_token: &str,
        platform: Platform,
    ) -> Result<(Device, RegisterOutcome)> {
        let mut devices = self.devices.write().await;

        match devices.get_mut(push_token) {
            Some(device) if device.user_id == user_id => {
                device.last_used_at = Utc::now();
                Ok((device.clone(), RegisterOutcome::AlreadyRegistered))
            }
            Some(device) => {
                device.user_id = user_id.to_string();
                device.platform = platform;
                device.last_used_at = Utc::now();
                Ok((device.clone(), RegisterOutcome::Updated))
            }
            None => {
                let device = Device::new(user_id, push_token, platform);
                devices.insert(push_token.to_string(), device.clone());
                Ok((device, RegisterOutcome::Created))
            }
        }
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        platform: Platform,
    ) -> Result<Device> {
        let mut devices = self.devices.write().await;

        if !devices.contains_key(old_token) {
            return Err(Error::NotFound(format!("device token {old_token}")));
        }
        if new_token != old_token && devices.contains_key(new_token) {
            return Err(Error::Validation(
                "new push token is already registered".to_string(),
            ));
        }

        // Checked above; the row is present.
        let mut device = devices.remove(old_token).ok_or_else(|| {
            Error::Internal("device row vanished during rotation".to_string())
        })?;
        device.push_token = new_token.to_string();
        device.platform = platform;
        device.last_used_at = Utc::now();
        devices.insert(new_token.to_string(), device.clone());

        Ok(device)
    }

    async fn remove(&self, push_token: &str) -> Result<Device> {
        let mut devices = self.devices.write().await;
        devices
            .remove(push_token)
            .ok_or_else(|| Error::NotFound(format!("device token {push_token}")))
    }

    async fn touch(&self, push_token: &str) -> Result<()> {
        let mut devices = self.devices.write().await;
        if let Some(device) = devices.get_mut(push_token) {
            device.last_used_at = Utc::now();
        }
        Ok(())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Device>> {
        let devices = self.devices.read().await;
        Ok(devices
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Device>> {
        let devices = self.devices.read().await;
        Ok(devices.values().cloned().collect())
    }
}
