//! Notification service facade.
//!
//! The operations exposed to whatever transport fronts this crate.
//! Expected outcomes come back as result objects the caller can map to
//! a status code; only faults (invalid input, missing rows, broken
//! collaborators) escalate as [`Error`] values.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::push::{DispatchReport, Dispatcher, PushMessage};
use crate::registry::{DeviceRegistry, Platform, RegisterOutcome};

/// Result of a device registration or token rotation.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    pub success: bool,
    pub message: String,
    pub device_id: Uuid,
    pub outcome: RegisterOutcome,
}

/// Result of a device removal.
#[derive(Debug, Clone, Serialize)]
pub struct RemovalResult {
    pub success: bool,
    pub message: String,
}

/// Facade over the registry and dispatcher.
pub struct NotificationService {
    registry: Arc<DeviceRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl NotificationService {
    /// Create the service over an already-wired registry and dispatcher.
    pub fn new(registry: Arc<DeviceRegistry>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    /// Register a device token for a user.
    pub async fn register_device(
        &self,
        user_id: &str,
        push_token: &str,
        platform: Platform,
    ) -> Result<RegistrationResult> {
        let (device, outcome) = self.registry.register(user_id, push_token, platform).await?;

        let message = match outcome {
            RegisterOutcome::Created => "Device registered",
            RegisterOutcome::Updated => "Device token reassigned",
            RegisterOutcome::AlreadyRegistered => "Device already registered",
        };

        Ok(RegistrationResult {
            success: true,
            message: message.to_string(),
            device_id: device.id,
            outcome,
        })
    }

    /// Replace a device's push token.
    pub async fn update_device_token(
        &self,
        old_token: &str,
        new_token: &str,
        platform: Platform,
    ) -> Result<RegistrationResult> {
        let device = self.registry.rotate(old_token, new_token, platform).await?;

        Ok(RegistrationResult {
            success: true,
            message: "Device token updated".to_string(),
            device_id: device.id,
            outcome: RegisterOutcome::Updated,
        })
    }

    /// Remove a device by token. Removing an already-removed token is a
    /// success; the end state the caller asked for holds either way.
    pub async fn remove_device(&self, push_token: &str) -> Result<RemovalResult> {
        match self.registry.remove(push_token).await {
            Ok(_) => Ok(RemovalResult {
                success: true,
                message: "Device removed".to_string(),
            }),
            Err(Error::NotFound(_)) => Ok(RemovalResult {
                success: true,
                message: "Device already removed".to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Send a notification to every device of one user.
    pub async fn send_to_user(
        &self,
        user_id: &str,
        message: &PushMessage,
    ) -> Result<DispatchReport> {
        self.dispatcher.send_to_user(user_id, message).await
    }

    /// Broadcast a notification to every registered device.
    pub async fn send_to_all(&self, message: &PushMessage) -> Result<DispatchReport> {
        self.dispatcher.send_to_all(message).await
    }

    /// Send a notification to the devices of users matching a filter.
    pub async fn send_by_filter(
        &self,
        filter: &Value,
        message: &PushMessage,
    ) -> Result<DispatchReport> {
        self.dispatcher.send_by_filter(filter, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::dispatcher::DEFAULT_MAX_CONCURRENT;
    use crate::push::{GatewayOutcome, PushGateway, RetryConfig};
    use crate::registry::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct AlwaysDelivered;

    #[async_trait]
    impl PushGateway for AlwaysDelivered {
        async fn send(&self, _push_token: &str, _message: &PushMessage) -> GatewayOutcome {
            GatewayOutcome::Delivered
        }
    }

    fn service() -> NotificationService {
        let registry = Arc::new(DeviceRegistry::new(Arc::new(MemoryStore::new())));
        let retry = RetryConfig {
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
        };
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            Arc::new(AlwaysDelivered),
            retry,
            DEFAULT_MAX_CONCURRENT,
        ));
        NotificationService::new(registry, dispatcher)
    }

    #[tokio::test]
    async fn test_register_then_reregister() {
        let service = service();

        let first = service
            .register_device("u1", "token-a", Platform::Ios)
            .await
            .unwrap();
        let second = service
            .register_device("u1", "token-a", Platform::Ios)
            .await
            .unwrap();

        assert_eq!(first.outcome, RegisterOutcome::Created);
        assert_eq!(second.outcome, RegisterOutcome::AlreadyRegistered);
        assert_eq!(first.device_id, second.device_id);
    }

    #[tokio::test]
    async fn test_update_token_keeps_device_identity() {
        let service = service();

        let registered = service
            .register_device("u1", "token-a", Platform::Ios)
            .await
            .unwrap();
        let rotated = service
            .update_device_token("token-a", "token-b", Platform::Ios)
            .await
            .unwrap();

        assert_eq!(rotated.device_id, registered.device_id);
        assert!(rotated.success);
    }

    #[tokio::test]
    async fn test_update_token_missing_device_is_error() {
        let service = service();
        let err = service
            .update_device_token("token-x", "token-y", Platform::Ios)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent_for_callers() {
        let service = service();
        service
            .register_device("u1", "token-a", Platform::Ios)
            .await
            .unwrap();

        let first = service.remove_device("token-a").await.unwrap();
        let second = service.remove_device("token-a").await.unwrap();

        assert!(first.success);
        assert!(second.success);
        assert_eq!(second.message, "Device already removed");
    }

    #[tokio::test]
    async fn test_send_to_user_through_facade() {
        let service = service();
        service
            .register_device("u1", "token-a", Platform::Ios)
            .await
            .unwrap();

        let report = service
            .send_to_user("u1", &PushMessage::new("Hi", "There", None))
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.outcomes.len(), 1);
    }

    #[test]
    fn test_registration_result_serialization() {
        let result = RegistrationResult {
            success: true,
            message: "Device registered".to_string(),
            device_id: Uuid::nil(),
            outcome: RegisterOutcome::Created,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "created");
        assert_eq!(json["success"], true);
    }
}
