//! Courier - push notification dispatch.
//!
//! A device registry keyed by push token, a retrying Expo-style gateway
//! client, and a fan-out dispatcher that delivers to one user, all
//! users, or a filtered user set. Tokens the gateway reports as
//! unregistered are pruned automatically, so the registry converges on
//! live devices without operator intervention.
//!
//! The calling transport layer is external; [`service::NotificationService`]
//! is the surface it talks to.

pub mod config;
pub mod error;
pub mod metrics;
pub mod push;
pub mod registry;
pub mod server;
pub mod service;
pub mod shutdown;

pub use error::{Error, Result};
