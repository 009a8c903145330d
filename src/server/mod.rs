//! Operational HTTP endpoints.

pub mod health;

pub use health::HealthServer;
