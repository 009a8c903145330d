//! Push delivery: gateway client, retry scheduling and fan-out.

pub mod dispatcher;
pub mod gateway;
pub mod retry;

pub use dispatcher::{DeliveryOutcome, DispatchReport, Dispatcher, UserResolver};
pub use gateway::{ExpoClient, GatewayOutcome, PushGateway, PushMessage};
pub use retry::{DeliveryErrorKind, RetryConfig};
