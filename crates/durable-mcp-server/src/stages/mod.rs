//! Cross-cutting pipeline stages, in their wire order: shutdown, logging,
//! throttling, authorization, metrics, tracing, dispatch.

pub mod auth;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod throttle;
pub mod tracing;

pub use auth::AuthStage;
pub use dispatch::DispatchStage;
pub use logging::LoggingStage;
pub use metrics::MetricsStage;
pub use shutdown::{ShutdownStage, ShutdownState};
pub use throttle::ThrottleStage;
pub use tracing::TracingStage;
