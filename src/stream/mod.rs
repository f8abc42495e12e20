//! Async stream adapters over subscriptions.
//!
//! [`TelemetryStream`] turns a protocol subscription into a `futures`
//! [`Stream`](futures::Stream); [`ThrottleExt`] caps how often any stream
//! yields, keeping only the newest item of each interval.

mod telemetry;
mod throttle;

pub use telemetry::{PayloadFormat, TelemetryStream};
pub use throttle::{Throttle, ThrottleExt};
