//! Background-refresh scheduling with exponential-backoff retry and
//! user-interaction deferral (§4.F).

pub mod error;
pub mod refresh;

pub use error::{SchedulerError, SchedulerResult};
pub use refresh::{RefreshCallback, RefreshConfig, RefreshScheduler, UpdateCallback, WriteThroughHook};
