//! Notification delivery engine.
//!
//! - [`dispatcher`]: claim loop over `notification_jobs`.
//! - [`delivery`]: fan-out of one job to its subscriptions.
//! - [`outcome`]: guarded status transitions after an attempt.

pub mod delivery;
pub mod dispatcher;
pub mod outcome;

#[cfg(test)]
pub(crate) mod testing;

pub use delivery::{DeliveryEngine, DeliveryLimits};
pub use dispatcher::{DispatchSettings, Dispatcher};
