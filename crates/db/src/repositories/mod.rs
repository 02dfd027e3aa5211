//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod notification_job_repo;
pub mod push_subscription_repo;

pub use notification_job_repo::NotificationJobRepo;
pub use push_subscription_repo::PushSubscriptionRepo;
