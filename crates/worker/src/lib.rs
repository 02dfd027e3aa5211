//! Campo notification worker.
//!
//! Drains the durable `notification_jobs` queue: claims due jobs, delivers
//! them through a [`campo_push::PushTransport`], applies retry/backoff, and
//! keeps the queue healthy with stuck-job recovery and retention cleanup.

pub mod background;
pub mod config;
pub mod engine;
pub mod shutdown;
pub mod stats;
