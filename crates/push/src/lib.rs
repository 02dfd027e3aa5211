//! Campo push notification plumbing.
//!
//! - [`PushTransport`]: the single delivery channel abstraction, with the
//!   HTTP gateway implementation [`HttpPushTransport`].
//! - [`SubscriptionDirectory`]: the device directory read and maintained
//!   during delivery, backed by PostgreSQL in [`PgSubscriptionDirectory`].
//! - [`NotificationQueue`]: the enqueue contract used by the rest of the
//!   application.

pub mod directory;
pub mod http;
pub mod queue;
pub mod transport;

pub use directory::{PgSubscriptionDirectory, Subscription, SubscriptionDirectory, SubscriptionKeys};
pub use http::{GatewayConfig, HttpPushTransport};
pub use queue::{NotificationQueue, QueueError};
pub use transport::{PushError, PushTransport, SendOptions, Urgency};
