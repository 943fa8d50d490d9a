//! # Dispatch Targets
//!
//! Outbound delivery for reload activity: the webhook short-circuit
//! (notify instead of mutate) and the best-effort alert sink.

pub mod alert;
pub mod webhook;

pub use alert::AlertSink;
pub use webhook::{WebhookNotifier, WebhookPayload, WorkloadRef};
