//! Outbound channel port (driven/secondary port)
//!
//! The outbound channel is the telemetry transport. crashline hands it a
//! structured log and forgets about it: retries and backoff belong to the
//! channel. Delivery outcomes flow back through [`DeliveryListener`].

use serde::{Deserialize, Serialize};

use crate::domain::record::{DeliveryPriority, StructuredLog};

/// Port trait for the telemetry transport
pub trait OutboundChannel: Send + Sync {
    /// Queues a log for delivery
    fn enqueue_for_delivery(&self, log: StructuredLog, priority: DeliveryPriority);
}

/// Outcome reported by the channel for a log it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "error")]
pub enum DeliveryOutcome {
    /// The channel is about to send the log
    WillSend,
    /// The log was accepted by the backend
    Succeeded,
    /// The log was dropped by the channel
    Failed(String),
}

/// Receives delivery outcomes from the outbound channel
///
/// Listeners are invoked for every log kind the channel carries;
/// implementations filter the kinds they care about.
pub trait DeliveryListener: Send + Sync {
    fn on_delivery_event(&self, log: &StructuredLog, outcome: &DeliveryOutcome);
}
