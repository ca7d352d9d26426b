//! Publisher module
//!
//! Renders the price store and pushes the report to every destination, on
//! a schedule or on demand.

mod destinations;
mod scheduler;
mod sink;

pub use destinations::{DestinationId, Destinations};
pub use scheduler::{BroadcastScheduler, Broadcaster, DeliveryReport};
pub use sink::{as_preformatted, MessageSink, TelegramSink};

#[cfg(test)]
pub use sink::MockMessageSink;
