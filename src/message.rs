//! Message types flowing through the publish loop.
//!
//! `OutboundMessage` is what a `MessageSource` hands over; the loop turns each one into a
//! `ProduceRecord` carrying a fresh correlation id, and the broker answers with a
//! `DeliveryOutcome`.

mod outbound;
mod record;

pub use outbound::OutboundMessage;
pub use record::{DeliveryOutcome, ProduceRecord, CORRELATION_ID_HEADER};
