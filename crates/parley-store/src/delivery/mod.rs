//! Offline delivery queue - durable records for recipients who were
//! disconnected when a message was sent
//!
//! A delivery record is a pointer into one of the message logs, never a
//! copy of the payload. Records stay in the queue until the recipient
//! acknowledges them; acknowledgement is a one-way latch, so a crash
//! between drain and ack re-delivers rather than drops.

pub mod queue;
pub mod types;

pub use queue::DeliveryQueue;
pub use types::{DeliveryRecord, MessageRef};
