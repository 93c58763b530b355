//! Outbound message model and topic validation
//!
//! Defines what a single tick produces: the message, its payload template and
//! the delivery attributes carried to the transport.

pub mod message;
pub mod topics;

pub use message::*;
pub use topics::*;
