//! Periodic publisher
//!
//! [`PublisherLoop`] drives one message per tick through a [`Transport`]:
//!
//! 1. stop with `ConnectionLost` if the transport gave up on the broker
//! 2. build the message for the next sequence number
//! 3. echo the payload to stdout when enabled
//! 4. hand it to the transport; a failed send is logged and dropped
//!
//! The sequence number is carried between ticks in an explicit
//! [`TickState`] and advances whether or not the send succeeded.
//!
//! [`Transport`]: crate::transport::Transport

pub mod runner;
pub mod settings;

pub use runner::{PublisherExit, PublisherLoop, TickState};
pub use settings::PublisherSettings;
