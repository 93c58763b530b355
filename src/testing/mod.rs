//! Testing utilities and mock implementations
//!
//! This module provides a mock transport for driving the publisher loop
//! without an MQTT broker.

pub mod mocks;

pub use mocks::*;
