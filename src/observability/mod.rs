//! Observability: structured logging and publisher metrics

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, init_with_verbosity, LogFormat};
pub use metrics::{MetricsSnapshot, PublisherMetrics};

// Span macros for structured logging
pub use logging::{mqtt_span, tick_span};
