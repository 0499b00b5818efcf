//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle controller and utilities produce:
//!     → logging.rs (structured records through an injected LogSink)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → tracing subscriber (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{build_logging, init_logging, LogHandle, LogLevel, LogSink, MemorySink, TracingSink};
