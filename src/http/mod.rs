//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (accepted by the lifecycle controller's serve task)
//!     → TraceLayer (request span)
//!     → request.rs (x-request-id set and propagated)
//!     → timeout + body limit
//!     → caller-supplied axum Router
//! ```

pub mod request;
pub mod server;

pub use request::{RequestIdLayers, X_REQUEST_ID};
pub use server::{health_router, ServiceHandle};
