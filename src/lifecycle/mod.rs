//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (controller.rs):
//!     Stopped → Starting → bind listener → Running
//!     → spawn serve task (axum::serve with graceful shutdown)
//!     → spawn watcher task (external cancel vs internal stop signal)
//!
//! Stop (controller.rs):
//!     Running → Stopping → fire stop signal → drain (bounded) → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → one Stop call with the configured deadline
//! ```
//!
//! # Design Decisions
//! - External cancellation and explicit Stop share a single code path
//! - Whoever wins the state check performs the shutdown; losers see NotRunning
//! - Shutdown has a deadline: in-flight work is cut off when it passes

use std::future::Future;
use std::time::Duration;

pub mod controller;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use controller::{LifecycleController, LifecycleError, ShutdownCause};
pub use shutdown::{Shutdown, StopSignal};
pub use signals::{ShutdownSignal, SignalBridge};
pub use state::ServiceState;

/// A long-running service with an explicit start/stop lifecycle.
pub trait Service: Send + Sync {
    /// Start the service; `cancel` resolving requests shutdown from outside.
    fn start<F>(&self, cancel: F) -> impl Future<Output = Result<(), LifecycleError>> + Send
    where
        F: Future<Output = ()> + Send + 'static;

    /// Gracefully stop the service within `deadline`.
    fn stop(&self, deadline: Duration) -> impl Future<Output = Result<(), LifecycleError>> + Send;

    /// Ok while the service is running.
    fn health(&self) -> Result<(), LifecycleError>;

    fn name(&self) -> &str;
}
