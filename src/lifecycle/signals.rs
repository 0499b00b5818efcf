//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT / SIGTERM (or a caller-chosen subset)
//! - Translate the first signal into one Stop call with a bounded deadline
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A one-shot guard in the bridge means concurrent signals stop at most once
//! - A lost race with another stopper (NotRunning) is not an error

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::lifecycle::{LifecycleError, Service};

/// OS signals that request a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM. Never delivered on non-unix platforms.
    Terminate,
}

impl ShutdownSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }
}

/// Bridges OS termination signals to a service's `stop()`.
pub struct SignalBridge<S> {
    service: S,
    deadline: Duration,
    signals: Vec<ShutdownSignal>,
    fired: AtomicBool,
}

impl<S: Service> SignalBridge<S> {
    /// Bridge SIGINT and SIGTERM to `service.stop(deadline)`.
    pub fn new(service: S, deadline: Duration) -> Self {
        Self {
            service,
            deadline,
            signals: vec![ShutdownSignal::Interrupt, ShutdownSignal::Terminate],
            fired: AtomicBool::new(false),
        }
    }

    /// Restrict the bridge to the given signals.
    pub fn with_signals(mut self, signals: &[ShutdownSignal]) -> Self {
        self.signals = signals.to_vec();
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Wait for the first configured signal, then stop the service.
    ///
    /// Returns `Ok(None)` immediately when no signals are configured.
    pub async fn wait(&self) -> Result<Option<ShutdownSignal>, LifecycleError> {
        let interrupt = self.signals.contains(&ShutdownSignal::Interrupt);
        let terminate = self.signals.contains(&ShutdownSignal::Terminate);

        let received = tokio::select! {
            res = tokio::signal::ctrl_c(), if interrupt => {
                res.map_err(LifecycleError::Signal)?;
                ShutdownSignal::Interrupt
            }
            res = recv_terminate(), if terminate => {
                res.map_err(LifecycleError::Signal)?;
                ShutdownSignal::Terminate
            }
            else => return Ok(None),
        };

        tracing::info!(
            signal = received.as_str(),
            service = self.service.name(),
            "Received signal, shutting down"
        );
        self.trigger().await?;
        Ok(Some(received))
    }

    /// Run the stop path without an OS signal.
    ///
    /// Only the first call reaches the service; later calls return Ok.
    pub async fn trigger(&self) -> Result<(), LifecycleError> {
        if self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!(service = self.service.name(), "Shutdown already triggered");
            return Ok(());
        }

        match self.service.stop(self.deadline).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_running() => {
                tracing::debug!(service = self.service.name(), "Service already stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(service = self.service.name(), error = %e, "Error shutting down service");
                Err(e)
            }
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
async fn recv_terminate() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut stream = signal(SignalKind::terminate())?;
    stream.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn recv_terminate() -> std::io::Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
