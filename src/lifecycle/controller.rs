//! Lifecycle controller for a network service.
//!
//! # Responsibilities
//! - Drive a bound listener through start/stop/health transitions
//! - Spawn the serve task and the watcher task on start
//! - Bound graceful drain by a caller-supplied deadline
//!
//! # Design Decisions
//! - One `std::sync::Mutex` guards the state and the run resources; it is
//!   never held across an `.await`
//! - The stop signal is fired under that lock, inside the
//!   `Running → Stopping` transition, so it fires at most once per run
//! - The watcher holds a `Weak` reference and a run generation, so it can
//!   never stop a later run or keep a dropped controller alive
//! - Serve errors are reported, never turned into an automatic stop
//! - Start and Stop are cancel-safe: a dropped `start()` falls back to
//!   Stopped, and a dropped `stop()` leaves the drain running on its own task

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::http::ServiceHandle;
use crate::lifecycle::shutdown::StopSignal;
use crate::lifecycle::state::ServiceState;
use crate::lifecycle::Service;
use crate::observability::logging::{LogLevel, LogSink};
use crate::observability::metrics;

/// Errors returned by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// start() called while not Stopped.
    #[error("service {name} already started")]
    AlreadyStarted { name: String },

    /// stop() or health() called while not Running.
    #[error("service {name} is not running")]
    NotRunning { name: String },

    /// The listener could not be bound; no task was spawned.
    #[error("service {name} failed to bind {address}: {source}")]
    BindFailed {
        name: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The drain did not finish cleanly. The service is Stopped regardless.
    #[error("error shutting down service {name}: {cause}")]
    Shutdown {
        name: String,
        #[source]
        cause: ShutdownCause,
        /// True when in-flight work was cut off at the deadline.
        partial: bool,
    },

    /// An OS signal handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

impl LifecycleError {
    pub fn is_not_running(&self) -> bool {
        matches!(self, LifecycleError::NotRunning { .. })
    }
}

/// Why a graceful drain failed.
#[derive(Debug, Error)]
pub enum ShutdownCause {
    #[error("drain exceeded deadline of {0:?}")]
    DrainTimeout(Duration),

    #[error("serve task failed: {0}")]
    TaskFailed(String),
}

/// Resources that exist only while a run is live.
struct Run {
    generation: u64,
    local_addr: SocketAddr,
    stop: StopSignal,
    serve: JoinHandle<()>,
}

enum Phase {
    Stopped,
    Starting,
    Running(Run),
    Stopping,
}

impl Phase {
    fn state(&self) -> ServiceState {
        match self {
            Phase::Stopped => ServiceState::Stopped,
            Phase::Starting => ServiceState::Starting,
            Phase::Running(_) => ServiceState::Running,
            Phase::Stopping => ServiceState::Stopping,
        }
    }
}

struct Inner {
    handle: ServiceHandle,
    events: EventLog,
    phase: Mutex<Phase>,
    generation: AtomicU64,
    stop_signals: AtomicU64,
}

impl Inner {
    fn name(&self) -> &str {
        &self.handle.config().name
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().expect("lifecycle mutex poisoned")
    }

    /// Move to `next` and return the previous phase; the caller holds the lock.
    fn transition(&self, phase: &mut Phase, next: Phase) -> Phase {
        let from = phase.state();
        let to = next.state();
        debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
        let previous = std::mem::replace(phase, next);
        metrics::record_transition(self.name(), to);
        self.events.log(
            LogLevel::Debug,
            "Lifecycle state transition",
            &[("from", from.to_string()), ("to", to.to_string())],
        );
        previous
    }

    /// `Running → Stopping` for the expected run, handing back its resources.
    fn begin_stop(&self, phase: &mut Phase, expected: Option<u64>) -> Option<Run> {
        match phase {
            Phase::Running(run) if expected.map_or(true, |g| g == run.generation) => {}
            _ => return None,
        }
        match self.transition(phase, Phase::Stopping) {
            Phase::Running(run) => Some(run),
            _ => None,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Dropping the stop signal releases the serve task into its drain.
        if let Ok(Phase::Running(_)) = self.phase.get_mut() {
            self.events.log(
                LogLevel::Warn,
                "Controller dropped while running, draining in background",
                &[],
            );
        }
    }
}

/// Returns a half-finished start to Stopped when the `start()` future is
/// dropped before the listener is serving.
struct StartGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut phase) = self.inner.phase.lock() else { return };
        if matches!(*phase, Phase::Starting) {
            self.inner.transition(&mut phase, Phase::Stopped);
            self.inner.events.log(LogLevel::Warn, "Start abandoned before the service was running", &[]);
        }
    }
}

/// Lifecycle events tagged with the service name.
#[derive(Clone)]
struct EventLog {
    service: String,
    sink: Arc<dyn LogSink>,
}

impl EventLog {
    fn log(&self, level: LogLevel, message: &str, extra: &[(&str, String)]) {
        let mut fields = Vec::with_capacity(extra.len() + 1);
        fields.push(("service", self.service.clone()));
        fields.extend(extra.iter().cloned());
        self.sink.log(level, message, &fields);
    }
}

/// Drives one network service through Stopped → Starting → Running →
/// Stopping → Stopped.
///
/// Cloning is cheap and every clone controls the same service.
#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<Inner>,
}

impl LifecycleController {
    /// Create a controller for `handle`, reporting lifecycle events to `sink`.
    pub fn new(handle: ServiceHandle, sink: Arc<dyn LogSink>) -> Self {
        let events = EventLog {
            service: handle.config().name.clone(),
            sink,
        };
        Self {
            inner: Arc::new(Inner {
                handle,
                events,
                phase: Mutex::new(Phase::Stopped),
                generation: AtomicU64::new(0),
                stop_signals: AtomicU64::new(0),
            }),
        }
    }

    /// Bind the listener and start serving.
    ///
    /// Returns as soon as the listener is bound. `cancel` is an external
    /// shutdown trigger: when it resolves the service is stopped with the
    /// configured shutdown timeout, exactly as if `stop()` had been called.
    pub async fn start<F>(&self, cancel: F) -> Result<(), LifecycleError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = &self.inner;
        {
            let mut phase = inner.lock();
            if !matches!(*phase, Phase::Stopped) {
                return Err(LifecycleError::AlreadyStarted { name: inner.name().to_string() });
            }
            inner.transition(&mut phase, Phase::Starting);
        }
        let mut guard = StartGuard { inner, armed: true };

        let address = inner.handle.config().address.clone();
        let (listener, local_addr) = match bind(&address).await {
            Ok(bound) => bound,
            Err(source) => {
                inner.events.log(
                    LogLevel::Error,
                    "Failed to bind HTTP service",
                    &[("address", address.clone()), ("error", source.to_string())],
                );
                guard.disarm();
                let mut phase = inner.lock();
                inner.transition(&mut phase, Phase::Stopped);
                return Err(LifecycleError::BindFailed {
                    name: inner.name().to_string(),
                    address,
                    source,
                });
            }
        };

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let stop = StopSignal::new();
        let stopped_for_watcher = stop.fired();
        let serve = tokio::spawn(serve(
            listener,
            inner.handle.router(),
            stop.fired(),
            inner.events.clone(),
        ));

        inner.events.log(
            LogLevel::Info,
            "Starting HTTP service",
            &[("address", local_addr.to_string())],
        );

        {
            let mut phase = inner.lock();
            inner.transition(
                &mut phase,
                Phase::Running(Run {
                    generation,
                    local_addr,
                    stop,
                    serve,
                }),
            );
            guard.disarm();
        }

        tokio::spawn(watch(
            Arc::downgrade(inner),
            generation,
            cancel,
            stopped_for_watcher,
        ));

        Ok(())
    }

    /// Stop serving, waiting at most `deadline` for in-flight work.
    ///
    /// Only one concurrent caller performs the shutdown; the others get
    /// `NotRunning`. On a drain failure the service still ends up Stopped.
    pub async fn stop(&self, deadline: Duration) -> Result<(), LifecycleError> {
        self.stop_run(None, deadline).await
    }

    async fn stop_run(&self, expected: Option<u64>, deadline: Duration) -> Result<(), LifecycleError> {
        let inner = &self.inner;
        let run = {
            let mut phase = inner.lock();
            let Some(run) = inner.begin_stop(&mut phase, expected) else {
                return Err(LifecycleError::NotRunning { name: inner.name().to_string() });
            };
            if run.stop.fire() {
                inner.stop_signals.fetch_add(1, Ordering::SeqCst);
                metrics::record_stop_signal(inner.name());
            }
            run
        };

        // The drain runs on its own task so that dropping this future
        // cannot strand the service in Stopping.
        let controller = self.clone();
        let drain = tokio::spawn(async move { controller.drain(run, deadline).await });
        match drain.await {
            Ok(result) => result,
            Err(join_error) => {
                {
                    let mut phase = inner.lock();
                    if matches!(*phase, Phase::Stopping) {
                        inner.transition(&mut phase, Phase::Stopped);
                    }
                }
                Err(LifecycleError::Shutdown {
                    name: inner.name().to_string(),
                    cause: ShutdownCause::TaskFailed(join_error.to_string()),
                    partial: false,
                })
            }
        }
    }

    /// Wait for the serve task within `deadline`, then enter Stopped.
    async fn drain(&self, run: Run, deadline: Duration) -> Result<(), LifecycleError> {
        let inner = &self.inner;
        inner.events.log(
            LogLevel::Info,
            "Stopping HTTP service",
            &[("address", run.local_addr.to_string()), ("deadline", format!("{deadline:?}"))],
        );

        let Run { mut serve, .. } = run;
        let outcome = match tokio::time::timeout(deadline, &mut serve).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_error)) => Err((ShutdownCause::TaskFailed(join_error.to_string()), false)),
            Err(_) => {
                // Deadline hit: abort so the listener and open connections are dropped now.
                serve.abort();
                let _ = serve.await;
                Err((ShutdownCause::DrainTimeout(deadline), true))
            }
        };

        {
            let mut phase = inner.lock();
            inner.transition(&mut phase, Phase::Stopped);
        }

        match outcome {
            Ok(()) => Ok(()),
            Err((cause, partial)) => {
                metrics::record_shutdown_failure(inner.name());
                inner.events.log(
                    LogLevel::Error,
                    "Error shutting down HTTP service",
                    &[("error", cause.to_string()), ("partial", partial.to_string())],
                );
                Err(LifecycleError::Shutdown {
                    name: inner.name().to_string(),
                    cause,
                    partial,
                })
            }
        }
    }

    /// Ok while Running, `NotRunning` otherwise.
    pub fn health(&self) -> Result<(), LifecycleError> {
        if self.state() == ServiceState::Running {
            Ok(())
        } else {
            Err(LifecycleError::NotRunning { name: self.inner.name().to_string() })
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn state(&self) -> ServiceState {
        self.inner.lock().state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Address the listener is bound to, while Running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.inner.lock() {
            Phase::Running(run) => Some(run.local_addr),
            _ => None,
        }
    }

    /// Number of stop signals fired over the controller's lifetime.
    ///
    /// Equals the number of completed `Running → Stopping` transitions.
    pub fn stop_signals_fired(&self) -> u64 {
        self.inner.stop_signals.load(Ordering::SeqCst)
    }
}

impl Service for LifecycleController {
    fn start<F>(&self, cancel: F) -> impl Future<Output = Result<(), LifecycleError>> + Send
    where
        F: Future<Output = ()> + Send + 'static,
    {
        LifecycleController::start(self, cancel)
    }

    fn stop(&self, deadline: Duration) -> impl Future<Output = Result<(), LifecycleError>> + Send {
        LifecycleController::stop(self, deadline)
    }

    fn health(&self) -> Result<(), LifecycleError> {
        LifecycleController::health(self)
    }

    fn name(&self) -> &str {
        LifecycleController::name(self)
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

async fn bind(address: &str) -> std::io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(address).await?;
    // On error the listener is dropped (closed) here.
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

/// Serve task: accept and serve until the stop signal, then drain.
async fn serve<S>(listener: TcpListener, app: Router, stopped: S, events: EventLog)
where
    S: Future<Output = ()> + Send + 'static,
{
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(stopped)
        .await;

    match result {
        Ok(()) => events.log(LogLevel::Info, "HTTP service stopped", &[]),
        Err(e) => events.log(LogLevel::Error, "HTTP service error", &[("error", e.to_string())]),
    }
}

/// Watcher task: forward the external cancellation into stop(), unless the
/// run ends on its own first.
async fn watch<C, S>(inner: Weak<Inner>, generation: u64, cancel: C, stopped: S)
where
    C: Future<Output = ()> + Send + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    tokio::select! {
        biased;
        _ = stopped => {}
        _ = cancel => {
            let Some(inner) = inner.upgrade() else { return };
            let deadline = inner.handle.config().shutdown_timeout();
            inner.events.log(LogLevel::Info, "External cancellation received, shutting down", &[]);
            let controller = LifecycleController { inner };
            match controller.stop_run(Some(generation), deadline).await {
                Ok(()) => {}
                Err(e) if e.is_not_running() => {
                    controller.inner.events.log(LogLevel::Debug, "Stop already in progress", &[]);
                }
                Err(e) => {
                    controller.inner.events.log(
                        LogLevel::Error,
                        "Error shutting down service",
                        &[("error", e.to_string())],
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::http::health_router;
    use crate::observability::MemorySink;

    fn controller(address: &str) -> (LifecycleController, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let handle = ServiceHandle::new(ServiceConfig::new("unit", address), health_router()).unwrap();
        (LifecycleController::new(handle, sink.clone()), sink)
    }

    #[test]
    fn error_messages() {
        let err = LifecycleError::AlreadyStarted { name: "api".into() };
        assert_eq!(err.to_string(), "service api already started");

        let err = LifecycleError::Shutdown {
            name: "api".into(),
            cause: ShutdownCause::DrainTimeout(Duration::from_secs(1)),
            partial: true,
        };
        assert_eq!(err.to_string(), "error shutting down service api: drain exceeded deadline of 1s");
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_not_running());
    }

    #[test]
    fn new_controller_is_stopped() {
        let (controller, sink) = controller("127.0.0.1:0");
        assert_eq!(controller.name(), "unit");
        assert_eq!(controller.state(), ServiceState::Stopped);
        assert!(controller.local_addr().is_none());
        assert!(controller.health().unwrap_err().is_not_running());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn transitions_are_logged_in_order() {
        let (controller, sink) = controller("127.0.0.1:0");
        controller.start(std::future::pending()).await.unwrap();
        controller.stop(Duration::from_secs(2)).await.unwrap();

        let steps: Vec<(String, String)> = sink
            .find("Lifecycle state transition")
            .iter()
            .map(|r| {
                (
                    r.field("from").unwrap_or_default().to_string(),
                    r.field("to").unwrap_or_default().to_string(),
                )
            })
            .collect();
        let expected = [
            ("stopped", "starting"),
            ("starting", "running"),
            ("running", "stopping"),
            ("stopping", "stopped"),
        ];
        assert_eq!(steps.len(), expected.len());
        for ((from, to), (want_from, want_to)) in steps.iter().zip(expected) {
            assert_eq!(from, want_from);
            assert_eq!(to, want_to);
        }
    }
}
