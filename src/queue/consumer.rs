//! Queue consumers and producers.
//!
//! # Responsibilities
//! - Run a message handler over a queue in a background task
//! - Give the consumer the same start/stop/health contract as a service
//! - Provide a closable producer side
//!
//! # Design Decisions
//! - An idle consumer sleeps `poll_interval` between polls; a busy one takes
//!   up to `batch_size` messages per round
//! - Stop is checked between batches, so the batch in hand finishes within
//!   the stop deadline or is cut off
//! - A failing handler is counted and logged; the message is not requeued

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::lifecycle::{LifecycleError, Service, ShutdownCause, StopSignal};
use crate::queue::{Message, Queue, QueueError, QueueOptions};

/// Boxed future returned by a message handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send>>;

type Handler = Arc<dyn Fn(Message) -> HandlerFuture + Send + Sync>;

/// Sends messages into a queue.
pub trait Producer: Send + Sync {
    fn send(&self, message: Message) -> Result<(), QueueError>;

    /// Send in order, stopping at the first failure.
    fn send_batch(&self, messages: Vec<Message>) -> Result<(), QueueError> {
        for message in messages {
            self.send(message)?;
        }
        Ok(())
    }

    /// Refuse further sends.
    fn close(&self);
}

/// Producer that pushes straight into a [`Queue`].
pub struct QueueProducer<Q: ?Sized> {
    queue: Arc<Q>,
    closed: AtomicBool,
}

impl<Q: Queue + ?Sized> QueueProducer<Q> {
    pub fn new(queue: Arc<Q>) -> Self {
        Self {
            queue,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<Q: Queue + ?Sized> Producer for QueueProducer<Q> {
    fn send(&self, message: Message) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        self.queue.push(message)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Stats {
    processed: AtomicU64,
    failed: AtomicU64,
}

struct ConsumerRun {
    stop: StopSignal,
    task: JoinHandle<()>,
}

/// Drains a queue through a handler until stopped.
pub struct Consumer<Q: ?Sized> {
    name: String,
    queue: Arc<Q>,
    options: QueueOptions,
    handler: Handler,
    stats: Arc<Stats>,
    run: Mutex<Option<ConsumerRun>>,
}

impl<Q: Queue + ?Sized + 'static> Consumer<Q> {
    /// Consumer named `name` that passes every message from `queue` to `handler`.
    pub fn new<F, Fut>(name: impl Into<String>, queue: Arc<Q>, options: QueueOptions, handler: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), QueueError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            queue,
            options,
            handler: Arc::new(move |message| -> HandlerFuture { Box::pin(handler(message)) }),
            stats: Arc::new(Stats::default()),
            run: Mutex::new(None),
        }
    }

    /// Messages the handler accepted.
    pub fn processed(&self) -> u64 {
        self.stats.processed.load(Ordering::SeqCst)
    }

    /// Messages the handler rejected.
    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ConsumerRun>> {
        self.run.lock().expect("consumer mutex poisoned")
    }

    fn not_running(&self) -> LifecycleError {
        LifecycleError::NotRunning { name: self.name.clone() }
    }

    fn spawn<F>(&self, cancel: F) -> Result<(), LifecycleError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut run = self.lock();
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return Err(LifecycleError::AlreadyStarted { name: self.name.clone() });
        }

        let stop = StopSignal::new();
        let task = tokio::spawn(consume(
            self.name.clone(),
            Arc::clone(&self.queue),
            self.options.clone(),
            Arc::clone(&self.handler),
            Arc::clone(&self.stats),
            stop.fired(),
            cancel,
        ));
        tracing::info!(consumer = %self.name, "Queue consumer started");
        *run = Some(ConsumerRun { stop, task });
        Ok(())
    }

    async fn shutdown(&self, deadline: Duration) -> Result<(), LifecycleError> {
        let run = {
            let mut run = self.lock();
            match run.take() {
                Some(r) if !r.task.is_finished() => r,
                _ => return Err(self.not_running()),
            }
        };
        run.stop.fire();

        let ConsumerRun { mut task, .. } = run;
        let outcome = match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(join_error)) => (ShutdownCause::TaskFailed(join_error.to_string()), false),
            Err(_) => {
                task.abort();
                let _ = task.await;
                (ShutdownCause::DrainTimeout(deadline), true)
            }
        };

        let (cause, partial) = outcome;
        tracing::error!(consumer = %self.name, error = %cause, partial, "Error stopping queue consumer");
        Err(LifecycleError::Shutdown {
            name: self.name.clone(),
            cause,
            partial,
        })
    }
}

impl<Q: Queue + ?Sized + 'static> Service for Consumer<Q> {
    fn start<F>(&self, cancel: F) -> impl Future<Output = Result<(), LifecycleError>> + Send
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let result = self.spawn(cancel);
        async move { result }
    }

    fn stop(&self, deadline: Duration) -> impl Future<Output = Result<(), LifecycleError>> + Send {
        self.shutdown(deadline)
    }

    fn health(&self) -> Result<(), LifecycleError> {
        match &*self.lock() {
            Some(run) if !run.task.is_finished() => Ok(()),
            _ => Err(self.not_running()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

async fn consume<Q, S, C>(
    name: String,
    queue: Arc<Q>,
    options: QueueOptions,
    handler: Handler,
    stats: Arc<Stats>,
    stopped: S,
    cancel: C,
) where
    Q: Queue + ?Sized,
    S: Future<Output = ()>,
    C: Future<Output = ()>,
{
    tokio::pin!(stopped);
    tokio::pin!(cancel);

    loop {
        let batch = tokio::select! {
            biased;
            _ = &mut stopped => break,
            _ = &mut cancel => {
                tracing::info!(consumer = %name, "External cancellation received, stopping consumer");
                break;
            }
            batch = next_batch(queue.as_ref(), &options) => batch,
        };

        for message in batch {
            let id = message.id.clone();
            match handler(message).await {
                Ok(()) => {
                    stats.processed.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(consumer = %name, message_id = %id, error = %e, "Message handler failed");
                }
            }
        }
    }

    tracing::info!(consumer = %name, "Queue consumer stopped");
}

/// Up to `batch_size` messages, or an empty batch after one idle poll interval.
async fn next_batch<Q: Queue + ?Sized>(queue: &Q, options: &QueueOptions) -> Vec<Message> {
    let mut batch = Vec::new();
    while batch.len() < options.batch_size {
        match queue.pop() {
            Ok(Some(message)) => batch.push(message),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Queue pop failed");
                break;
            }
        }
    }
    if batch.is_empty() {
        tokio::time::sleep(options.poll_interval).await;
    }
    batch
}
