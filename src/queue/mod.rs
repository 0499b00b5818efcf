//! Message queue interface.
//!
//! # Design Decisions
//! - FIFO semantics; `peek` never removes
//! - A full queue rejects pushes instead of blocking the producer
//! - Remote brokers plug in behind the `Queue` trait
//! - Consumers are services: started and stopped like any other listener

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::QueueConfig;

pub mod consumer;
pub mod memory;

pub use consumer::{Consumer, Producer, QueueProducer};
pub use memory::MemoryQueue;

/// Errors returned by queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full ({0} messages)")]
    Full(usize),

    #[error("invalid queue options: {0}")]
    InvalidOptions(String),

    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("producer is closed")]
    Closed,

    #[error("message handler failed: {0}")]
    Handler(String),
}

/// A queued message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub timestamp: SystemTime,
}

impl Message {
    /// New message with a random id, stamped now.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            body: body.into(),
            metadata: HashMap::new(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Queue tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// Maximum number of queued messages.
    pub max_size: usize,
    /// Messages taken per `pop_batch` or consumer round.
    pub batch_size: usize,
    /// How long an idle consumer sleeps before polling again.
    pub poll_interval: Duration,
}

impl QueueOptions {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_size == 0 {
            return Err(QueueError::InvalidOptions("max size must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(QueueError::InvalidOptions("batch size must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueueOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_size: config.max_size,
            batch_size: config.batch_size,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// FIFO message queue.
pub trait Queue: Send + Sync {
    fn push(&self, message: Message) -> Result<(), QueueError>;

    /// Remove and return the oldest message.
    fn pop(&self) -> Result<Option<Message>, QueueError>;

    /// Return the oldest message without removing it.
    fn peek(&self) -> Result<Option<Message>, QueueError>;

    fn len(&self) -> Result<usize, QueueError>;

    fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }

    fn clear(&self) -> Result<(), QueueError>;
}
