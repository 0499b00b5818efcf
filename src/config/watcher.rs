//! Configuration hot reload.
//!
//! # Data Flow
//! ```text
//! file event (notify)
//!     → ConfigWatcher re-reads and validates the file
//!     → ConfigStore::reload (identical content is ignored)
//!     → atomic swap
//!     → subscribers whose selected section changed are notified
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;

use crate::config::loader::parse_config;
use crate::config::schema::AppConfig;

/// Pushes a new config into one subscription; returns false once the
/// subscriber is gone.
type Listener = Box<dyn Fn(&AppConfig) -> bool + Send + Sync>;

/// Shared, atomically swappable view of the current configuration.
///
/// Readers never block. Components that react to reloads take a
/// [`subscribe`](Self::subscribe) receiver for the section they care about.
#[derive(Clone)]
pub struct ConfigStore {
    current: Arc<ArcSwap<AppConfig>>,
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl ConfigStore {
    pub fn new(config: AppConfig) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of the current configuration.
    pub fn load(&self) -> Arc<AppConfig> {
        self.current.load_full()
    }

    /// Replace the current configuration and notify subscribers.
    pub fn store(&self, config: AppConfig) {
        let mut listeners = self.listeners.lock().expect("config listeners mutex poisoned");
        self.publish(&mut listeners, config);
    }

    /// Apply a reloaded configuration. Returns `false` when it is identical
    /// to the current one.
    pub fn reload(&self, config: AppConfig) -> bool {
        let mut listeners = self.listeners.lock().expect("config listeners mutex poisoned");
        let previous = self.current.load_full();
        if *previous == config {
            tracing::debug!("Config file unchanged, nothing to reload");
            return false;
        }
        if config.service.address != previous.service.address {
            tracing::warn!(
                address = %config.service.address,
                "service.address changed; takes effect on next start"
            );
        }
        self.publish(&mut listeners, config);
        tracing::info!("Configuration reloaded");
        true
    }

    /// Follow one section of the configuration.
    ///
    /// The receiver starts out holding the current value and is marked
    /// changed only when a later store changes what `select` returns.
    pub fn subscribe<T, F>(&self, select: F) -> watch::Receiver<T>
    where
        T: PartialEq + Send + Sync + 'static,
        F: Fn(&AppConfig) -> T + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().expect("config listeners mutex poisoned");
        let snapshot = self.current.load_full();
        let (tx, rx) = watch::channel(select(snapshot.as_ref()));
        listeners.push(Box::new(move |config: &AppConfig| {
            let next = select(config);
            tx.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
            !tx.is_closed()
        }));
        rx
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().expect("config listeners mutex poisoned").len()
    }

    fn publish(&self, listeners: &mut Vec<Listener>, config: AppConfig) {
        let config = Arc::new(config);
        self.current.store(Arc::clone(&config));
        listeners.retain(|notify| notify(config.as_ref()));
    }
}

/// Watches the configuration file and feeds valid changes into a [`ConfigStore`].
pub struct ConfigWatcher {
    path: PathBuf,
    store: ConfigStore,
}

impl ConfigWatcher {
    pub fn new(path: &Path, store: ConfigStore) -> Self {
        Self {
            path: path.to_path_buf(),
            store,
        }
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let ConfigWatcher { path, store } = self;
        let reload_path = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    apply_file(&reload_path, &store);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Re-read `path` into `store`. Returns whether the store changed.
///
/// An empty read is a writer mid-truncate and is skipped; an invalid file
/// keeps the current configuration.
fn apply_file(path: &Path, store: &ConfigStore) -> bool {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read config file");
            return false;
        }
    };
    if content.trim().is_empty() {
        tracing::debug!(path = %path.display(), "Config file empty, waiting for the write to finish");
        return false;
    }

    match parse_config(&content) {
        Ok(config) => store.reload(config),
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Rejected config reload, keeping current configuration"
            );
            false
        }
    }
}
