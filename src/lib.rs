//! Service toolkit: lifecycle control for network services plus the small
//! utilities a service process needs (config, logging, errors, cache, queue).

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod queue;

pub use config::schema::AppConfig;
pub use http::ServiceHandle;
pub use lifecycle::{LifecycleController, LifecycleError, Service, ServiceState, Shutdown, SignalBridge};
