//! Service lifecycle states.
//!
//! # State Transitions
//! ```text
//! Stopped  → Starting: start() accepted
//! Starting → Running:  listener bound
//! Starting → Stopped:  bind failed (Running never entered)
//! Running  → Stopping: stop() accepted (explicit, external cancel, or signal)
//! Stopping → Stopped:  drain finished or deadline hit
//! ```

use std::fmt;

/// Observable state of a lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    /// Not serving; start() may be called.
    Stopped,
    /// Binding the listener.
    Starting,
    /// Listener bound and serving.
    Running,
    /// Draining in-flight work.
    Stopping,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
        }
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: ServiceState) -> bool {
        matches!(
            (self, next),
            (ServiceState::Stopped, ServiceState::Starting)
                | (ServiceState::Starting, ServiceState::Running)
                | (ServiceState::Starting, ServiceState::Stopped)
                | (ServiceState::Running, ServiceState::Stopping)
                | (ServiceState::Stopping, ServiceState::Stopped)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ServiceState::*;

    #[test]
    fn legal_transitions() {
        assert!(Stopped.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Stopped));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Stopping));
        assert!(!Running.can_transition_to(Starting));
        assert!(!Running.can_transition_to(Stopped));
        assert!(!Stopping.can_transition_to(Running));
        assert!(!Starting.can_transition_to(Stopping));
    }
}
