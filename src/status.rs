//! Provisioning status machine and its observers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Status of a provisioning attempt. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Idle,
    ResolvingNetwork,
    BackendLoading,
    BackendInitializing,
    CreatingSession,
    Ready,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::ResolvingNetwork => "resolving-network",
            SessionStatus::BackendLoading => "backend-loading",
            SessionStatus::BackendInitializing => "backend-initializing",
            SessionStatus::CreatingSession => "creating-session",
            SessionStatus::Ready => "ready",
            SessionStatus::Error => "error",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Idle => 0,
            SessionStatus::ResolvingNetwork => 1,
            SessionStatus::BackendLoading => 2,
            SessionStatus::BackendInitializing => 3,
            SessionStatus::CreatingSession => 4,
            SessionStatus::Ready => 5,
            SessionStatus::Error => 6,
        }
    }

    /// `ready` and `error` end an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ready | SessionStatus::Error)
    }

    /// Forward-only; any non-terminal status may fail into `error`.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == SessionStatus::Error || next.rank() > self.rank()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called synchronously with the new status on every transition.
pub type StatusCallback = Arc<dyn Fn(SessionStatus) + Send + Sync>;

/// Current status plus the ordered history of the latest attempt.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    history: Vec<SessionStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            history: vec![SessionStatus::Idle],
        }
    }

    pub fn current(&self) -> SessionStatus {
        self.history
            .last()
            .copied()
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn history(&self) -> &[SessionStatus] {
        &self.history
    }

    /// Start a new attempt from `idle`.
    pub fn reset(&mut self) {
        self.history.clear();
        self.history.push(SessionStatus::Idle);
    }

    /// Record `next` if it is a legal move. Returns whether it was applied.
    pub fn advance(&mut self, next: SessionStatus) -> bool {
        if !self.current().can_transition_to(next) {
            return false;
        }
        self.history.push(next);
        true
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
