//! Scraping session lifecycle
//!
//! ```text
//!            start()                    marker gone
//!   Idle ──────────▶ Initializing ──▶ CaptchaWait ──▶ Polling
//!     ▲                 │    │             │            │
//!     │                 │    └─────────────┼───────────▶│
//!     │                 ▼                  ▼            ▼
//!     │              Failed ◀────────── (fatal) ─── Stopping ──▶ Stopped
//!     │                 │                                          │
//!     └──── start() ────┴──────────────────────────────────────────┘
//! ```
//!
//! `Stopped` and `Failed` end a run; `start()` from either begins a new one.

use serde::{Deserialize, Serialize};

/// State of the scraping session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Never started
    #[default]
    Idle,
    /// Acquiring the browser and loading the page
    Initializing,
    /// Waiting for an anti-automation challenge to clear
    CaptchaWait,
    /// Poll loop running
    Polling,
    /// Stop requested, loop winding down
    Stopping,
    /// Stopped on request, session released
    Stopped,
    /// Stopped by an unrecoverable error, session released
    Failed,
}

impl SessionState {
    /// Whether a run is in progress
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Initializing
                | SessionState::CaptchaWait
                | SessionState::Polling
                | SessionState::Stopping
        )
    }

    /// Whether a run has ended
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle | Stopped | Failed, Initializing)
                | (Initializing, CaptchaWait | Polling | Stopping | Failed)
                | (CaptchaWait, Polling | Stopping | Failed)
                | (Polling, Stopping | Failed)
                | (Stopping, Stopped)
        )
    }

    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::CaptchaWait => "captcha_wait",
            SessionState::Polling => "polling",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
