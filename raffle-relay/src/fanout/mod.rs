//! Fan-out of one raffle activation to every enrolled participant.
//!
//! Lifecycle of one webhook delivery:
//!
//! ```text
//! RECEIVED ──verify──► VERIFIED ──► DISPATCHING ──► COMPLETED
//!     │
//!     └──────────────► REJECTED (bad payload or digest, terminal)
//! ```
//!
//! Dispatch snapshots the credential store, then runs one registration per participant with at
//! most `fanout.max_concurrency` in flight. Each participant yields exactly one
//! [`RegistrationOutcome`](crate::alphabot::RegistrationOutcome) no matter how its siblings fare.
//! Notifications go out afterwards as separate tracked tasks, so a slow chat platform never holds
//! up the webhook response.

use std::fmt;

use crate::alphabot::RegistrationOutcome;
use crate::types::RaffleSlug;

pub mod orchestrator;

pub use orchestrator::FanoutOrchestrator;

/// Where a webhook delivery is in its lifecycle. Recorded on log lines as `state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutState {
    Received,
    Verified,
    Dispatching,
    Completed,
    Rejected,
}

impl fmt::Display for FanoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "RECEIVED",
            Self::Verified => "VERIFIED",
            Self::Dispatching => "DISPATCHING",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// All outcomes of one fan-out run, in completion order.
#[derive(Debug, Clone, PartialEq)]
pub struct FanoutReport {
    pub raffle_slug: RaffleSlug,
    pub outcomes: Vec<RegistrationOutcome>,
}

impl FanoutReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// What happened to a verified event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDisposition {
    /// Not an event type this service acts on
    Ignored { event: String },
    /// Activation event without a raffle slug
    MissingSlug,
    /// Fan-out finished inside the response deadline
    Completed(FanoutReport),
    /// Fan-out outlived the response deadline and is still running in the background
    StillDispatching { raffle_slug: RaffleSlug },
}
