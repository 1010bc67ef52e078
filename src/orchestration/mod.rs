//! Orchestration layer for muster.
//!
//! The notification channel that carries outcomes back to waiting joins, the
//! fan-out/fan-in join protocol, the two-phase team workflow built from two
//! joins, and the batch runner that launches many workflows at once.

mod channel;
mod join;
mod runner;
mod team;

pub use channel::{
    Acknowledge, Acknowledger, Delivery, Mailbox, NotificationChannel, Subscription, Wake,
};
pub use join::{Join, JoinOrchestrator, JoinReport, JoinState};
pub use runner::{RunStats, RunSummary, Runner, WorkflowId};
pub use team::{PersonQuery, Team, TeamOutcome, TeamWorkflow};
