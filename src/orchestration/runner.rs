//! Batch launcher for team workflows.
//!
//! Each iteration starts `workflow_count` workflows with random requests,
//! reports progress while they run, and waits for all of them before the next
//! iteration. Counters are collected in [`RunStats`] and summarized at the end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::core::CreationRequest;
use crate::orchestration::{TeamOutcome, TeamWorkflow};
use crate::{mlog, mlog_debug, mlog_error, mlog_warn, Error, Result};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Identifier of one workflow instance, for logs and JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the UUID.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Counters shared by every workflow of a run.
#[derive(Debug, Default)]
pub struct RunStats {
    workflows_started: AtomicUsize,
    workflows_finished: AtomicUsize,
    teams_assembled: AtomicUsize,
    leaders_aborted: AtomicUsize,
    members_requested: AtomicUsize,
    members_created: AtomicUsize,
    errors: AtomicUsize,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.workflows_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &TeamOutcome) {
        self.workflows_finished.fetch_add(1, Ordering::Relaxed);
        match outcome {
            TeamOutcome::Assembled(team) => {
                self.teams_assembled.fetch_add(1, Ordering::Relaxed);
                self.members_requested
                    .fetch_add(team.requested, Ordering::Relaxed);
                self.members_created
                    .fetch_add(team.members.len(), Ordering::Relaxed);
            }
            TeamOutcome::Aborted { .. } => {
                self.leaders_aborted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_error(&self) {
        self.workflows_finished.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> RunSummary {
        let requested = self.members_requested.load(Ordering::Relaxed);
        let created = self.members_created.load(Ordering::Relaxed);
        RunSummary {
            workflows_started: self.workflows_started.load(Ordering::Relaxed),
            workflows_finished: self.workflows_finished.load(Ordering::Relaxed),
            teams_assembled: self.teams_assembled.load(Ordering::Relaxed),
            leaders_aborted: self.leaders_aborted.load(Ordering::Relaxed),
            members_requested: requested,
            members_created: created,
            // Counters are read one by one while workflows may still record.
            members_dropped: requested.saturating_sub(created),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`RunStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunSummary {
    pub workflows_started: usize,
    pub workflows_finished: usize,
    pub teams_assembled: usize,
    pub leaders_aborted: usize,
    pub members_requested: usize,
    pub members_created: usize,
    pub members_dropped: usize,
    pub errors: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} workflows finished, {} teams, {} aborted leaders, {}/{} members ({} dropped), {} errors",
            self.workflows_finished,
            self.workflows_started,
            self.teams_assembled,
            self.leaders_aborted,
            self.members_created,
            self.members_requested,
            self.members_dropped,
            self.errors
        )
    }
}

/// Drives iterations of concurrent team workflows.
pub struct Runner {
    config: Arc<Config>,
    workflow: Arc<TeamWorkflow>,
    stats: Arc<RunStats>,
    progress_interval: Duration,
    json: bool,
    seed: Option<u64>,
}

impl Runner {
    pub fn new(config: Arc<Config>, workflow: Arc<TeamWorkflow>) -> Self {
        Self {
            config,
            workflow,
            stats: Arc::new(RunStats::new()),
            progress_interval: PROGRESS_INTERVAL,
            json: false,
            seed: None,
        }
    }

    /// Print one JSON line per finished workflow on stdout.
    pub fn with_json_output(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Fix the RNG seed used for random requests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn stats(&self) -> Arc<RunStats> {
        self.stats.clone()
    }

    /// Run every configured iteration, stopping early when `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let iterations = self.config.iteration_count;

        for k in 0..iterations {
            if cancel.is_cancelled() {
                break;
            }
            mlog_debug!("Starting iteration {}/{}", k + 1, iterations);
            self.run_iteration(&mut rng, &cancel).await?;

            if k + 1 < iterations {
                mlog!(
                    "Waiting {} ms. before starting the next iteration...",
                    self.config.iteration_delay_millis
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.iteration_delay()) => {}
                }
            }
        }

        let summary = self.stats.summary();
        mlog!("Run finished: {}", summary);
        Ok(summary)
    }

    async fn run_iteration(&self, rng: &mut StdRng, cancel: &CancellationToken) -> Result<()> {
        let count = self.config.workflow_count;
        let mut workflows = JoinSet::new();

        for _ in 0..count {
            let request = CreationRequest::random(
                rng,
                self.config.team_size_min,
                self.config.team_size_max,
            )?;
            let id = WorkflowId::new();
            let workflow = self.workflow.clone();
            self.stats.record_started();
            mlog_debug!(
                "Workflow {} started: female leader={}, team size={}",
                id,
                request.leader_is_female(),
                request.team_size()
            );
            workflows.spawn(async move { (id, workflow.run(request).await) });
        }
        mlog!("Running {} workflows...", count);

        let mut remaining = count;
        let mut reported = remaining;
        let mut ticker = tokio::time::interval(self.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    mlog_warn!("Cancelled with {} workflows remaining", remaining);
                    workflows.abort_all();
                    break;
                }
                joined = workflows.join_next() => {
                    let Some(joined) = joined else { break };
                    remaining -= 1;
                    match joined {
                        Ok((id, Ok(outcome))) => {
                            self.stats.record_outcome(&outcome);
                            self.emit(id, &outcome);
                        }
                        Ok((id, Err(e))) => {
                            self.stats.record_error();
                            mlog_error!("Workflow {} failed: {}", id, e);
                        }
                        Err(e) => {
                            self.stats.record_error();
                            mlog_error!("{}", Error::TaskJoin(e.to_string()));
                        }
                    }
                }
                _ = ticker.tick() => {
                    if remaining != reported {
                        mlog!("{} workflows remaining...", remaining);
                        reported = remaining;
                    }
                }
            }
        }
        Ok(())
    }

    fn emit(&self, id: WorkflowId, outcome: &TeamOutcome) {
        if let TeamOutcome::Aborted { reason } = outcome {
            mlog_debug!("Workflow {} aborted: {}", id, reason);
        }
        if !self.json {
            return;
        }
        let line = match outcome {
            TeamOutcome::Assembled(team) => serde_json::json!({
                "workflow": id,
                "status": "assembled",
                "team": team,
                "dropped": team.dropped(),
            }),
            TeamOutcome::Aborted { reason } => serde_json::json!({
                "workflow": id,
                "status": "aborted",
                "reason": reason.to_string(),
            }),
        };
        println!("{}", line);
    }
}
