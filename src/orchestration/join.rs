//! Fan-out/fan-in with a deadline.
//!
//! A [`Join`] tracks the tokens one fan-out is waiting on. It moves from
//! `Idle` to `AwaitingAll` when the first token is expected, and ends in
//! `Complete` (every token resolved) or `TimedOut` (deadline first). Both end
//! states are terminal: later deliveries are acknowledged but do not change
//! what the join assembles.
//!
//! Assembly always follows dispatch order, whatever order outcomes arrived in.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::{CorrelatedResult, CorrelationToken};
use crate::dispatch::Dispatcher;
use crate::orchestration::{Delivery, Mailbox, Subscription, Wake};
use crate::{mlog_debug, mlog_warn, Error, Result};

/// Lifecycle of one join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Idle,
    AwaitingAll,
    Complete,
    TimedOut,
}

impl JoinState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JoinState::Complete | JoinState::TimedOut)
    }
}

impl std::fmt::Display for JoinState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinState::Idle => write!(f, "idle"),
            JoinState::AwaitingAll => write!(f, "awaiting all"),
            JoinState::Complete => write!(f, "complete"),
            JoinState::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Pending set and recorded outcomes of one fan-out.
#[derive(Debug)]
pub struct Join<T> {
    order: Vec<CorrelationToken>,
    pending: HashSet<CorrelationToken>,
    resolved: HashMap<CorrelationToken, CorrelatedResult<T>>,
    state: JoinState,
}

impl<T> Default for Join<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            pending: HashSet::new(),
            resolved: HashMap::new(),
            state: JoinState::Idle,
        }
    }
}

impl<T> Join<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dispatched token. Ignored once the join has ended.
    pub fn expect(&mut self, token: CorrelationToken) {
        if self.state.is_terminal() || !self.pending.insert(token) {
            return;
        }
        self.order.push(token);
        self.state = JoinState::AwaitingAll;
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Tokens in dispatch order.
    pub fn tokens(&self) -> &[CorrelationToken] {
        &self.order
    }

    /// Record one delivery and acknowledge it.
    ///
    /// Returns `false` when the delivery was not for a pending token of a live
    /// join (late, duplicate, or foreign); it is still acknowledged.
    pub fn record(&mut self, delivery: Delivery<T>) -> bool {
        let (token, outcome, ack) = delivery.into_parts();
        let recorded = self.state == JoinState::AwaitingAll && self.pending.remove(&token);
        if recorded {
            self.resolved.insert(token, outcome);
            if self.pending.is_empty() {
                self.state = JoinState::Complete;
            }
        } else {
            mlog_debug!("Ignoring {} for {} ({} join)", outcome.kind(), token, self.state);
        }
        ack.confirm();
        recorded
    }

    /// Suspend until every expected token resolved or `deadline` passes.
    pub async fn wait(&mut self, inbox: &mut Subscription<T>, deadline: Instant) -> JoinState {
        if self.state == JoinState::Idle {
            self.state = JoinState::Complete;
        }
        while self.state == JoinState::AwaitingAll {
            match inbox.await_any(deadline).await {
                Wake::Delivered(delivery) => {
                    self.record(delivery);
                }
                Wake::DeadlineExpired => {
                    mlog_debug!("Join deadline expired with {} pending", self.pending.len());
                    self.state = JoinState::TimedOut;
                }
            }
        }
        self.state
    }

    /// Outcomes in dispatch order; tokens never resolved become `TimedOut`.
    pub fn assemble(mut self) -> Vec<(CorrelationToken, CorrelatedResult<T>)> {
        let resolved = &mut self.resolved;
        self.order
            .iter()
            .map(|token| {
                let outcome = resolved.remove(token).unwrap_or(CorrelatedResult::TimedOut);
                (*token, outcome)
            })
            .collect()
    }
}

/// What one fan-out produced.
#[derive(Debug)]
pub struct JoinReport<T> {
    pub state: JoinState,
    /// One entry per dispatched request, in dispatch order.
    pub results: Vec<(CorrelationToken, CorrelatedResult<T>)>,
    /// Targets never dispatched because the pacer was full.
    pub rejected: usize,
}

impl<T> JoinReport<T> {
    pub fn values(self) -> Vec<T> {
        self.results
            .into_iter()
            .filter_map(|(_, outcome)| outcome.value())
            .collect()
    }
}

/// Dispatches a batch of requests and joins on all of their outcomes.
///
/// Joins sharing one orchestrator share its dispatcher (and so its pacer and
/// token registry) but each has its own pending set and inbox.
pub struct JoinOrchestrator<T> {
    dispatcher: Arc<Dispatcher<T>>,
    mailbox: Arc<Mailbox<T>>,
    timeout: Duration,
}

impl<T: Send + 'static> JoinOrchestrator<T> {
    /// `mailbox` must be the channel `dispatcher` publishes to.
    pub fn new(dispatcher: Arc<Dispatcher<T>>, mailbox: Arc<Mailbox<T>>, timeout: Duration) -> Self {
        Self {
            dispatcher,
            mailbox,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<T>> {
        &self.dispatcher
    }

    /// Dispatch every target, then wait for all outcomes.
    ///
    /// The deadline is `timeout` after the last dispatch. A failed admission
    /// aborts the fan-out; outcomes of requests already dispatched are then
    /// acknowledged and dropped when they arrive.
    pub async fn fan_out<I>(&self, targets: I) -> Result<JoinReport<T>>
    where
        I: IntoIterator<Item = String>,
    {
        self.join_on(targets, false).await
    }

    /// Like [`fan_out`](Self::fan_out), but when the pacer is full the
    /// remaining targets are counted in `rejected` and the join proceeds
    /// with the requests already admitted.
    pub async fn fan_out_admitted<I>(&self, targets: I) -> Result<JoinReport<T>>
    where
        I: IntoIterator<Item = String>,
    {
        self.join_on(targets, true).await
    }

    async fn join_on<I>(&self, targets: I, keep_admitted: bool) -> Result<JoinReport<T>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut inbox = self.mailbox.subscribe();
        let mut join = Join::new();
        let mut rejected = 0;

        for target in targets {
            if rejected > 0 {
                rejected += 1;
                continue;
            }
            match self.dispatcher.dispatch(target) {
                Ok(token) => {
                    inbox.watch(token);
                    join.expect(token);
                }
                Err(e @ Error::CapacityExceeded { .. }) if keep_admitted => {
                    mlog_warn!("{}; joining on {} admitted requests", e, inbox.watched());
                    rejected = 1;
                }
                Err(e) => return Err(e),
            }
        }

        let deadline = Instant::now() + self.timeout;
        let state = join.wait(&mut inbox, deadline).await;
        mlog_debug!("Join of {} requests ended {}", inbox.watched(), state);

        Ok(JoinReport {
            state,
            results: join.assemble(),
            rejected,
        })
    }
}
