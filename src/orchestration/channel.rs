//! Notification channel between dispatchers and waiting joins.
//!
//! `publish` hands one outcome to whoever waits on its token and returns an
//! [`Acknowledge`]. The publisher awaits it before releasing its completion
//! slot; it resolves once the consuming side has recorded the outcome.
//!
//! [`Mailbox`] is the in-process implementation. Each join opens a
//! [`Subscription`], watches the tokens it dispatched, and suspends in
//! [`Subscription::await_any`]. The mailbox also covers the two edges of a
//! join's lifetime:
//! - an outcome published before its token is watched is kept and handed
//!   over on `watch`;
//! - an outcome published after its join finished is acknowledged and
//!   dropped. Finished tokens are remembered (up to a bound) so repeated
//!   late or duplicate publishes are dropped as well and never stashed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::core::{CorrelatedResult, CorrelationToken};
use crate::{mlog_debug, mlog_warn};

/// Publisher side of an acknowledgment handshake.
#[derive(Debug)]
#[must_use = "waiting on the acknowledgment is what provides backpressure"]
pub struct Acknowledge {
    rx: Option<oneshot::Receiver<()>>,
}

impl Acknowledge {
    /// An acknowledgment that is already satisfied.
    pub fn immediate() -> Self {
        Self { rx: None }
    }

    /// Wait until the outcome has been recorded (or the receiver is gone).
    pub async fn wait(self) {
        if let Some(rx) = self.rx {
            let _ = rx.await;
        }
    }
}

/// Consumer side of an acknowledgment handshake.
///
/// Dropping it without calling `confirm` also releases the publisher.
#[derive(Debug)]
pub struct Acknowledger {
    tx: Option<oneshot::Sender<()>>,
}

impl Acknowledger {
    fn none() -> Self {
        Self { tx: None }
    }

    pub fn confirm(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

fn ack_pair() -> (Acknowledger, Acknowledge) {
    let (tx, rx) = oneshot::channel();
    (Acknowledger { tx: Some(tx) }, Acknowledge { rx: Some(rx) })
}

/// One published outcome on its way to a join.
#[derive(Debug)]
pub struct Delivery<T> {
    pub token: CorrelationToken,
    pub outcome: CorrelatedResult<T>,
    ack: Acknowledger,
}

impl<T> Delivery<T> {
    /// Build a delivery and the acknowledgment its publisher would wait on.
    pub fn new(token: CorrelationToken, outcome: CorrelatedResult<T>) -> (Self, Acknowledge) {
        let (ack, waiter) = ack_pair();
        (Self { token, outcome, ack }, waiter)
    }

    pub fn into_parts(self) -> (CorrelationToken, CorrelatedResult<T>, Acknowledger) {
        (self.token, self.outcome, self.ack)
    }
}

/// Delivers correlated outcomes to waiting joins.
pub trait NotificationChannel<T>: Send + Sync {
    /// Deliver `outcome` for `token`. Exactly one call per token is expected;
    /// extra calls are acknowledged and otherwise ignored by the consumer.
    fn publish(&self, token: CorrelationToken, outcome: CorrelatedResult<T>) -> Acknowledge;
}

/// Result of one suspension in [`Subscription::await_any`].
#[derive(Debug)]
pub enum Wake<T> {
    Delivered(Delivery<T>),
    DeadlineExpired,
}

/// Default number of finished tokens remembered by a [`Mailbox`].
pub const RETIRED_LIMIT: usize = 16_384;

struct Routes<T> {
    routes: HashMap<CorrelationToken, mpsc::UnboundedSender<Delivery<T>>>,
    early: HashMap<CorrelationToken, CorrelatedResult<T>>,
    /// Tokens of finished joins; `true` while their outcome is still owed.
    retired: HashMap<CorrelationToken, bool>,
    retired_order: VecDeque<CorrelationToken>,
    retired_limit: usize,
}

impl<T> Routes<T> {
    fn new(retired_limit: usize) -> Self {
        Self {
            routes: HashMap::new(),
            early: HashMap::new(),
            retired: HashMap::new(),
            retired_order: VecDeque::new(),
            retired_limit,
        }
    }

    fn retire(&mut self, token: CorrelationToken, outcome_owed: bool) {
        if self.retired.insert(token, outcome_owed).is_some() {
            return;
        }
        self.retired_order.push_back(token);
        while self.retired_order.len() > self.retired_limit {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
    }

    /// Mark a retired token's outcome as received. Returns whether it was owed.
    fn settle(&mut self, token: &CorrelationToken) -> bool {
        match self.retired.get_mut(token) {
            Some(owed) => std::mem::replace(owed, false),
            None => false,
        }
    }
}

fn lock<T>(routes: &Mutex<Routes<T>>) -> MutexGuard<'_, Routes<T>> {
    routes.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-process notification channel.
pub struct Mailbox<T> {
    routes: Arc<Mutex<Routes<T>>>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::with_retired_limit(RETIRED_LIMIT)
    }
}

impl<T> Mailbox<T> {
    /// A mailbox remembering at most `limit` finished tokens.
    pub fn with_retired_limit(limit: usize) -> Self {
        Self {
            routes: Arc::new(Mutex::new(Routes::new(limit.max(1)))),
        }
    }
}

impl<T: Send> Mailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an inbox for one join.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        Subscription {
            routes: self.routes.clone(),
            tx,
            rx,
            watched: HashSet::new(),
            seen: HashSet::new(),
        }
    }

    /// Outcomes held for tokens nobody has watched yet.
    pub fn early_count(&self) -> usize {
        lock(&self.routes).early.len()
    }

    /// Tokens whose join finished before their outcome arrived.
    pub fn abandoned_count(&self) -> usize {
        lock(&self.routes).retired.values().filter(|owed| **owed).count()
    }

    /// Finished tokens currently remembered.
    pub fn retired_count(&self) -> usize {
        lock(&self.routes).retired.len()
    }

    /// Tokens currently routed to a live subscription.
    pub fn watched_count(&self) -> usize {
        lock(&self.routes).routes.len()
    }
}

impl<T: Send> NotificationChannel<T> for Mailbox<T> {
    fn publish(&self, token: CorrelationToken, outcome: CorrelatedResult<T>) -> Acknowledge {
        let mut routes = lock(&self.routes);

        if let Some(tx) = routes.routes.get(&token) {
            let (delivery, waiter) = Delivery::new(token, outcome);
            return match tx.send(delivery) {
                Ok(()) => waiter,
                Err(mpsc::error::SendError(delivery)) => {
                    delivery.ack.confirm();
                    Acknowledge::immediate()
                }
            };
        }

        if routes.retired.contains_key(&token) {
            if routes.settle(&token) {
                mlog_debug!("Ignoring late {} for {}", outcome.kind(), token);
            } else {
                mlog_warn!("Ignoring duplicate {} for finished {}", outcome.kind(), token);
            }
            return Acknowledge::immediate();
        }

        if routes.early.contains_key(&token) {
            mlog_warn!("Duplicate {} for unwatched {} ignored", outcome.kind(), token);
        } else {
            routes.early.insert(token, outcome);
        }
        Acknowledge::immediate()
    }
}

/// One join's inbox. Dropping it retires every watched token.
pub struct Subscription<T> {
    routes: Arc<Mutex<Routes<T>>>,
    tx: mpsc::UnboundedSender<Delivery<T>>,
    rx: mpsc::UnboundedReceiver<Delivery<T>>,
    watched: HashSet<CorrelationToken>,
    seen: HashSet<CorrelationToken>,
}

impl<T> Subscription<T> {
    /// Route outcomes for `token` to this inbox.
    pub fn watch(&mut self, token: CorrelationToken) {
        let mut routes = lock(&self.routes);
        if let Some(outcome) = routes.early.remove(&token) {
            // The outcome beat us here; the mailbox already acknowledged it.
            let _ = self.tx.send(Delivery {
                token,
                outcome,
                ack: Acknowledger::none(),
            });
        }
        routes.routes.insert(token, self.tx.clone());
        self.watched.insert(token);
    }

    pub fn watched(&self) -> usize {
        self.watched.len()
    }

    /// Suspend until any watched token's outcome arrives or `deadline` passes.
    pub async fn await_any(&mut self, deadline: Instant) -> Wake<T> {
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(delivery)) => {
                self.seen.insert(delivery.token);
                Wake::Delivered(delivery)
            }
            // Unreachable while we hold `tx`, but a closed inbox can never
            // deliver, so it behaves like an expired deadline.
            Ok(None) | Err(_) => Wake::DeadlineExpired,
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let mut routes = lock(&self.routes);
        for token in &self.watched {
            routes.routes.remove(token);
            routes.retire(*token, !self.seen.contains(token));
        }
        drop(routes);

        // Anything already queued here is recorded by nobody; release its publisher.
        self.rx.close();
        while let Ok(delivery) = self.rx.try_recv() {
            lock(&self.routes).settle(&delivery.token);
            delivery.ack.confirm();
        }
    }
}
