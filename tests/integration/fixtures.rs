//! Test fixtures for integration tests.
//!
//! Provides:
//! - A scripted `Transport` that records when each call started
//! - Person reply builders
//! - Config and workflow constructors for fast paced runs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use muster::dispatch::{RawReply, Transport};
use muster::orchestration::TeamWorkflow;
use muster::{Config, Error, Result};

/// Long enough to outlive any join deadline used in the tests.
pub const HANG: Duration = Duration::from_secs(3600);

/// How the mock answers one call.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub delay: Duration,
    pub result: std::result::Result<RawReply, String>,
}

impl MockReply {
    pub fn person(first: &str, last: &str, gender: &str, region: &str) -> Self {
        Self {
            delay: Duration::from_millis(5),
            result: Ok(RawReply::ok(person_json(first, last, gender, region))),
        }
    }

    pub fn status(status: u16, text: &str) -> Self {
        Self {
            delay: Duration::from_millis(5),
            result: Ok(RawReply::with_status(status, text)),
        }
    }

    pub fn refused() -> Self {
        Self {
            delay: Duration::from_millis(5),
            result: Err("connection refused".to_string()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub fn person_json(first: &str, last: &str, gender: &str, region: &str) -> String {
    serde_json::json!({
        "name": first,
        "surname": last,
        "gender": gender,
        "region": region,
    })
    .to_string()
}

type Responder = dyn Fn(usize, &str) -> MockReply + Send + Sync;

/// A transport whose replies are computed from the call index and target.
pub struct MockTransport {
    responder: Box<Responder>,
    next_call: AtomicUsize,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(usize, &str) -> MockReply + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            next_call: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Leader from `region`; every member call yields `Member<index>`.
    pub fn team_from(region: &'static str) -> Arc<Self> {
        Self::new(move |call, target| {
            if target.contains("gender=") {
                MockReply::person("Lead", "Er", "female", region)
            } else {
                MockReply::person("Member", &call.to_string(), "male", region)
            }
        })
    }

    pub fn calls(&self) -> Vec<(Instant, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn invoke(&self, target: &str) -> Result<RawReply> {
        let call = self.next_call.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), target.to_string()));
        let reply = (self.responder)(call, target);
        tokio::time::sleep(reply.delay).await;
        reply.result.map_err(Error::Connection)
    }
}

/// Config with small spacing and the default one-minute join deadline.
pub fn test_config() -> Config {
    Config {
        delay_millis: 10,
        join_timeout_secs: 60,
        workflow_count: 4,
        iteration_count: 1,
        iteration_delay_millis: 500,
        api_url: "http://people.test/api/".to_string(),
        ..Default::default()
    }
}

pub fn workflow(config: &Config, transport: Arc<MockTransport>) -> TeamWorkflow {
    TeamWorkflow::from_config(config, transport)
}

/// Assert successive call start instants are at least `spacing` apart.
pub fn assert_spaced(calls: &[(Instant, String)], spacing: Duration) {
    let mut starts: Vec<Instant> = calls.iter().map(|(at, _)| *at).collect();
    starts.sort();
    for pair in starts.windows(2) {
        assert!(
            pair[1] - pair[0] >= spacing,
            "calls only {:?} apart, expected at least {:?}",
            pair[1] - pair[0],
            spacing
        );
    }
}
