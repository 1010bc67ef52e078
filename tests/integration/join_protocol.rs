//! Fan-out/fan-in tests against the real dispatch path.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use muster::core::{CorrelatedResult, CorrelationRegistry, Person};
use muster::dispatch::{Dispatcher, Pacer, PersonDecoder};
use muster::orchestration::{JoinOrchestrator, JoinState, Mailbox};
use muster::Error;

use crate::fixtures::{assert_spaced, MockReply, MockTransport, HANG};

struct Harness {
    joins: JoinOrchestrator<Person>,
    pacer: Arc<Pacer>,
    mailbox: Arc<Mailbox<Person>>,
}

fn harness(transport: Arc<MockTransport>, spacing: Duration, timeout: Duration) -> Harness {
    harness_with_capacity(transport, spacing, timeout, 100)
}

fn harness_with_capacity(
    transport: Arc<MockTransport>,
    spacing: Duration,
    timeout: Duration,
    capacity: usize,
) -> Harness {
    let mailbox = Arc::new(Mailbox::new());
    let pacer = Arc::new(Pacer::new(spacing, capacity));
    let dispatcher = Dispatcher::new(
        Arc::new(CorrelationRegistry::new()),
        pacer.clone(),
        transport,
        Arc::new(PersonDecoder),
        mailbox.clone(),
    );
    Harness {
        joins: JoinOrchestrator::new(Arc::new(dispatcher), mailbox.clone(), timeout),
        pacer,
        mailbox,
    }
}

fn targets(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://people.test/api/?n={}", i)).collect()
}

/// Given 5 requests whose replies arrive in reverse order
/// When the join completes
/// Then assembled outcomes follow dispatch order
#[tokio::test(start_paused = true)]
async fn test_reverse_arrival_assembles_in_dispatch_order() {
    let transport = MockTransport::new(|call, _| {
        MockReply::person("P", &call.to_string(), "male", "Chile")
            .after(Duration::from_millis(100 * (5 - call as u64)))
    });
    let h = harness(transport.clone(), Duration::from_millis(10), Duration::from_secs(60));

    let report = h.joins.fan_out(targets(5)).await.unwrap();
    assert_eq!(report.state, JoinState::Complete);

    let tokens: Vec<_> = report.results.iter().map(|(t, _)| *t).collect();
    let mut sorted = tokens.clone();
    sorted.sort();
    assert_eq!(tokens, sorted, "tokens must come back in issue order");

    let names: Vec<_> = report.values().into_iter().map(|p| p.last_name).collect();
    assert_eq!(names, vec!["0", "1", "2", "3", "4"]);
    assert_spaced(&transport.calls(), Duration::from_millis(10));
}

/// Given requests that never answer
/// When the join waits
/// Then it ends TimedOut exactly one timeout after the last dispatch
#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_the_join() {
    let transport = MockTransport::new(|call, _| {
        if call == 1 {
            MockReply::person("Fast", "One", "female", "Peru")
        } else {
            MockReply::person("Slow", "One", "male", "Peru").after(HANG)
        }
    });
    let h = harness(transport, Duration::from_millis(10), Duration::from_secs(60));

    let start = Instant::now();
    let report = h.joins.fan_out(targets(4)).await.unwrap();
    let elapsed = Instant::now() - start;

    assert_eq!(report.state, JoinState::TimedOut);
    assert!(elapsed <= Duration::from_secs(60), "join overran: {:?}", elapsed);
    let kinds: Vec<_> = report.results.iter().map(|(_, o)| o.kind()).collect();
    assert_eq!(kinds, vec!["timed out", "value", "timed out", "timed out"]);
}

/// Given a join that timed out while calls were still running
/// When those calls finally complete
/// Then their publishers are acknowledged and their pacer slots released
#[tokio::test(start_paused = true)]
async fn test_late_results_do_not_leak_completion_slots() {
    let transport = MockTransport::new(|_, _| {
        MockReply::person("Late", "Comer", "male", "Fiji").after(Duration::from_secs(90))
    });
    let h = harness(transport, Duration::from_millis(10), Duration::from_secs(30));

    let report = h.joins.fan_out(targets(3)).await.unwrap();
    assert_eq!(report.state, JoinState::TimedOut);
    assert_eq!(h.pacer.in_flight(), 3);
    assert_eq!(h.mailbox.abandoned_count(), 3);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.pacer.in_flight(), 0);
    assert_eq!(h.mailbox.abandoned_count(), 0);
    assert_eq!(h.mailbox.early_count(), 0);
}

/// Given k of N calls failing in different ways
/// When the join completes
/// Then failures are recorded in place and do not end the join early
#[tokio::test(start_paused = true)]
async fn test_failures_are_delivered_as_outcomes() {
    let transport = MockTransport::new(|call, _| match call {
        1 => MockReply::status(500, "Internal Server Error"),
        3 => MockReply::refused(),
        _ => MockReply::person("Ok", &call.to_string(), "female", "Kenya"),
    });
    let h = harness(transport, Duration::from_millis(10), Duration::from_secs(60));

    let report = h.joins.fan_out(targets(5)).await.unwrap();
    assert_eq!(report.state, JoinState::Complete);
    assert!(matches!(
        report.results[1].1,
        CorrelatedResult::Failure(Error::Transport { status: 500, .. })
    ));
    assert!(matches!(
        report.results[3].1,
        CorrelatedResult::Failure(Error::Connection(_))
    ));
    assert_eq!(report.values().len(), 3);
}

/// Given two joins running at once on one dispatcher
/// When both complete
/// Then each sees only its own tokens and the pacer spaced all calls
#[tokio::test(start_paused = true)]
async fn test_concurrent_joins_are_independent() {
    let transport = MockTransport::new(|call, target| {
        let group = if target.contains("group=a") { "A" } else { "B" };
        MockReply::person(group, &call.to_string(), "male", "Laos")
    });
    let h = harness(transport.clone(), Duration::from_millis(25), Duration::from_secs(60));

    let a_targets: Vec<_> = (0..3).map(|i| format!("http://people.test/?group=a&n={}", i)).collect();
    let b_targets: Vec<_> = (0..4).map(|i| format!("http://people.test/?group=b&n={}", i)).collect();
    let (a, b) = tokio::join!(h.joins.fan_out(a_targets), h.joins.fan_out(b_targets));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.values().iter().all(|p| p.first_name == "A"));
    assert_eq!(b.results.len(), 4);
    assert!(b.values().iter().all(|p| p.first_name == "B"));
    assert_eq!(transport.call_count(), 7);
    assert_spaced(&transport.calls(), Duration::from_millis(25));
}

/// Given a pacer with fewer slots than targets
/// When the join keeps what was admitted
/// Then it completes on the admitted requests and counts the rest as rejected
#[tokio::test(start_paused = true)]
async fn test_full_pacer_rejects_only_unadmitted_targets() {
    let transport = MockTransport::new(|call, _| {
        MockReply::person("P", &call.to_string(), "female", "Cuba")
    });
    let h = harness_with_capacity(transport.clone(), Duration::from_millis(10), Duration::from_secs(60), 2);

    let strict = h.joins.fan_out(targets(5)).await;
    assert!(matches!(strict, Err(Error::CapacityExceeded { max: 2 })));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.pacer.in_flight(), 0);

    let report = h.joins.fan_out_admitted(targets(5)).await.unwrap();
    assert_eq!(report.state, JoinState::Complete);
    assert_eq!(report.rejected, 3);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.values().len(), 2);
    assert_eq!(transport.call_count(), 4);
    assert_eq!(h.mailbox.early_count(), 0);
}
