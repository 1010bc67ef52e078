//! Launcher tests: iterations, stats and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use muster::orchestration::{RunSummary, Runner};

use crate::fixtures::{test_config, workflow, MockReply, MockTransport, HANG};

#[tokio::test(start_paused = true)]
async fn test_runs_every_iteration_to_completion() {
    let mut config = test_config();
    config.workflow_count = 5;
    config.iteration_count = 2;
    let config = Arc::new(config);
    let transport = MockTransport::team_from("Ghana");
    let runner = Runner::new(config.clone(), Arc::new(workflow(&config, transport.clone())))
        .with_seed(7)
        .with_progress_interval(Duration::from_millis(100));

    let start = Instant::now();
    let summary = runner.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.workflows_started, 10);
    assert_eq!(summary.workflows_finished, 10);
    assert_eq!(summary.teams_assembled, 10);
    assert_eq!(summary.leaders_aborted, 0);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.members_dropped, 0);
    assert_eq!(summary.members_created, summary.members_requested);
    assert!((20..=40).contains(&summary.members_requested));
    assert_eq!(transport.call_count(), 10 + summary.members_requested);

    // Iterations are separated by the configured delay.
    assert!(Instant::now() - start >= Duration::from_millis(500));
    assert_eq!(runner.stats().summary(), summary);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_leaders_are_counted() {
    let config = Arc::new(test_config());
    let transport = MockTransport::new(|_, _| MockReply::status(503, "Service Unavailable"));
    let runner = Runner::new(config.clone(), Arc::new(workflow(&config, transport.clone())));

    let summary = runner.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.workflows_finished, 4);
    assert_eq!(summary.leaders_aborted, 4);
    assert_eq!(summary.teams_assembled, 0);
    assert_eq!(summary.members_requested, 0);
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_capacity_errors_are_counted() {
    let mut config = test_config();
    config.max_scheduled = 1;
    config.workflow_count = 3;
    config.team_size_min = 2;
    config.team_size_max = 2;
    let config = Arc::new(config);
    let runner = Runner::new(
        config.clone(),
        Arc::new(workflow(&config, MockTransport::team_from("Togo"))),
    );

    let summary = runner.run(CancellationToken::new()).await.unwrap();
    // One leader gets the only slot; the other two workflows cannot start.
    assert_eq!(summary.workflows_finished, 3);
    assert_eq!(summary.errors, 2);
    assert_eq!(summary.teams_assembled, 1);
    assert!(summary.members_created <= 1);
    assert_eq!(summary.members_requested, 2);
}

#[tokio::test(start_paused = true)]
async fn test_precancelled_run_does_nothing() {
    let config = Arc::new(test_config());
    let transport = MockTransport::team_from("Oman");
    let runner = Runner::new(config.clone(), Arc::new(workflow(&config, transport.clone())));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = runner.run(cancel).await.unwrap();

    assert_eq!(summary, RunSummary::default());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_abandons_running_workflows() {
    let config = Arc::new(test_config());
    let transport = MockTransport::new(|_, _| MockReply::person("Stuck", "Lead", "male", "Nepal").after(HANG));
    let runner = Runner::new(config.clone(), Arc::new(workflow(&config, transport)));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let summary = runner.run(cancel).await.unwrap();

    assert!(Instant::now() - start < Duration::from_secs(60));
    assert_eq!(summary.workflows_started, 4);
    assert_eq!(summary.workflows_finished, 0);
}
