/*
[INPUT]:  StubTask sequences and RunnerOptions variants
[OUTPUT]: Verified skip/fail/retry/timeout/cancel behaviour of TaskRunner
[POS]:    Integration tests - runner semantics
[UPDATE]: When runner policies change
*/

mod common;

use std::time::Duration;

use common::{Behaviour, StubTask, drain};
use rstest::rstest;
use scaffold_task::event;
use scaffold_task::{
    InvalidTaskPolicy, RetryPolicy, RunEvent, RunnerOptions, StateBag, TaskRunner, TaskStatus,
};

fn runner_with(options: RunnerOptions, tasks: &[&StubTask]) -> TaskRunner {
    let mut runner = TaskRunner::new(options);
    runner.extend(tasks.iter().map(|task| task.boxed()));
    runner
}

fn statuses(report: &scaffold_task::RunReport) -> Vec<TaskStatus> {
    report.outcomes.iter().map(|o| o.status).collect()
}

#[tokio::test]
async fn runs_tasks_in_order_and_shares_state() {
    let first = StubTask::new("Check node").writing("node_version", "v20.1.0");
    let second = StubTask::new("Install deps");
    let runner = runner_with(RunnerOptions::default(), &[&first, &second]);

    let mut state = StateBag::new();
    let report = runner.run(&mut state).await;

    assert!(report.is_success());
    assert_eq!(statuses(&report), vec![TaskStatus::Succeeded, TaskStatus::Succeeded]);
    assert_eq!(state.get::<String>("node_version").as_deref(), Some("v20.1.0"));
    assert_eq!(report.outcomes[1].attempts, 1);
}

#[tokio::test]
async fn invalid_tasks_are_skipped_by_default() {
    let invalid = StubTask::new("Install Homebrew").invalid();
    let valid = StubTask::new("Install Yarn");
    let runner = runner_with(RunnerOptions::default(), &[&invalid, &valid]);

    let report = runner.run(&mut StateBag::new()).await;

    assert_eq!(statuses(&report), vec![TaskStatus::Skipped, TaskStatus::Succeeded]);
    assert_eq!(invalid.run_count(), 0);
    assert_eq!(report.outcomes[0].reason.as_deref(), Some("preconditions not met"));
    assert!(report.is_success());
}

#[tokio::test]
async fn fail_policy_reports_mitigation_without_running() {
    let invalid = StubTask::new("Install Android SDK").invalid();
    let after = StubTask::new("Create emulator");
    let options = RunnerOptions {
        invalid_policy: InvalidTaskPolicy::Fail,
        ..RunnerOptions::default()
    };
    let runner = runner_with(options, &[&invalid, &after]);

    let report = runner.run(&mut StateBag::new()).await;

    assert_eq!(statuses(&report), vec![TaskStatus::Failed, TaskStatus::Cancelled]);
    assert_eq!(invalid.run_count(), 0);
    assert_eq!(after.run_count(), 0);
    let failure = report.first_failure().expect("failure recorded");
    assert_eq!(failure.mitigation.as_deref(), Some("try Install Android SDK again"));
}

#[tokio::test]
async fn first_failure_halts_remaining_tasks() {
    let ok = StubTask::new("a");
    let broken = StubTask::new("b").behaving(Behaviour::Fail);
    let never = StubTask::new("c");
    let runner = runner_with(RunnerOptions::default(), &[&ok, &broken, &never]);

    let report = runner.run(&mut StateBag::new()).await;

    assert_eq!(
        statuses(&report),
        vec![TaskStatus::Succeeded, TaskStatus::Failed, TaskStatus::Cancelled]
    );
    assert_eq!(never.run_count(), 0);
    let failure = report.first_failure().expect("failure recorded");
    assert_eq!(failure.error.as_deref(), Some("b failed: b broke"));
    assert_eq!(failure.mitigation.as_deref(), Some("try b again"));
    assert!(!report.is_success());
}

#[tokio::test]
async fn continue_on_error_runs_everything() {
    let broken = StubTask::new("b").behaving(Behaviour::Fail);
    let after = StubTask::new("c");
    let options = RunnerOptions {
        continue_on_error: true,
        ..RunnerOptions::default()
    };
    let runner = runner_with(options, &[&broken, &after]);

    let report = runner.run(&mut StateBag::new()).await;

    assert_eq!(statuses(&report), vec![TaskStatus::Failed, TaskStatus::Succeeded]);
    assert_eq!(after.run_count(), 1);
}

#[rstest]
#[case(0, 1, TaskStatus::Failed)]
#[case(1, 2, TaskStatus::Failed)]
#[case(2, 3, TaskStatus::Succeeded)]
#[tokio::test(start_paused = true)]
async fn retries_flaky_tasks_with_backoff(
    #[case] max_retries: u32,
    #[case] expected_runs: u32,
    #[case] expected: TaskStatus,
) {
    let flaky = StubTask::new("Download model").behaving(Behaviour::FailTimes(2));
    let options = RunnerOptions {
        retry: RetryPolicy::with_retries(max_retries),
        ..RunnerOptions::default()
    };
    let runner = runner_with(options, &[&flaky]);

    let report = runner.run(&mut StateBag::new()).await;

    assert_eq!(flaky.run_count(), expected_runs);
    assert_eq!(report.outcomes[0].status, expected);
    assert_eq!(report.outcomes[0].attempts, expected_runs);
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_the_task() {
    let slow = StubTask::new("Boot emulator").behaving(Behaviour::Sleep(Duration::from_secs(60)));
    let options = RunnerOptions {
        task_timeout: Some(Duration::from_secs(5)),
        ..RunnerOptions::default()
    };
    let runner = runner_with(options, &[&slow]);

    let report = runner.run(&mut StateBag::new()).await;

    assert_eq!(report.outcomes[0].status, TaskStatus::Failed);
    assert_eq!(
        report.outcomes[0].error.as_deref(),
        Some("Boot emulator timed out after 5s")
    );
}

#[tokio::test(start_paused = true)]
async fn timed_out_attempts_are_retried() {
    let slow = StubTask::new("Boot emulator").behaving(Behaviour::Sleep(Duration::from_secs(60)));
    let options = RunnerOptions {
        task_timeout: Some(Duration::from_secs(5)),
        retry: RetryPolicy::with_retries(1),
        ..RunnerOptions::default()
    };
    let runner = runner_with(options, &[&slow]);

    let report = runner.run(&mut StateBag::new()).await;

    assert_eq!(slow.run_count(), 2);
    assert_eq!(report.outcomes[0].status, TaskStatus::Failed);
    assert_eq!(report.outcomes[0].attempts, 2);
    assert_eq!(
        report.outcomes[0].error.as_deref(),
        Some("Boot emulator timed out after 5s")
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_retrying() {
    let failing = StubTask::new("Sync gradle").behaving(Behaviour::Fail);
    let next = StubTask::new("Build apk");
    let options = RunnerOptions {
        retry: RetryPolicy::with_retries(3),
        ..RunnerOptions::default()
    };
    let runner = runner_with(options, &[&failing, &next]);

    // first backoff waits 1s; cancel halfway through it
    let token = runner.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
    });

    let report = runner.run(&mut StateBag::new()).await;

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, TaskStatus::Cancelled);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.reason.as_deref(), Some("run cancelled"));
    assert_eq!(
        outcome.error.as_deref(),
        Some("Sync gradle failed: Sync gradle broke")
    );
    assert_eq!(failing.run_count(), 1);
    assert_eq!(next.run_count(), 0);
    assert_eq!(report.outcomes[1].status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn panicking_task_is_reported_as_failure() {
    let panicky = StubTask::new("Explode").behaving(Behaviour::Panic);
    let runner = runner_with(RunnerOptions::default(), &[&panicky]);

    let report = runner.run(&mut StateBag::new()).await;

    assert_eq!(report.outcomes[0].status, TaskStatus::Failed);
    assert_eq!(
        report.outcomes[0].error.as_deref(),
        Some("Explode panicked: stub panic")
    );
    assert!(report.outcomes[0].mitigation.is_some());
}

#[tokio::test]
async fn cancellation_interrupts_task_in_flight() {
    let slow = StubTask::new("Install pods").behaving(Behaviour::Sleep(Duration::from_secs(3600)));
    let next = StubTask::new("Open Xcode");
    let runner = runner_with(RunnerOptions::default(), &[&slow, &next]);

    let token = runner.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), runner.run(&mut StateBag::new()))
        .await
        .expect("run settles after cancel");

    assert_eq!(statuses(&report), vec![TaskStatus::Cancelled, TaskStatus::Cancelled]);
    assert_eq!(next.run_count(), 0);
    assert!(!report.is_success());
}

#[tokio::test]
async fn dry_run_never_calls_run() {
    let valid = StubTask::new("Write Podfile");
    let invalid = StubTask::new("Install Java").invalid();
    let options = RunnerOptions {
        dry_run: true,
        ..RunnerOptions::default()
    };
    let runner = runner_with(options, &[&valid, &invalid]);

    let report = runner.run(&mut StateBag::new()).await;

    assert_eq!(statuses(&report), vec![TaskStatus::Skipped, TaskStatus::Skipped]);
    assert_eq!(valid.run_count(), 0);
    assert_eq!(report.outcomes[0].reason.as_deref(), Some("dry run"));
    assert_eq!(report.outcomes[1].reason.as_deref(), Some("preconditions not met"));
}

#[tokio::test]
async fn emits_events_for_renderers() {
    let ok = StubTask::new("a");
    let skipped = StubTask::new("b").invalid();
    let broken = StubTask::new("c").behaving(Behaviour::Fail);
    let (tx, mut rx) = event::channel();
    let runner = runner_with(RunnerOptions::default(), &[&ok, &skipped, &broken]).with_events(tx);

    runner.run(&mut StateBag::new()).await;
    let events = drain(&mut rx);

    assert!(matches!(events.first(), Some(RunEvent::RunStarted { total: 3, .. })));
    assert!(events.contains(&RunEvent::Progress {
        index: 0,
        message: "attempt 1".to_string()
    }));
    assert!(events.iter().any(|e| matches!(e, RunEvent::TaskSucceeded { index: 0, .. })));
    assert!(events.iter().any(|e| matches!(e, RunEvent::TaskSkipped { index: 1, .. })));
    assert!(events.contains(&RunEvent::TaskFailed {
        index: 2,
        title: "c".to_string(),
        error: "c failed: c broke".to_string(),
        mitigation: "try c again".to_string(),
    }));
    assert!(matches!(
        events.last(),
        Some(RunEvent::RunFinished {
            succeeded: 1,
            failed: 1,
            skipped: 1,
            cancelled: 0,
            ..
        })
    ));
}

#[test]
fn preflight_reports_validity_without_running() {
    let valid = StubTask::new("a");
    let invalid = StubTask::new("b").invalid();
    let runner = runner_with(RunnerOptions::default(), &[&valid, &invalid]);

    let preflight = runner.preflight();
    assert_eq!(preflight.len(), 2);
    assert!(preflight[0].valid);
    assert!(!preflight[1].valid);
    assert_eq!(runner.descriptions(), vec!["a", "b"]);
    assert_eq!(valid.run_count() + invalid.run_count(), 0);
}

#[tokio::test]
async fn report_serializes_to_json() {
    let ok = StubTask::new("a");
    let runner = runner_with(RunnerOptions::default(), &[&ok]);
    let report = runner.run(&mut StateBag::new()).await;

    let json = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(json["outcomes"][0]["status"], "succeeded");
    assert_eq!(json["outcomes"][0]["title"], "a");
    assert!(json["outcomes"][0].get("error").is_none());
}
