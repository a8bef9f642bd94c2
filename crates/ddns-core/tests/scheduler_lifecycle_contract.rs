//! Architectural Contract Test: Task Lifecycle
//!
//! This test verifies the scheduler's task operations and timer behavior.
//!
//! Constraints verified:
//! - New tasks are stopped and disabled until started
//! - start runs once immediately, then on every interval
//! - stop cancels future runs; delete also removes the remote record
//! - Unknown identifiers are reported as NotFound
//! - Runs of the same task never overlap
//!
//! If this test fails, tasks are being run too often, too rarely, or
//! concurrently with themselves.

mod common;

use common::*;
use ddns_core::task::{Credentials, MAX_INTERVAL_SECS, TaskStatus};
use ddns_core::{Error, Severity};
use std::time::Duration;

#[tokio::test]
async fn add_creates_stopped_task_with_short_id() {
    let h = harness();

    let task = h.scheduler.add(new_task("www", 300)).await.unwrap();

    assert_eq!(task.id.len(), 8);
    assert!(task.id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(task.full_domain, "www.example.com");
    assert_eq!(task.status, TaskStatus::Stopped);
    assert!(!task.enabled);
    assert!(task.last_ip.is_none());
    assert!(!h.scheduler.is_scheduled(&task.id));
    assert_eq!(h.probe.calls(), 0, "adding must not run the task");
}

#[tokio::test]
async fn add_rejects_malformed_input() {
    let h = harness();

    let mut missing_domain = new_task("www", 300);
    missing_domain.domain = "  ".to_string();
    let zero_interval = new_task("www", 0);
    let mut missing_secret = new_task("www", 300);
    missing_secret.credentials = Credentials::new("", "key");

    for bad in [missing_domain, zero_interval, missing_secret] {
        let result = h.scheduler.add(bad).await;
        assert!(matches!(result, Err(Error::Validation(_))), "got {:?}", result);
    }
    assert!(h.scheduler.list_all().is_empty(), "nothing may be registered");
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let h = harness();

    assert!(matches!(h.scheduler.get("missing"), Err(Error::NotFound(_))));
    assert!(matches!(h.scheduler.start("missing").await, Err(Error::NotFound(_))));
    assert!(matches!(h.scheduler.stop("missing").await, Err(Error::NotFound(_))));
    assert!(matches!(h.scheduler.delete("missing").await, Err(Error::NotFound(_))));
    assert!(matches!(
        h.scheduler.execute_now("missing").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        h.scheduler.update("missing", 60, PRIMARY_URL, "primary").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn stop_then_start_runs_exactly_once() {
    let h = harness();
    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();

    h.scheduler.stop(&task.id).await.unwrap();
    let started = h.scheduler.start(&task.id).await.unwrap();

    assert_eq!(h.probe.calls(), 1, "one immediate run");
    assert_eq!(started.status, TaskStatus::Running);
    assert!(started.enabled);
    assert_eq!(started.last_ip, Some(ip("5.6.7.8")));
    assert!(h.scheduler.is_scheduled(&task.id));
}

#[tokio::test]
async fn stop_cancels_the_timer() {
    let h = harness();
    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();
    h.scheduler.start(&task.id).await.unwrap();

    let stopped = h.scheduler.stop(&task.id).await.unwrap();

    assert_eq!(stopped.status, TaskStatus::Stopped);
    assert!(!stopped.enabled);
    assert!(!h.scheduler.is_scheduled(&task.id));
    assert_eq!(stopped.last_ip, Some(ip("5.6.7.8")), "stop keeps the last address");
}

#[tokio::test]
async fn failed_first_run_still_arms_the_timer() {
    let h = harness();
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();

    let started = h.scheduler.start(&task.id).await.unwrap();

    assert_eq!(started.status, TaskStatus::Error);
    assert!(started.enabled);
    assert!(h.scheduler.is_scheduled(&task.id));
}

#[tokio::test]
async fn error_clears_on_next_success() {
    let h = harness();
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();
    h.scheduler.start(&task.id).await.unwrap();
    assert_eq!(h.scheduler.get(&task.id).unwrap().status, TaskStatus::Error);

    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    h.scheduler.execute_now(&task.id).await.unwrap();

    let task = h.scheduler.get(&task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.last_error.is_none());
}

#[tokio::test]
async fn execute_now_on_stopped_task_keeps_it_stopped() {
    let h = harness();
    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();

    let outcome = h.scheduler.execute_now(&task.id).await.unwrap();

    assert!(outcome.updated);
    let task = h.scheduler.get(&task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Stopped);
    assert_eq!(task.last_ip, Some(ip("5.6.7.8")));
    assert!(!h.scheduler.is_scheduled(&task.id));
}

#[tokio::test]
async fn update_restarts_a_running_task() {
    let h = harness();
    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    h.probe.answer(BACKUP_URL, "5.6.7.8");
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();
    h.scheduler.start(&task.id).await.unwrap();

    let updated = h
        .scheduler
        .update(&task.id, 7200, BACKUP_URL, "backup")
        .await
        .unwrap();

    assert_eq!(updated.interval_secs, 7200);
    assert_eq!(updated.service_url, BACKUP_URL);
    assert_eq!(updated.service_name, "backup");
    assert!(updated.enabled);
    assert!(h.scheduler.is_scheduled(&task.id));
    assert_eq!(h.probe.calls_to(BACKUP_URL), 1, "restart runs with the new service");
}

#[tokio::test]
async fn update_leaves_a_stopped_task_stopped() {
    let h = harness();
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();

    let updated = h
        .scheduler
        .update(&task.id, 120, BACKUP_URL, "backup")
        .await
        .unwrap();

    assert_eq!(updated.interval_secs, 120);
    assert_eq!(updated.status, TaskStatus::Stopped);
    assert!(!h.scheduler.is_scheduled(&task.id));
    assert_eq!(h.probe.calls(), 0);
}

#[tokio::test]
async fn update_rejects_zero_interval() {
    let h = harness();
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();

    let result = h.scheduler.update(&task.id, 0, PRIMARY_URL, "primary").await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(h.scheduler.get(&task.id).unwrap().interval_secs, 3600);
}

#[tokio::test]
async fn oversized_interval_is_rejected() {
    let h = harness();

    let result = h.scheduler.add(new_task("www", u64::MAX)).await;
    assert!(matches!(result, Err(Error::Validation(_))), "got {:?}", result);
    assert!(h.scheduler.list_all().is_empty());

    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();
    let result = h
        .scheduler
        .update(&task.id, MAX_INTERVAL_SECS + 1, PRIMARY_URL, "primary")
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(h.scheduler.get(&task.id).unwrap().interval_secs, 3600);
}

#[tokio::test]
async fn delete_removes_remote_record_and_task() {
    let h = harness();
    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();
    h.scheduler.start(&task.id).await.unwrap();
    assert!(h.provider.record_value("example.com", "www").is_some());

    let removed = h.scheduler.delete(&task.id).await.unwrap();

    assert_eq!(removed.id, task.id);
    assert_eq!(h.provider.delete_count(), 1);
    assert!(h.provider.record_value("example.com", "www").is_none());
    assert!(h.scheduler.list_all().is_empty());
    assert!(!h.scheduler.is_scheduled(&task.id));
    assert!(matches!(h.scheduler.get(&task.id), Err(Error::NotFound(_))));
}

#[tokio::test]
async fn delete_succeeds_when_remote_delete_fails() {
    let h = harness();
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();
    h.provider.fail_with(Some("AuthFailure"));

    h.scheduler
        .delete(&task.id)
        .await
        .expect("remote failure must not block local deletion");

    assert!(h.scheduler.list_all().is_empty());
    assert!(h
        .scheduler
        .logs(0)
        .iter()
        .any(|e| e.severity == Severity::Warn && e.message.contains("AuthFailure")));
}

#[tokio::test]
async fn list_by_account_filters_on_secret_id() {
    let h = harness();
    h.scheduler.add(new_task("a", 300)).await.unwrap();
    h.scheduler.add(new_task("b", 300)).await.unwrap();
    let mut other = new_task("c", 300);
    other.credentials = Credentials::new("AKID-other", "key");
    h.scheduler.add(other).await.unwrap();

    let mine = h.scheduler.list_by_account(SECRET_ID);
    let hosts: Vec<&str> = mine.iter().map(|t| t.host.as_str()).collect();
    assert_eq!(hosts, vec!["a", "b"], "creation order is kept");
    assert_eq!(h.scheduler.list_by_account("AKID-other").len(), 1);
    assert!(h.scheduler.list_by_account("nobody").is_empty());
    assert_eq!(h.scheduler.list_all().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn timer_fires_every_interval() {
    let h = harness();
    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    let task = h.scheduler.add(new_task("www", 60)).await.unwrap();

    h.scheduler.start(&task.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(125)).await;

    assert_eq!(h.probe.calls(), 3, "immediate run plus ticks at 60s and 120s");
    assert_eq!(
        h.provider.create_count(),
        1,
        "only the first run writes; later runs see no change"
    );
}

#[tokio::test(start_paused = true)]
async fn stopped_timer_never_fires_again() {
    let h = harness();
    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    let task = h.scheduler.add(new_task("www", 60)).await.unwrap();

    h.scheduler.start(&task.id).await.unwrap();
    h.scheduler.stop(&task.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(h.probe.calls(), 1);
}

#[tokio::test]
async fn manual_runs_of_one_task_never_overlap() {
    let h = harness();
    h.probe
        .set(PRIMARY_URL, Reply::Slow(Duration::from_millis(50), ip("5.6.7.8")));
    let task = h.scheduler.add(new_task("www", 3600)).await.unwrap();

    let (a, b, c) = tokio::join!(
        h.scheduler.execute_now(&task.id),
        h.scheduler.execute_now(&task.id),
        h.scheduler.execute_now(&task.id),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(h.probe.calls(), 3);
    assert_eq!(h.probe.max_in_flight(), 1, "runs must be serialized");
    assert_eq!(h.provider.create_count(), 1, "later runs see the first write");
}

#[tokio::test(start_paused = true)]
async fn tick_is_skipped_while_a_run_is_in_progress() {
    let h = harness();
    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    let task = h.scheduler.add(new_task("www", 1)).await.unwrap();
    h.scheduler.start(&task.id).await.unwrap();

    h.probe
        .set(PRIMARY_URL, Reply::Slow(Duration::from_millis(3500), ip("5.6.7.8")));
    let scheduler = h.scheduler.clone();
    let id = task.id.clone();
    let manual = tokio::spawn(async move { scheduler.execute_now(&id).await });

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(h.probe.calls(), 2, "ticks during the manual run are skipped");

    manual.await.unwrap().unwrap();
    assert_eq!(h.probe.max_in_flight(), 1);
}

#[tokio::test]
async fn tasks_for_different_hosts_run_independently() {
    let h = harness();
    h.probe.answer(PRIMARY_URL, "5.6.7.8");
    let a = h.scheduler.add(new_task("a", 3600)).await.unwrap();
    let b = h.scheduler.add(new_task("b", 3600)).await.unwrap();

    let (ra, rb) = tokio::join!(h.scheduler.start(&a.id), h.scheduler.start(&b.id));
    ra.unwrap();
    rb.unwrap();

    assert_eq!(h.provider.record_value("example.com", "a").as_deref(), Some("5.6.7.8"));
    assert_eq!(h.provider.record_value("example.com", "b").as_deref(), Some("5.6.7.8"));
}

#[tokio::test]
async fn operation_log_reads_from_an_offset() {
    let h = harness();
    h.scheduler.add(new_task("a", 300)).await.unwrap();
    h.scheduler.add(new_task("b", 300)).await.unwrap();

    let count = h.scheduler.log_count();
    assert_eq!(count, 2);
    assert_eq!(h.scheduler.logs(1).len(), 1);
    assert!(h.scheduler.logs(count).is_empty());
    assert!(h.scheduler.logs(count + 10).is_empty());
}
