//! Integration tests for the task queue: lifecycle, deadlines, cancellation,
//! listing, and cleanup.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use taskcast_core::status::TaskStatus;
use taskcast_core::task::TaskRecord;
use taskcast_core::types::TaskId;
use taskcast_events::{TaskEventBus, TaskEventKind};
use taskcast_worker::{QueueConfig, TaskQueue};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_queue(pool_size: usize) -> TaskQueue {
    let config = QueueConfig {
        pool_size,
        ..QueueConfig::default()
    };
    TaskQueue::new(&config, Arc::new(TaskEventBus::default()))
}

/// Poll until the task is terminal or `limit` elapses.
async fn wait_terminal(queue: &TaskQueue, task_id: TaskId, limit: Duration) -> TaskRecord {
    let deadline = Instant::now() + limit;
    loop {
        let record = queue.get(task_id).expect("task should exist");
        if record.is_terminal() {
            return record;
        }
        assert!(
            Instant::now() < deadline,
            "task {task_id} still {} after {limit:?}",
            record.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the task reports `status`.
async fn wait_status(queue: &TaskQueue, task_id: TaskId, status: TaskStatus) {
    for _ in 0..300 {
        if queue.get(task_id).map(|r| r.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {task_id} never reached {status}");
}

fn sleeper(duration: Duration) -> impl FnOnce() -> Result<&'static str, String> + Send {
    move || {
        std::thread::sleep(duration);
        Ok("ok")
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fast_work_completes_with_its_result() {
    let queue = new_queue(4);
    let record = queue.submit(1, sleeper(Duration::from_millis(100)), Duration::from_secs(5));

    let done = wait_terminal(&queue, record.id, Duration::from_secs(1)).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result, Some(serde_json::json!("ok")));
    assert_eq!(done.progress, 100);
    assert!(done.error.is_none());
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_work_times_out_within_budget_plus_slack() {
    let queue = new_queue(4);
    let submitted = Instant::now();
    let record = queue.submit(1, sleeper(Duration::from_secs(3)), Duration::from_secs(1));

    let done = wait_terminal(&queue, record.id, Duration::from_secs(2)).await;
    assert!(submitted.elapsed() < Duration::from_secs(2));
    assert_eq!(done.status, TaskStatus::TimedOut);
    let error = done.error.expect("timeout carries an error");
    assert!(error.contains("1 second"), "unexpected error: {error}");
    assert!(done.result.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn erroring_work_fails_with_its_message() {
    let queue = new_queue(4);
    let record = queue.submit(
        1,
        || -> Result<String, String> { Err("boom".to_string()) },
        Duration::from_secs(5),
    );

    let done = wait_terminal(&queue, record.id, Duration::from_secs(1)).await;
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("Task execution failed: boom"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn time_spent_waiting_for_a_slot_does_not_count_against_budget() {
    let queue = new_queue(1);
    let blocker = queue.submit(1, sleeper(Duration::from_millis(600)), Duration::from_secs(5));
    wait_status(&queue, blocker.id, TaskStatus::Processing).await;

    // Waits ~600ms for the only slot, then runs well inside its budget.
    let queued = queue.submit(1, sleeper(Duration::from_millis(100)), Duration::from_millis(300));

    let done = wait_terminal(&queue, queued.id, Duration::from_secs(2)).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.error.is_none());

    let waited = done.started_at.unwrap() - done.created_at;
    assert!(waited > chrono::Duration::milliseconds(300));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminal_status_never_changes_on_later_reads() {
    let queue = new_queue(2);
    let record = queue.submit(1, sleeper(Duration::from_millis(10)), Duration::from_secs(5));
    let done = wait_terminal(&queue, record.id, Duration::from_secs(1)).await;

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.get(record.id), Some(done.clone()));
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_right_after_submit_marks_cancelled() {
    let queue = new_queue(4);
    let record = queue.submit(1, sleeper(Duration::from_millis(50)), Duration::from_secs(5));

    assert!(queue.cancel(record.id));
    assert_eq!(queue.get(record.id).map(|r| r.status), Some(TaskStatus::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_cancelled_while_waiting_for_a_slot_never_runs() {
    let queue = new_queue(1);
    let blocker = queue.submit(1, sleeper(Duration::from_millis(200)), Duration::from_secs(5));
    wait_status(&queue, blocker.id, TaskStatus::Processing).await;

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let waiting = queue.submit(
        1,
        move || {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, String>("ran")
        },
        Duration::from_secs(5),
    );
    assert!(queue.cancel(waiting.id));

    wait_terminal(&queue, blocker.id, Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!ran.load(Ordering::SeqCst));
    let record = queue.get(waiting.id).unwrap();
    assert_eq!(record.status, TaskStatus::Cancelled);
    assert!(record.started_at.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_on_terminal_task_is_rejected_and_leaves_record_alone() {
    let queue = new_queue(2);
    let record = queue.submit(1, sleeper(Duration::from_millis(10)), Duration::from_secs(5));
    let done = wait_terminal(&queue, record.id, Duration::from_secs(1)).await;

    assert!(!queue.cancel(record.id));
    assert_eq!(queue.get(record.id), Some(done));
}

#[tokio::test]
async fn cancel_on_unknown_task_returns_false() {
    let queue = new_queue(1);
    assert!(!queue.cancel(TaskId::new_v4()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_finishing_after_cancel_does_not_overwrite_it() {
    let queue = new_queue(1);
    let record = queue.submit(1, sleeper(Duration::from_millis(200)), Duration::from_secs(5));
    wait_status(&queue, record.id, TaskStatus::Processing).await;

    assert!(queue.cancel(record.id));
    let cancelled = queue.get(record.id).unwrap();

    // Outlive the running call so its late result reaches the queue.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let after = queue.get(record.id).unwrap();
    assert_eq!(after, cancelled);
    assert_eq!(after.status, TaskStatus::Cancelled);
    assert!(after.result.is_none());
}

// ---------------------------------------------------------------------------
// Listing, stats, cleanup
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submitting_n_tasks_yields_n_distinct_ids() {
    let queue = new_queue(4);
    let ids: HashSet<TaskId> = (0..20)
        .map(|i| {
            queue
                .submit(i % 3, || Ok::<_, String>(1), Duration::from_secs(5))
                .id
        })
        .collect();

    assert_eq!(ids.len(), 20);
    assert_eq!(queue.stats().total, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn four_outcomes_are_counted_in_stats() {
    let queue = new_queue(4);
    let completed = queue.submit(1, sleeper(Duration::from_millis(100)), Duration::from_secs(5));
    let timed_out = queue.submit(1, sleeper(Duration::from_secs(3)), Duration::from_secs(1));
    let failed = queue.submit(
        1,
        || -> Result<String, String> { Err("boom".to_string()) },
        Duration::from_secs(5),
    );
    let cancelled = queue.submit(1, sleeper(Duration::from_millis(200)), Duration::from_secs(5));
    assert!(queue.cancel(cancelled.id));

    for id in [completed.id, timed_out.id, failed.id] {
        wait_terminal(&queue, id, Duration::from_secs(3)).await;
    }

    let stats = queue.stats();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.pending + stats.processing, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_for_owner_is_filtered_and_newest_first() {
    let queue = new_queue(2);
    let first = queue.submit(42, sleeper(Duration::from_millis(10)), Duration::from_secs(5));
    let _other = queue.submit(7, sleeper(Duration::from_millis(10)), Duration::from_secs(5));
    let second = queue.submit(42, sleeper(Duration::from_millis(10)), Duration::from_secs(5));

    let listed: Vec<TaskId> = queue
        .list_for_owner(42, true)
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![second.id, first.id]);

    wait_terminal(&queue, first.id, Duration::from_secs(1)).await;
    wait_terminal(&queue, second.id, Duration::from_secs(1)).await;
    assert!(queue.list_for_owner(42, false).is_empty());
    assert_eq!(queue.list_for_owner(42, true).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cleanup_evicts_only_old_terminal_records() {
    let queue = new_queue(1);
    let finished = queue.submit(1, || Ok::<_, String>("done"), Duration::from_secs(5));
    wait_terminal(&queue, finished.id, Duration::from_secs(1)).await;

    let running = queue.submit(1, sleeper(Duration::from_millis(300)), Duration::from_secs(5));
    wait_status(&queue, running.id, TaskStatus::Processing).await;

    assert_eq!(queue.cleanup(Duration::from_secs(3600)), 0);
    assert!(queue.get(finished.id).is_some());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.cleanup(Duration::from_millis(10)), 1);
    assert!(queue.get(finished.id).is_none());
    assert_matches!(queue.get(running.id), Some(r) if r.status == TaskStatus::Processing);
}

// ---------------------------------------------------------------------------
// Progress and events
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_reports_are_visible_and_published() {
    let bus = Arc::new(TaskEventBus::default());
    let mut rx = bus.subscribe();
    let queue = TaskQueue::new(&QueueConfig::default(), Arc::clone(&bus));

    let record = queue.submit_with_progress(
        5,
        |progress| {
            assert!(progress.report(40));
            assert!(!progress.report(20));
            Ok::<_, String>(serde_json::json!({ "frames": 24 }))
        },
        Duration::from_secs(5),
    );
    let done = wait_terminal(&queue, record.id, Duration::from_secs(1)).await;
    assert_eq!(done.result, Some(serde_json::json!({ "frames": 24 })));

    let mut progress_seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if event.kind == TaskEventKind::Progress {
            progress_seen.push(event.record.progress);
        }
    }
    assert_eq!(progress_seen, vec![40]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_progress_ignores_unknown_and_terminal_tasks() {
    let queue = new_queue(1);
    assert!(!queue.update_progress(TaskId::new_v4(), 50));

    let record = queue.submit(1, || Ok::<_, String>("done"), Duration::from_secs(5));
    let done = wait_terminal(&queue, record.id, Duration::from_secs(1)).await;
    assert!(!queue.update_progress(record.id, 100));
    assert_eq!(queue.get(record.id), Some(done));
}
