use parexec::{
    BatchState, CancelReason, CompletionTracker, FnTaskHelper, Outcome, Task, TaskError,
    TaskFailure, WorkerPool,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn task<V, F>(f: F) -> Task<V>
where
    F: FnOnce() -> anyhow::Result<V> + Send + 'static,
{
    Box::new(f)
}

fn sleep_task(ms: u64) -> Task<u64> {
    task(move || {
        thread::sleep(Duration::from_millis(ms));
        Ok(ms)
    })
}

fn tracker(threads: usize) -> CompletionTracker<&'static str, u64> {
    let pool = Arc::new(WorkerPool::new(threads).unwrap());
    let helper = FnTaskHelper::new(|name: &&'static str| {
        if name.is_empty() {
            anyhow::bail!("empty name");
        }
        let len = name.len() as u64;
        Ok(task(move || Ok(len)))
    });
    CompletionTracker::new(pool, Arc::new(helper))
}

#[test]
fn test_take_returns_completion_order() {
    let mut tracker = tracker(3);
    tracker.submit(sleep_task(300), "slow").unwrap();
    tracker.submit(sleep_task(10), "fast").unwrap();
    tracker.submit(sleep_task(150), "medium").unwrap();

    let order: Vec<&str> = std::iter::from_fn(|| tracker.take())
        .map(|d| d.operand)
        .collect();
    assert_eq!(order, vec!["fast", "medium", "slow"]);
}

#[test]
fn test_pending_count_only_drops_on_drain() {
    let mut tracker = tracker(1);
    tracker.submit(sleep_task(300), "slow").unwrap();
    assert_eq!(tracker.pending_count(), 1);

    assert!(tracker.poll(Duration::from_millis(20)).is_none());
    assert!(tracker.try_poll().is_none());
    assert_eq!(tracker.pending_count(), 1);

    let drained = tracker.poll(Duration::from_secs(5)).unwrap();
    assert!(matches!(drained.outcome, Outcome::Success(300)));
    assert_eq!(tracker.pending_count(), 0);
    assert_eq!(tracker.submitted(), 1);
}

#[test]
fn test_poll_without_representable_deadline() {
    let mut tracker = tracker(1);
    tracker.submit(sleep_task(20), "quick").unwrap();

    let drained = tracker.poll(Duration::MAX).unwrap();
    assert!(matches!(drained.outcome, Outcome::Success(20)));
    // nothing pending: returns at once instead of waiting forever
    assert!(tracker.poll(Duration::MAX).is_none());
}

#[test]
fn test_take_on_empty_tracker() {
    let mut tracker = tracker(1);
    assert!(tracker.take().is_none());
    assert!(tracker.poll(Duration::from_millis(10)).is_none());
    assert_eq!(tracker.state(), BatchState::Created);
}

#[test]
fn test_batch_state_transitions() {
    let mut tracker = tracker(2);
    assert_eq!(tracker.state(), BatchState::Created);

    tracker.submit(sleep_task(10), "a").unwrap();
    tracker.submit(sleep_task(100), "b").unwrap();
    assert_eq!(tracker.state(), BatchState::Submitted);

    tracker.take().unwrap();
    assert_eq!(tracker.state(), BatchState::Draining);

    tracker.take().unwrap();
    assert_eq!(tracker.state(), BatchState::Completed);

    assert!(matches!(
        tracker.submit(sleep_task(1), "c"),
        Err(TaskError::BatchCompleted)
    ));
}

#[test]
fn test_operand_for_and_handles() {
    let mut tracker = tracker(1);
    let handle = tracker.submit(sleep_task(50), "x").unwrap();
    assert_eq!(tracker.operand_for(&handle), Some(&"x"));
    assert_eq!(tracker.handles().count(), 1);

    let drained = tracker.take().unwrap();
    assert_eq!(drained.handle.id(), handle.id());
    assert_eq!(tracker.operand_for(&handle), None);
    assert!(handle.is_done());
}

#[test]
fn test_submit_operand_uses_helper() {
    let mut tracker = tracker(2);
    tracker.submit_operand("four").unwrap();
    tracker.submit_operand("").unwrap();

    let mut lengths = Vec::new();
    let mut invalid = 0;
    while let Some(drained) = tracker.take() {
        match drained.outcome {
            Outcome::Success(n) => lengths.push(n),
            Outcome::Failed(TaskFailure::InvalidOperand(_)) => invalid += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(lengths, vec![4]);
    assert_eq!(invalid, 1);
}

#[test]
fn test_cancel_all_drains_as_cancelled() {
    let mut tracker = tracker(1);
    tracker.submit(sleep_task(200), "running").unwrap();
    tracker.submit(sleep_task(200), "queued").unwrap();

    assert_eq!(tracker.cancel_all(), 2);
    assert_eq!(tracker.cancel_all(), 0);

    for _ in 0..2 {
        let drained = tracker.poll(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            drained.outcome,
            Outcome::Cancelled(CancelReason::Requested)
        ));
    }
    assert_eq!(tracker.pending_count(), 0);
}

#[test]
fn test_cancelled_task_observes_interrupt() {
    let observed = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&observed);
    let mut tracker = tracker(1);
    let handle = tracker
        .submit(
            task(move || {
                let start = Instant::now();
                while start.elapsed() < Duration::from_secs(5) {
                    if parexec::interrupted() {
                        seen.store(true, Ordering::SeqCst);
                        return Ok(0);
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Ok(1)
            }),
            "loop",
        )
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    assert!(handle.cancel());
    let drained = tracker.take().unwrap();
    assert!(matches!(drained.outcome, Outcome::Cancelled(_)));

    let pool = Arc::clone(tracker.pool());
    assert!(pool.shutdown(Duration::from_secs(5)));
    assert!(observed.load(Ordering::SeqCst));
}

#[test]
fn test_interrupted_false_outside_worker() {
    assert!(!parexec::interrupted());
}

#[test]
fn test_submit_after_shutdown_rejected() {
    let mut tracker = tracker(1);
    assert!(tracker.pool().shutdown(Duration::from_secs(1)));
    assert!(matches!(
        tracker.submit(sleep_task(1), "late"),
        Err(TaskError::Rejected)
    ));
    assert!(matches!(
        tracker.submit_operand(""),
        Err(TaskError::Rejected)
    ));
    assert_eq!(tracker.pending_count(), 0);
}

#[test]
fn test_panicking_task_reported() {
    let mut tracker = tracker(1);
    tracker
        .submit(task(|| -> anyhow::Result<u64> { panic!("kaboom") }), "p")
        .unwrap();
    let drained = tracker.take().unwrap();
    match drained.outcome {
        Outcome::Failed(TaskFailure::Panicked(msg)) => assert_eq!(msg, "kaboom"),
        other => panic!("unexpected outcome {other:?}"),
    }
}
