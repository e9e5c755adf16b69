// Integration tests for jobpool::scheduler::Pool

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use jobpool::{IdleStrategy, Job, JobError, Pool, PoolConfig, PoolError, PoolStatus, WorkerStatus};

const FAST_BACKOFF: Duration = Duration::from_millis(10);
const WAIT: Duration = Duration::from_secs(10);

fn fast_pool(workers: usize, strategy: IdleStrategy) -> Pool {
    let config = PoolConfig::new(workers)
        .with_backoff(FAST_BACKOFF)
        .with_idle_strategy(strategy);
    Pool::with_config(config).unwrap()
}

fn both_strategies() -> [IdleStrategy; 2] {
    [IdleStrategy::Backoff, IdleStrategy::Notify]
}

#[test]
fn test_concurrent_submit_loses_and_duplicates_nothing() {
    for strategy in both_strategies() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 200;

        let pool = Arc::new(fast_pool(4, strategy));
        pool.start().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let pool = pool.clone();
                let seen = seen.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let seen = seen.clone();
                        pool.submit(Job::new(
                            move |tag: Option<&(usize, usize)>| {
                                seen.lock().unwrap().push(*tag.unwrap());
                            },
                            Some((p, i)),
                        ))
                        .unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let report = pool.shutdown().unwrap();
        let seen = seen.lock().unwrap();
        let unique: HashSet<_> = seen.iter().copied().collect();

        assert_eq!(unique.len(), seen.len(), "a job ran twice");
        assert_eq!(report.executed as usize, seen.len());
        assert_eq!(
            report.executed as usize + report.dropped,
            PRODUCERS * PER_PRODUCER
        );
    }
}

#[test]
fn test_every_job_runs_when_waiting_for_idle() {
    for strategy in both_strategies() {
        let pool = fast_pool(3, strategy);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.start().unwrap();

        for _ in 0..100 {
            let counter = counter.clone();
            pool.submit(Job::from_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        assert!(pool.wait_idle(WAIT));
        let report = pool.shutdown().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(report.executed, 100);
        assert_eq!(report.dropped, 0);
    }
}

#[test]
fn test_single_worker_runs_backlog_in_lifo_order() {
    let pool = fast_pool(1, IdleStrategy::Backoff);
    let order = Arc::new(Mutex::new(Vec::new()));

    // Submitted before start: nothing can pop until the worker exists.
    for name in ["J1", "J2", "J3"] {
        let order = order.clone();
        pool.submit(Job::from_fn(move || order.lock().unwrap().push(name)))
            .unwrap();
    }
    pool.start().unwrap();

    assert!(pool.wait_idle(WAIT));
    pool.shutdown().unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["J3", "J2", "J1"]);
}

#[test]
fn test_shutdown_with_default_backoff_is_bounded() {
    let pool = Pool::new(4).unwrap();
    pool.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let report = pool.shutdown().unwrap();

    // One 500 ms backoff plus scheduling slack.
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.workers_joined, 4);
    assert_eq!(pool.status(), PoolStatus::Shutdown);
}

#[test]
fn test_notify_strategy_shuts_down_without_waiting_for_backoff() {
    let config = PoolConfig::new(4)
        .with_backoff(Duration::from_secs(30))
        .with_idle_strategy(IdleStrategy::Notify);
    let pool = Pool::with_config(config).unwrap();
    pool.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    pool.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_all_workers_stop_after_shutdown() {
    let pool = fast_pool(3, IdleStrategy::Backoff);
    pool.start().unwrap();
    assert_eq!(pool.worker_statuses().len(), 3);

    pool.shutdown().unwrap();
    // Handles are consumed by the join.
    assert!(pool.worker_statuses().is_empty());
}

#[test]
fn test_busy_worker_reports_executing() {
    let pool = fast_pool(1, IdleStrategy::Backoff);
    let gate = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    pool.start().unwrap();

    let (g, r) = (gate.clone(), release.clone());
    pool.submit(Job::from_fn(move || {
        g.wait();
        r.wait();
    }))
    .unwrap();

    gate.wait();
    assert_eq!(pool.worker_statuses(), vec![WorkerStatus::Executing]);
    release.wait();

    assert!(pool.wait_idle(WAIT));
    pool.shutdown().unwrap();
}

#[test]
fn test_queued_jobs_are_dropped_at_shutdown() {
    let pool = fast_pool(1, IdleStrategy::Backoff);
    let started = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let ran = Arc::new(AtomicUsize::new(0));
    pool.start().unwrap();

    let (s, r) = (started.clone(), release.clone());
    pool.submit(Job::from_fn(move || {
        s.wait();
        r.wait();
    }))
    .unwrap();
    started.wait();

    // The only worker is blocked, so these stay queued.
    for _ in 0..5 {
        let ran = ran.clone();
        pool.submit(Job::from_fn(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    let releaser = {
        let release = release.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release.wait();
        })
    };

    // Clears the flag first, so the worker exits right after its job.
    let report = pool.shutdown().unwrap();
    releaser.join().unwrap();

    assert_eq!(report.executed, 1);
    assert_eq!(report.dropped, 5);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_payloads_are_isolated_between_concurrent_jobs() {
    let pool = fast_pool(4, IdleStrategy::Notify);
    let barrier = Arc::new(Barrier::new(4));
    let results = Arc::new(Mutex::new(Vec::new()));
    pool.start().unwrap();

    for i in 0..4 {
        let barrier = barrier.clone();
        let results = results.clone();
        pool.submit(Job::new(
            move |payload: Option<&Vec<usize>>| {
                let payload = payload.unwrap();
                // All four run at once before reading back.
                barrier.wait();
                results.lock().unwrap().push((i, payload.clone()));
            },
            Some(vec![i; 16]),
        ))
        .unwrap();
    }

    assert!(pool.wait_idle(WAIT));
    pool.shutdown().unwrap();

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 4);
    for (i, payload) in results.iter() {
        assert!(payload.iter().all(|v| v == i));
    }
}

#[test]
fn test_panicking_job_does_not_kill_worker() {
    for strategy in both_strategies() {
        let pool = fast_pool(1, strategy);
        let observed = Arc::new(Mutex::new(None));
        let failures = pool.failures();
        pool.start().unwrap();

        pool.submit(
            Job::new(|_: Option<&String>| panic!("boom"), None).with_label("exploding"),
        )
        .unwrap();
        assert!(pool.wait_idle(WAIT));

        let seen = observed.clone();
        pool.submit(Job::new(
            move |payload: Option<&String>| {
                *seen.lock().unwrap() = payload.cloned();
            },
            Some("follow-up".to_string()),
        ))
        .unwrap();
        assert!(pool.wait_idle(WAIT));

        assert_eq!(observed.lock().unwrap().as_deref(), Some("follow-up"));

        let failure = failures.try_recv().unwrap();
        assert_eq!(failure.label.as_deref(), Some("exploding"));
        assert_eq!(failure.worker_id, 0);
        assert!(matches!(failure.error, JobError::Panicked(ref msg) if msg == "boom"));

        let report = pool.shutdown().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.executed, 1);
    }
}

#[test]
fn test_failing_job_is_reported_and_worker_continues() {
    let pool = fast_pool(2, IdleStrategy::Backoff);
    let observed = Arc::new(Mutex::new(None));
    let failures = pool.failures();
    pool.start().unwrap();

    let failing = Job::try_new(
        |path: Option<&String>| Err(anyhow::anyhow!("cannot open {}", path.unwrap())),
        Some("/missing".to_string()),
    );
    let failing_id = failing.id();
    pool.submit(failing).unwrap();
    assert!(pool.wait_idle(WAIT));

    let seen = observed.clone();
    pool.submit(Job::new(
        move |payload: Option<&String>| {
            *seen.lock().unwrap() = payload.cloned();
        },
        Some("follow-up".to_string()),
    ))
    .unwrap();
    assert!(pool.wait_idle(WAIT));

    assert_eq!(observed.lock().unwrap().as_deref(), Some("follow-up"));
    let failure = failures.try_recv().unwrap();
    assert_eq!(failure.job_id, failing_id);
    assert!(failure.error.to_string().contains("cannot open /missing"));
    assert_eq!(pool.metrics().failed, 1);

    pool.shutdown().unwrap();
}

#[test]
fn test_output_guard_prevents_interleaving() {
    let pool = fast_pool(4, IdleStrategy::Notify);
    let sink = Arc::new(Mutex::new(Vec::new()));
    let guard = pool.output_guard();
    pool.start().unwrap();

    for writer in 0..4 {
        let sink = sink.clone();
        let guard = guard.clone();
        pool.submit(Job::from_fn(move || {
            for _ in 0..20 {
                guard.with_lock(|| {
                    for part in 0..3 {
                        sink.lock().unwrap().push((writer, part));
                        thread::yield_now();
                    }
                });
            }
        }))
        .unwrap();
    }

    assert!(pool.wait_idle(WAIT));
    pool.shutdown().unwrap();

    let sink = sink.lock().unwrap();
    assert_eq!(sink.len(), 4 * 20 * 3);
    for write in sink.chunks(3) {
        let writer = write[0].0;
        assert_eq!(
            write,
            &[(writer, 0), (writer, 1), (writer, 2)],
            "parts of two writes interleaved"
        );
    }
}

#[test]
fn test_start_twice_is_rejected() {
    let pool = fast_pool(1, IdleStrategy::Backoff);
    pool.start().unwrap();
    assert_eq!(pool.start(), Err(PoolError::AlreadyStarted));
    pool.shutdown().unwrap();
    assert_eq!(pool.start(), Err(PoolError::ShutDown));
}

#[test]
fn test_submit_after_shutdown_is_rejected() {
    let pool = fast_pool(1, IdleStrategy::Backoff);
    pool.start().unwrap();
    pool.shutdown().unwrap();

    let result = pool.submit(Job::from_fn(|| {}));
    assert_eq!(result, Err(PoolError::ShutDown));
    assert_eq!(pool.metrics().queue_length, 0);
}

#[test]
fn test_second_shutdown_is_rejected() {
    let pool = fast_pool(1, IdleStrategy::Backoff);
    pool.start().unwrap();
    pool.shutdown().unwrap();
    assert_eq!(pool.shutdown(), Err(PoolError::AlreadyShutDown));
}

#[test]
fn test_zero_workers_is_rejected() {
    assert!(matches!(Pool::new(0), Err(PoolError::InvalidConfig(_))));
}

#[test]
fn test_metrics_track_submissions() {
    let pool = fast_pool(2, IdleStrategy::Backoff);
    for _ in 0..3 {
        pool.submit(Job::from_fn(|| {})).unwrap();
    }

    let before = pool.metrics();
    assert_eq!(before.status, PoolStatus::Created);
    assert_eq!(before.submitted, 3);
    assert_eq!(before.queue_length, 3);
    assert_eq!(before.executed, 0);

    pool.start().unwrap();
    assert!(pool.wait_idle(WAIT));
    let after = pool.metrics();
    assert_eq!(after.status, PoolStatus::Running);
    assert_eq!(after.executed, 3);
    assert_eq!(after.queue_length, 0);

    pool.shutdown().unwrap();
}

#[test]
fn test_drop_shuts_down_running_pool() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = fast_pool(2, IdleStrategy::Backoff);
        pool.start().unwrap();
        let counter = counter.clone();
        pool.submit(Job::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert!(pool.wait_idle(WAIT));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dropping_last_handle_inside_job_detaches_its_worker() {
    let pool = Arc::new(fast_pool(2, IdleStrategy::Backoff));
    let failures = pool.failures();
    let (released_tx, released_rx) = flume::bounded::<()>(1);
    let (done_tx, done_rx) = flume::bounded(1);
    pool.start().unwrap();

    let owned = pool.clone();
    pool.submit(Job::from_fn(move || {
        released_rx.recv().unwrap();
        // Last reference: `Drop` shuts the pool down from this worker.
        drop(owned);
        done_tx.send(thread::current().name().map(str::to_owned)).unwrap();
    }))
    .unwrap();

    drop(pool);
    released_tx.send(()).unwrap();

    let worker_name = done_rx.recv_timeout(WAIT).unwrap();
    assert!(worker_name.unwrap().starts_with("jobpool-worker-"));

    // The detached worker exits after the job, releasing the failure sender.
    assert!(matches!(
        failures.recv_timeout(WAIT),
        Err(flume::RecvTimeoutError::Disconnected)
    ));
}

#[test]
fn test_shutdown_from_inside_job_reports_detached_worker() {
    let pool = Arc::new(fast_pool(3, IdleStrategy::Notify));
    let (report_tx, report_rx) = flume::bounded(1);
    pool.start().unwrap();

    let inner = pool.clone();
    pool.submit(Job::from_fn(move || {
        report_tx.send(inner.shutdown()).unwrap();
    }))
    .unwrap();

    let report = report_rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(report.workers_joined, 2);
    assert_eq!(report.workers_detached, 1);
    assert_eq!(pool.status(), PoolStatus::Shutdown);
}

#[test]
fn test_unread_failure_reports_are_bounded() {
    let config = PoolConfig::new(1)
        .with_backoff(FAST_BACKOFF)
        .with_failure_capacity(4);
    let pool = Pool::with_config(config).unwrap();
    let failures = pool.failures();

    for i in 0..10 {
        pool.submit(Job::try_new(
            |n: Option<&usize>| Err(anyhow::anyhow!("job {} failed", n.unwrap())),
            Some(i),
        ))
        .unwrap();
    }
    pool.start().unwrap();
    assert!(pool.wait_idle(WAIT));

    let metrics = pool.metrics();
    assert_eq!(metrics.failed, 10);
    assert_eq!(metrics.failure_reports_dropped, 6);
    assert_eq!(failures.len(), 4);

    // Reading frees room for new reports.
    assert_eq!(failures.drain().count(), 4);
    pool.submit(Job::try_new(|_: Option<&()>| Err(anyhow::anyhow!("late")), None))
        .unwrap();
    assert!(pool.wait_idle(WAIT));
    assert_eq!(failures.len(), 1);
    assert_eq!(pool.metrics().failure_reports_dropped, 6);

    pool.shutdown().unwrap();
}
