//! Ramp schedule tests. These run under paused time, so the tick timeline
//! is deterministic: batches land at t = 0, interval, 2*interval, ...

mod utils;
use utils::init;

use stampede::prelude::*;
use std::time::Duration;

fn slow_workload() -> impl Workload {
    workload_fn("slow", || async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, WorkloadError>(Outcome::default())
    })
}

#[tokio::test(start_paused = true)]
async fn ramp_up_is_monotonic_to_max() {
    init();

    let config = RunConfig::new("ramp-up")
        .workers(6)
        .ramp("2:100ms".parse().unwrap());
    let run = stampede::start(slow_workload(), config).await.unwrap();
    let report = run.report();

    // Sample between ticks: expect 2, 4, 6 active workers.
    let mut last = 0;
    tokio::time::sleep(Duration::from_millis(50)).await;
    for _ in 0..3 {
        let active = report.active_workers();
        assert!(active >= last, "ramp-up must be non-decreasing");
        last = active;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(report.active_workers(), 6);

    run.stop();
    let summary = run.wait().await.unwrap();
    assert_eq!(report.active_workers(), 0);
    assert!(summary.count > 0);
}

#[tokio::test(start_paused = true)]
async fn ramp_down_drains_to_zero() {
    init();

    let config = RunConfig::new("ramp-down")
        .workers(4)
        .ramp("2:100ms:1".parse().unwrap())
        .ramp_grace_ticks(1);
    let run = stampede::start(slow_workload(), config).await.unwrap();
    let report = run.report();

    // Up: 2 at t=0, 4 at t=100. Grace tick at t=200. Drain cancels one
    // worker per tick from t=300 on.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(report.active_workers(), 4);

    let mut last = report.active_workers();
    while report.active_workers() > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let active = report.active_workers();
        assert!(active <= last, "drain must be non-increasing");
        last = active;
    }

    let summary = run.wait().await.unwrap();
    assert!(report.is_done());
    assert_eq!(report.active_workers(), 0);
    assert!(summary.count > 0);
}

#[tokio::test(start_paused = true)]
async fn empty_ramp_starts_all_workers_immediately() {
    init();

    let run = stampede::start(slow_workload(), RunConfig::new("no-ramp").workers(8))
        .await
        .unwrap();
    let report = run.report();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(report.active_workers(), 8);

    run.stop();
    run.wait().await.unwrap();
    assert_eq!(report.active_workers(), 0);
}

#[tokio::test(start_paused = true)]
async fn up_zero_with_down_starts_immediately_then_drains() {
    init();

    let config = RunConfig::new("drain-only")
        .workers(3)
        .ramp("0:100ms:3".parse().unwrap())
        .ramp_grace_ticks(0);
    let run = stampede::start(slow_workload(), config).await.unwrap();
    let report = run.report();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(report.active_workers(), 3);

    let summary = run.wait().await.unwrap();
    assert_eq!(report.active_workers(), 0);
    assert!(summary.count > 0);
}
