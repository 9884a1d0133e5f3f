mod utils;
use utils::init;

use rand_distr::{Distribution, SkewNormal};
use stampede::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn ok_workload() -> impl Workload {
    workload_fn("ok", || async {
        tokio::time::sleep(Duration::from_micros(500)).await;
        Ok::<_, WorkloadError>(Outcome {
            status: vec!["200".to_string()],
            cost: Some(Duration::from_millis(2)),
            ..Default::default()
        })
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invocation_budget_is_exact() {
    init();

    let run = stampede::start(ok_workload(), RunConfig::new("budget").count(1000).workers(50))
        .await
        .unwrap();
    let report = run.report();

    let summary = run.wait().await.unwrap();
    assert_eq!(summary.count, 1000);
    assert_eq!(summary.codes.get("200"), Some(&1000));
    assert!(summary.errors.is_empty());
    assert_eq!(report.active_workers(), 0);
    assert!(report.is_done());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workers_are_clamped_to_small_budgets() {
    init();

    let run = stampede::start(ok_workload(), RunConfig::new("clamp").count(5).workers(50))
        .await
        .unwrap();
    let summary = run.wait().await.unwrap();
    assert_eq!(summary.count, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn budget_is_exact_under_throttling() {
    init();

    // Workers park on the rate limiter between claims; a claimed slot must
    // still produce its invocation once the budget hits zero.
    let config = RunConfig::new("throttled-budget")
        .count(40)
        .workers(8)
        .qps(2000.0);
    let run = stampede::start(ok_workload(), config).await.unwrap();
    let summary = run.wait().await.unwrap();
    assert_eq!(summary.count, 40);
    assert_eq!(summary.codes.get("200"), Some(&40));

    // Every worker holds a claimed slot at the moment the budget empties.
    let config = RunConfig::new("throttled-tight")
        .count(4)
        .workers(4)
        .qps(500.0);
    let run = stampede::start(ok_workload(), config).await.unwrap();
    let summary = run.wait().await.unwrap();
    assert_eq!(summary.count, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invocation_errors_are_tallied_not_fatal() {
    init();

    let workload = workload_fn("failing", || async {
        tokio::time::sleep(Duration::from_micros(100)).await;
        Err::<Outcome, WorkloadError>(anyhow::anyhow!("boom").into())
    });

    let run = stampede::start(workload, RunConfig::new("errors").count(100).workers(10))
        .await
        .unwrap();
    let summary = run.wait().await.unwrap();

    assert_eq!(summary.count, 100);
    assert_eq!(summary.errors.get("boom"), Some(&100));
    assert!(summary.codes.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn init_failure_aborts_before_workers_start() {
    init();

    struct BrokenSetup;

    #[async_trait::async_trait]
    impl Workload for BrokenSetup {
        fn name(&self) -> &str {
            "broken-setup"
        }

        async fn init(&self, _config: &RunConfig) -> Result<InitHints, WorkloadError> {
            Err(anyhow::anyhow!("no backend").into())
        }

        async fn invoke(&self, _config: &RunConfig) -> Result<Outcome, WorkloadError> {
            unreachable!("init failed, invoke must never run")
        }
    }

    let err = stampede::start(BrokenSetup, RunConfig::new("broken"))
        .await
        .err()
        .expect("init failure must be fatal");
    assert!(matches!(err, Error::Init(_)));
    assert!(err.to_string().contains("no backend"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_tags_are_estimated() {
    init();

    let seq = Arc::new(AtomicU64::new(0));
    let workload = workload_fn("tagged", move || {
        let seq = Arc::clone(&seq);
        async move {
            let i = seq.fetch_add(1, Ordering::Relaxed);
            Ok::<_, WorkloadError>(Outcome {
                counting: vec![format!("conn-{i}")],
                ..Default::default()
            })
        }
    });

    let config = RunConfig::new("tags").count(2000).workers(20).verbose(1);
    let run = stampede::start(workload, config).await.unwrap();
    let summary = run.wait().await.unwrap();

    let estimate = summary.counting as f64;
    assert!(
        (estimate - 2000.0).abs() / 2000.0 < 0.02,
        "estimate {estimate} outside 2% of 2000"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn latency_percentiles_are_ordered() {
    init();

    let workload = workload_fn("jittery", || async {
        let normal = SkewNormal::<f64>::new(0.002, 0.001, 5.0).unwrap();
        let secs: f64 = normal.sample(&mut rand::thread_rng()).max(0.0);
        Ok::<_, WorkloadError>(Outcome {
            cost: Some(Duration::from_secs_f64(secs)),
            ..Default::default()
        })
    });

    let run = stampede::start(workload, RunConfig::new("jitter").count(500).workers(25))
        .await
        .unwrap();
    let summary = run.wait().await.unwrap();

    assert_eq!(summary.count, 500);
    for pair in summary.percentiles.windows(2) {
        assert!(pair[0].latency <= pair[1].latency);
    }
    assert!(summary.latency.min <= summary.latency.mean);
    assert!(summary.latency.mean <= summary.latency.max);
}

#[tokio::test(start_paused = true)]
async fn think_time_runs_complete() {
    init();

    let config = RunConfig::new("think")
        .count(50)
        .workers(5)
        .think("1ms-2ms".parse().unwrap());
    let run = stampede::start(ok_workload(), config).await.unwrap();
    let summary = run.wait().await.unwrap();
    assert_eq!(summary.count, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn final_snapshot_reports_throughput() {
    init();

    let total = Arc::new(AtomicU64::new(0));
    let workload = workload_fn("bytes", move || {
        let total = Arc::clone(&total);
        async move {
            let read = total.fetch_add(1024, Ordering::Relaxed) + 1024;
            Ok::<_, WorkloadError>(Outcome {
                read_bytes: read,
                write_bytes: read / 2,
                ..Default::default()
            })
        }
    });

    let run = stampede::start(workload, RunConfig::new("bytes").count(200).workers(10))
        .await
        .unwrap();
    let summary = run.wait().await.unwrap();

    assert_eq!(summary.count, 200);
    assert!(summary.read_throughput > 0.0);
    assert!(summary.write_throughput > 0.0);
    assert!(summary.rps > 0.0);
}
