//! Wires a workload, a requester and a stream report into a running
//! benchmark and hands back the control surface consumers poll.

use crate::config::RunConfig;
use crate::error::Error;
use crate::record::RecordPool;
use crate::report::{SnapshotReport, StreamReport};
use crate::requester::Requester;
use crate::workload::{InitHints, Workload};
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Starts a benchmark run: initializes the workload (a failure here is
/// fatal and aborts before any workers start), then spawns the requester
/// driver and the report collector.
pub async fn start<W: Workload>(workload: W, mut config: RunConfig) -> Result<BenchRun<W>, Error> {
    config.normalize();
    let workload = Arc::new(workload);
    let config = Arc::new(config);

    let hints = workload.init(&config).await.map_err(Error::Init)?;
    info!(name = %config.name, workload = workload.name(), "starting run");

    let pool = Arc::new(RecordPool::new());
    let active = Arc::new(AtomicI64::new(0));
    let (requester, records) = Requester::new(
        Arc::clone(&workload),
        Arc::clone(&config),
        Arc::clone(&pool),
        Arc::clone(&active),
    );
    let token = requester.cancel_token();
    let report = Arc::new(StreamReport::new(pool, active));

    let driver = tokio::spawn(requester.run());
    let collector = tokio::spawn(Arc::clone(&report).collect(records));

    Ok(BenchRun {
        workload,
        config,
        hints,
        report,
        token,
        driver,
        collector,
    })
}

/// Handle to a running benchmark. Consumers poll [`report`] on their own
/// cadence; [`wait`] joins everything and returns the final snapshot.
///
/// [`report`]: BenchRun::report
/// [`wait`]: BenchRun::wait
pub struct BenchRun<W> {
    workload: Arc<W>,
    config: Arc<RunConfig>,
    hints: InitHints,
    report: Arc<StreamReport>,
    token: CancellationToken,
    driver: JoinHandle<()>,
    collector: JoinHandle<()>,
}

impl<W: Workload> BenchRun<W> {
    pub fn report(&self) -> Arc<StreamReport> {
        Arc::clone(&self.report)
    }

    pub fn hints(&self) -> InitHints {
        self.hints
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Operator-requested stop. Idempotent and safe to call concurrently
    /// with the other termination triggers; in-flight invocations finish.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Waits for the run to terminate (budget exhausted, deadline elapsed or
    /// [`stop`] called), finalizes the workload and returns the final
    /// snapshot. A run interrupted early still reports its partial results.
    ///
    /// [`stop`]: BenchRun::stop
    pub async fn wait(self) -> Result<SnapshotReport, Error> {
        let _ = self.driver.await;
        let _ = self.collector.await;
        self.report.done().await;

        self.workload
            .finalize(&self.config)
            .await
            .map_err(Error::Finalize)?;

        Ok(self.report.snapshot())
    }
}
