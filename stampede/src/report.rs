//! The streaming aggregator: ingests outcome records from the pipeline and
//! serves consistent point-in-time snapshots while ingestion continues.

use crate::record::{OutcomeRecord, RecordPool};
use crate::stats::{merge_codes, Histogram, RunningStats};
use parking_lot::Mutex;
use pdatastructs::hyperloglog::HyperLogLog;
use pdatastructs::tdigest::{TDigest, K1};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Percentiles every snapshot reports, in ascending order.
pub const QUANTILES: [f64; 7] = [0.50, 0.75, 0.90, 0.95, 0.99, 0.999, 0.9999];

const HISTOGRAM_BINS: usize = 8;
const TDIGEST_BACKLOG_SIZE: usize = 100;
/// 2^16 HyperLogLog registers, roughly 0.4% relative error.
const HLL_ADDRESS_BITS: usize = 16;

/// All mutable aggregate state, guarded by one coarse lock. Every fold is a
/// commutative operation, so arrival order across workers does not matter.
struct Aggregates {
    latency: RunningStats,
    rps: RunningStats,
    sketch: TDigest<K1>,
    histogram: Histogram,
    codes: HashMap<String, u64>,
    errors: HashMap<String, u64>,
    counting: HyperLogLog<String>,
    read_bytes: u64,
    write_bytes: u64,

    // Latency observed strictly within the current second, swapped out by
    // the 1Hz tick for charting.
    within_sec_tmp: RunningStats,
    within_sec: RunningStats,
    rps_within_sec: f64,
    no_data_within_sec: bool,
    last_count: u64,
    last_tick: Instant,
}

impl Aggregates {
    fn new(start: Instant) -> Self {
        Self {
            latency: RunningStats::default(),
            rps: RunningStats::default(),
            sketch: default_tdigest(),
            histogram: Histogram::new(HISTOGRAM_BINS),
            codes: HashMap::new(),
            errors: HashMap::new(),
            counting: HyperLogLog::new(HLL_ADDRESS_BITS),
            read_bytes: 0,
            write_bytes: 0,
            within_sec_tmp: RunningStats::default(),
            within_sec: RunningStats::default(),
            rps_within_sec: 0.0,
            no_data_within_sec: true,
            last_count: 0,
            last_tick: start,
        }
    }
}

/// Lock-protected streaming aggregator over the outcome pipeline.
///
/// One dedicated consumer task runs [`collect`]; any number of readers may
/// call [`snapshot`] and [`charts`] concurrently. The lock is held for
/// O(distinct codes + distinct errors + fixed percentiles + histogram bins),
/// never O(total records).
///
/// [`collect`]: StreamReport::collect
/// [`snapshot`]: StreamReport::snapshot
/// [`charts`]: StreamReport::charts
pub struct StreamReport {
    start: Instant,
    agg: Mutex<Aggregates>,
    pool: Arc<RecordPool>,
    active: Arc<AtomicI64>,
    done: CancellationToken,
}

impl StreamReport {
    pub(crate) fn new(pool: Arc<RecordPool>, active: Arc<AtomicI64>) -> Self {
        let start = Instant::now();
        Self {
            start,
            agg: Mutex::new(Aggregates::new(start)),
            pool,
            active,
            done: CancellationToken::new(),
        }
    }

    /// Drains the pipeline until it is closed and empty, then fires the
    /// done signal exactly once. Runs the 1Hz rate tick on the side.
    pub async fn collect(self: Arc<Self>, mut records: mpsc::Receiver<Box<OutcomeRecord>>) {
        let ticker = Arc::clone(&self);
        let tick_task = tokio::spawn(async move { ticker.run_ticker().await });

        while let Some(record) = records.recv().await {
            self.ingest(&record);
            self.pool.release(record);
        }

        debug!("record pipeline drained");
        self.done.cancel();
        let _ = tick_task.await;
    }

    fn ingest(&self, record: &OutcomeRecord) {
        let cost = record.cost.as_secs_f64();
        let mut agg = self.agg.lock();

        agg.latency.update(cost);
        agg.within_sec_tmp.update(cost);
        // The sketch's compression requires distinguishable samples; a
        // picosecond tie-breaker keeps constant-cost streams inside that
        // contract without moving any quantile measurably.
        let tie = agg.latency.count() as f64 * 1e-12;
        agg.sketch.insert(cost + tie);
        agg.histogram.insert(cost);

        for key in merge_codes(&record.code) {
            *agg.codes.entry(key).or_insert(0) += 1;
        }
        if !record.error.is_empty() {
            *agg.errors.entry(record.error.clone()).or_insert(0) += 1;
        }
        for tag in &record.counting {
            agg.counting.add(tag);
        }

        agg.read_bytes = record.read_bytes;
        agg.write_bytes = record.write_bytes;
    }

    /// Once per second: derive the instantaneous request rate from the count
    /// delta and publish the within-second latency distribution. A second
    /// with no records is marked "no data" rather than folded in as a zero
    /// rate, so idle gaps (e.g. ramp pauses) do not bias the RPS stats.
    async fn run_ticker(&self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // NOTE: First tick completes instantly
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.done.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let mut agg = self.agg.lock();
            let delta = agg.latency.count() - agg.last_count;
            if delta > 0 {
                let rps = delta as f64 / agg.last_tick.elapsed().as_secs_f64();
                agg.rps.update(rps);
                agg.last_count = agg.latency.count();
                agg.last_tick = Instant::now();

                agg.within_sec = agg.within_sec_tmp;
                agg.rps_within_sec = rps;
                agg.within_sec_tmp.reset();
                agg.no_data_within_sec = false;
            } else {
                agg.no_data_within_sec = true;
            }
        }
    }

    /// Immutable point-in-time copy of the aggregate statistics. Safe to
    /// call at arbitrary frequency concurrently with ingestion.
    pub fn snapshot(&self) -> SnapshotReport {
        let agg = self.agg.lock();

        let elapsed = self.start.elapsed();
        let elapsed_sec = elapsed.as_secs_f64().max(f64::MIN_POSITIVE);
        let count = agg.latency.count();

        let rps_stats = (agg.rps.count() > 0).then(|| SnapshotRpsStats {
            min: agg.rps.min(),
            mean: agg.rps.mean(),
            std_dev: agg.rps.stddev(),
            max: agg.rps.max(),
        });

        let percentiles = QUANTILES
            .iter()
            .map(|&percentile| SnapshotPercentile {
                percentile,
                latency: duration_from_secs(agg.sketch.quantile(percentile)),
            })
            .collect();

        let histogram = agg
            .histogram
            .bins()
            .iter()
            .map(|bin| SnapshotHistogram {
                mean: duration_from_secs(bin.value),
                count: bin.count,
            })
            .collect();

        SnapshotReport {
            elapsed,
            count,
            rps: count as f64 / elapsed_sec,
            read_throughput: agg.read_bytes as f64 / 1024.0 / 1024.0 / elapsed_sec,
            write_throughput: agg.write_bytes as f64 / 1024.0 / 1024.0 / elapsed_sec,
            counting: agg.counting.count() as u64,
            codes: agg.codes.clone(),
            errors: agg.errors.clone(),
            latency: SnapshotStats {
                min: duration_from_secs(agg.latency.min()),
                mean: duration_from_secs(agg.latency.mean()),
                std_dev: duration_from_secs(agg.latency.stddev()),
                max: duration_from_secs(agg.latency.max()),
            },
            rps_stats,
            percentiles,
            histogram,
        }
    }

    /// Lower-resolution per-second view for charting. `None` when no record
    /// arrived within the last second.
    pub fn charts(&self) -> Option<ChartsReport> {
        let agg = self.agg.lock();
        if agg.no_data_within_sec {
            return None;
        }

        let within = &agg.within_sec;
        Some(ChartsReport {
            rps: agg.rps_within_sec,
            latency: SnapshotStats {
                min: duration_from_secs(within.min()),
                mean: duration_from_secs(within.mean()),
                std_dev: duration_from_secs(within.stddev()),
                max: duration_from_secs(within.max()),
            },
            latency_percentiles: QUANTILES
                .iter()
                .map(|&q| duration_from_secs(agg.sketch.quantile(q)))
                .collect(),
            concurrent: self.active.load(Ordering::Relaxed),
        })
    }

    /// Resolves once ingestion has fully drained after run termination,
    /// regardless of which trigger ended the run.
    pub async fn done(&self) {
        self.done.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Number of workers currently inside their run loop.
    pub fn active_workers(&self) -> i64 {
        self.active.load(Ordering::Relaxed)
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.0), TDIGEST_BACKLOG_SIZE)
}

// An empty sketch yields NaN quantiles.
fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotStats {
    pub min: Duration,
    pub mean: Duration,
    pub std_dev: Duration,
    pub max: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapshotRpsStats {
    pub min: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapshotPercentile {
    pub percentile: f64,
    pub latency: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotHistogram {
    pub mean: Duration,
    pub count: u64,
}

/// Point-in-time copy of the aggregate statistics; holds no reference to
/// the live aggregate.
#[derive(Clone, Debug)]
pub struct SnapshotReport {
    pub elapsed: Duration,
    pub count: u64,
    /// All-time rate: `count / elapsed`.
    pub rps: f64,
    /// MiB/s derived from the cumulative read counter.
    pub read_throughput: f64,
    /// MiB/s derived from the cumulative write counter.
    pub write_throughput: f64,
    /// Estimated distinct counting-tag count.
    pub counting: u64,
    pub codes: HashMap<String, u64>,
    pub errors: HashMap<String, u64>,
    pub latency: SnapshotStats,
    /// `None` until the first 1Hz sample lands.
    pub rps_stats: Option<SnapshotRpsStats>,
    pub percentiles: Vec<SnapshotPercentile>,
    pub histogram: Vec<SnapshotHistogram>,
}

/// One second's worth of data for live charting.
#[derive(Clone, Debug)]
pub struct ChartsReport {
    /// Rate observed within the last second.
    pub rps: f64,
    /// Latency distribution within the last second.
    pub latency: SnapshotStats,
    /// All-time percentiles at [`QUANTILES`].
    pub latency_percentiles: Vec<Duration>,
    /// Active worker count at the time of the call.
    pub concurrent: i64,
}
