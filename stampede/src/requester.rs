//! The concurrency scheduler: owns the worker population, the global
//! invocation budget, the deadline and the outcome pipeline.

use crate::config::{RunConfig, DEFAULT_RAMP_INTERVAL};
use crate::limiter::rate_limiter;
use crate::record::{OutcomeRecord, RecordPool};
use crate::workload::Workload;
use governor::DefaultDirectRateLimiter;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Upper bound on the outcome pipeline capacity, regardless of worker count.
const MAX_PIPELINE_CAPACITY: usize = 8192;

/// Drives the configured worker population. Each worker repeatedly invokes
/// the workload, publishes one [`OutcomeRecord`] per invocation, and stops
/// when its cancellation token fires or the invocation budget runs out.
///
/// Deadline expiry and an external stop converge on the run-scoped token;
/// budget exhaustion retires each worker as it claims an empty slot, so
/// every successfully claimed invocation completes. Either way the pipeline
/// closes exactly once, when the last worker drops its sender.
pub struct Requester<W> {
    workload: Arc<W>,
    config: Arc<RunConfig>,
    token: CancellationToken,
    budget: Option<Arc<AtomicI64>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pool: Arc<RecordPool>,
    active: Arc<AtomicI64>,
    records: mpsc::Sender<Box<OutcomeRecord>>,
}

impl<W: Workload> Requester<W> {
    pub(crate) fn new(
        workload: Arc<W>,
        config: Arc<RunConfig>,
        pool: Arc<RecordPool>,
        active: Arc<AtomicI64>,
    ) -> (Self, mpsc::Receiver<Box<OutcomeRecord>>) {
        let capacity = (config.workers * 100).clamp(1, MAX_PIPELINE_CAPACITY);
        let (records, rx) = mpsc::channel(capacity);
        let budget = (config.n > 0).then(|| Arc::new(AtomicI64::new(config.n as i64)));
        let limiter = rate_limiter(config.qps).map(Arc::new);

        let requester = Self {
            workload,
            config,
            token: CancellationToken::new(),
            budget,
            limiter,
            pool,
            active,
            records,
        };
        (requester, rx)
    }

    /// Run-scoped cancellation handle. Cancelling it is the external
    /// interrupt: workers observe it at their next loop check.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Realizes the configured run: spawns the population (ramped or all at
    /// once), waits for every worker to stop, then closes the pipeline by
    /// dropping the last sender.
    pub async fn run(self) {
        if let Some(duration) = self.config.duration {
            let token = self.token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => token.cancel(),
                    _ = token.cancelled() => {}
                }
            });
        }

        let mut workers = Vec::with_capacity(self.config.workers);
        if self.config.ramp.is_empty() {
            for _ in 0..self.config.workers {
                workers.push(self.spawn_worker(self.token.clone()));
            }
        } else {
            self.run_ramp(&mut workers).await;
        }

        for worker in workers {
            let _ = worker.await;
        }

        self.token.cancel();
        debug!("all workers stopped");
    }

    /// Starts `up` workers per interval tick until the maximum, sits at full
    /// concurrency for the grace ticks, then (if `down` > 0) cancels workers
    /// in reverse start order, `down` per tick, until none remain.
    async fn run_ramp(&self, workers: &mut Vec<JoinHandle<()>>) {
        let ramp = &self.config.ramp;
        let interval_dur = if ramp.interval.is_zero() {
            DEFAULT_RAMP_INTERVAL
        } else {
            ramp.interval
        };
        let mut ticker = interval(interval_dur);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // NOTE: First tick completes instantly
        ticker.tick().await;

        let max = self.config.workers;
        let mut tokens: Vec<CancellationToken> = Vec::with_capacity(max);

        if ramp.up == 0 {
            for _ in 0..max {
                let token = self.token.child_token();
                workers.push(self.spawn_worker(token.clone()));
                tokens.push(token);
            }
        } else {
            while tokens.len() < max {
                let batch = ramp.up.min(max - tokens.len());
                for _ in 0..batch {
                    let token = self.token.child_token();
                    workers.push(self.spawn_worker(token.clone()));
                    tokens.push(token);
                }
                debug!(active = tokens.len(), "ramped up");
                if !self.tick(&mut ticker).await {
                    return;
                }
            }
        }

        for _ in 0..self.config.ramp_grace_ticks {
            if !self.tick(&mut ticker).await {
                return;
            }
        }

        if ramp.down > 0 {
            while !tokens.is_empty() {
                if !self.tick(&mut ticker).await {
                    return;
                }
                for _ in 0..ramp.down {
                    match tokens.pop() {
                        Some(token) => token.cancel(),
                        None => break,
                    }
                }
                debug!(active = tokens.len(), "ramped down");
            }
            self.tick(&mut ticker).await;
        }
    }

    /// Waits for the next ramp tick; false once the run itself is cancelled.
    async fn tick(&self, ticker: &mut Interval) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = ticker.tick() => true,
        }
    }

    fn spawn_worker(&self, token: CancellationToken) -> JoinHandle<()> {
        let workload = Arc::clone(&self.workload);
        let config = Arc::clone(&self.config);
        let budget = self.budget.clone();
        let limiter = self.limiter.clone();
        let pool = Arc::clone(&self.pool);
        let active = Arc::clone(&self.active);
        let records = self.records.clone();

        tokio::spawn(async move {
            active.fetch_add(1, Ordering::SeqCst);

            loop {
                // A non-positive slot means the budget is spent: this
                // worker retires, and the rest follow as they each claim.
                // The run token stays untouched so workers holding a
                // claimed slot still carry that invocation through the
                // rate limiter.
                if let Some(budget) = &budget {
                    if budget.fetch_sub(1, Ordering::SeqCst) <= 0 {
                        break;
                    }
                }

                match &limiter {
                    Some(limiter) => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = limiter.until_ready() => {}
                        }
                    }
                    None => {
                        if token.is_cancelled() {
                            break;
                        }
                    }
                }

                let mut record = pool.acquire();
                let start = Instant::now();
                match workload.invoke(&config).await {
                    Ok(outcome) => {
                        record.cost = outcome.cost.unwrap_or_else(|| start.elapsed());
                        record.code = outcome.status;
                        if config.verbose >= 1 {
                            record.counting = outcome.counting;
                        }
                        record.read_bytes = outcome.read_bytes;
                        record.write_bytes = outcome.write_bytes;
                    }
                    Err(err) => {
                        record.cost = start.elapsed();
                        record.error = err.to_string();
                    }
                }

                // The collector may already be gone when a shutdown trigger
                // fired mid-invocation; a rejected publish is benign.
                if records.send(record).await.is_err() {
                    break;
                }

                if let Some(think) = &config.think {
                    tokio::time::sleep(think.think()).await;
                }
            }

            active.fetch_sub(1, Ordering::SeqCst);
        })
    }
}
