//! The workload contract: the pluggable unit of work the engine drives.

use crate::config::RunConfig;
pub use crate::error::WorkloadError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The result of one workload invocation.
#[derive(Clone, Debug, Default)]
pub struct Outcome {
    /// Cumulative bytes read by the workload so far, not a per-invocation
    /// delta.
    pub read_bytes: u64,
    /// Cumulative bytes written by the workload so far.
    pub write_bytes: u64,
    /// Ordered status tags, e.g. one HTTP status code per step of a
    /// multi-step profile.
    pub status: Vec<String>,
    /// Free-form tags fed into the distinct-count estimate, e.g. connection
    /// identities.
    pub counting: Vec<String>,
    /// Self-measured cost. When `None` the engine records the elapsed time
    /// of the invocation.
    pub cost: Option<Duration>,
}

/// Options a workload may hand back from [`Workload::init`] for downstream
/// consumers (printers, chart servers).
#[derive(Clone, Copy, Debug, Default)]
pub struct InitHints {
    pub no_report: bool,
}

/// A unit of work with lifecycle hooks. The requester calls [`invoke`] once
/// per scheduled invocation.
///
/// An `invoke` failure is recorded on the outcome record and never aborts
/// the run; an [`init`] failure aborts the run before any workers start.
///
/// [`invoke`]: Workload::invoke
/// [`init`]: Workload::init
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn init(&self, _config: &RunConfig) -> Result<InitHints, WorkloadError> {
        Ok(InitHints::default())
    }

    async fn invoke(&self, config: &RunConfig) -> Result<Outcome, WorkloadError>;

    async fn finalize(&self, _config: &RunConfig) -> Result<(), WorkloadError> {
        Ok(())
    }
}

/// Wraps a bare async function into a [`Workload`] with no-op init/finalize.
pub struct WorkloadFn<F> {
    name: String,
    func: F,
}

pub fn workload_fn<F, Fut>(name: &str, func: F) -> WorkloadFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome, WorkloadError>> + Send,
{
    WorkloadFn {
        name: name.to_string(),
        func,
    }
}

#[async_trait]
impl<F, Fut> Workload for WorkloadFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome, WorkloadError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _config: &RunConfig) -> Result<Outcome, WorkloadError> {
        (self.func)().await
    }
}
