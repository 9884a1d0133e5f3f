use thiserror::Error;

/// Error type workloads report at the trait boundary. Invocation failures
/// never surface through [`Error`]; they end up in the error tally instead.
pub type WorkloadError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// The workload failed to initialize. Fatal: no workers were started.
    #[error("workload init failed: {0}")]
    Init(#[source] WorkloadError),

    /// The workload failed to finalize after the run completed.
    #[error("workload finalize failed: {0}")]
    Finalize(#[source] WorkloadError),
}
