#![doc = include_str!("../README.md")]

pub mod config;
pub mod report;
pub mod requester;
pub mod runner;
pub mod workload;

pub(crate) mod limiter;
pub(crate) mod record;
pub(crate) mod stats;

mod error;

pub use config::{RampSpec, RunConfig, ThinkTime};
pub use error::Error;
pub use report::{ChartsReport, SnapshotReport, StreamReport};
pub use runner::{start, BenchRun};
pub use workload::{workload_fn, InitHints, Outcome, Workload, WorkloadError};

pub mod prelude {
    pub use crate::config::{RampSpec, RunConfig, ThinkTime};
    pub use crate::error::Error;
    pub use crate::report::{ChartsReport, SnapshotReport, StreamReport};
    pub use crate::runner::{start, BenchRun};
    pub use crate::workload::{workload_fn, InitHints, Outcome, Workload, WorkloadError};
}
