//! Pairwise Interference Study Builder
//!
//! Expands a baseline broadcast study into one interference scenario per
//! (desired station, study channel) combination and orders the scenarios into
//! a work queue for the external compute engines.
//!
//! # Build Pipeline
//!
//! ```text
//! validate → for each desired d, channel c:
//!              replicate d onto c
//!              for each other station u, delta in -1..=1:
//!                  distance(d@c, u) ≤ rule(d, u, delta).max  ⇒  add u@(c+delta)
//!          → sort by desired coordinate → FIFO queue → (after the run) restore
//! ```
//!
//! | Stage | Module |
//! |-------|--------|
//! | Preconditions | [`validator`] |
//! | Site distances | [`geometry`] |
//! | Rule lookup | [`rules`] |
//! | Channel replicas | [`replication`] |
//! | Scenario assembly | [`assembler`] |
//! | Ordering + queue | [`scheduler`] |
//! | Worker count | [`balancer`] |
//! | Cleanup | [`restore`] |

use study_model::{ModelError, RepositoryError};
use thiserror::Error;

pub mod assembler;
pub mod balancer;
pub mod cancel;
pub mod config;
pub mod geometry;
pub mod pipeline;
pub mod replication;
pub mod report;
pub mod restore;
pub mod rules;
pub mod scheduler;
pub mod validator;

pub use cancel::CancelFlag;
pub use config::{parse_channel_list, BuildConfig, Envelope};
pub use pipeline::{build, prepare_run, BuildOutcome, BuildRequest, PreparedRun};
pub use replication::{DigitalReplicator, ReplicationCache, ReplicationError, Replicator};
pub use report::{BuildReport, BuildStats};
pub use restore::{restore_study, RestoreError, RestoreSummary};
pub use scheduler::{ScenarioQueue, ScenarioSortKey, SortAxis};
pub use validator::{ValidatedStudy, ValidationError};

/// Smallest number of scenarios handed to each worker process
pub const DEFAULT_MIN_BATCH_SIZE: usize = 5;

/// Cell size (km) a pair study must be run at
pub const DEFAULT_CELL_SIZE_KM: f64 = 2.0;

/// Default worker processes requested by the CLI
pub const DEFAULT_WORKER_COUNT: usize = 4;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Study validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Cannot materialize a required channel representation: {0}")]
    Replication(#[from] ReplicationError),
    #[error("No station pairs found")]
    NoStationPairs,
    #[error("Build cancelled")]
    Cancelled,
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Study data error: {0}")]
    Model(#[from] ModelError),
}

impl BuildError {
    /// Message for the caller's log surface; cancellation reports nothing
    pub fn user_message(&self) -> Option<String> {
        match self {
            BuildError::Cancelled => None,
            other => Some(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
