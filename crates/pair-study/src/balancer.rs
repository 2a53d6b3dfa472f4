//! Worker count for a run
//!
//! Never more processes than the caller asked for, and never so many that a
//! process gets fewer than `min_batch` scenarios (unless only one is left).

use crate::{BuildError, Result};

pub fn balance_worker_count(
    requested: usize,
    scenario_count: usize,
    min_batch: usize,
) -> Result<usize> {
    if scenario_count == 0 {
        return Err(BuildError::NoStationPairs);
    }
    let by_batch = scenario_count / min_batch.max(1);
    Ok(by_batch.clamp(1, requested.max(1)))
}
