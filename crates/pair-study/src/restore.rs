//! Post-run cleanup
//!
//! Drops every generated scenario along with its parameter overrides and
//! station entries. Replicas backed by an external record stay in the study so
//! the next build can reuse them. Replicas of local-only sources cannot be
//! reused, so they are dropped unless the baseline still references them.

use serde::Serialize;
use std::collections::HashSet;
use study_model::{RepositoryError, ScenarioKey, SourceKey, StudyLock, StudyRepository, Study};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Study {study_id} was modified or unlocked since the build, not restoring")]
    LockMismatch { study_id: String },
    #[error("Study {0} has no baseline scenario")]
    NoBaseline(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub type RestoreResult<T> = std::result::Result<T, RestoreError>;

#[derive(Debug, Clone, Serialize)]
pub struct RestoreSummary {
    pub scenarios_removed: usize,
    pub entries_removed: usize,
    pub parameters_removed: usize,
    /// Local-only replicas removed from the arena
    pub replicas_dropped: usize,
    pub stations_kept: usize,
    /// Lock after the restoring save
    #[serde(skip)]
    pub lock: Option<StudyLock>,
}

/// Remove everything but `baseline` from the scenario list
pub fn strip_generated(study: &mut Study, baseline: ScenarioKey) -> RestoreSummary {
    let entries_removed = study
        .scenarios
        .iter()
        .filter(|s| s.key != baseline)
        .map(|s| s.entries.len())
        .sum();
    let scenarios_before = study.scenarios.len();
    study.scenarios.retain(|s| s.key == baseline);

    let parameters_before = study.parameters.len();
    study.parameters.retain(|p| p.scenario == baseline);

    let referenced: HashSet<SourceKey> = study
        .scenarios
        .iter()
        .flat_map(|s| s.entries.iter().map(|e| e.source))
        .collect();
    let stations_before = study.stations.len();
    study.stations.retain(|s| {
        !s.is_replica() || s.external_record.is_some() || referenced.contains(&s.key)
    });
    study.reindex();

    RestoreSummary {
        scenarios_removed: scenarios_before - study.scenarios.len(),
        entries_removed,
        parameters_removed: parameters_before - study.parameters.len(),
        replicas_dropped: stations_before - study.stations.len(),
        stations_kept: study.stations.len(),
        lock: None,
    }
}

/// Return a study to its pre-build scenario set
///
/// `lock` must still be the repository's current lock for the study, at the
/// same generation. The lock stays held; the caller releases it.
pub fn restore_study(
    repository: &dyn StudyRepository,
    study_id: &str,
    lock: &StudyLock,
) -> RestoreResult<RestoreSummary> {
    let current = repository.current_lock(study_id)?;
    if lock.study_id != study_id || !current.is_some_and(|c| c.matches(lock)) {
        return Err(RestoreError::LockMismatch {
            study_id: study_id.to_string(),
        });
    }

    let mut study = repository.load(lock)?;
    let baseline = study
        .baseline_key()
        .ok_or_else(|| RestoreError::NoBaseline(study_id.to_string()))?;

    let mut summary = strip_generated(&mut study, baseline);
    summary.lock = Some(repository.save(&study, lock)?);

    info!(
        "Restored {}: dropped {} scenarios, {} overrides, {} local replicas; {} stations kept",
        study_id,
        summary.scenarios_removed,
        summary.parameters_removed,
        summary.replicas_dropped,
        summary.stations_kept
    );
    Ok(summary)
}
