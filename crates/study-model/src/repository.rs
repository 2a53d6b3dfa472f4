//! Study repository interface
//!
//! The persistent store is an external collaborator. A build holds an
//! exclusive [`StudyLock`] for its whole duration; every save under the lock
//! bumps the generation so stale holders can be detected later.
//!
//! [`InMemoryRepository`] implements both traits for tests and the CLI.

use crate::station::Station;
use crate::study::Study;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Study not found: {0}")]
    NotFound(String),
    #[error("Study {0} is locked by another session")]
    Locked(String),
    #[error("Study {0} is not locked")]
    NotLocked(String),
    #[error("Lock for study {study_id} is stale (held generation {held}, current {current})")]
    StaleLock {
        study_id: String,
        held: u64,
        current: u64,
    },
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Exclusive edit lock on a study
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyLock {
    pub study_id: String,
    pub token: Uuid,
    /// Number of saves made under this lock
    pub generation: u64,
    pub acquired_at: DateTime<Utc>,
}

impl StudyLock {
    /// Same study, same token, same generation
    pub fn matches(&self, other: &StudyLock) -> bool {
        self.study_id == other.study_id
            && self.token == other.token
            && self.generation == other.generation
    }
}

pub trait StudyRepository: Send + Sync {
    fn acquire_lock(&self, study_id: &str) -> RepositoryResult<StudyLock>;

    fn current_lock(&self, study_id: &str) -> RepositoryResult<Option<StudyLock>>;

    fn load(&self, lock: &StudyLock) -> RepositoryResult<Study>;

    /// Persist the study and return the lock at its new generation
    fn save(&self, study: &Study, lock: &StudyLock) -> RepositoryResult<StudyLock>;

    fn release_lock(&self, lock: &StudyLock) -> RepositoryResult<()>;
}

/// Durable, cross-build store of replicated stations
pub trait SharedReplicationStore {
    fn find_shared_replication(
        &self,
        dataset_key: &str,
        record_id: &str,
        channel: u16,
    ) -> Option<Station>;
}

#[derive(Default)]
struct RepoData {
    studies: HashMap<String, Study>,
    locks: HashMap<String, StudyLock>,
}

#[derive(Clone, Default)]
pub struct InMemoryRepository {
    data: Arc<RwLock<RepoData>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a study outside of any lock
    pub fn insert_study(&self, study: Study) {
        self.data.write().studies.insert(study.id.clone(), study);
    }

    pub fn study_snapshot(&self, study_id: &str) -> Option<Study> {
        self.data.read().studies.get(study_id).cloned()
    }

    fn check_lock(data: &RepoData, lock: &StudyLock) -> RepositoryResult<()> {
        let current = data
            .locks
            .get(&lock.study_id)
            .ok_or_else(|| RepositoryError::NotLocked(lock.study_id.clone()))?;
        if current.token != lock.token {
            return Err(RepositoryError::Locked(lock.study_id.clone()));
        }
        if current.generation != lock.generation {
            return Err(RepositoryError::StaleLock {
                study_id: lock.study_id.clone(),
                held: lock.generation,
                current: current.generation,
            });
        }
        Ok(())
    }
}

impl StudyRepository for InMemoryRepository {
    fn acquire_lock(&self, study_id: &str) -> RepositoryResult<StudyLock> {
        let mut data = self.data.write();
        if !data.studies.contains_key(study_id) {
            return Err(RepositoryError::NotFound(study_id.to_string()));
        }
        if data.locks.contains_key(study_id) {
            return Err(RepositoryError::Locked(study_id.to_string()));
        }
        let lock = StudyLock {
            study_id: study_id.to_string(),
            token: Uuid::new_v4(),
            generation: 0,
            acquired_at: Utc::now(),
        };
        debug!("Locked study {} with token {}", study_id, lock.token);
        data.locks.insert(study_id.to_string(), lock.clone());
        Ok(lock)
    }

    fn current_lock(&self, study_id: &str) -> RepositoryResult<Option<StudyLock>> {
        let data = self.data.read();
        if !data.studies.contains_key(study_id) {
            return Err(RepositoryError::NotFound(study_id.to_string()));
        }
        Ok(data.locks.get(study_id).cloned())
    }

    fn load(&self, lock: &StudyLock) -> RepositoryResult<Study> {
        let data = self.data.read();
        Self::check_lock(&data, lock)?;
        let mut study = data
            .studies
            .get(&lock.study_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(lock.study_id.clone()))?;
        study.reindex();
        Ok(study)
    }

    fn save(&self, study: &Study, lock: &StudyLock) -> RepositoryResult<StudyLock> {
        let mut data = self.data.write();
        Self::check_lock(&data, lock)?;
        data.studies.insert(lock.study_id.clone(), study.clone());

        let mut next = lock.clone();
        next.generation += 1;
        data.locks.insert(lock.study_id.clone(), next.clone());
        debug!(
            "Saved study {} at generation {}",
            lock.study_id, next.generation
        );
        Ok(next)
    }

    fn release_lock(&self, lock: &StudyLock) -> RepositoryResult<()> {
        let mut data = self.data.write();
        Self::check_lock(&data, lock)?;
        data.locks.remove(&lock.study_id);
        Ok(())
    }
}

impl SharedReplicationStore for InMemoryRepository {
    fn find_shared_replication(
        &self,
        dataset_key: &str,
        record_id: &str,
        channel: u16,
    ) -> Option<Station> {
        let data = self.data.read();
        data.studies
            .values()
            .flat_map(|s| s.stations.iter())
            .find(|s| {
                s.is_replica()
                    && s.channel == channel
                    && s.external_record.as_ref().map_or(false, |r| {
                        r.dataset_key == dataset_key && r.record_id == record_id
                    })
            })
            .cloned()
    }
}
