//! Build entry points
//!
//! [`build`] works on a copy of the study and only hands it back when every
//! stage succeeded. [`prepare_run`] wraps it in the repository lock protocol:
//! lock, load, build, save, and release the lock again on any failure.

use crate::assembler::Assembler;
use crate::balancer::balance_worker_count;
use crate::cancel::CancelFlag;
use crate::config::BuildConfig;
use crate::replication::{ReplicationCache, ReplicationContext, Replicator};
use crate::report::BuildStats;
use crate::scheduler::{ScenarioQueue, SortAxis};
use crate::validator::validate;
use crate::Result;
use study_model::{SharedReplicationStore, Study, StudyLock, StudyRepository};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub channels: Vec<u16>,
    pub config: BuildConfig,
}

impl BuildRequest {
    pub fn new(channels: Vec<u16>) -> Self {
        Self {
            channels,
            config: BuildConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug)]
pub struct BuildOutcome {
    /// The study with replicas and generated scenarios added
    pub study: Study,
    pub queue: ScenarioQueue,
    pub stats: BuildStats,
}

/// Generate every pair scenario for `study`
///
/// `study` itself is never modified. On any error the working copy is dropped.
pub fn build(
    study: &Study,
    request: &BuildRequest,
    replicator: &dyn Replicator,
    store: &dyn SharedReplicationStore,
    cancel: &CancelFlag,
) -> Result<BuildOutcome> {
    let config = &request.config;
    let validated = validate(study, &request.channels, config)?;

    let mut working = study.clone();
    working.reindex();
    let mut cache = ReplicationCache::seeded_from(&working);
    let ctx = ReplicationContext { replicator, store };

    let assembly = Assembler::new(&working, &validated, config, ctx, cancel)?
        .run(&mut working, &mut cache)?;
    cancel.check()?;

    let workers = balance_worker_count(
        config.requested_workers,
        assembly.scenarios.len(),
        config.min_batch_size,
    )?;

    let axis = SortAxis::choose(
        validated
            .desired
            .iter()
            .filter_map(|&k| working.station(k))
            .map(|s| s.location),
    );
    let queue = ScenarioQueue::new(axis, &assembly.scenarios, workers);
    let stats = BuildStats::new(
        &working.id,
        &validated.channels,
        assembly.stats,
        cache.stats(),
        &queue,
    );

    Ok(BuildOutcome {
        study: working,
        queue,
        stats,
    })
}

/// A saved build, ready for dispatch
#[derive(Debug)]
pub struct PreparedRun {
    pub study_id: String,
    /// Lock still held, at the generation of the build's save
    pub lock: StudyLock,
    pub study: Study,
    pub queue: ScenarioQueue,
    pub stats: BuildStats,
}

/// Lock, build and save a study held in `repository`
///
/// The lock is kept on success so the run can later be restored under it.
pub fn prepare_run<R>(
    repository: &R,
    study_id: &str,
    request: &BuildRequest,
    replicator: &dyn Replicator,
    cancel: &CancelFlag,
) -> Result<PreparedRun>
where
    R: StudyRepository + SharedReplicationStore,
{
    let lock = repository.acquire_lock(study_id)?;
    info!("Preparing pair study run for {}", study_id);

    match build_locked(repository, &lock, request, replicator, cancel) {
        Ok(run) => Ok(run),
        Err(e) => {
            if let Err(release) = repository.release_lock(&lock) {
                warn!("Failed to release lock on {}: {}", study_id, release);
            }
            Err(e)
        }
    }
}

fn build_locked<R>(
    repository: &R,
    lock: &StudyLock,
    request: &BuildRequest,
    replicator: &dyn Replicator,
    cancel: &CancelFlag,
) -> Result<PreparedRun>
where
    R: StudyRepository + SharedReplicationStore,
{
    let study = repository.load(lock)?;
    let outcome = build(&study, request, replicator, repository, cancel)?;
    let lock = repository.save(&outcome.study, lock)?;
    outcome.stats.log_summary();

    Ok(PreparedRun {
        study_id: lock.study_id.clone(),
        lock,
        study: outcome.study,
        queue: outcome.queue,
        stats: outcome.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{DigitalReplicator, ReplicationError};
    use crate::restore::restore_study;
    use crate::testutil::{lat_offset, rule, station, study};
    use crate::validator::ValidationError;
    use crate::BuildError;
    use study_model::{ExternalRecord, InMemoryRepository, ModelError, SourceKey, Station};

    type ReplicaResult = std::result::Result<Station, ReplicationError>;

    struct FailingReplicator;

    impl Replicator for FailingReplicator {
        fn replicate(&self, original: &Station, channel: u16) -> ReplicaResult {
            Err(ReplicationError::failed(original, channel, "no pattern data"))
        }
    }

    /// Replicates normally but raises the cancel flag on every call
    struct CancellingReplicator {
        flag: CancelFlag,
    }

    impl Replicator for CancellingReplicator {
        fn replicate(&self, original: &Station, channel: u16) -> ReplicaResult {
            self.flag.cancel();
            DigitalReplicator.replicate(original, channel)
        }
    }

    fn pair(rules: Vec<study_model::InterferenceRule>) -> Study {
        let mut d = station(100, 20, 40.0, -75.0);
        d.rule_extra_distance_km = 25.0;
        let u = station(200, 22, 40.0 + lat_offset(105.0), -75.0);
        study(vec![d, u], rules)
    }

    fn repository(s: Study) -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.insert_study(s);
        repo
    }

    #[test]
    fn test_build_leaves_input_untouched() {
        let s = pair(vec![rule(0, 100.0)]);
        let store = InMemoryRepository::new();
        let outcome = build(
            &s,
            &BuildRequest::new(vec![20]),
            &DigitalReplicator,
            &store,
            &CancelFlag::new(),
        )
        .unwrap();

        assert_eq!(s.scenarios.len(), 1);
        assert_eq!(s.stations.len(), 2);
        assert_eq!(outcome.study.scenarios.len(), 2);
        assert_eq!(outcome.study.stations.len(), 3);
        assert_eq!(outcome.queue.total_scenario_count(), 1);
        assert_eq!(outcome.queue.recommended_worker_count(), 1);
        assert_eq!(outcome.stats.scenario_count, 1);
        assert_eq!(outcome.stats.replicas_created, 1);
        // Desired stations are stacked on one meridian
        assert_eq!(outcome.stats.sort_axis, SortAxis::Latitude);
    }

    #[test]
    fn test_no_pairs_is_reported() {
        let s = pair(vec![rule(-1, 100.0)]);
        let store = InMemoryRepository::new();
        let err = build(
            &s,
            &BuildRequest::new(vec![22]),
            &DigitalReplicator,
            &store,
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::NoStationPairs));
        assert_eq!(err.user_message().as_deref(), Some("No station pairs found"));
    }

    #[test]
    fn test_validation_failure_aborts_before_work() {
        let s = pair(vec![rule(0, 100.0)]);
        let store = InMemoryRepository::new();
        let err = build(
            &s,
            &BuildRequest::new(vec![20, 20]),
            &DigitalReplicator,
            &store,
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Validation(ValidationError::DuplicateChannel(20))
        ));
    }

    #[test]
    fn test_prepare_run_saves_and_keeps_lock() {
        let repo = repository(pair(vec![rule(0, 100.0)]));
        let run = prepare_run(
            &repo,
            "pair-test",
            &BuildRequest::new(vec![20]),
            &DigitalReplicator,
            &CancelFlag::new(),
        )
        .unwrap();

        assert_eq!(run.lock.generation, 1);
        assert!(run
            .lock
            .matches(&repo.current_lock("pair-test").unwrap().unwrap()));
        let stored = repo.study_snapshot("pair-test").unwrap();
        assert_eq!(stored.scenarios.len(), 2);
        assert_eq!(run.queue.next_scenario(), Some(stored.scenarios[1].key));
    }

    #[test]
    fn test_cancelled_run_saves_nothing_and_unlocks() {
        let repo = repository(pair(vec![rule(0, 100.0)]));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = prepare_run(
            &repo,
            "pair-test",
            &BuildRequest::new(vec![20]),
            &DigitalReplicator,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
        assert_eq!(err.user_message(), None);
        assert_eq!(repo.study_snapshot("pair-test").unwrap().scenarios.len(), 1);
        assert!(repo.current_lock("pair-test").unwrap().is_none());
    }

    #[test]
    fn test_replication_failure_aborts_run() {
        let repo = repository(pair(vec![rule(0, 100.0)]));
        let err = prepare_run(
            &repo,
            "pair-test",
            &BuildRequest::new(vec![20]),
            &FailingReplicator,
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Replication(_)));
        assert_eq!(repo.study_snapshot("pair-test").unwrap().stations.len(), 2);
        assert!(repo.current_lock("pair-test").unwrap().is_none());
    }

    #[test]
    fn test_rebuild_after_restore_reuses_replicas() {
        let mut s = pair(vec![rule(0, 100.0)]);
        for (i, station) in s.stations.iter_mut().enumerate() {
            station.external_record = Some(ExternalRecord {
                dataset_key: "lms".to_string(),
                record_id: format!("R{}", i),
            });
        }
        let repo = repository(s);
        let request = BuildRequest::new(vec![20]);

        let cancel = CancelFlag::new();

        let run = prepare_run(&repo, "pair-test", &request, &DigitalReplicator, &cancel).unwrap();
        assert_eq!(run.stats.replicas_created, 1);
        let summary = restore_study(&repo, "pair-test", &run.lock).unwrap();
        assert_eq!(summary.replicas_dropped, 0);
        repo.release_lock(&summary.lock.unwrap()).unwrap();

        let again = prepare_run(&repo, "pair-test", &request, &FailingReplicator, &cancel).unwrap();
        assert_eq!(again.stats.replicas_created, 0);
        assert_eq!(again.stats.scenario_count, 1);
        assert_eq!(again.study.stations.len(), 3);
    }

    #[test]
    fn test_local_replicas_do_not_pile_up_across_rebuilds() {
        let repo = repository(pair(vec![rule(0, 100.0)]));
        let request = BuildRequest::new(vec![20]);
        let cancel = CancelFlag::new();

        for _ in 0..3 {
            let run =
                prepare_run(&repo, "pair-test", &request, &DigitalReplicator, &cancel).unwrap();
            assert_eq!(run.stats.replicas_created, 1);
            assert_eq!(run.study.stations.len(), 3);

            let summary = restore_study(&repo, "pair-test", &run.lock).unwrap();
            assert_eq!(summary.replicas_dropped, 1);
            repo.release_lock(&summary.lock.unwrap()).unwrap();
            assert_eq!(repo.study_snapshot("pair-test").unwrap().stations.len(), 2);
        }
    }

    #[test]
    fn test_cancel_during_replication_saves_nothing_and_unlocks() {
        let repo = repository(pair(vec![rule(0, 100.0)]));
        let cancel = CancelFlag::new();
        let replicator = CancellingReplicator {
            flag: cancel.clone(),
        };

        let err = prepare_run(
            &repo,
            "pair-test",
            &BuildRequest::new(vec![20]),
            &replicator,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
        assert!(cancel.is_cancelled());
        let stored = repo.study_snapshot("pair-test").unwrap();
        assert_eq!(stored.stations.len(), 2);
        assert_eq!(stored.scenarios.len(), 1);
        assert!(repo.current_lock("pair-test").unwrap().is_none());
    }

    #[test]
    fn test_exhausted_station_keys_abort_the_build() {
        let mut s = pair(vec![rule(0, 100.0)]);
        s.stations[1].key = SourceKey(u32::MAX);
        s.scenarios[0].entries[1].source = SourceKey(u32::MAX);
        let repo = repository(s);

        let err = prepare_run(
            &repo,
            "pair-test",
            &BuildRequest::new(vec![20]),
            &DigitalReplicator,
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Replication(ReplicationError::Model(ModelError::StationKeysExhausted))
        ));
        assert_eq!(repo.study_snapshot("pair-test").unwrap().stations.len(), 2);
        assert!(repo.current_lock("pair-test").unwrap().is_none());
    }
}
