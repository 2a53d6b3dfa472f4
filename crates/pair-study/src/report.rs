//! Build statistics and the JSON run report

use crate::assembler::AssemblyStats;
use crate::replication::ReplicationStats;
use crate::scheduler::{ScenarioQueue, SortAxis};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use study_model::{ScenarioKey, SourceKey, Study};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct BuildStats {
    pub study_id: String,
    pub channels: Vec<u16>,
    pub desired_stations: usize,
    pub interfering_stations: usize,
    pub station_pairs: usize,
    pub scenario_count: usize,
    pub scenarios_discarded: usize,
    pub replicas_created: usize,
    pub replicas_imported: usize,
    pub replica_cache_hits: usize,
    pub channels_scanned: BTreeMap<i32, usize>,
    pub sort_axis: SortAxis,
    pub recommended_workers: usize,
    pub generated_at: DateTime<Utc>,
}

impl BuildStats {
    pub fn new(
        study_id: &str,
        channels: &[u16],
        assembly: AssemblyStats,
        replication: ReplicationStats,
        queue: &ScenarioQueue,
    ) -> Self {
        Self {
            study_id: study_id.to_string(),
            channels: channels.to_vec(),
            desired_stations: assembly.desired_stations,
            interfering_stations: assembly.interfering_stations,
            station_pairs: assembly.station_pairs,
            scenario_count: assembly.scenarios_created,
            scenarios_discarded: assembly.scenarios_discarded,
            replicas_created: replication.created,
            replicas_imported: replication.imported,
            replica_cache_hits: replication.hits,
            channels_scanned: assembly.channels_scanned,
            sort_axis: queue.axis(),
            recommended_workers: queue.recommended_worker_count(),
            generated_at: Utc::now(),
        }
    }

    pub fn log_summary(&self) {
        info!("=== Pair Study Build: {} ===", self.study_id);
        info!("  Desired stations:     {}", self.desired_stations);
        info!("  Interfering stations: {}", self.interfering_stations);
        info!("  Station pairs:        {}", self.station_pairs);
        info!(
            "  Scenarios:            {} ({} empty discarded)",
            self.scenario_count, self.scenarios_discarded
        );
        info!(
            "  Replicas:             {} created, {} imported, {} reused",
            self.replicas_created, self.replicas_imported, self.replica_cache_hits
        );
        info!(
            "  Run order:            by {:?}, {} workers",
            self.sort_axis, self.recommended_workers
        );
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub key: ScenarioKey,
    pub name: String,
    pub desired: Vec<String>,
    pub undesired: Vec<String>,
}

/// What the dispatcher needs to run a build, in queue order
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub stats: BuildStats,
    pub scenarios: Vec<ScenarioSummary>,
}

impl BuildReport {
    pub fn new(study: &Study, queue: &ScenarioQueue, stats: BuildStats) -> Self {
        let label = |key: SourceKey| {
            study
                .station(key)
                .map(|s| format!("{} ch {}", s.call_sign, s.channel))
                .unwrap_or_else(|| key.to_string())
        };
        let scenarios = queue
            .order()
            .iter()
            .filter_map(|&key| study.scenario(key))
            .map(|s| ScenarioSummary {
                key: s.key,
                name: s.name.clone(),
                desired: s.desired().map(&label).collect(),
                undesired: s.undesired().map(&label).collect(),
            })
            .collect();
        Self { stats, scenarios }
    }
}
