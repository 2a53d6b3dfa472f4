//! Study container
//!
//! The study owns the station arena, its scenarios and the interference rules.
//! Generated scenarios point back to the baseline through `parent`.

use crate::channel::ChannelRange;
use crate::rule::InterferenceRule;
use crate::scenario::{Scenario, ScenarioKey, ScenarioParameter};
use crate::station::{SourceKey, Station};
use crate::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyMode {
    Grid,
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridType {
    Global,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub id: String,
    pub name: String,
    pub mode: StudyMode,
    pub grid_type: GridType,
    pub cell_size_km: f64,
    pub km_per_degree: f64,
    /// Channel bounds of the study
    pub channels: ChannelRange,
    #[serde(default)]
    pub stations: Vec<Station>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub rules: Vec<InterferenceRule>,
    #[serde(default)]
    pub parameters: Vec<ScenarioParameter>,
    /// Next station key to hand out; never decreases
    #[serde(default = "first_key")]
    next_station_key: u64,
    /// Next scenario key to hand out; never decreases
    #[serde(default = "first_key")]
    next_scenario_key: u64,
    #[serde(skip)]
    index: HashMap<SourceKey, usize>,
    /// Scenario count the scenario counter was last synced at
    #[serde(skip)]
    synced_scenarios: usize,
}

fn first_key() -> u64 {
    1
}

impl Study {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        channels: ChannelRange,
        km_per_degree: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mode: StudyMode::Grid,
            grid_type: GridType::Global,
            cell_size_km: 2.0,
            km_per_degree,
            channels,
            stations: Vec::new(),
            scenarios: Vec::new(),
            rules: Vec::new(),
            parameters: Vec::new(),
            next_station_key: first_key(),
            next_scenario_key: first_key(),
            index: HashMap::new(),
            synced_scenarios: 0,
        }
    }

    /// Rebuild the key index and key counters after the arena was replaced
    /// wholesale
    pub fn reindex(&mut self) {
        self.index = self
            .stations
            .iter()
            .enumerate()
            .map(|(i, s)| (s.key, i))
            .collect();
        let past_stations = self.stations.iter().map(|s| u64::from(s.key.0) + 1).max();
        self.next_station_key = self.next_station_key.max(past_stations.unwrap_or(1));
        self.sync_scenario_counter();
    }

    fn sync_scenario_counter(&mut self) {
        let past_scenarios = self.scenarios.iter().map(|s| u64::from(s.key.0) + 1).max();
        self.next_scenario_key = self.next_scenario_key.max(past_scenarios.unwrap_or(1));
        self.synced_scenarios = self.scenarios.len();
    }

    pub fn station(&self, key: SourceKey) -> Option<&Station> {
        if let Some(hit) = self
            .index
            .get(&key)
            .and_then(|&i| self.stations.get(i))
            .filter(|s| s.key == key)
        {
            return Some(hit);
        }
        self.stations.iter().find(|s| s.key == key)
    }

    pub fn require_station(&self, key: SourceKey) -> Result<&Station> {
        self.station(key).ok_or(ModelError::UnknownStation(key))
    }

    /// Append a station under a fresh key and return that key
    pub fn add_station(&mut self, mut station: Station) -> Result<SourceKey> {
        if self.index.len() != self.stations.len() {
            self.reindex();
        }
        let key = SourceKey(
            u32::try_from(self.next_station_key).map_err(|_| ModelError::StationKeysExhausted)?,
        );
        self.next_station_key = self
            .next_station_key
            .checked_add(1)
            .ok_or(ModelError::StationKeysExhausted)?;
        station.key = key;
        self.index.insert(key, self.stations.len());
        self.stations.push(station);
        Ok(key)
    }

    pub fn scenario(&self, key: ScenarioKey) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.key == key)
    }

    pub fn require_scenario(&self, key: ScenarioKey) -> Result<&Scenario> {
        self.scenario(key).ok_or(ModelError::UnknownScenario(key))
    }

    /// Append a scenario under a fresh key and return that key
    pub fn add_scenario(&mut self, mut scenario: Scenario) -> Result<ScenarioKey> {
        if self.synced_scenarios != self.scenarios.len() {
            self.sync_scenario_counter();
        }
        let key = ScenarioKey(
            u32::try_from(self.next_scenario_key).map_err(|_| ModelError::ScenarioKeysExhausted)?,
        );
        self.next_scenario_key = self
            .next_scenario_key
            .checked_add(1)
            .ok_or(ModelError::ScenarioKeysExhausted)?;
        scenario.key = key;
        self.scenarios.push(scenario);
        self.synced_scenarios = self.scenarios.len();
        Ok(key)
    }

    /// The user-curated root scenario
    pub fn baseline_key(&self) -> Option<ScenarioKey> {
        self.scenarios
            .iter()
            .filter(|s| s.parent.is_none())
            .map(|s| s.key)
            .min()
    }

    pub fn baseline(&self) -> Option<&Scenario> {
        self.baseline_key().and_then(|k| self.scenario(k))
    }

    /// Replicas recorded in the arena, as (original, channel) -> replica
    pub fn replicas(&self) -> impl Iterator<Item = (SourceKey, u16, SourceKey)> + '_ {
        self.stations
            .iter()
            .filter_map(|s| s.replicated_from.map(|orig| (orig, s.channel, s.key)))
    }
}
