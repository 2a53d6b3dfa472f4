//! Scenario assembly
//!
//! One scenario per (desired station, channel). Home-country desired stations
//! are replicated onto every study channel; foreign desired stations are
//! studied as they are, on their own channel only. Each scenario collects the
//! baseline stations that qualify under a co- or first-adjacent rule.

use crate::cancel::CancelFlag;
use crate::config::BuildConfig;
use crate::geometry;
use crate::replication::{ReplicationCache, ReplicationContext};
use crate::rules::{match_rule, RuleQuery};
use crate::validator::ValidatedStudy;
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use study_model::{same_band, GeoPoint, Scenario, ScenarioEntry, ScenarioKey, Station, Study};
use tracing::{debug, info};

/// Channel offsets scanned around each study channel
pub const CHANNEL_DELTAS: [i32; 3] = [-1, 0, 1];

/// A finalized scenario and the desired site it is ordered by
#[derive(Debug, Clone, Copy)]
pub struct GeneratedScenario {
    pub key: ScenarioKey,
    pub desired_facility_id: i32,
    pub channel: u16,
    pub desired_location: GeoPoint,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssemblyStats {
    pub desired_stations: usize,
    pub scenarios_created: usize,
    pub scenarios_discarded: usize,
    /// Distinct facilities that interfere with at least one desired station
    pub interfering_stations: usize,
    /// Distinct (desired, undesired) facility pairs
    pub station_pairs: usize,
    /// Channels scanned per desired facility
    pub channels_scanned: BTreeMap<i32, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub scenarios: Vec<GeneratedScenario>,
    pub stats: AssemblyStats,
}

pub struct Assembler<'a> {
    validated: &'a ValidatedStudy,
    config: &'a BuildConfig,
    replication: ReplicationContext<'a>,
    cancel: &'a CancelFlag,
    /// Baseline stations, cloned so the arena can grow while scanning
    baseline: Vec<Station>,
    interfering: HashSet<i32>,
    pairs: HashSet<(i32, i32)>,
    assembly: Assembly,
}

impl<'a> Assembler<'a> {
    pub fn new(
        study: &Study,
        validated: &'a ValidatedStudy,
        config: &'a BuildConfig,
        replication: ReplicationContext<'a>,
        cancel: &'a CancelFlag,
    ) -> Result<Self> {
        let baseline = validated
            .desired
            .iter()
            .map(|&k| study.require_station(k).cloned())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            validated,
            config,
            replication,
            cancel,
            baseline,
            interfering: HashSet::new(),
            pairs: HashSet::new(),
            assembly: Assembly::default(),
        })
    }

    /// Build every scenario into `study`
    pub fn run(mut self, study: &mut Study, cache: &mut ReplicationCache) -> Result<Assembly> {
        let (home, foreign): (Vec<_>, Vec<_>) = self
            .baseline
            .iter()
            .cloned()
            .partition(|s| s.country == self.config.home_country);
        info!(
            "Assembling scenarios for {} home and {} foreign desired stations",
            home.len(),
            foreign.len()
        );

        for desired in &home {
            self.assembly.stats.desired_stations += 1;
            for &channel in &self.validated.channels {
                self.cancel.check()?;
                let rep = cache.representation_on_channel(
                    study,
                    desired.key,
                    channel,
                    self.replication,
                )?;
                let rep = study.require_station(rep)?.clone();
                self.scan(study, cache, desired, &rep, channel)?;
            }
        }

        for desired in &foreign {
            self.assembly.stats.desired_stations += 1;
            self.cancel.check()?;
            self.scan(study, cache, desired, desired, desired.channel)?;
        }

        self.assembly.stats.interfering_stations = self.interfering.len();
        self.assembly.stats.station_pairs = self.pairs.len();
        Ok(self.assembly)
    }

    /// Collect the undesired stations for `desired` studied as `rep` on `channel`
    fn scan(
        &mut self,
        study: &mut Study,
        cache: &mut ReplicationCache,
        desired: &Station,
        rep: &Station,
        channel: u16,
    ) -> Result<()> {
        *self
            .assembly
            .stats
            .channels_scanned
            .entry(desired.facility_id)
            .or_default() += 1;

        let mut entries = vec![ScenarioEntry::desired(rep.key)];
        let mut included = HashSet::new();
        let mut facilities = Vec::new();

        for undesired in &self.baseline {
            self.cancel.check()?;
            if undesired.facility_id == desired.facility_id {
                continue;
            }
            let distance = geometry::distance(
                rep,
                undesired,
                self.validated.km_per_degree,
                self.config.check_each_transmitter,
            );

            for delta in CHANNEL_DELTAS {
                self.cancel.check()?;
                let Some(interfering) = interfering_channel(channel, delta, self.validated) else {
                    continue;
                };
                let query = RuleQuery::for_pair(rep, undesired, channel, delta);
                let Some(rule) = match_rule(&self.validated.rules, &query) else {
                    continue;
                };
                if distance > rule.max_distance_km {
                    continue;
                }

                let u_rep = cache.representation_on_channel(
                    study,
                    undesired.key,
                    interfering,
                    self.replication,
                )?;
                if included.insert(u_rep) {
                    entries.push(ScenarioEntry::undesired(u_rep));
                    facilities.push(undesired.facility_id);
                }
            }
        }

        if entries.len() < 2 {
            self.assembly.stats.scenarios_discarded += 1;
            return Ok(());
        }

        for &u in &facilities {
            self.interfering.insert(u);
            self.pairs.insert((desired.facility_id, u));
        }

        let seq = self.assembly.scenarios.len() + 1;
        let mut scenario = Scenario::new(
            ScenarioKey(0),
            format!("{}_{}_{}", desired.call_sign, channel, seq),
            format!(
                "Pair study of {} (facility {}) on channel {}, {} undesired",
                desired.call_sign,
                desired.facility_id,
                channel,
                entries.len() - 1
            ),
        );
        scenario.parent = Some(self.validated.baseline);
        scenario.entries = entries;
        let key = study.add_scenario(scenario)?;
        debug!(
            "Scenario {} for {} on channel {} with {} undesired",
            key,
            desired.call_sign,
            channel,
            facilities.len()
        );

        self.assembly.stats.scenarios_created += 1;
        self.assembly.scenarios.push(GeneratedScenario {
            key,
            desired_facility_id: desired.facility_id,
            channel,
            desired_location: desired.location,
        });
        Ok(())
    }
}

/// `channel + delta` when it stays inside the study bounds and band
fn interfering_channel(channel: u16, delta: i32, validated: &ValidatedStudy) -> Option<u16> {
    let candidate = u16::try_from(i32::from(channel) + delta).ok()?;
    (validated.bounds.contains(candidate) && same_band(channel, candidate)).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::DigitalReplicator;
    use crate::testutil::{lat_offset, rule, station, study};
    use crate::validator::validate;
    use crate::BuildError;
    use study_model::{Country, InMemoryRepository, ServiceType};

    fn assemble(s: &mut Study, channels: &[u16], config: &BuildConfig) -> Result<Assembly> {
        let validated = validate(s, channels, config)?;
        let store = InMemoryRepository::new();
        let ctx = ReplicationContext {
            replicator: &DigitalReplicator,
            store: &store,
        };
        let cancel = CancelFlag::new();
        let mut cache = ReplicationCache::seeded_from(s);
        Assembler::new(s, &validated, config, ctx, &cancel)?.run(s, &mut cache)
    }

    /// Facility 100 on 20 and facility 200 on 22, 105 km apart. Only 100
    /// carries an allowance, so the pair qualifies at 80 km one way only.
    fn pair_study(rules: Vec<study_model::InterferenceRule>) -> Study {
        let mut d = station(100, 20, 40.0, -75.0);
        d.rule_extra_distance_km = 25.0;
        let u = station(200, 22, 40.0 + lat_offset(105.0), -75.0);
        study(vec![d, u], rules)
    }

    #[test]
    fn test_co_channel_pair_produces_one_scenario() {
        let mut s = pair_study(vec![rule(0, 100.0)]);
        let original_100 = s.stations[0].key;
        let assembly = assemble(&mut s, &[20], &BuildConfig::default()).unwrap();

        assert_eq!(assembly.scenarios.len(), 1);
        assert_eq!(assembly.scenarios[0].desired_facility_id, 100);
        assert_eq!(assembly.scenarios[0].channel, 20);
        let scenario = s.scenario(assembly.scenarios[0].key).unwrap();

        // 100 is already digital on 20 and is used as is
        assert_eq!(scenario.desired().collect::<Vec<_>>(), vec![original_100]);

        let undesired: Vec<_> = scenario.undesired().collect();
        assert_eq!(undesired.len(), 1);
        let u = s.station(undesired[0]).unwrap();
        assert_eq!((u.facility_id, u.channel), (200, 20));
        assert!(u.is_replica());

        assert_eq!(assembly.stats.station_pairs, 1);
        assert_eq!(assembly.stats.interfering_stations, 1);
        assert_eq!(assembly.stats.scenarios_created, 1);
        // 200 studied on 20 sees 100 at 105 km
        assert_eq!(assembly.stats.scenarios_discarded, 1);
    }

    #[test]
    fn test_rule_for_other_delta_yields_nothing() {
        let mut s = pair_study(vec![rule(-1, 100.0)]);
        let assembly = assemble(&mut s, &[22], &BuildConfig::default()).unwrap();
        assert!(assembly.scenarios.is_empty());
        assert_eq!(assembly.stats.station_pairs, 0);
        assert_eq!(s.scenarios.len(), 1);
    }

    #[test]
    fn test_distance_above_rule_maximum_is_skipped() {
        let mut s = pair_study(vec![rule(0, 79.0)]);
        let assembly = assemble(&mut s, &[20], &BuildConfig::default()).unwrap();
        assert!(assembly.scenarios.is_empty());
        assert_eq!(assembly.stats.scenarios_discarded, 2);
        // Only the baseline remains
        assert_eq!(s.scenarios.len(), 1);
    }

    #[test]
    fn test_every_scenario_is_runnable() {
        let stations = vec![
            station(100, 20, 40.0, -75.0),
            station(200, 21, 40.3, -75.0),
            station(300, 22, 40.6, -75.0),
            station(400, 30, 45.0, -75.0),
        ];
        let mut s = study(stations, vec![rule(-1, 80.0), rule(0, 120.0), rule(1, 80.0)]);
        let assembly = assemble(&mut s, &[19, 20, 21, 22, 23], &BuildConfig::default()).unwrap();

        assert!(!assembly.scenarios.is_empty());
        for g in &assembly.scenarios {
            let scenario = s.scenario(g.key).unwrap();
            assert!(scenario.is_runnable());
            assert_eq!(scenario.parent, s.baseline_key());
        }
        // Facility 400 is far from everyone
        assert!(assembly.scenarios.iter().all(|g| g.desired_facility_id != 400));
    }

    #[test]
    fn test_channels_scanned_per_country() {
        let mut foreign = station(300, 25, 40.3, -75.0);
        foreign.country = Country::Ca;
        let stations = vec![
            station(100, 20, 40.0, -75.0),
            station(200, 22, 40.5, -75.0),
            foreign,
        ];
        let mut s = study(stations, vec![rule(0, 100.0)]);
        let channels = [20, 21, 22, 23];
        let assembly = assemble(&mut s, &channels, &BuildConfig::default()).unwrap();

        assert_eq!(assembly.stats.channels_scanned.get(&100), Some(&channels.len()));
        assert_eq!(assembly.stats.channels_scanned.get(&200), Some(&channels.len()));
        assert_eq!(assembly.stats.channels_scanned.get(&300), Some(&1));
        assert_eq!(assembly.stats.desired_stations, 3);
    }

    #[test]
    fn test_foreign_desired_is_not_replicated() {
        let mut foreign = station(300, 25, 40.0, -75.0);
        foreign.country = Country::Ca;
        let mut rule_ca = rule(0, 100.0);
        rule_ca.country = Country::Ca;
        let mut s = study(vec![foreign, station(100, 20, 40.3, -75.0)], vec![rule_ca]);
        let foreign_key = s.stations[0].key;

        let assembly = assemble(&mut s, &[20, 25], &BuildConfig::default()).unwrap();
        let g = assembly
            .scenarios
            .iter()
            .find(|g| g.desired_facility_id == 300)
            .unwrap();
        assert_eq!(g.channel, 25);
        let scenario = s.scenario(g.key).unwrap();
        assert_eq!(scenario.desired().collect::<Vec<_>>(), vec![foreign_key]);
        let u = s.station(scenario.undesired().next().unwrap()).unwrap();
        assert_eq!((u.facility_id, u.channel), (100, 25));
    }

    #[test]
    fn test_band_edges_and_bounds_are_respected() {
        // 13 and 14 sit on either side of the VHF/UHF edge
        let rules = vec![rule(-1, 200.0), rule(1, 200.0)];
        let mut s = study(
            vec![station(100, 13, 40.0, -75.0), station(200, 14, 40.3, -75.0)],
            rules.clone(),
        );
        let assembly = assemble(&mut s, &[13, 14], &BuildConfig::default()).unwrap();
        assert!(assembly.scenarios.is_empty());

        let mut s = study(
            vec![station(100, 14, 40.0, -75.0), station(200, 15, 40.3, -75.0)],
            rules,
        );
        let assembly = assemble(&mut s, &[14, 15], &BuildConfig::default()).unwrap();
        assert!(!assembly.scenarios.is_empty());
        for g in &assembly.scenarios {
            let scenario = s.scenario(g.key).unwrap();
            for u in scenario.undesired() {
                let channel = s.station(u).unwrap().channel;
                assert!((14..=15).contains(&channel));
                assert_eq!(channel.abs_diff(g.channel), 1);
            }
        }
    }

    #[test]
    fn test_analog_undesired_is_replicated_as_digital() {
        let mut analog = station(200, 20, 40.3, -75.0);
        analog.service = ServiceType::Tv;
        let mut s = study(vec![station(100, 20, 40.0, -75.0), analog], vec![rule(0, 100.0)]);
        let assembly = assemble(&mut s, &[20], &BuildConfig::default()).unwrap();

        let g = assembly
            .scenarios
            .iter()
            .find(|g| g.desired_facility_id == 100)
            .unwrap();
        let scenario = s.scenario(g.key).unwrap();
        let u = s.station(scenario.undesired().next().unwrap()).unwrap();
        assert_eq!(u.service, ServiceType::Dt);
        assert_eq!(u.facility_id, 200);
    }

    #[test]
    fn test_cancellation_stops_assembly() {
        let mut s = pair_study(vec![rule(0, 100.0)]);
        let config = BuildConfig::default();
        let validated = validate(&s, &[20], &config).unwrap();
        let store = InMemoryRepository::new();
        let ctx = ReplicationContext {
            replicator: &DigitalReplicator,
            store: &store,
        };
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut cache = ReplicationCache::new();

        let result = Assembler::new(&s, &validated, &config, ctx, &cancel)
            .unwrap()
            .run(&mut s, &mut cache);
        assert!(matches!(result, Err(BuildError::Cancelled)));
    }
}
