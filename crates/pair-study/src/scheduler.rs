//! Scenario ordering and the dispatch queue
//!
//! Scenarios are sorted along whichever axis the desired set spreads out on
//! the most, so consecutive scenarios tend to share terrain tiles in the
//! compute engine. The sorted keys are then drained FIFO by any number of
//! dispatcher threads.

use crate::assembler::GeneratedScenario;
use parking_lot::Mutex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::VecDeque;
use study_model::{GeoPoint, ScenarioKey};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortAxis {
    Latitude,
    Longitude,
}

impl SortAxis {
    /// Latitude when the points span more latitude than longitude
    pub fn choose<I>(points: I) -> Self
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        let mut lat = (f64::INFINITY, f64::NEG_INFINITY);
        let mut lon = (f64::INFINITY, f64::NEG_INFINITY);
        for p in points {
            lat = (lat.0.min(p.latitude), lat.1.max(p.latitude));
            lon = (lon.0.min(p.longitude), lon.1.max(p.longitude));
        }
        if lat.1 - lat.0 > lon.1 - lon.0 {
            SortAxis::Latitude
        } else {
            SortAxis::Longitude
        }
    }

    pub fn coordinate(self, point: GeoPoint) -> f64 {
        match self {
            SortAxis::Latitude => point.latitude,
            SortAxis::Longitude => point.longitude,
        }
    }
}

/// Position of a scenario in the run order
#[derive(Debug, Clone, Copy)]
pub struct ScenarioSortKey {
    pub coordinate: f64,
    pub scenario: ScenarioKey,
}

impl ScenarioSortKey {
    pub fn new(axis: SortAxis, generated: &GeneratedScenario) -> Self {
        Self {
            coordinate: axis.coordinate(generated.desired_location),
            scenario: generated.key,
        }
    }
}

impl Ord for ScenarioSortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.coordinate
            .total_cmp(&other.coordinate)
            .then(self.scenario.cmp(&other.scenario))
    }
}

impl PartialOrd for ScenarioSortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScenarioSortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScenarioSortKey {}

pub fn order_scenarios(axis: SortAxis, scenarios: &[GeneratedScenario]) -> Vec<ScenarioKey> {
    let mut keys: Vec<_> = scenarios
        .iter()
        .map(|g| ScenarioSortKey::new(axis, g))
        .collect();
    keys.sort_unstable();
    keys.into_iter().map(|k| k.scenario).collect()
}

/// FIFO of scenario keys, safe to drain from several threads
#[derive(Debug)]
pub struct ScenarioQueue {
    pending: Mutex<VecDeque<ScenarioKey>>,
    order: Vec<ScenarioKey>,
    axis: SortAxis,
    workers: usize,
}

impl ScenarioQueue {
    pub fn new(axis: SortAxis, scenarios: &[GeneratedScenario], workers: usize) -> Self {
        let order = order_scenarios(axis, scenarios);
        info!(
            "Queued {} scenarios sorted by {:?} for {} workers",
            order.len(),
            axis,
            workers
        );
        Self {
            pending: Mutex::new(order.iter().copied().collect()),
            order,
            axis,
            workers,
        }
    }

    pub fn next_scenario(&self) -> Option<ScenarioKey> {
        let next = self.pending.lock().pop_front();
        if let Some(key) = next {
            debug!("Dispatching scenario {}", key);
        }
        next
    }

    pub fn total_scenario_count(&self) -> usize {
        self.order.len()
    }

    pub fn recommended_worker_count(&self) -> usize {
        self.workers
    }

    /// Scenarios not yet handed out
    pub fn remaining(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn axis(&self) -> SortAxis {
        self.axis
    }

    /// Full run order, including scenarios already dispatched
    pub fn order(&self) -> &[ScenarioKey] {
        &self.order
    }
}
