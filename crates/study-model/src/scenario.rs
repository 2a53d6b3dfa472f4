//! Scenarios

use crate::station::SourceKey;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioKey(pub u32);

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioEntry {
    pub source: SourceKey,
    pub is_desired: bool,
    pub is_undesired: bool,
}

impl ScenarioEntry {
    pub fn desired(source: SourceKey) -> Self {
        Self {
            source,
            is_desired: true,
            is_undesired: false,
        }
    }

    pub fn undesired(source: SourceKey) -> Self {
        Self {
            source,
            is_desired: false,
            is_undesired: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub key: ScenarioKey,
    pub name: String,
    pub description: String,
    /// Scenario this one was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ScenarioKey>,
    pub entries: Vec<ScenarioEntry>,
}

impl Scenario {
    pub fn new(key: ScenarioKey, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            description: description.into(),
            parent: None,
            entries: Vec::new(),
        }
    }

    pub fn desired(&self) -> impl Iterator<Item = SourceKey> + '_ {
        self.entries.iter().filter(|e| e.is_desired).map(|e| e.source)
    }

    pub fn undesired(&self) -> impl Iterator<Item = SourceKey> + '_ {
        self.entries.iter().filter(|e| e.is_undesired).map(|e| e.source)
    }

    /// At least one desired and one undesired entry
    pub fn is_runnable(&self) -> bool {
        self.entries.iter().any(|e| e.is_desired) && self.entries.iter().any(|e| e.is_undesired)
    }
}

/// Scenario-level study parameter override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParameter {
    pub scenario: ScenarioKey,
    pub parameter_id: u32,
    pub value: String,
}
