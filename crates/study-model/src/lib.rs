//! Study Model Library
//!
//! Broadcast interference study data: stations and their transmitter sites,
//! channel bands, interference rules, scenarios, and the repository
//! collaborator that persists studies under an exclusive lock.

use thiserror::Error;

pub mod channel;
pub mod repository;
pub mod rule;
pub mod scenario;
pub mod station;
pub mod study;

pub use channel::{same_band, AdjacencyBand, ChannelRange};
pub use repository::{
    InMemoryRepository, RepositoryError, RepositoryResult, SharedReplicationStore, StudyLock,
    StudyRepository,
};
pub use rule::{InterferenceRule, OffsetRelation};
pub use scenario::{Scenario, ScenarioEntry, ScenarioKey, ScenarioParameter};
pub use station::{
    Country, EmissionMask, ExternalRecord, FrequencyOffset, GeoPoint, RuleIdentity, ServiceType,
    SourceKey, Station, TransmitterSite,
};
pub use study::{GridType, Study, StudyMode};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Station not found: {0}")]
    UnknownStation(SourceKey),
    #[error("Scenario not found: {0}")]
    UnknownScenario(ScenarioKey),
    #[error("Study has no station keys left")]
    StationKeysExhausted,
    #[error("Study has no scenario keys left")]
    ScenarioKeysExhausted,
}

pub type Result<T> = std::result::Result<T, ModelError>;
