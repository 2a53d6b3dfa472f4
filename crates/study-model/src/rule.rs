//! Interference rules
//!
//! A rule says how close an undesired station on a given channel offset may be
//! before it has to be included in a desired station's interference analysis.

use crate::channel::ChannelRange;
use crate::station::{Country, EmissionMask, ServiceType};
use serde::{Deserialize, Serialize};

/// How the rule treats carrier frequency offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetRelation {
    Any,
    /// Both offsets known and equal
    With,
    /// Anything except two known, different offsets
    Without,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterferenceRule {
    pub country: Country,
    pub desired_service: ServiceType,
    pub undesired_service: ServiceType,
    /// Undesired channel minus desired channel
    pub channel_delta: i32,
    /// Desired channels the rule applies to
    pub channels: ChannelRange,
    pub offset_relation: OffsetRelation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emission_mask: Option<EmissionMask>,
    pub max_distance_km: f64,
}

impl InterferenceRule {
    /// Digital-to-digital with a co- or first-adjacent delta
    pub fn is_pair_study_rule(&self) -> bool {
        self.desired_service.is_digital()
            && self.undesired_service.is_digital()
            && (-1..=1).contains(&self.channel_delta)
    }
}
