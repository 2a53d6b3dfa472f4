//! Station records
//!
//! A station is one broadcast facility as it appears in a study. Stations live
//! in the study's arena and are addressed by [`SourceKey`]; replicas produced
//! for other channels are ordinary stations that remember their original.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena identity of a station within one study
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey(pub u32);

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src-{}", self.0)
    }
}

/// Administrating country
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "CA")]
    Ca,
    #[serde(rename = "MX")]
    Mx,
}

impl Country {
    pub fn code(&self) -> &'static str {
        match self {
            Country::Us => "US",
            Country::Ca => "CA",
            Country::Mx => "MX",
        }
    }
}

/// Record service type
///
/// Analog services have a default digital counterpart, which is what a station
/// becomes when it is replicated onto another channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// Digital full power
    #[serde(rename = "DT")]
    Dt,
    /// Analog full power
    #[serde(rename = "TV")]
    Tv,
    /// Digital Class A
    #[serde(rename = "DC")]
    Dc,
    /// Analog Class A
    #[serde(rename = "CA")]
    Ca,
    /// Digital low power
    #[serde(rename = "LD")]
    Ld,
    /// Analog low power and translators
    #[serde(rename = "LP")]
    Lp,
}

impl ServiceType {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceType::Dt => "DT",
            ServiceType::Tv => "TV",
            ServiceType::Dc => "DC",
            ServiceType::Ca => "CA",
            ServiceType::Ld => "LD",
            ServiceType::Lp => "LP",
        }
    }

    pub fn is_digital(&self) -> bool {
        matches!(self, ServiceType::Dt | ServiceType::Dc | ServiceType::Ld)
    }

    /// Digital service this type maps to on replication
    pub fn digital_counterpart(&self) -> ServiceType {
        match self {
            ServiceType::Tv => ServiceType::Dt,
            ServiceType::Ca => ServiceType::Dc,
            ServiceType::Lp => ServiceType::Ld,
            digital => *digital,
        }
    }

    /// Emission mask a freshly replicated station of this type carries
    pub fn default_emission_mask(&self) -> Option<EmissionMask> {
        match self.digital_counterpart() {
            ServiceType::Ld => Some(EmissionMask::Simple),
            _ => None,
        }
    }
}

/// Carrier frequency offset class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyOffset {
    Zero,
    Plus,
    Minus,
}

/// Low power emission mask class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionMask {
    Simple,
    Stringent,
    FullService,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One transmitter of a distributed (DTS) station
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitterSite {
    pub location: GeoPoint,
    pub rule_extra_distance_km: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Pointer to the persisted record a station was loaded from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub dataset_key: String,
    pub record_id: String,
}

/// Service, offset and mask as seen by the interference rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleIdentity {
    pub service: ServiceType,
    pub frequency_offset: Option<FrequencyOffset>,
    pub emission_mask: Option<EmissionMask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub key: SourceKey,
    pub facility_id: i32,
    pub call_sign: String,
    pub channel: u16,
    pub service: ServiceType,
    pub country: Country,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_offset: Option<FrequencyOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emission_mask: Option<EmissionMask>,
    pub location: GeoPoint,
    /// Worst-case contour radius subtracted from raw distances (km)
    pub rule_extra_distance_km: f64,
    /// Sub-sites of a distributed station, empty otherwise
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transmitters: Vec<TransmitterSite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_record: Option<ExternalRecord>,
    /// Original station this one was replicated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicated_from: Option<SourceKey>,
}

impl Station {
    pub fn is_distributed(&self) -> bool {
        !self.transmitters.is_empty()
    }

    pub fn is_replica(&self) -> bool {
        self.replicated_from.is_some()
    }

    pub fn active_transmitters(&self) -> impl Iterator<Item = &TransmitterSite> {
        self.transmitters.iter().filter(|t| t.active)
    }

    /// Identity the station has right now
    pub fn rule_identity(&self) -> RuleIdentity {
        RuleIdentity {
            service: self.service,
            frequency_offset: self.frequency_offset,
            emission_mask: self.emission_mask,
        }
    }

    /// Identity used for rule lookup: the station itself when digital, otherwise
    /// the digital station it would become if replicated.
    pub fn digital_identity(&self) -> RuleIdentity {
        if self.service.is_digital() {
            return self.rule_identity();
        }
        RuleIdentity {
            service: self.service.digital_counterpart(),
            frequency_offset: None,
            emission_mask: self.service.default_emission_mask(),
        }
    }

    /// Largest rule extra distance over the station and its active sub-sites
    pub fn max_rule_extra_distance_km(&self) -> f64 {
        self.active_transmitters()
            .map(|t| t.rule_extra_distance_km)
            .fold(self.rule_extra_distance_km, f64::max)
    }

    /// Locations that must fit inside the study envelope
    pub fn coverage_sites(&self) -> Vec<(GeoPoint, f64)> {
        if self.is_distributed() {
            self.active_transmitters()
                .map(|t| (t.location, t.rule_extra_distance_km))
                .collect()
        } else {
            vec![(self.location, self.rule_extra_distance_km)]
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn station(key: u32, facility_id: i32, channel: u16, lat: f64, lon: f64) -> Station {
        Station {
            key: SourceKey(key),
            facility_id,
            call_sign: format!("W{}", facility_id),
            channel,
            service: ServiceType::Dt,
            country: Country::Us,
            frequency_offset: None,
            emission_mask: None,
            location: GeoPoint::new(lat, lon),
            rule_extra_distance_km: 0.0,
            transmitters: Vec::new(),
            external_record: None,
            replicated_from: None,
        }
    }
}
