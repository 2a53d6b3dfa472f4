//! Build preconditions
//!
//! All checks run before anything is mutated. A passing study yields a
//! [`ValidatedStudy`]: the desired set, the study channels and the cleaned rule
//! list every later stage works from.

use crate::config::{BuildConfig, Envelope};
use crate::rules::pair_study_rules;
use std::collections::HashSet;
use study_model::{
    ChannelRange, GeoPoint, GridType, InterferenceRule, ScenarioKey, SourceKey, Station, Study,
    StudyMode,
};
use thiserror::Error;
use tracing::{debug, info};

/// Cell sizes closer than this are considered equal (km)
const CELL_SIZE_TOLERANCE_KM: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Pair studies must use the global grid study mode")]
    WrongStudyMode,
    #[error("Pair studies must use a {required} km cell size, study uses {found} km")]
    WrongCellSize { required: f64, found: f64 },
    #[error("Study kilometers per degree must be positive, found {0}")]
    InvalidKmPerDegree(f64),
    #[error("Study must contain exactly one scenario, found {0}")]
    ScenarioCount(usize),
    #[error("Baseline scenario needs at least 2 desired stations, found {0}")]
    TooFewDesired(usize),
    #[error("Baseline scenario references missing station {0}")]
    UnknownStation(SourceKey),
    #[error("Station {call_sign} has an invalid facility ID {facility_id}")]
    InvalidFacilityId { call_sign: String, facility_id: i32 },
    #[error("Facility ID {0} appears more than once in the baseline scenario")]
    DuplicateFacilityId(i32),
    #[error("No study channels were requested")]
    NoChannels,
    #[error("Study channel {channel} is outside the study range {first}-{last}")]
    ChannelOutOfRange { channel: u16, first: u16, last: u16 },
    #[error("Study channel {0} was requested more than once")]
    DuplicateChannel(u16),
    #[error("Station {call_sign} (facility {facility_id}) is too close to the study area edge")]
    OutsideEnvelope { call_sign: String, facility_id: i32 },
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Read-only view of a study that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedStudy {
    pub baseline: ScenarioKey,
    /// Desired stations in baseline order
    pub desired: Vec<SourceKey>,
    /// Requested study channels, ascending
    pub channels: Vec<u16>,
    /// Span of the requested channels; interfering channels must fall inside
    pub bounds: ChannelRange,
    pub km_per_degree: f64,
    /// Digital-to-digital rules for deltas -1..=1
    pub rules: Vec<InterferenceRule>,
}

pub fn validate(
    study: &Study,
    channels: &[u16],
    config: &BuildConfig,
) -> ValidationResult<ValidatedStudy> {
    if study.mode != StudyMode::Grid || study.grid_type != GridType::Global {
        return Err(ValidationError::WrongStudyMode);
    }
    if (study.cell_size_km - config.required_cell_size_km).abs() > CELL_SIZE_TOLERANCE_KM {
        return Err(ValidationError::WrongCellSize {
            required: config.required_cell_size_km,
            found: study.cell_size_km,
        });
    }
    if study.km_per_degree.is_nan() || study.km_per_degree <= 0.0 {
        return Err(ValidationError::InvalidKmPerDegree(study.km_per_degree));
    }

    if study.scenarios.len() != 1 {
        return Err(ValidationError::ScenarioCount(study.scenarios.len()));
    }
    let baseline = &study.scenarios[0];

    let desired: Vec<&Station> = baseline
        .desired()
        .map(|k| study.station(k).ok_or(ValidationError::UnknownStation(k)))
        .collect::<ValidationResult<_>>()?;
    if desired.len() < 2 {
        return Err(ValidationError::TooFewDesired(desired.len()));
    }

    check_facility_ids(&desired)?;
    let channels = check_channels(channels, study.channels)?;

    let max_allowance = desired
        .iter()
        .map(|s| s.max_rule_extra_distance_km())
        .fold(0.0, f64::max);
    for station in &desired {
        let inside = station.coverage_sites().into_iter().all(|(site, allowance)| {
            within_envelope(
                &config.envelope,
                site,
                allowance,
                max_allowance,
                study.km_per_degree,
            )
        });
        if !inside {
            return Err(ValidationError::OutsideEnvelope {
                call_sign: station.call_sign.clone(),
                facility_id: station.facility_id,
            });
        }
    }

    let rules = pair_study_rules(&study.rules);
    info!(
        "Validated study {}: {} desired stations, {} study channels, {} of {} rules apply",
        study.id,
        desired.len(),
        channels.len(),
        rules.len(),
        study.rules.len()
    );

    let bounds = ChannelRange::new(channels[0], channels[channels.len() - 1]);
    Ok(ValidatedStudy {
        baseline: baseline.key,
        desired: desired.iter().map(|s| s.key).collect(),
        channels,
        bounds,
        km_per_degree: study.km_per_degree,
        rules,
    })
}

fn check_facility_ids(desired: &[&Station]) -> ValidationResult<()> {
    let mut seen = HashSet::new();
    for s in desired {
        if s.facility_id <= 0 {
            return Err(ValidationError::InvalidFacilityId {
                call_sign: s.call_sign.clone(),
                facility_id: s.facility_id,
            });
        }
        if !seen.insert(s.facility_id) {
            return Err(ValidationError::DuplicateFacilityId(s.facility_id));
        }
    }
    Ok(())
}

fn check_channels(requested: &[u16], bounds: ChannelRange) -> ValidationResult<Vec<u16>> {
    if requested.is_empty() {
        return Err(ValidationError::NoChannels);
    }
    let mut seen = HashSet::new();
    for &channel in requested {
        if !bounds.contains(channel) {
            return Err(ValidationError::ChannelOutOfRange {
                channel,
                first: bounds.first,
                last: bounds.last,
            });
        }
        if !seen.insert(channel) {
            return Err(ValidationError::DuplicateChannel(channel));
        }
    }
    let mut channels = requested.to_vec();
    channels.sort_unstable();
    Ok(channels)
}

/// Whether a site keeps its allowance clear of every envelope edge
///
/// Sites further than `max_allowance_km` from all edges pass on the coarse box
/// test alone; sites outside the box fail. Only the band in between gets the
/// per-edge comparison against the site's own allowance.
pub fn within_envelope(
    envelope: &Envelope,
    site: GeoPoint,
    allowance_km: f64,
    max_allowance_km: f64,
    km_per_degree: f64,
) -> bool {
    let (lat, lon) = (site.latitude, site.longitude);
    if lat < envelope.south || lat > envelope.north || lon < envelope.west || lon > envelope.east {
        return false;
    }

    let lon_km_per_degree = km_per_degree * lat.to_radians().cos().max(f64::EPSILON);
    let lat_margin = max_allowance_km / km_per_degree;
    let lon_margin = max_allowance_km / lon_km_per_degree;
    if lat - lat_margin > envelope.south
        && lat + lat_margin < envelope.north
        && lon - lon_margin > envelope.west
        && lon + lon_margin < envelope.east
    {
        return true;
    }

    let edges = [
        (envelope.north - lat) * km_per_degree,
        (lat - envelope.south) * km_per_degree,
        (envelope.east - lon) * lon_km_per_degree,
        (lon - envelope.west) * lon_km_per_degree,
    ];
    debug!(
        "Edge check at ({:.4}, {:.4}): allowance {:.1} km, edges {:?}",
        lat, lon, allowance_km, edges
    );
    edges.iter().all(|&edge| edge >= allowance_km)
}
