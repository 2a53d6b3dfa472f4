//! Build configuration
//!
//! Defaults cover a US pair study; a JSON file can override any field and the
//! CLI flags override the file.

use crate::{DEFAULT_CELL_SIZE_KM, DEFAULT_MIN_BATCH_SIZE, DEFAULT_WORKER_COUNT};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use study_model::Country;
use thiserror::Error;
use tracing::info;

/// Northern and southern limit of the terrain/grid data (degrees)
pub const ENVELOPE_LAT_LIMIT: f64 = 75.0;

/// Eastern and western limit of the terrain/grid data (degrees)
pub const ENVELOPE_LON_LIMIT: f64 = 180.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid channel list '{0}'")]
    InvalidChannelList(String),
}

/// Coordinate envelope the study's grid data supports
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            south: -ENVELOPE_LAT_LIMIT,
            north: ENVELOPE_LAT_LIMIT,
            west: -ENVELOPE_LON_LIMIT,
            east: ENVELOPE_LON_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Desired stations of this country are studied on every study channel
    pub home_country: Country,
    pub envelope: Envelope,
    pub required_cell_size_km: f64,
    pub min_batch_size: usize,
    pub requested_workers: usize,
    /// Compare every sub-site pair when both stations are distributed
    pub check_each_transmitter: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            home_country: Country::Us,
            envelope: Envelope::default(),
            required_cell_size_km: DEFAULT_CELL_SIZE_KM,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            requested_workers: DEFAULT_WORKER_COUNT,
            check_each_transmitter: false,
        }
    }
}

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading build config from {:?}", path);
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.requested_workers = n;
        self
    }

    pub fn home_country(mut self, country: Country) -> Self {
        self.home_country = country;
        self
    }

    pub fn check_each_transmitter(mut self, enabled: bool) -> Self {
        self.check_each_transmitter = enabled;
        self
    }

    pub fn envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }
}

/// Parse a channel list such as `"14-36,38,40-41"`
///
/// Order and duplicates are preserved; the validator rejects duplicates.
pub fn parse_channel_list(list: &str) -> Result<Vec<u16>, ConfigError> {
    let invalid = || ConfigError::InvalidChannelList(list.to_string());
    let mut channels = Vec::new();

    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((first, last)) => {
                let first: u16 = first.trim().parse().map_err(|_| invalid())?;
                let last: u16 = last.trim().parse().map_err(|_| invalid())?;
                if last < first {
                    return Err(invalid());
                }
                channels.extend(first..=last);
            }
            None => channels.push(part.parse().map_err(|_| invalid())?),
        }
    }

    if channels.is_empty() {
        return Err(invalid());
    }
    Ok(channels)
}
