//! Channel representations of stations
//!
//! Every (original station, channel) pair resolves to exactly one station in
//! the study arena per build. Stations backed by an external record share
//! replicas across builds through the durable tier; stations without one
//! (edited or synthetic sources) use a tier that lives only as long as the
//! cache.

use std::collections::HashMap;
use study_model::{ModelError, SharedReplicationStore, SourceKey, Station, Study};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplicationError {
    #[error("cannot replicate {call_sign} (facility {facility_id}) to channel {channel}: {reason}")]
    Failed {
        call_sign: String,
        facility_id: i32,
        channel: u16,
        reason: String,
    },
    #[error("replication source {0} is not in the study")]
    UnknownSource(SourceKey),
    #[error("cannot add replica to the study: {0}")]
    Model(#[from] ModelError),
}

impl ReplicationError {
    pub fn failed(original: &Station, channel: u16, reason: impl Into<String>) -> Self {
        ReplicationError::Failed {
            call_sign: original.call_sign.clone(),
            facility_id: original.facility_id,
            channel,
            reason: reason.into(),
        }
    }
}

/// Produces a digital representation of a station on another channel
pub trait Replicator {
    fn replicate(&self, original: &Station, channel: u16) -> Result<Station, ReplicationError>;
}

/// Replicator that keeps sites and allowances and switches the service to
/// its digital counterpart
#[derive(Debug, Clone, Copy, Default)]
pub struct DigitalReplicator;

impl Replicator for DigitalReplicator {
    fn replicate(&self, original: &Station, channel: u16) -> Result<Station, ReplicationError> {
        if channel < 2 {
            return Err(ReplicationError::failed(original, channel, "no such TV channel"));
        }
        let identity = original.digital_identity();
        let mut replica = original.clone();
        replica.channel = channel;
        replica.service = identity.service;
        replica.frequency_offset = identity.frequency_offset;
        replica.emission_mask = identity.emission_mask;
        Ok(replica)
    }
}

/// External collaborators the cache calls on a miss
#[derive(Clone, Copy)]
pub struct ReplicationContext<'a> {
    pub replicator: &'a dyn Replicator,
    pub store: &'a dyn SharedReplicationStore,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SharedKey {
    dataset_key: String,
    record_id: String,
    channel: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    /// Replicas produced by the replicator in this build
    pub created: usize,
    /// Replicas imported from the durable store
    pub imported: usize,
    /// Lookups answered from either tier
    pub hits: usize,
}

#[derive(Debug, Default)]
pub struct ReplicationCache {
    shared: HashMap<SharedKey, SourceKey>,
    local: HashMap<(SourceKey, u16), SourceKey>,
    stats: ReplicationStats,
}

impl ReplicationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose shared tier already knows the record-backed replicas in `study`
    pub fn seeded_from(study: &Study) -> Self {
        let mut cache = Self::new();
        for station in study.stations.iter().filter(|s| s.is_replica()) {
            if let Some(record) = &station.external_record {
                cache.shared.insert(
                    SharedKey {
                        dataset_key: record.dataset_key.clone(),
                        record_id: record.record_id.clone(),
                        channel: station.channel,
                    },
                    station.key,
                );
            }
        }
        debug!("Seeded shared replication tier with {} stations", cache.shared.len());
        cache
    }

    pub fn stats(&self) -> ReplicationStats {
        self.stats
    }

    /// Key of `original` as a digital station on `channel`
    ///
    /// A digital original already on `channel` is returned as is. New replicas
    /// are appended to the study arena.
    pub fn representation_on_channel(
        &mut self,
        study: &mut Study,
        original: SourceKey,
        channel: u16,
        ctx: ReplicationContext<'_>,
    ) -> Result<SourceKey, ReplicationError> {
        let station = study
            .station(original)
            .ok_or(ReplicationError::UnknownSource(original))?;
        if station.service.is_digital() && station.channel == channel {
            return Ok(original);
        }

        let shared_key = station.external_record.as_ref().map(|r| SharedKey {
            dataset_key: r.dataset_key.clone(),
            record_id: r.record_id.clone(),
            channel,
        });

        let cached = match &shared_key {
            Some(k) => self.shared.get(k),
            None => self.local.get(&(original, channel)),
        };
        if let Some(&key) = cached {
            self.stats.hits += 1;
            return Ok(key);
        }

        if let Some(k) = &shared_key {
            if let Some(mut found) =
                ctx.store
                    .find_shared_replication(&k.dataset_key, &k.record_id, channel)
            {
                found.replicated_from = Some(original);
                let key = study.add_station(found)?;
                self.shared.insert(k.clone(), key);
                self.stats.imported += 1;
                debug!("Imported shared replica {} of {} on channel {}", key, original, channel);
                return Ok(key);
            }
        }

        let mut replica = ctx.replicator.replicate(station, channel)?;
        if replica.channel != channel || !replica.service.is_digital() {
            return Err(ReplicationError::failed(
                station,
                channel,
                format!(
                    "replicator produced a {} station on channel {}",
                    replica.service.code(),
                    replica.channel
                ),
            ));
        }
        replica.replicated_from = Some(original);
        replica.external_record = station.external_record.clone();

        let key = study.add_station(replica)?;
        match shared_key {
            Some(k) => self.shared.insert(k, key),
            None => self.local.insert((original, channel), key),
        };
        self.stats.created += 1;
        debug!("Replicated {} to channel {} as {}", original, channel, key);
        Ok(key)
    }
}
