//! TV channel bands
//!
//! Adjacency is only modeled inside one partition of the channel plan:
//! 2-4, 5-6, 7-13 and 14 and up. Channels on either side of a partition edge
//! are never treated as adjacent.

use serde::{Deserialize, Serialize};

/// Partition of the channel plan used for adjacency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjacencyBand {
    LowVhfA,
    LowVhfB,
    HighVhf,
    Uhf,
}

impl AdjacencyBand {
    /// Band of a channel, `None` below channel 2
    pub fn of(channel: u16) -> Option<Self> {
        match channel {
            2..=4 => Some(AdjacencyBand::LowVhfA),
            5..=6 => Some(AdjacencyBand::LowVhfB),
            7..=13 => Some(AdjacencyBand::HighVhf),
            14.. => Some(AdjacencyBand::Uhf),
            _ => None,
        }
    }
}

/// True when both channels sit in the same adjacency band
pub fn same_band(a: u16, b: u16) -> bool {
    match (AdjacencyBand::of(a), AdjacencyBand::of(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Inclusive channel range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRange {
    pub first: u16,
    pub last: u16,
}

impl ChannelRange {
    pub const fn new(first: u16, last: u16) -> Self {
        Self { first, last }
    }

    pub fn contains(&self, channel: u16) -> bool {
        (self.first..=self.last).contains(&channel)
    }

    pub fn len(&self) -> usize {
        if self.last < self.first {
            0
        } else {
            (self.last - self.first) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
