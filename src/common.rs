use std::{
    ops::Deref,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Deserialize;

use crate::CardinalityError;

/// Opaque identifier of one unit whose cardinality is being limited.
///
/// Values are supplied by the caller, typically derived from the identity of
/// a logical entity (e.g. a metric name plus its tags).
pub type Hash = u64;

/// Whole seconds since the Unix epoch.
pub type Timestamp = u64;

/// Upper bound on the number of members passed to a single set-add command.
pub const MAX_SET_MEMBERS_PER_COMMAND: usize = 200;

/// Current wall-clock time as a [`Timestamp`].
pub fn now_timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Number of parallel set keys each granule is split across.
///
/// Sharding bounds the size of any single set in the backing store; it has no
/// effect on admission decisions.
///
/// # Validation
///
/// Must be at least 1. Defaults to 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "u64")]
pub struct ClusterShardFactor(u64);

impl ClusterShardFactor {
    /// Shard a unit hash is written to.
    pub fn shard_of(&self, hash: Hash) -> u64 {
        hash % self.0
    }
}

impl Default for ClusterShardFactor {
    fn default() -> Self {
        Self(3)
    }
}

impl Deref for ClusterShardFactor {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for ClusterShardFactor {
    type Error = CardinalityError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(CardinalityError::InvalidShardFactor(
                "cluster shard factor must be at least 1".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}
