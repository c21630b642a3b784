//! Store key naming.
//!
//! Key formats are shared by every backend and must stay stable, as existing
//! state in a shared store is addressed by them:
//!
//! - unit-seen flag: `cardinality-counter-{prefix}-{hash}`
//! - bucket set: `cardinality-sets-{prefix}-{shard}-{granule}`

use crate::{CardinalityError, ClusterShardFactor, Hash, Quota, Timestamp};

/// Key of the flag marking `hash` as recently admitted under `prefix`.
pub fn unit_key(prefix: &str, hash: Hash) -> String {
    format!("cardinality-counter-{prefix}-{hash}")
}

/// Key of the set holding the hashes admitted into one shard of one granule.
pub fn set_key(prefix: &str, shard: u64, granule: u64) -> String {
    format!("cardinality-sets-{prefix}-{shard}-{granule}")
}

/// Keys to count when estimating the cardinality of `quota`'s window.
///
/// Only the oldest granule is read, across all shards. Every admission is
/// written into all granules of its window, so the oldest one still alive
/// holds everything admitted since the window opened.
pub fn read_set_keys(
    prefix: &str,
    quota: &Quota,
    timestamp: Timestamp,
    shard_factor: ClusterShardFactor,
) -> Result<Vec<String>, CardinalityError> {
    let oldest = quota.oldest_granule(timestamp)?;

    Ok((0..*shard_factor)
        .map(|shard| set_key(prefix, shard, oldest))
        .collect())
}

/// Keys `hash` is added to when admitted under `quota` at `timestamp`.
pub fn write_set_keys(
    prefix: &str,
    quota: &Quota,
    timestamp: Timestamp,
    hash: Hash,
    shard_factor: ClusterShardFactor,
) -> Result<Vec<String>, CardinalityError> {
    let shard = shard_factor.shard_of(hash);

    Ok(quota
        .granules(timestamp)?
        .into_iter()
        .map(|granule| set_key(prefix, shard, granule))
        .collect())
}
