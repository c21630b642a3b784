//! Backend selection.
//!
//! Which limiter runs is a configuration decision: [`build_limiter`] turns a
//! [`CardinalityLimiterConfig`] into a ready [`CardinalityLimiter`].

use std::sync::Arc;

use serde::Deserialize;

#[cfg(feature = "redis-tokio")]
use crate::redis::{RedisCardinalityStore, RedisClusters};
use crate::{
    BackedCardinalityLimiter, CardinalityError, CardinalityLimiter, ClusterShardFactor,
    LocalCardinalityStore, NoopCardinalityLimiter,
};

/// Configuration of one cardinality limiter.
///
/// Deserializes from an internally tagged map:
///
/// ```
/// use cardinality_limiter::CardinalityLimiterConfig;
///
/// let config: CardinalityLimiterConfig = serde_json::from_str(
///     r#"{ "backend": "local", "cluster_shard_factor": 5 }"#,
/// ).unwrap();
///
/// assert!(matches!(config, CardinalityLimiterConfig::Local { .. }));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum CardinalityLimiterConfig {
    /// Grant everything, record nothing.
    #[default]
    Noop,
    /// Keep state in process memory.
    Local {
        /// Shards per granule.
        #[serde(default)]
        cluster_shard_factor: ClusterShardFactor,
    },
    /// Keep state in a named Redis cluster.
    #[cfg(feature = "redis-tokio")]
    Redis {
        /// Name of the cluster in [`RedisClusters`].
        #[serde(default = "default_cluster")]
        cluster: String,
        /// Shards per granule.
        #[serde(default)]
        cluster_shard_factor: ClusterShardFactor,
    },
}

#[cfg(feature = "redis-tokio")]
fn default_cluster() -> String {
    "default".to_string()
}

/// Shared resources limiters are built from.
#[derive(Clone, Debug, Default)]
pub struct CardinalityLimiterOptions {
    /// Redis clusters available to `redis` backends.
    #[cfg(feature = "redis-tokio")]
    pub redis_clusters: RedisClusters,
}

/// Build the limiter described by `config`.
///
/// Fails with [`CardinalityError::UnknownCluster`] if a Redis backend names a
/// cluster missing from `options`.
pub fn build_limiter(
    config: &CardinalityLimiterConfig,
    options: &CardinalityLimiterOptions,
) -> Result<Arc<dyn CardinalityLimiter>, CardinalityError> {
    #[cfg(not(feature = "redis-tokio"))]
    let _ = options;

    match config {
        CardinalityLimiterConfig::Noop => Ok(Arc::new(NoopCardinalityLimiter)),
        CardinalityLimiterConfig::Local {
            cluster_shard_factor,
        } => Ok(Arc::new(BackedCardinalityLimiter::new(
            LocalCardinalityStore::new(),
            *cluster_shard_factor,
        ))),
        #[cfg(feature = "redis-tokio")]
        CardinalityLimiterConfig::Redis {
            cluster,
            cluster_shard_factor,
        } => {
            let client = options.redis_clusters.get(cluster)?;

            Ok(Arc::new(BackedCardinalityLimiter::new(
                RedisCardinalityStore::new(client),
                *cluster_shard_factor,
            )))
        }
    }
}
