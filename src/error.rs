/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum CardinalityError {
    /// A quota whose window cannot be split into whole granules.
    #[error("invalid quota: {0}")]
    InvalidQuota(String),

    /// A shard factor of zero.
    #[error("invalid cluster shard factor: {0}")]
    InvalidShardFactor(String),

    /// The request timestamp lies before the first granule of the quota's window.
    #[error("timestamp {timestamp} is too early for a {window_seconds}s window")]
    TimestampBeforeWindow {
        /// Offending timestamp, in seconds.
        timestamp: u64,
        /// Window of the quota being evaluated.
        window_seconds: u64,
    },

    /// No Redis cluster registered under the requested name.
    #[error("unknown redis cluster: {0}")]
    UnknownCluster(String),

    /// Invalid redis client connection count.
    #[error("invalid redis client connection count: {0}")]
    InvalidRedisClientConnectionCount(String),

    /// The backing store answered with a reply of an unexpected shape.
    #[error("unexpected store reply: {0}")]
    UnexpectedStoreReply(String),

    /// Redis error.
    #[cfg(feature = "redis-tokio")]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}
