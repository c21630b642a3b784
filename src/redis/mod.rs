//! Redis backing store.
//!
//! [`RedisCardinalityStore`] keeps the limiter's state in a Redis deployment
//! shared by every process enforcing the same quotas. [`RedisClusters`] maps
//! cluster names from configuration to connection pools.

mod redis_client;
pub use redis_client::*;

mod redis_cardinality_store;
pub use redis_cardinality_store::*;
