mod runtime;

mod test_config;
#[cfg(feature = "redis-tokio")]
mod test_redis_cardinality_store;
