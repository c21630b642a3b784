#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod cardinality_limiter;
pub use cardinality_limiter::*;

mod backed_cardinality_limiter;
pub use backed_cardinality_limiter::*;

mod store;
pub use store::*;

pub mod keys;

pub mod local;
pub use local::*;

#[cfg(feature = "redis-tokio")]
pub mod redis;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod quota;
pub use quota::*;

mod common;
pub use common::{
    ClusterShardFactor, Hash, MAX_SET_MEMBERS_PER_COMMAND, Timestamp, now_timestamp,
};

#[cfg(test)]
mod tests;
