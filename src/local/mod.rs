//! In-process backing store.
//!
//! [`LocalCardinalityStore`] keeps the limiter's flags and bucket sets in a
//! [`DashMap`](dashmap::DashMap) with Redis-like expiry.
//!
//! # When to Use
//!
//! ✅ **Use the local store when:**
//! - A single process owns the limited key space
//! - Tests and benchmarks need the real algorithm without Redis
//!
//! ❌ **Don't use the local store when:**
//! - Several instances must share the same limits
//! - State must survive process restarts
//!
//! # Examples
//!
//! ```
//! use cardinality_limiter::{BackedCardinalityLimiter, ClusterShardFactor, LocalCardinalityStore};
//!
//! let store = LocalCardinalityStore::new();
//! let limiter = BackedCardinalityLimiter::new(store, ClusterShardFactor::default());
//! assert!(limiter.store().is_empty());
//! ```

mod local_cardinality_store;
pub use local_cardinality_store::*;
