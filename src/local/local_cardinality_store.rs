use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
    CardinalityError, CardinalityStore, Hash, ReadBatch, ReadResult, WriteBatch, WriteCommand,
};

#[derive(Debug)]
enum LocalValue {
    Flag,
    Set(HashSet<Hash>),
}

#[derive(Debug)]
struct LocalEntry {
    value: LocalValue,
    expires_at: Option<Instant>,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`CardinalityStore`].
///
/// Mirrors the subset of Redis semantics the limiter relies on: flags and
/// sets with per-key expiry, a set-add that creates missing sets without an
/// expiry, and an expire that ignores missing keys.
///
/// # Semantics & Limitations
///
/// - **Process-scoped:** state is not shared across processes
/// - **Lazy eviction:** expired keys are dropped when read or written, or by
///   [`cleanup`](Self::cleanup) / [`run_cleanup_loop`](Self::run_cleanup_loop)
/// - **Not atomic:** a write batch is applied command by command; concurrent
///   readers can observe a partially applied batch
pub struct LocalCardinalityStore {
    entries: DashMap<String, LocalEntry>,
    read_round_trips: AtomicU64,
    write_round_trips: AtomicU64,
}

impl Default for LocalCardinalityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCardinalityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            read_round_trips: AtomicU64::new(0),
            write_round_trips: AtomicU64::new(0),
        }
    }

    /// Number of keys currently held, including expired keys not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no key.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of read batches served so far.
    pub fn read_round_trips(&self) -> u64 {
        self.read_round_trips.load(Ordering::Relaxed)
    }

    /// Number of write batches applied so far.
    pub fn write_round_trips(&self) -> u64 {
        self.write_round_trips.load(Ordering::Relaxed)
    }

    /// Whether `key` exists and has not expired.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Members of the set at `key`, empty if missing or expired.
    pub fn members(&self, key: &str) -> Vec<Hash> {
        let now = Instant::now();

        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                LocalValue::Set(members) => members.iter().copied().collect(),
                LocalValue::Flag => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Remaining time to live of `key`, `None` if missing or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();

        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Drop every expired key. Returns the number of keys removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();

        self.entries.retain(|_, entry| !entry.is_expired(now));

        before.saturating_sub(self.entries.len())
    } // end method cleanup

    /// Periodically evict expired keys on the current tokio runtime.
    ///
    /// The loop holds a weak reference and stops once the store is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn run_cleanup_loop(self: &Arc<Self>, interval: Duration) {
        let store = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            // discard the first tick
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(store) = store.upgrade() else {
                    break;
                };

                let removed = store.cleanup();
                if removed > 0 {
                    tracing::trace!(removed, "cardinality.local.cleanup");
                }
            }
        });
    }

    fn is_live(&self, key: &str, now: Instant) -> bool {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }

        !expired
    }

    fn cardinality(&self, key: &str, now: Instant) -> u64 {
        if !self.is_live(key, now) {
            return 0;
        }

        self.entries
            .get(key)
            .map_or(0, |entry| match &entry.value {
                LocalValue::Set(members) => members.len() as u64,
                LocalValue::Flag => 0,
            })
    }

    fn apply(&self, command: &WriteCommand, now: Instant) {
        match command {
            WriteCommand::SetFlag { key, ttl_seconds } => {
                self.entries.insert(
                    key.clone(),
                    LocalEntry {
                        value: LocalValue::Flag,
                        expires_at: Some(now + Duration::from_secs(*ttl_seconds)),
                    },
                );
            }
            WriteCommand::AddMembers { key, members } => {
                let mut entry = self.entries.entry(key.clone()).or_insert(LocalEntry {
                    value: LocalValue::Set(HashSet::new()),
                    expires_at: None,
                });

                if entry.is_expired(now) || !matches!(entry.value, LocalValue::Set(_)) {
                    *entry = LocalEntry {
                        value: LocalValue::Set(HashSet::new()),
                        expires_at: None,
                    };
                }

                if let LocalValue::Set(set) = &mut entry.value {
                    set.extend(members.iter().copied());
                }
            }
            WriteCommand::Expire { key, ttl_seconds } => {
                if self.is_live(key, now)
                    && let Some(mut entry) = self.entries.get_mut(key)
                {
                    entry.expires_at = Some(now + Duration::from_secs(*ttl_seconds));
                }
            }
        }
    }
}

#[async_trait]
impl CardinalityStore for LocalCardinalityStore {
    async fn read(&self, batch: &ReadBatch) -> Result<ReadResult, CardinalityError> {
        self.read_round_trips.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        Ok(ReadResult {
            seen: batch
                .unit_keys
                .iter()
                .map(|key| self.is_live(key, now))
                .collect(),
            set_sizes: batch
                .set_keys
                .iter()
                .map(|key| self.cardinality(key, now))
                .collect(),
        })
    }

    async fn write(&self, batch: &WriteBatch) -> Result<(), CardinalityError> {
        self.write_round_trips.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        for command in batch.commands() {
            self.apply(command, now);
        }

        Ok(())
    }
}
