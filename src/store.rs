//! Contract between the limiter and its backing store.
//!
//! The limiter talks to the store in exactly two shapes: one batched read per
//! check and one batched, non-transactional write per commit. Each call on
//! [`CardinalityStore`] is a single round trip.

use async_trait::async_trait;

use crate::{CardinalityError, Hash, MAX_SET_MEMBERS_PER_COMMAND};

/// Keys fetched during a check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadBatch {
    /// Unit-seen flags to test for existence.
    pub unit_keys: Vec<String>,
    /// Bucket sets whose cardinality is requested.
    pub set_keys: Vec<String>,
}

impl ReadBatch {
    /// Whether there is nothing to fetch.
    pub fn is_empty(&self) -> bool {
        self.unit_keys.is_empty() && self.set_keys.is_empty()
    }
}

/// Answer to a [`ReadBatch`], positionally aligned with its keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadResult {
    /// `seen[i]` is true iff `unit_keys[i]` exists.
    pub seen: Vec<bool>,
    /// `set_sizes[i]` is the cardinality of `set_keys[i]`, 0 if missing.
    pub set_sizes: Vec<u64>,
}

/// One mutation issued during a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteCommand {
    /// Set a presence flag expiring after `ttl_seconds`.
    SetFlag {
        /// Flag key.
        key: String,
        /// Time to live in seconds.
        ttl_seconds: u64,
    },
    /// Add members to a set, creating it if needed.
    AddMembers {
        /// Set key.
        key: String,
        /// At most [`MAX_SET_MEMBERS_PER_COMMAND`] members.
        members: Vec<Hash>,
    },
    /// (Re)set the time to live of an existing key.
    Expire {
        /// Key to expire.
        key: String,
        /// Time to live in seconds.
        ttl_seconds: u64,
    },
}

/// Ordered mutations executed as one pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    commands: Vec<WriteCommand>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a flag with a time to live.
    pub fn set_flag(&mut self, key: String, ttl_seconds: u64) {
        self.commands.push(WriteCommand::SetFlag { key, ttl_seconds });
    }

    /// Queue set additions, split into chunks of at most
    /// [`MAX_SET_MEMBERS_PER_COMMAND`] members.
    pub fn add_members(&mut self, key: &str, members: &[Hash]) {
        for chunk in members.chunks(MAX_SET_MEMBERS_PER_COMMAND) {
            self.commands.push(WriteCommand::AddMembers {
                key: key.to_string(),
                members: chunk.to_vec(),
            });
        }
    }

    /// Queue a time to live refresh.
    pub fn expire(&mut self, key: String, ttl_seconds: u64) {
        self.commands.push(WriteCommand::Expire { key, ttl_seconds });
    }

    /// Queued commands, in execution order.
    pub fn commands(&self) -> &[WriteCommand] {
        &self.commands
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no command is queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A key-value/set store able to hold the limiter's sliding-window state.
///
/// Implementations must execute each call as a single round trip. Writes are
/// applied in order but need not be atomic with respect to other clients; a
/// failure halfway through may leave a prefix of the batch applied.
#[async_trait]
pub trait CardinalityStore: Send + Sync {
    /// Fetch flag existence and set cardinalities.
    async fn read(&self, batch: &ReadBatch) -> Result<ReadResult, CardinalityError>;

    /// Apply every command of `batch`, in order.
    async fn write(&self, batch: &WriteBatch) -> Result<(), CardinalityError>;
}
