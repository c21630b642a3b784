use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{Client, aio::ConnectionManager};
use serde::Deserialize;

use crate::CardinalityError;

/// A round-robin pool of [`redis::aio::ConnectionManager`]s.
pub struct RedisClient {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("connection_count", &self.connection_managers.len())
            .field("track_index", &self.track_index)
            .finish_non_exhaustive()
    }
}

impl RedisClient {
    /// Create a new [`RedisClient`] holding a single connection manager.
    pub async fn default_from_client(client: Client) -> Result<Self, CardinalityError> {
        Self::from_client(client, 1).await
    }

    /// Create a new [`RedisClient`] holding `connection_count` connection managers.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, CardinalityError> {
        if connection_count == 0 {
            return Err(CardinalityError::InvalidRedisClientConnectionCount(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Self::from_connection_managers(connection_managers)
    }

    /// Wrap already established connection managers.
    pub fn from_connection_managers(
        connection_managers: Vec<ConnectionManager>,
    ) -> Result<Self, CardinalityError> {
        if connection_managers.is_empty() {
            return Err(CardinalityError::InvalidRedisClientConnectionCount(
                "at least one connection manager is required".to_string(),
            ));
        }

        Ok(Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        })
    }

    /// Get a [`redis::aio::ConnectionManager`] from the pool.
    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method get
} // end impl RedisClient

impl Clone for RedisClient {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

/// Connection settings for one named Redis cluster.
#[derive(Clone, Debug, Deserialize)]
pub struct RedisClusterConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/`.
    pub url: String,
    /// Number of multiplexed connections to open.
    #[serde(default = "default_connection_count")]
    pub connection_count: usize,
}

fn default_connection_count() -> usize {
    1
}

/// Registry of Redis clusters addressable by name.
///
/// Limiters pick their backing cluster by name from configuration, so several
/// limiters can share or split Redis deployments without code changes.
#[derive(Clone, Debug, Default)]
pub struct RedisClusters {
    clusters: HashMap<String, RedisClient>,
}

impl RedisClusters {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a client for every configured cluster.
    pub async fn connect(
        configs: &HashMap<String, RedisClusterConfig>,
    ) -> Result<Self, CardinalityError> {
        let mut clusters = Self::new();

        for (name, config) in configs {
            let client = Client::open(config.url.as_str())?;
            let client = RedisClient::from_client(client, config.connection_count).await?;
            tracing::debug!(cluster = %name, connections = config.connection_count, "redis.cluster.connected");
            clusters.insert(name.clone(), client);
        }

        Ok(clusters)
    }

    /// Register `client` under `name`, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, client: RedisClient) {
        self.clusters.insert(name.into(), client);
    }

    /// The client registered under `name`.
    pub fn get(&self, name: &str) -> Result<RedisClient, CardinalityError> {
        self.clusters
            .get(name)
            .cloned()
            .ok_or_else(|| CardinalityError::UnknownCluster(name.to_string()))
    }
}
