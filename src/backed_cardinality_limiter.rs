use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::{
    CardinalityError, CardinalityLimiter, CardinalityStore, ClusterShardFactor, GrantedQuota,
    Hash, Quota, ReadBatch, RequestedQuota, Timestamp, WriteBatch,
    keys::{read_set_keys, set_key, unit_key},
    now_timestamp,
};

/// Cardinality limiter keeping its sliding-window state in a [`CardinalityStore`].
///
/// # State
///
/// - One flag per `(prefix, hash)` marking the unit as recently admitted. It
///   lives as long as the longest window among the quotas it was admitted
///   under, and makes the unit free in every later check.
/// - One set per `(prefix, shard, granule)` holding the hashes admitted into
///   that granule, with `shard = hash % cluster_shard_factor`.
///
/// # Algorithm
///
/// **Commit** adds each admitted hash to its shard's set in *every* granule
/// of the quota's current window, and resets each set's expiry to the
/// window length.
///
/// **Check** therefore only needs the oldest granule of a window: summed
/// across shards, its cardinality already covers everything admitted while
/// the window was open. `limit - estimate` is the remaining capacity of a
/// quota and the smallest one across a request's quotas binds. Units are
/// walked in request order; seen units are granted for free, unseen ones
/// while capacity remains.
///
/// Check issues one read round trip and commit one write pipeline, both
/// skipped when there is nothing to do.
///
/// # Examples
///
/// ```
/// use cardinality_limiter::{
///     BackedCardinalityLimiter, CardinalityLimiter, ClusterShardFactor, LocalCardinalityStore,
///     Quota, RequestedQuota,
/// };
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let limiter = BackedCardinalityLimiter::new(
///     LocalCardinalityStore::new(),
///     ClusterShardFactor::default(),
/// );
///
/// let quota = Quota::new(60, 60, 2).unwrap();
/// let request = RequestedQuota::new("org-1", vec![1, 2, 3], vec![quota]);
///
/// let (timestamp, grants) = limiter.check_within_quotas(&[request], Some(100)).await.unwrap();
/// assert_eq!(grants[0].granted_unit_hashes, vec![1, 2]);
/// assert_eq!(grants[0].reached_quotas, vec![quota]);
///
/// // ...process units 1 and 2, then record them.
/// limiter.use_quotas(&grants, timestamp).await.unwrap();
/// # });
/// ```
pub struct BackedCardinalityLimiter<S> {
    store: S,
    shard_factor: ClusterShardFactor,
}

impl<S: CardinalityStore> BackedCardinalityLimiter<S> {
    /// Create a limiter on top of `store`.
    pub fn new(store: S, shard_factor: ClusterShardFactor) -> Self {
        Self {
            store,
            shard_factor,
        }
    } // end constructor

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of shards each granule is split across.
    pub fn shard_factor(&self) -> ClusterShardFactor {
        self.shard_factor
    }

    pub(crate) fn build_read_batch(
        &self,
        requests: &[RequestedQuota],
        timestamp: Timestamp,
    ) -> Result<ReadBatch, CardinalityError> {
        let mut batch = ReadBatch::default();

        for request in requests.iter().filter(|r| needs_store(r)) {
            batch.unit_keys.extend(
                request
                    .unit_hashes
                    .iter()
                    .map(|hash| unit_key(&request.prefix, *hash)),
            );

            for quota in &request.quotas {
                batch.set_keys.extend(read_set_keys(
                    &request.prefix,
                    quota,
                    timestamp,
                    self.shard_factor,
                )?);
            }
        }

        Ok(batch)
    }

    pub(crate) fn build_write_batch(
        &self,
        grants: &[GrantedQuota],
        timestamp: Timestamp,
    ) -> Result<WriteBatch, CardinalityError> {
        // Keyed maps so repeated units and shared buckets collapse into one write.
        let mut unit_ttls: BTreeMap<String, u64> = BTreeMap::new();
        let mut set_members: BTreeMap<String, (BTreeSet<Hash>, u64)> = BTreeMap::new();

        for grant in grants {
            let request = &grant.request;

            let Some(unit_ttl) = request.quotas.iter().map(Quota::window_seconds).max() else {
                continue;
            };

            if grant.granted_unit_hashes.is_empty() {
                continue;
            }

            let windows = request
                .quotas
                .iter()
                .map(|quota| Ok((quota.window_seconds(), quota.granules(timestamp)?)))
                .collect::<Result<Vec<_>, CardinalityError>>()?;

            for &hash in &grant.granted_unit_hashes {
                unit_ttls.insert(unit_key(&request.prefix, hash), unit_ttl);

                let shard = self.shard_factor.shard_of(hash);

                for (window_seconds, granules) in &windows {
                    for &granule in granules {
                        let entry = set_members
                            .entry(set_key(&request.prefix, shard, granule))
                            .or_default();
                        entry.0.insert(hash);
                        entry.1 = *window_seconds;
                    }
                }
            }
        }

        let mut batch = WriteBatch::new();

        for (key, ttl) in unit_ttls {
            batch.set_flag(key, ttl);
        }

        for (key, (members, ttl)) in set_members {
            let members: Vec<Hash> = members.into_iter().collect();
            batch.add_members(&key, &members);
            batch.expire(key, ttl);
        }

        Ok(batch)
    }
}

#[async_trait]
impl<S: CardinalityStore> CardinalityLimiter for BackedCardinalityLimiter<S> {
    async fn check_within_quotas(
        &self,
        requests: &[RequestedQuota],
        timestamp: Option<Timestamp>,
    ) -> Result<(Timestamp, Vec<GrantedQuota>), CardinalityError> {
        let timestamp = timestamp.unwrap_or_else(now_timestamp);

        let batch = self.build_read_batch(requests, timestamp)?;

        if batch.is_empty() {
            let grants = requests.iter().cloned().map(GrantedQuota::full).collect();
            return Ok((timestamp, grants));
        }

        let result = self.store.read(&batch).await?;

        if result.seen.len() != batch.unit_keys.len()
            || result.set_sizes.len() != batch.set_keys.len()
        {
            return Err(CardinalityError::UnexpectedStoreReply(format!(
                "expected {} flags and {} set sizes, got {} and {}",
                batch.unit_keys.len(),
                batch.set_keys.len(),
                result.seen.len(),
                result.set_sizes.len()
            )));
        }

        let shards = *self.shard_factor as usize;
        let mut seen = result.seen.as_slice();
        let mut set_sizes = result.set_sizes.as_slice();
        let mut grants = Vec::with_capacity(requests.len());

        for request in requests {
            if !needs_store(request) {
                grants.push(GrantedQuota::full(request.clone()));
                continue;
            }

            let (request_seen, rest) = seen.split_at(request.unit_hashes.len());
            seen = rest;

            let (request_sizes, rest) = set_sizes.split_at(request.quotas.len() * shards);
            set_sizes = rest;

            grants.push(grant_request(request, request_seen, request_sizes, shards));
        }

        let granted: usize = grants.iter().map(|g| g.granted_unit_hashes.len()).sum();
        let requested: usize = requests.iter().map(|r| r.unit_hashes.len()).sum();
        tracing::debug!(
            timestamp,
            requests = requests.len(),
            requested,
            granted,
            "cardinality.check"
        );

        Ok((timestamp, grants))
    }

    async fn use_quotas(
        &self,
        grants: &[GrantedQuota],
        timestamp: Timestamp,
    ) -> Result<(), CardinalityError> {
        let batch = self.build_write_batch(grants, timestamp)?;

        if batch.is_empty() {
            return Ok(());
        }

        self.store.write(&batch).await?;

        tracing::debug!(
            timestamp,
            grants = grants.len(),
            commands = batch.len(),
            "cardinality.commit"
        );

        Ok(())
    }
}

/// Requests without quotas are granted in full, and requests without units
/// have nothing to grant; neither needs the store.
fn needs_store(request: &RequestedQuota) -> bool {
    !request.quotas.is_empty() && !request.unit_hashes.is_empty()
}

/// Decide one request given its flags and oldest-granule set sizes.
///
/// `seen` is aligned with `request.unit_hashes`; `set_sizes` holds `shards`
/// consecutive entries per quota, in quota order.
pub(crate) fn grant_request(
    request: &RequestedQuota,
    seen: &[bool],
    set_sizes: &[u64],
    shards: usize,
) -> GrantedQuota {
    let mut quotas_by_remaining: BTreeMap<u64, Vec<Quota>> = BTreeMap::new();

    for (quota, sizes) in request.quotas.iter().zip(set_sizes.chunks(shards)) {
        let estimate: u64 = sizes.iter().sum();
        let remaining = quota.limit().saturating_sub(estimate);
        quotas_by_remaining.entry(remaining).or_default().push(*quota);
    }

    let Some((&smallest_remaining, binding_quotas)) = quotas_by_remaining.first_key_value() else {
        return GrantedQuota::full(request.clone());
    };

    let mut remaining = smallest_remaining;
    let mut exhausted = false;
    let mut granted_unit_hashes = Vec::with_capacity(request.unit_hashes.len());

    for (&hash, &is_seen) in request.unit_hashes.iter().zip(seen) {
        if is_seen {
            granted_unit_hashes.push(hash);
        } else if remaining > 0 {
            granted_unit_hashes.push(hash);
            remaining -= 1;
        } else {
            exhausted = true;
        }
    }

    let reached_quotas = if exhausted {
        binding_quotas.clone()
    } else {
        Vec::new()
    };

    GrantedQuota {
        request: request.clone(),
        granted_unit_hashes,
        reached_quotas,
    }
}
