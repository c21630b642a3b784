use std::env;

use redis::AsyncCommands;

use crate::{
    BackedCardinalityLimiter, CardinalityLimiter, CardinalityStore, ClusterShardFactor, Quota,
    RequestedQuota, WriteBatch,
    keys::{set_key, unit_key},
    redis::{RedisCardinalityStore, RedisClient},
};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_prefix() -> String {
    let n: u64 = rand::random();
    format!("cardinality_test_{n}")
}

async fn build_limiter(
    url: &str,
    shards: u64,
) -> (
    BackedCardinalityLimiter<RedisCardinalityStore>,
    redis::aio::ConnectionManager,
) {
    let client = redis::Client::open(url).unwrap();
    let cm = client.get_connection_manager().await.unwrap();
    let pool = RedisClient::from_client(client, 2).await.unwrap();

    let limiter = BackedCardinalityLimiter::new(
        RedisCardinalityStore::new(pool),
        ClusterShardFactor::try_from(shards).unwrap(),
    );

    (limiter, cm)
}

#[test]
fn grants_up_to_the_limit_and_records_state() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (limiter, mut cm) = build_limiter(&url, 3).await;
        let prefix = unique_prefix();
        let quota = Quota::new(60, 60, 2).unwrap();
        let request = RequestedQuota::new(prefix.clone(), vec![1, 2, 3], vec![quota]);

        let (timestamp, grants) = limiter
            .check_within_quotas(&[request.clone()], Some(100))
            .await
            .unwrap();
        assert_eq!(grants[0].granted_unit_hashes, vec![1, 2]);
        assert_eq!(grants[0].reached_quotas, vec![quota]);

        limiter.use_quotas(&grants, timestamp).await.unwrap();

        let flag: Option<String> = cm.get(unit_key(&prefix, 1)).await.unwrap();
        assert_eq!(flag.as_deref(), Some("1"));
        let flag_ttl: i64 = cm.ttl(unit_key(&prefix, 2)).await.unwrap();
        assert!(flag_ttl > 0 && flag_ttl <= 60);

        // hash 1 -> shard 1, hash 2 -> shard 2, both in granule 0.
        let shard_1: u64 = cm.scard(set_key(&prefix, 1, 0)).await.unwrap();
        let shard_2: u64 = cm.scard(set_key(&prefix, 2, 0)).await.unwrap();
        assert_eq!((shard_1, shard_2), (1, 1));

        let (_, grants) = limiter
            .check_within_quotas(&[request], Some(100))
            .await
            .unwrap();
        assert_eq!(grants[0].granted_unit_hashes, vec![1, 2]);
    });
}

#[test]
fn seen_units_are_free() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (limiter, mut cm) = build_limiter(&url, 3).await;
        let prefix = unique_prefix();
        let quota = Quota::new(60, 60, 2).unwrap();

        let _: () = cm.set_ex(unit_key(&prefix, 1), 1, 60).await.unwrap();

        let (_, grants) = limiter
            .check_within_quotas(
                &[RequestedQuota::new(prefix, vec![1, 2, 3], vec![quota])],
                Some(100),
            )
            .await
            .unwrap();

        assert_eq!(grants[0].granted_unit_hashes, vec![1, 2, 3]);
        assert!(grants[0].reached_quotas.is_empty());
    });
}

#[test]
fn large_member_batches_are_applied_in_full() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (limiter, mut cm) = build_limiter(&url, 1).await;
        let prefix = unique_prefix();
        let key = set_key(&prefix, 0, 0);

        let members: Vec<u64> = (0..500).collect();
        let mut batch = WriteBatch::new();
        batch.add_members(&key, &members);
        batch.expire(key.clone(), 60);

        limiter.store().write(&batch).await.unwrap();

        let count: u64 = cm.scard(&key).await.unwrap();
        assert_eq!(count, 500);
    });
}
