use super::runtime::block_on;
use crate::{
    CardinalityError, CardinalityLimiter, CardinalityLimiterConfig, CardinalityLimiterOptions,
    ClusterShardFactor, Quota, RequestedQuota, build_limiter,
};

#[test]
fn config_defaults_to_noop() {
    assert_eq!(
        CardinalityLimiterConfig::default(),
        CardinalityLimiterConfig::Noop
    );

    let config: CardinalityLimiterConfig =
        serde_json::from_str(r#"{ "backend": "noop" }"#).unwrap();
    assert_eq!(config, CardinalityLimiterConfig::Noop);
}

#[test]
fn local_config_defaults_shard_factor() {
    let config: CardinalityLimiterConfig =
        serde_json::from_str(r#"{ "backend": "local" }"#).unwrap();

    assert_eq!(
        config,
        CardinalityLimiterConfig::Local {
            cluster_shard_factor: ClusterShardFactor::default()
        }
    );
}

#[test]
fn zero_shard_factor_is_rejected() {
    let result = serde_json::from_str::<CardinalityLimiterConfig>(
        r#"{ "backend": "local", "cluster_shard_factor": 0 }"#,
    );

    assert!(result.is_err());
}

#[test]
fn quotas_deserialize_with_validation() {
    let quota: Quota = serde_json::from_str(
        r#"{ "window_seconds": 3600, "granularity_seconds": 600, "limit": 100 }"#,
    )
    .unwrap();
    assert_eq!(quota, Quota::new(3600, 600, 100).unwrap());

    let invalid = serde_json::from_str::<Quota>(
        r#"{ "window_seconds": 3600, "granularity_seconds": 7, "limit": 100 }"#,
    );
    assert!(invalid.is_err());
}

#[test]
fn builds_the_configured_backend() {
    block_on(async {
        let options = CardinalityLimiterOptions::default();
        let quota = Quota::new(60, 60, 1).unwrap();
        let requests = [RequestedQuota::new("org", vec![1, 2], vec![quota])];

        let noop = build_limiter(&CardinalityLimiterConfig::Noop, &options).unwrap();
        let (_, grants) = noop.check_within_quotas(&requests, Some(100)).await.unwrap();
        assert_eq!(grants[0].granted_unit_hashes, vec![1, 2]);

        let local = build_limiter(
            &CardinalityLimiterConfig::Local {
                cluster_shard_factor: ClusterShardFactor::default(),
            },
            &options,
        )
        .unwrap();
        let (_, grants) = local.check_within_quotas(&requests, Some(100)).await.unwrap();
        assert_eq!(grants[0].granted_unit_hashes, vec![1]);
    });
}

#[cfg(feature = "redis-tokio")]
#[test]
fn redis_config_defaults_cluster() {
    let config: CardinalityLimiterConfig =
        serde_json::from_str(r#"{ "backend": "redis", "cluster_shard_factor": 5 }"#).unwrap();

    assert_eq!(
        config,
        CardinalityLimiterConfig::Redis {
            cluster: "default".to_string(),
            cluster_shard_factor: ClusterShardFactor::try_from(5).unwrap(),
        }
    );
}

#[cfg(feature = "redis-tokio")]
#[test]
fn unknown_redis_cluster_is_rejected() {
    let config = CardinalityLimiterConfig::Redis {
        cluster: "metrics".to_string(),
        cluster_shard_factor: ClusterShardFactor::default(),
    };

    match build_limiter(&config, &CardinalityLimiterOptions::default()) {
        Err(CardinalityError::UnknownCluster(name)) => assert_eq!(name, "metrics"),
        Err(err) => panic!("unexpected error: {err}"),
        Ok(_) => panic!("expected an unknown cluster error"),
    }
}
