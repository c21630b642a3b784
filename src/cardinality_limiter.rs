use async_trait::async_trait;

use crate::{CardinalityError, GrantedQuota, RequestedQuota, Timestamp, now_timestamp};

/// A limiter bounding the cardinality of a set rather than a rate.
///
/// Callers pass in candidate units and get back the subset that may be
/// processed. Units already admitted within a quota's window are free and
/// never count against it again.
///
/// Admission happens in two phases so a grant can be dropped without leaving
/// a trace when downstream processing fails:
///
/// 1. [`check_within_quotas`](CardinalityLimiter::check_within_quotas) computes
///    grants without touching limiter state.
/// 2. [`use_quotas`](CardinalityLimiter::use_quotas) records the granted units.
///
/// Nothing ties the two phases together: concurrent callers sharing a prefix
/// can both be granted the last slot of a quota. Limits are approximate.
///
/// Store failures are returned as-is. Whether to fail open or closed is up to
/// the caller.
#[async_trait]
pub trait CardinalityLimiter: Send + Sync {
    /// Compute grants for `requests` at `timestamp` (now if `None`).
    ///
    /// Returns the timestamp used together with one grant per request, in
    /// request order. Repeated calls against unchanged state return the same
    /// grants.
    ///
    /// A timestamp far in the past can look at windows whose state has
    /// already expired, effectively disabling the limits.
    async fn check_within_quotas(
        &self,
        requests: &[RequestedQuota],
        timestamp: Option<Timestamp>,
    ) -> Result<(Timestamp, Vec<GrantedQuota>), CardinalityError>;

    /// Record the units admitted by `grants`.
    ///
    /// `timestamp` must be the one returned by the `check_within_quotas` call
    /// that produced `grants`. Calling this twice for the same grants counts
    /// them twice.
    async fn use_quotas(
        &self,
        grants: &[GrantedQuota],
        timestamp: Timestamp,
    ) -> Result<(), CardinalityError>;
}

/// Limiter granting everything and recording nothing.
///
/// Used when cardinality limiting is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCardinalityLimiter;

#[async_trait]
impl CardinalityLimiter for NoopCardinalityLimiter {
    async fn check_within_quotas(
        &self,
        requests: &[RequestedQuota],
        timestamp: Option<Timestamp>,
    ) -> Result<(Timestamp, Vec<GrantedQuota>), CardinalityError> {
        let timestamp = timestamp.unwrap_or_else(now_timestamp);

        let grants = requests.iter().cloned().map(GrantedQuota::full).collect();

        Ok((timestamp, grants))
    }

    async fn use_quotas(
        &self,
        _grants: &[GrantedQuota],
        _timestamp: Timestamp,
    ) -> Result<(), CardinalityError> {
        Ok(())
    }
}
