use serde::Deserialize;

use crate::{CardinalityError, Hash, Timestamp};

/// One admission limit over a sliding time window.
///
/// The window is split into `window_seconds / granularity_seconds` granules.
/// A small granularity makes the window slide more smoothly at the cost of
/// more keys in the backing store; a granularity equal to the window makes the
/// quota reset once per window.
///
/// # Validation
///
/// - `window_seconds` and `granularity_seconds` must be greater than 0
/// - `window_seconds` must be a multiple of `granularity_seconds`
///
/// # Examples
///
/// ```
/// use cardinality_limiter::Quota;
///
/// // At most 10_000 new units per hour, sliding in 10 minute steps.
/// let quota = Quota::new(3600, 600, 10_000).unwrap();
/// assert_eq!(quota.granule_count(), 6);
///
/// assert!(Quota::new(3600, 7, 10).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawQuota")]
pub struct Quota {
    window_seconds: u64,
    granularity_seconds: u64,
    limit: u64,
}

#[derive(Deserialize)]
struct RawQuota {
    window_seconds: u64,
    granularity_seconds: u64,
    limit: u64,
}

impl TryFrom<RawQuota> for Quota {
    type Error = CardinalityError;

    fn try_from(raw: RawQuota) -> Result<Self, Self::Error> {
        Self::new(raw.window_seconds, raw.granularity_seconds, raw.limit)
    }
}

impl Quota {
    /// Create a new quota.
    pub fn new(
        window_seconds: u64,
        granularity_seconds: u64,
        limit: u64,
    ) -> Result<Self, CardinalityError> {
        if granularity_seconds == 0 {
            return Err(CardinalityError::InvalidQuota(
                "granularity must be greater than 0".to_string(),
            ));
        }

        if window_seconds == 0 {
            return Err(CardinalityError::InvalidQuota(
                "window must be greater than 0".to_string(),
            ));
        }

        if window_seconds % granularity_seconds != 0 {
            return Err(CardinalityError::InvalidQuota(format!(
                "window of {window_seconds}s is not a multiple of the {granularity_seconds}s granularity"
            )));
        }

        Ok(Self {
            window_seconds,
            granularity_seconds,
            limit,
        })
    }

    /// Length of the sliding window in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Length of one granule in seconds.
    pub fn granularity_seconds(&self) -> u64 {
        self.granularity_seconds
    }

    /// Number of distinct new units admitted within the window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of granules making up the window.
    pub fn granule_count(&self) -> u64 {
        self.window_seconds / self.granularity_seconds
    }

    /// Granules of the window evaluated at `timestamp`, newest first.
    ///
    /// The granule containing `timestamp` is still in progress and is not part
    /// of the window: for `g = timestamp / granularity_seconds` this returns
    /// `g - 1, g - 2, ..., g - granule_count()`. The last element is the
    /// oldest granule.
    pub fn granules(&self, timestamp: Timestamp) -> Result<Vec<u64>, CardinalityError> {
        let current = timestamp / self.granularity_seconds;

        if current < self.granule_count() {
            return Err(CardinalityError::TimestampBeforeWindow {
                timestamp,
                window_seconds: self.window_seconds,
            });
        }

        Ok((1..=self.granule_count()).map(|i| current - i).collect())
    }

    /// Oldest granule of the window evaluated at `timestamp`.
    pub fn oldest_granule(&self, timestamp: Timestamp) -> Result<u64, CardinalityError> {
        let current = timestamp / self.granularity_seconds;

        current
            .checked_sub(self.granule_count())
            .ok_or(CardinalityError::TimestampBeforeWindow {
                timestamp,
                window_seconds: self.window_seconds,
            })
    }
}

/// A batch of units to evaluate against a list of quotas.
///
/// All store keys touched on behalf of this request are namespaced by
/// `prefix` (e.g. one prefix per organization). Quotas are combined with AND:
/// a unit not seen before is only admitted if it fits into every quota.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestedQuota {
    /// Namespace for all store keys of this request.
    pub prefix: String,
    /// Candidate units, in order of admission preference.
    ///
    /// Duplicates are allowed but each unseen occurrence consumes capacity.
    pub unit_hashes: Vec<Hash>,
    /// Quotas every new unit has to fit into.
    pub quotas: Vec<Quota>,
}

impl RequestedQuota {
    /// Create a new request.
    pub fn new(prefix: impl Into<String>, unit_hashes: Vec<Hash>, quotas: Vec<Quota>) -> Self {
        Self {
            prefix: prefix.into(),
            unit_hashes,
            quotas,
        }
    }
}

/// Outcome of evaluating a [`RequestedQuota`].
///
/// Produced by `check_within_quotas` and passed back unchanged to
/// `use_quotas` once the granted units have been processed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GrantedQuota {
    /// The request this grant answers.
    pub request: RequestedQuota,
    /// Admitted subset of `request.unit_hashes`, in request order.
    pub granted_unit_hashes: Vec<Hash>,
    /// Quotas that were exhausted. Empty iff every unit was granted.
    pub reached_quotas: Vec<Quota>,
}

impl GrantedQuota {
    /// A grant admitting every unit of `request`.
    pub fn full(request: RequestedQuota) -> Self {
        let granted_unit_hashes = request.unit_hashes.clone();

        Self {
            request,
            granted_unit_hashes,
            reached_quotas: Vec::new(),
        }
    }

    /// Whether every requested unit was admitted.
    pub fn is_fully_granted(&self) -> bool {
        self.reached_quotas.is_empty()
    }
}
