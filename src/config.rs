//! Tunable constants and [`Config`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The default load factor of a segment.
///
/// A bucket whose size reaches this factor times the average bucket size of its segment is
/// considered overweight.
pub const DEFAULT_BUCKET_LOAD_FACTOR: f64 = 0.75;

/// The default number of buckets in a newly created segment.
pub const DEFAULT_BUCKET_NUMBER: usize = 16;

/// The default maximum bucket size; a larger bucket is always overweight.
pub const DEFAULT_BUCKET_MAX_SIZE: usize = 1000;

/// The default number of segments.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// The maximum number of segments.
pub const MAX_CONCURRENCY: usize = 65536;

/// [`Config`] holds the construction parameters of a [`ConcurrentMap`](crate::ConcurrentMap).
///
/// Out-of-range tuning values fall back to their defaults when the map is built; only
/// `concurrency` is validated strictly.
///
/// # Examples
///
/// ```
/// use cmap::{Config, ConcurrentMap};
///
/// let config = Config::default().concurrency(4).load_factor(0.5);
/// let map: ConcurrentMap<u64> = ConcurrentMap::with_config(config).unwrap();
/// assert_eq!(map.concurrency(), 4);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// The number of segments, `[1, MAX_CONCURRENCY]`.
    pub concurrency: usize,
    /// The load factor used to derive the overweight threshold.
    pub load_factor: f64,
    /// The initial number of buckets per segment.
    pub initial_buckets: usize,
    /// The bucket size above which a bucket is always overweight.
    pub max_bucket_size: usize,
}

impl Config {
    /// Sets the number of segments.
    #[inline]
    #[must_use]
    pub const fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the load factor.
    #[inline]
    #[must_use]
    pub const fn load_factor(mut self, load_factor: f64) -> Self {
        self.load_factor = load_factor;
        self
    }

    /// Sets the initial number of buckets per segment.
    #[inline]
    #[must_use]
    pub const fn initial_buckets(mut self, initial_buckets: usize) -> Self {
        self.initial_buckets = initial_buckets;
        self
    }

    /// Sets the maximum bucket size.
    #[inline]
    #[must_use]
    pub const fn max_bucket_size(mut self, max_bucket_size: usize) -> Self {
        self.max_bucket_size = max_bucket_size;
        self
    }

    /// Returns the effective load factor.
    pub(crate) fn effective_load_factor(&self) -> f64 {
        if self.load_factor.is_finite() && self.load_factor > 0.0 {
            self.load_factor
        } else {
            DEFAULT_BUCKET_LOAD_FACTOR
        }
    }

    /// Returns the effective initial number of buckets per segment.
    pub(crate) const fn effective_initial_buckets(&self) -> usize {
        if self.initial_buckets == 0 {
            DEFAULT_BUCKET_NUMBER
        } else {
            self.initial_buckets
        }
    }

    /// Returns the effective maximum bucket size.
    pub(crate) const fn effective_max_bucket_size(&self) -> usize {
        if self.max_bucket_size == 0 {
            DEFAULT_BUCKET_MAX_SIZE
        } else {
            self.max_bucket_size
        }
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            load_factor: DEFAULT_BUCKET_LOAD_FACTOR,
            initial_buckets: DEFAULT_BUCKET_NUMBER,
            max_bucket_size: DEFAULT_BUCKET_MAX_SIZE,
        }
    }
}
