//! [`PairRedistributor`] decides when the bucket table of a segment is rebuilt.

use sdd::Guard;
use tracing::trace;

use crate::config::Config;
use crate::segment::bucket::Bucket;
use crate::segment::bucket_index;

/// The floor of the average bucket size used to derive the overweight threshold.
pub const MIN_AVERAGE_BUCKET_SIZE: usize = 100;

/// The minimum number of buckets required for shrinking.
pub const MIN_SHRINKABLE_BUCKET_NUMBER: usize = 100;

/// The minimum number of buckets after shrinking.
pub const MIN_BUCKET_NUMBER: usize = 2;

/// [`BucketStatus`] classifies a bucket after a mutation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BucketStatus {
    /// Normal: no action required.
    Normal,
    /// Underweight: the table may shrink.
    Underweight,
    /// Overweight: the table may grow.
    Overweight,
}

/// [`PairRedistributor`] is the resize policy of a single segment.
///
/// A segment owns its own [`PairRedistributor`] and invokes it while holding the segment lock
/// after every insertion of a new key and every removal, in the following order.
///
/// 1. [`update_threshold`](Self::update_threshold) with the new pair total.
/// 2. [`check_bucket_status`](Self::check_bucket_status) with the size of the affected bucket.
/// 3. [`redistribute`](Self::redistribute) with the status and the current buckets.
///
/// A panic raised by any of them is caught by the segment and reported as
/// [`Error::Redistribution`](crate::Error::Redistribution).
pub trait PairRedistributor<V> {
    /// Recomputes the threshold from the number of pairs and buckets in the segment.
    fn update_threshold(&mut self, pair_total: usize, bucket_count: usize);

    /// Classifies a bucket of the given size.
    fn check_bucket_status(&mut self, pair_total: usize, bucket_size: usize) -> BucketStatus;

    /// Returns a rebuilt bucket sequence if the bucket count is to be changed.
    ///
    /// `buckets` must not be modified; the segment keeps it if `None` is returned.
    fn redistribute(&mut self, status: BucketStatus, buckets: &[Bucket<V>])
        -> Option<Vec<Bucket<V>>>;
}

/// [`DefaultRedistributor`] grows or shrinks a table by a factor of two.
///
/// A bucket is overweight if its size exceeds the maximum bucket size, or reaches
/// `max(pair_total / bucket_count, 100) * load_factor`. Every overweight and every empty bucket
/// observed is counted, and the table is resized only if at least a quarter of the buckets have
/// been observed empty since the counters were last reset.
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultRedistributor {
    load_factor: f64,
    max_bucket_size: usize,
    upper_threshold: usize,
    overweight_count: usize,
    empty_count: usize,
}

impl DefaultRedistributor {
    /// Creates a new [`DefaultRedistributor`] for a segment of `bucket_count` buckets.
    ///
    /// A non-positive `load_factor` is replaced with the default.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::DefaultRedistributor;
    ///
    /// let redistributor = DefaultRedistributor::new(0.5, 16);
    /// assert_eq!(redistributor.upper_threshold(), 50);
    ///
    /// let redistributor = DefaultRedistributor::new(-1.0, 16);
    /// assert_eq!(redistributor.upper_threshold(), 75);
    /// ```
    #[must_use]
    pub fn new(load_factor: f64, bucket_count: usize) -> Self {
        Self::with_config(
            &Config::default()
                .load_factor(load_factor)
                .initial_buckets(bucket_count),
        )
    }

    /// Creates a new [`DefaultRedistributor`] from a [`Config`].
    #[must_use]
    pub fn with_config(config: &Config) -> Self {
        let mut redistributor = Self {
            load_factor: config.effective_load_factor(),
            max_bucket_size: config.effective_max_bucket_size(),
            upper_threshold: 0,
            overweight_count: 0,
            empty_count: 0,
        };
        redistributor.compute_threshold(0, config.effective_initial_buckets());
        redistributor
    }

    /// Returns the load factor.
    #[inline]
    pub const fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Returns the current overweight threshold.
    #[inline]
    pub const fn upper_threshold(&self) -> usize {
        self.upper_threshold
    }

    /// Returns the number of overweight buckets observed since the last reset.
    #[inline]
    pub const fn overweight_count(&self) -> usize {
        self.overweight_count
    }

    /// Returns the number of empty buckets observed since the last reset.
    #[inline]
    pub const fn empty_count(&self) -> usize {
        self.empty_count
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn compute_threshold(&mut self, pair_total: usize, bucket_count: usize) {
        let average = (pair_total / bucket_count.max(1)).max(MIN_AVERAGE_BUCKET_SIZE);
        self.upper_threshold = (average as f64 * self.load_factor) as usize;
    }

    fn reset_counters(&mut self) {
        self.overweight_count = 0;
        self.empty_count = 0;
    }

    /// Returns `true` if at least a quarter of `bucket_count` buckets were observed empty.
    fn sparse_enough(&self, bucket_count: usize) -> bool {
        self.empty_count.saturating_mul(4) >= bucket_count
    }
}

impl Default for DefaultRedistributor {
    #[inline]
    fn default() -> Self {
        Self::with_config(&Config::default())
    }
}

impl<V: 'static> PairRedistributor<V> for DefaultRedistributor {
    #[inline]
    fn update_threshold(&mut self, pair_total: usize, bucket_count: usize) {
        self.compute_threshold(pair_total, bucket_count);
    }

    fn check_bucket_status(&mut self, _pair_total: usize, bucket_size: usize) -> BucketStatus {
        if bucket_size > self.max_bucket_size || bucket_size >= self.upper_threshold {
            self.overweight_count += 1;
            return BucketStatus::Overweight;
        }
        if bucket_size == 0 {
            self.empty_count += 1;
        }
        BucketStatus::Normal
    }

    fn redistribute(
        &mut self,
        status: BucketStatus,
        buckets: &[Bucket<V>],
    ) -> Option<Vec<Bucket<V>>> {
        let current = buckets.len();
        let new_count = match status {
            BucketStatus::Overweight => {
                if !self.sparse_enough(current) {
                    trace!(current, empty = self.empty_count, "growth declined");
                    return None;
                }
                current.saturating_mul(2)
            }
            BucketStatus::Underweight => {
                if current < MIN_SHRINKABLE_BUCKET_NUMBER || !self.sparse_enough(current) {
                    trace!(current, empty = self.empty_count, "shrink declined");
                    return None;
                }
                (current / 2).max(MIN_BUCKET_NUMBER)
            }
            BucketStatus::Normal => return None,
        };
        if new_count == current {
            self.reset_counters();
            return None;
        }

        // Copies are relinked instead of the live pairs, so `buckets` stays intact.
        let guard = Guard::new();
        let new_buckets: Vec<Bucket<V>> = (0..new_count).map(|_| Bucket::new()).collect();
        for pair in buckets.iter().flat_map(|bucket| bucket.pairs(&guard)) {
            new_buckets[bucket_index(pair.hash(), new_count)].put(pair.copy(), None);
        }
        self.reset_counters();
        Some(new_buckets)
    }
}
