//! [`Segment`] is an independently locked partition of a [`ConcurrentMap`](crate::ConcurrentMap).

pub mod bucket;
pub mod pair;

use std::fmt::{self, Debug};
use std::hash::BuildHasher;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use sdd::{Guard, Shared};
use tracing::{debug, warn};

use crate::config::DEFAULT_BUCKET_NUMBER;
use crate::redistributor::PairRedistributor;
use crate::Error;
use bucket::Bucket;
use pair::{hash_key, Pair};

/// Calculates the [`Bucket`] index for the hash value.
///
/// The lower bits of the hash value are used; the upper bits select the [`Segment`].
#[allow(clippy::cast_possible_truncation)] // The remainder is less than `bucket_count`.
#[inline]
pub(crate) const fn bucket_index(hash: u64, bucket_count: usize) -> usize {
    (hash % bucket_count as u64) as usize
}

/// [`Segment`] owns a bucket table and the [`PairRedistributor`] resizing it.
///
/// Every operation, including reads, holds the segment lock from bucket selection to the end of
/// the bucket operation; a mutation additionally holds it while the table is being resized, so
/// a half-built table is never observed.
pub struct Segment<V, R> {
    table: Mutex<Table<V, R>>,
}

/// The data protected by the segment lock.
struct Table<V, R> {
    buckets: Vec<Bucket<V>>,
    pair_total: usize,
    redistributor: R,
}

impl<V: 'static, R: PairRedistributor<V>> Segment<V, R> {
    /// Creates a new [`Segment`] with `bucket_count` empty buckets.
    ///
    /// A `bucket_count` of zero is replaced with the default.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::{DefaultRedistributor, Segment};
    ///
    /// let segment: Segment<u32, _> = Segment::new(0, DefaultRedistributor::default());
    /// assert_eq!(segment.bucket_count(), 16);
    /// assert_eq!(segment.size(), 0);
    /// ```
    pub fn new(bucket_count: usize, redistributor: R) -> Self {
        let bucket_count = if bucket_count == 0 {
            DEFAULT_BUCKET_NUMBER
        } else {
            bucket_count
        };
        Self {
            table: Mutex::new(Table {
                buckets: (0..bucket_count).map(|_| Bucket::new()).collect(),
                pair_total: 0,
                redistributor,
            }),
        }
    }

    /// Puts a [`Pair`] into the [`Segment`].
    ///
    /// Returns `true` if the key was newly inserted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Redistribution`] if resizing the table failed after the key was newly
    /// inserted; the insertion itself is kept.
    pub fn put(&self, pair: Pair<V>) -> Result<bool, Error> {
        let mut table = self.table.lock();
        let bucket = &table.buckets[bucket_index(pair.hash(), table.buckets.len())];
        if !bucket.put(pair, None) {
            return Ok(false);
        }
        let bucket_size = bucket.size();
        table.pair_total += 1;
        table.redistribute(bucket_size).map(|()| true)
    }

    /// Deletes the [`Pair`] associated with the key.
    ///
    /// Returns `false` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Redistribution`] if resizing the table failed after the key was removed;
    /// the removal itself is kept.
    #[inline]
    pub fn delete<H: BuildHasher>(&self, key: &str, build_hasher: &H) -> Result<bool, Error> {
        self.delete_with_hash(key, hash_key(build_hasher, key))
    }

    /// Deletes the [`Pair`] associated with the key of which the hash value is known.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Redistribution`] if resizing the table failed after the key was removed.
    pub fn delete_with_hash(&self, key: &str, hash: u64) -> Result<bool, Error> {
        let mut table = self.table.lock();
        let bucket = &table.buckets[bucket_index(hash, table.buckets.len())];
        if !bucket.delete(key, None) {
            return Ok(false);
        }
        let bucket_size = bucket.size();
        table.pair_total -= 1;
        table.redistribute(bucket_size).map(|()| true)
    }
}

impl<V, R> Segment<V, R> {
    /// Returns the [`Pair`] associated with the key.
    #[inline]
    pub fn get<H: BuildHasher>(&self, key: &str, build_hasher: &H) -> Option<Shared<Pair<V>>> {
        self.get_with_hash(key, hash_key(build_hasher, key))
    }

    /// Returns the [`Pair`] associated with the key of which the hash value is known.
    #[inline]
    pub fn get_with_hash(&self, key: &str, hash: u64) -> Option<Shared<Pair<V>>> {
        let table = self.table.lock();
        table.buckets[bucket_index(hash, table.buckets.len())].get(key)
    }

    /// Reads the key and the element associated with the key of which the hash value is known.
    ///
    /// The segment lock is held while `reader` is running.
    #[inline]
    pub fn read_with_hash<U, F: FnOnce(&str, &V) -> U>(
        &self,
        key: &str,
        hash: u64,
        reader: F,
    ) -> Option<U> {
        let table = self.table.lock();
        let guard = Guard::new();
        let pair = table.buckets[bucket_index(hash, table.buckets.len())].get_ref(key, &guard)?;
        pair.element_ref(&guard)
            .map(|element| reader(pair.key(), element))
    }

    /// Returns the number of pairs in the [`Segment`].
    #[inline]
    pub fn size(&self) -> usize {
        self.table.lock().pair_total
    }

    /// Returns the current number of buckets.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.table.lock().buckets.len()
    }

    /// Passes the current buckets to `inspector` while holding the segment lock.
    #[cfg(test)]
    pub(crate) fn inspect<U, F: FnOnce(&[Bucket<V>]) -> U>(&self, inspector: F) -> U {
        inspector(&self.table.lock().buckets)
    }
}

impl<V, R> Debug for Segment<V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("Segment")
            .field("bucket_count", &table.buckets.len())
            .field("pair_total", &table.pair_total)
            .finish_non_exhaustive()
    }
}

impl<V: 'static, R: PairRedistributor<V>> Table<V, R> {
    /// Runs the resize sequence after a structural change to a bucket of `bucket_size` pairs.
    fn redistribute(&mut self, bucket_size: usize) -> Result<(), Error> {
        let Self {
            buckets,
            pair_total,
            redistributor,
        } = self;
        let pair_total = *pair_total;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            redistributor.update_threshold(pair_total, buckets.len());
            let status = redistributor.check_bucket_status(pair_total, bucket_size);
            redistributor.redistribute(status, &buckets[..])
        }));
        let outcome = match result {
            Ok(None) => Ok(()),
            Ok(Some(new_buckets)) if new_buckets.is_empty() => Err(Error::Redistribution(
                String::from("the new bucket sequence is empty"),
            )),
            Ok(Some(new_buckets)) => {
                debug!(
                    from = buckets.len(),
                    to = new_buckets.len(),
                    pair_total,
                    "rebuilt segment bucket table"
                );
                *buckets = new_buckets;
                Ok(())
            }
            Err(payload) => Err(Error::from_panic(payload)),
        };
        if let Err(error) = &outcome {
            warn!(%error, pair_total, "skipped segment bucket redistribution");
        }
        outcome
    }
}
