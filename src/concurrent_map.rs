//! [`ConcurrentMap`] is a segmented concurrent hash map.

use std::collections::hash_map::RandomState;
use std::fmt::{self, Debug};
use std::hash::BuildHasher;
use std::sync::atomic::AtomicIsize;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;

use sdd::Shared;

use crate::config::{Config, MAX_CONCURRENCY};
use crate::redistributor::{DefaultRedistributor, PairRedistributor};
use crate::segment::pair::{hash_key, Pair};
use crate::segment::Segment;
use crate::Error;

/// Segmented concurrent hash map.
///
/// [`ConcurrentMap`] partitions its keys among a fixed number of [`Segment`] instances, each of
/// which is guarded by its own lock, so that operations on keys of different segments never
/// contend.
///
/// ## The key characteristics of [`ConcurrentMap`]
///
/// * The upper bits of the hash value of a key select the segment; the lower bits select the
///   bucket within the segment.
/// * A segment rebuilds its bucket table when its [`PairRedistributor`] asks for it; the rebuild
///   relocates every pair of the segment while the segment is locked.
/// * [`len`](Self::len) is a lock-free counter which is eventually consistent with the segments.
///
/// # Examples
///
/// ```
/// use cmap::ConcurrentMap;
///
/// let map: ConcurrentMap<u64> = ConcurrentMap::new(4).unwrap();
///
/// assert_eq!(map.put("a", 1_u64), Ok(true));
/// assert_eq!(map.put("a", 2_u64), Ok(false));
/// assert_eq!(map.get("a").map(|v| *v), Some(2));
/// assert!(map.delete("a"));
/// assert!(map.get("a").is_none());
/// assert_eq!(map.len(), 0);
/// ```
pub struct ConcurrentMap<V, R = DefaultRedistributor, H = RandomState> {
    segments: Box<[Segment<V, R>]>,
    total: AtomicIsize,
    build_hasher: H,
}

impl<V: 'static> ConcurrentMap<V> {
    /// Creates an empty [`ConcurrentMap`] with `concurrency` segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `concurrency` is not in `[1, 65536]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::ConcurrentMap;
    ///
    /// assert!(ConcurrentMap::<u64>::new(0).is_err());
    /// assert!(ConcurrentMap::<u64>::new(65537).is_err());
    /// assert_eq!(ConcurrentMap::<u64>::new(65536).unwrap().concurrency(), 65536);
    /// ```
    #[inline]
    pub fn new(concurrency: usize) -> Result<Self, Error> {
        Self::with_config(Config::default().concurrency(concurrency))
    }

    /// Creates an empty [`ConcurrentMap`] with the given [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the concurrency is out of range.
    #[inline]
    pub fn with_config(config: Config) -> Result<Self, Error> {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<V: 'static, R: PairRedistributor<V> + Clone> ConcurrentMap<V, R> {
    /// Creates an empty [`ConcurrentMap`] of which every segment owns a clone of
    /// `redistributor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `concurrency` is not in `[1, 65536]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::{ConcurrentMap, DefaultRedistributor};
    ///
    /// let map: ConcurrentMap<u64, _> =
    ///     ConcurrentMap::with_redistributor(8, DefaultRedistributor::new(0.5, 16)).unwrap();
    /// assert_eq!(map.concurrency(), 8);
    /// ```
    #[inline]
    pub fn with_redistributor(concurrency: usize, redistributor: R) -> Result<Self, Error> {
        Self::with_parts(
            Config::default().concurrency(concurrency),
            redistributor,
            RandomState::new(),
        )
    }
}

impl<V: 'static, H: BuildHasher> ConcurrentMap<V, DefaultRedistributor, H> {
    /// Creates an empty [`ConcurrentMap`] with the given [`Config`] and [`BuildHasher`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the concurrency is out of range.
    #[inline]
    pub fn with_config_and_hasher(config: Config, build_hasher: H) -> Result<Self, Error> {
        let redistributor = DefaultRedistributor::with_config(&config);
        Self::with_parts(config, redistributor, build_hasher)
    }
}

impl<V: 'static, R: PairRedistributor<V>, H: BuildHasher> ConcurrentMap<V, R, H> {
    /// Creates an empty [`ConcurrentMap`] from all its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the concurrency is out of range.
    pub fn with_parts(config: Config, redistributor: R, build_hasher: H) -> Result<Self, Error>
    where
        R: Clone,
    {
        if config.concurrency == 0 {
            return Err(Error::InvalidArgument("concurrency is too small"));
        }
        if config.concurrency > MAX_CONCURRENCY {
            return Err(Error::InvalidArgument("concurrency is too large"));
        }
        Ok(Self::with_valid_parts(&config, &redistributor, build_hasher))
    }

    /// Puts a key-element pair into the [`ConcurrentMap`].
    ///
    /// Returns `true` if the key was newly inserted, and `false` if the element of an existing
    /// key was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `element` is `None`; the map is left untouched.
    /// Returns [`Error::Redistribution`] if the key was newly inserted but the segment failed to
    /// resize afterwards.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::{ConcurrentMap, Error};
    ///
    /// let map: ConcurrentMap<String> = ConcurrentMap::new(2).unwrap();
    ///
    /// assert_eq!(map.put("k", String::from("v")), Ok(true));
    /// assert!(matches!(map.put("k", None::<String>), Err(Error::InvalidArgument(_))));
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn put<E: Into<Option<V>>>(&self, key: &str, element: E) -> Result<bool, Error> {
        let hash = hash_key(&self.build_hasher, key);
        let pair = Pair::with_hash(Arc::from(key), hash, element)?;
        let result = self.segment_for(hash).put(pair);
        if Self::committed(&result) {
            self.total.fetch_add(1, Relaxed);
        }
        result
    }

    /// Returns the element associated with the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::ConcurrentMap;
    ///
    /// let map: ConcurrentMap<u64> = ConcurrentMap::new(2).unwrap();
    ///
    /// assert!(map.get("a").is_none());
    /// assert!(map.put("a", 7_u64).is_ok());
    /// assert_eq!(*map.get("a").unwrap(), 7);
    /// ```
    #[inline]
    pub fn get(&self, key: &str) -> Option<Shared<V>> {
        let hash = hash_key(&self.build_hasher, key);
        self.segment_for(hash)
            .get_with_hash(key, hash)
            .map(|pair| pair.element())
    }

    /// Reads the key and the element associated with the key.
    ///
    /// Returns `None` if the key does not exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::ConcurrentMap;
    ///
    /// let map: ConcurrentMap<u64> = ConcurrentMap::new(2).unwrap();
    ///
    /// assert!(map.put("a", 7_u64).is_ok());
    /// assert_eq!(map.read("a", |_, v| *v * 2), Some(14));
    /// assert!(map.read("b", |_, v| *v).is_none());
    /// ```
    #[inline]
    pub fn read<U, F: FnOnce(&str, &V) -> U>(&self, key: &str, reader: F) -> Option<U> {
        let hash = hash_key(&self.build_hasher, key);
        self.segment_for(hash).read_with_hash(key, hash, reader)
    }

    /// Returns `true` if the key exists.
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.read(key, |_, _| ()).is_some()
    }

    /// Deletes the key.
    ///
    /// Returns `true` if the key was removed. A resize failure following the removal is logged
    /// and otherwise ignored; use [`try_delete`](Self::try_delete) to observe it.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::ConcurrentMap;
    ///
    /// let map: ConcurrentMap<u64> = ConcurrentMap::new(2).unwrap();
    ///
    /// assert!(!map.delete("a"));
    /// assert!(map.put("a", 1_u64).is_ok());
    /// assert!(map.delete("a"));
    /// ```
    #[inline]
    pub fn delete(&self, key: &str) -> bool {
        match self.try_delete(key) {
            Ok(removed) => removed,
            // The key was removed before the resize failed.
            Err(_) => true,
        }
    }

    /// Deletes the key.
    ///
    /// Returns `true` if the key was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Redistribution`] if the key was removed but the segment failed to resize
    /// afterwards.
    pub fn try_delete(&self, key: &str) -> Result<bool, Error> {
        let hash = hash_key(&self.build_hasher, key);
        let result = self.segment_for(hash).delete_with_hash(key, hash);
        if Self::committed(&result) {
            self.total.fetch_sub(1, Relaxed);
        }
        result
    }

    /// Returns the number of segments.
    #[inline]
    pub fn concurrency(&self) -> usize {
        self.segments.len()
    }

    /// Returns the number of pairs in the [`ConcurrentMap`].
    ///
    /// The counter is not synchronized with in-flight mutations, therefore the value may lag
    /// behind the segments while other threads are modifying the map.
    #[inline]
    pub fn len(&self) -> usize {
        usize::try_from(self.total.load(Relaxed)).unwrap_or(0)
    }

    /// Returns `true` if the [`ConcurrentMap`] is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of pairs in each segment.
    ///
    /// The sum equals [`len`](Self::len) once no mutation is in flight.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::ConcurrentMap;
    ///
    /// let map: ConcurrentMap<u64> = ConcurrentMap::new(4).unwrap();
    /// assert!(map.put("a", 1_u64).is_ok());
    /// assert_eq!(map.segment_sizes().len(), 4);
    /// assert_eq!(map.segment_sizes().iter().sum::<usize>(), 1);
    /// ```
    pub fn segment_sizes(&self) -> Vec<usize> {
        self.segments.iter().map(Segment::size).collect()
    }

    /// Returns the current number of buckets in each segment.
    pub fn bucket_counts(&self) -> Vec<usize> {
        self.segments.iter().map(Segment::bucket_count).collect()
    }

    /// Returns a reference to the segment at `index`.
    #[cfg(test)]
    #[inline]
    pub(crate) fn segment(&self, index: usize) -> Option<&Segment<V, R>> {
        self.segments.get(index)
    }

    fn with_valid_parts(config: &Config, redistributor: &R, build_hasher: H) -> Self
    where
        R: Clone,
    {
        let initial_buckets = config.effective_initial_buckets();
        Self {
            segments: (0..config.concurrency)
                .map(|_| Segment::new(initial_buckets, redistributor.clone()))
                .collect(),
            total: AtomicIsize::new(0),
            build_hasher,
        }
    }

    /// Returns `true` if a segment mutation was applied.
    ///
    /// A redistribution error is only raised after the mutation has been applied.
    #[inline]
    fn committed(result: &Result<bool, Error>) -> bool {
        matches!(result, Ok(true) | Err(Error::Redistribution(_)))
    }

    /// Selects the segment by the upper bits of the hash value.
    #[allow(clippy::cast_possible_truncation)] // The remainder is less than the segment count.
    #[inline]
    fn segment_for(&self, hash: u64) -> &Segment<V, R> {
        let concurrency = self.segments.len();
        if concurrency == 1 {
            return &self.segments[0];
        }
        let upper = if hash > u64::from(u32::MAX) {
            hash >> 48
        } else {
            hash >> 16
        };
        &self.segments[(upper % concurrency as u64) as usize]
    }
}

impl<V: 'static> Default for ConcurrentMap<V> {
    /// Creates an empty [`ConcurrentMap`] with the default [`Config`].
    #[inline]
    fn default() -> Self {
        let config = Config::default();
        Self::with_valid_parts(
            &config,
            &DefaultRedistributor::with_config(&config),
            RandomState::new(),
        )
    }
}

impl<V, R, H> Debug for ConcurrentMap<V, R, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("concurrency", &self.segments.len())
            .field("len", &self.total.load(Relaxed))
            .finish_non_exhaustive()
    }
}
