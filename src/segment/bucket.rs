//! [`Bucket`] is a hash slot holding a chain of [`Pair`] instances.

use std::fmt::{self, Debug, Display};
use std::iter::FusedIterator;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{Acquire, Release};

use parking_lot::Mutex;
use sdd::{AtomicShared, Guard, Ptr, Shared, Tag};

use super::pair::Pair;

/// [`Bucket`] is a hash slot holding a singly linked chain of [`Pair`] instances.
///
/// Mutating methods take an optional lock which is held for the duration of the mutation; when
/// no lock is supplied, the caller is responsible for serializing mutations. Read methods never
/// lock: a published [`Pair`] is never relinked, so a reader always walks a complete version of
/// the chain.
///
/// ## Copy-on-write deletion
///
/// Removing a [`Pair`] clones every [`Pair`] preceding it, links the innermost clone to the
/// successor of the removed [`Pair`], and publishes the outermost clone as the new head. Readers
/// that started before the publication keep walking the old chain to its end.
pub struct Bucket<V> {
    /// `head` points to the newest [`Pair`]; null denotes an empty [`Bucket`].
    head: AtomicShared<Pair<V>>,
    size: AtomicUsize,
}

/// An iterator over the [`Pair`] instances of a [`Bucket`].
///
/// [`Pairs`] reads the newest entry first.
pub struct Pairs<'g, V> {
    current: Option<&'g Pair<V>>,
    guard: &'g Guard,
}

impl<V: 'static> Bucket<V> {
    /// Puts a [`Pair`] into the [`Bucket`].
    ///
    /// Returns `true` if the key was newly inserted. If the key exists, only the element of the
    /// existing [`Pair`] is replaced and `false` is returned.
    ///
    /// The [`Pair`] is taken by value, so a [`Pair`] already linked into a chain can only be
    /// put again as a [`copy`](Pair::copy).
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::{Bucket, Pair};
    /// use std::collections::hash_map::RandomState;
    ///
    /// let build_hasher = RandomState::new();
    /// let bucket: Bucket<u32> = Bucket::default();
    ///
    /// let pair = Pair::<u32>::new("a", 1_u32, &build_hasher).unwrap();
    /// assert!(bucket.put(pair, None));
    ///
    /// let pair = Pair::<u32>::new("a", 2_u32, &build_hasher).unwrap();
    /// assert!(!bucket.put(pair, None));
    /// assert_eq!(bucket.size(), 1);
    /// ```
    pub fn put(&self, pair: Pair<V>, lock: Option<&Mutex<()>>) -> bool {
        let _locked = lock.map(|lock| lock.lock());
        let guard = Guard::new();
        let head_ptr = self.head.load(Acquire, &guard);
        if let Some(existing) = Self::search(head_ptr, pair.key(), &guard).as_ref() {
            existing.replace_element(pair.element());
            return false;
        }

        // Only the new pair is modified before it is published.
        pair.set_next(head_ptr.get_shared());
        drop(self.head.swap((Some(Shared::new(pair)), Tag::None), Release));
        self.size.fetch_add(1, Release);
        true
    }

    /// Deletes the [`Pair`] associated with the key.
    ///
    /// Returns `false` if the key does not exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::{Bucket, Pair};
    /// use std::collections::hash_map::RandomState;
    ///
    /// let build_hasher = RandomState::new();
    /// let bucket: Bucket<u32> = Bucket::default();
    /// for (key, element) in [("a", 1_u32), ("b", 2_u32), ("c", 3_u32)] {
    ///     bucket.put(Pair::new(key, element, &build_hasher).unwrap(), None);
    /// }
    ///
    /// assert!(bucket.delete("b", None));
    /// assert!(!bucket.delete("b", None));
    /// assert!(bucket.get("b").is_none());
    /// assert_eq!(*bucket.get("a").unwrap().element(), 1);
    /// assert_eq!(bucket.size(), 2);
    /// ```
    pub fn delete(&self, key: &str, lock: Option<&Mutex<()>>) -> bool {
        let _locked = lock.map(|lock| lock.lock());
        let guard = Guard::new();
        let mut predecessors = Vec::new();
        let mut current = self.first_pair(&guard);
        let breakpoint = loop {
            let Some(pair) = current else {
                return false;
            };
            if pair.key() == key {
                break pair.next_shared(&guard);
            }
            predecessors.push(pair);
            current = pair.next(&guard);
        };

        let new_head = predecessors.iter().rev().fold(breakpoint, |next, pair| {
            let cloned = pair.copy();
            cloned.set_next(next);
            Some(Shared::new(cloned))
        });
        drop(self.head.swap((new_head, Tag::None), Release));
        self.size.fetch_sub(1, Release);
        true
    }
}

impl<V> Bucket<V> {
    /// Creates an empty [`Bucket`].
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: AtomicShared::null(),
            size: AtomicUsize::new(0),
        }
    }

    /// Returns the [`Pair`] associated with the key.
    ///
    /// This method never blocks.
    #[inline]
    pub fn get(&self, key: &str) -> Option<Shared<Pair<V>>> {
        let guard = Guard::new();
        Self::search(self.head.load(Acquire, &guard), key, &guard).get_shared()
    }

    /// Returns a guarded reference to the [`Pair`] associated with the key.
    #[inline]
    pub fn get_ref<'g>(&self, key: &str, guard: &'g Guard) -> Option<&'g Pair<V>> {
        Self::search(self.head.load(Acquire, guard), key, guard).as_ref()
    }

    /// Returns a guarded reference to the newest [`Pair`].
    #[inline]
    pub fn first_pair<'g>(&self, guard: &'g Guard) -> Option<&'g Pair<V>> {
        self.head.load(Acquire, guard).as_ref()
    }

    /// Returns an iterator over the [`Pair`] instances reachable from the current head.
    #[inline]
    pub fn pairs<'g>(&self, guard: &'g Guard) -> Pairs<'g, V> {
        Pairs {
            current: self.first_pair(guard),
            guard,
        }
    }

    /// Removes every [`Pair`].
    #[inline]
    pub fn clear(&self, lock: Option<&Mutex<()>>) {
        let _locked = lock.map(|lock| lock.lock());
        self.size.store(0, Release);
        drop(self.head.swap((None, Tag::None), Release));
    }

    /// Returns the number of [`Pair`] instances.
    #[inline]
    pub fn size(&self) -> usize {
        self.size.load(Acquire)
    }

    /// Returns `true` if the [`Bucket`] is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null(Acquire)
    }

    /// Walks the chain starting from `ptr`, and returns a pointer to the matching [`Pair`].
    fn search<'g>(mut ptr: Ptr<'g, Pair<V>>, key: &str, guard: &'g Guard) -> Ptr<'g, Pair<V>> {
        while let Some(pair) = ptr.as_ref() {
            if pair.key() == key {
                return ptr;
            }
            ptr = pair.next_ptr(guard);
        }
        Ptr::null()
    }
}

impl<V> Default for Bucket<V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Debug> Debug for Bucket<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = Guard::new();
        f.debug_list().entries(self.pairs(&guard)).finish()
    }
}

impl<V: Display> Display for Bucket<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = Guard::new();
        f.write_str("[ ")?;
        for pair in self.pairs(&guard) {
            write!(f, "{pair} ")?;
        }
        f.write_str(" ]")
    }
}

impl<'g, V> Iterator for Pairs<'g, V> {
    type Item = &'g Pair<V>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.current?;
        self.current = pair.next(self.guard);
        Some(pair)
    }
}

impl<V> FusedIterator for Pairs<'_, V> {}
