//! [`Pair`] is a key-element node of a bucket chain.

use std::fmt::{self, Debug, Display};
use std::hash::BuildHasher;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::Arc;

use sdd::{AtomicShared, Guard, Ptr, Shared, Tag};

use crate::Error;

/// Hashes a key the same way for every component of the map.
#[inline]
pub(crate) fn hash_key<H: BuildHasher>(build_hasher: &H, key: &str) -> u64 {
    build_hasher.hash_one(key)
}

/// [`Pair`] is a key-value node forming one link of a bucket chain.
///
/// The key and its hash never change once the [`Pair`] is created. The element and the link to
/// the next [`Pair`] are atomic handles, therefore a reader traversing a chain never observes a
/// partially written value. A published [`Pair`] may be shared by several versions of a chain.
pub struct Pair<V> {
    key: Arc<str>,
    hash: u64,
    element: AtomicShared<V>,
    next: AtomicShared<Pair<V>>,
}

impl<V: 'static> Pair<V> {
    /// Creates a new [`Pair`], hashing the key with the supplied [`BuildHasher`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `element` is `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::Pair;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let pair = Pair::<u32>::new("a", 1_u32, &RandomState::new()).unwrap();
    /// assert_eq!(pair.key(), "a");
    /// assert_eq!(*pair.element(), 1);
    ///
    /// assert!(Pair::<u32>::new("b", None::<u32>, &RandomState::new()).is_err());
    /// ```
    #[inline]
    pub fn new<E: Into<Option<V>>, H: BuildHasher>(
        key: &str,
        element: E,
        build_hasher: &H,
    ) -> Result<Self, Error> {
        Self::with_hash(Arc::from(key), hash_key(build_hasher, key), element)
    }

    /// Creates a new [`Pair`] with a hash value computed by the caller.
    pub(crate) fn with_hash<E: Into<Option<V>>>(
        key: Arc<str>,
        hash: u64,
        element: E,
    ) -> Result<Self, Error> {
        let Some(element) = element.into() else {
            return Err(Error::InvalidArgument("element is absent"));
        };
        Ok(Self {
            key,
            hash,
            element: AtomicShared::new(element),
            next: AtomicShared::null(),
        })
    }

    /// Returns a strong reference to the element.
    #[inline]
    pub fn element(&self) -> Shared<V> {
        match self.element.get_shared(Acquire, &Guard::new()) {
            Some(element) => element,
            None => unreachable!("a pair always holds an element"),
        }
    }

    /// Replaces the element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `element` is `None`, in which case the current
    /// element is kept.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::Pair;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let pair = Pair::<u32>::new("a", 1_u32, &RandomState::new()).unwrap();
    /// assert!(pair.set_element(2_u32).is_ok());
    /// assert!(pair.set_element(None::<u32>).is_err());
    /// assert_eq!(*pair.element(), 2);
    /// ```
    #[inline]
    pub fn set_element<E: Into<Option<V>>>(&self, element: E) -> Result<(), Error> {
        let Some(element) = element.into() else {
            return Err(Error::InvalidArgument("element is absent"));
        };
        self.replace_element(Shared::new(element));
        Ok(())
    }

    /// Returns a new unlinked [`Pair`] that shares the key and the element with `self`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmap::Pair;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let pair = Pair::<u32>::new("a", 1_u32, &RandomState::new()).unwrap();
    /// let copied = pair.copy();
    /// assert_eq!(copied.key(), "a");
    /// assert_eq!(copied.hash(), pair.hash());
    /// assert_eq!(*copied.element(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn copy(&self) -> Self {
        let guard = Guard::new();
        Self {
            key: self.key.clone(),
            hash: self.hash,
            element: self
                .element
                .get_shared(Acquire, &guard)
                .map_or_else(AtomicShared::null, AtomicShared::from),
            next: AtomicShared::null(),
        }
    }
}

impl<V> Pair<V> {
    /// Returns the key.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the hash value of the key.
    #[inline]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Returns a guarded reference to the element.
    #[inline]
    pub fn element_ref<'g>(&self, guard: &'g Guard) -> Option<&'g V> {
        self.element.load(Acquire, guard).as_ref()
    }

    /// Returns a guarded reference to the next [`Pair`] in the chain.
    #[inline]
    pub fn next<'g>(&self, guard: &'g Guard) -> Option<&'g Pair<V>> {
        self.next.load(Acquire, guard).as_ref()
    }

    /// Links `next` after `self`, or unlinks the successor if `next` is `None`.
    ///
    /// Only a [`Pair`] that has not been published yet may be relinked; readers of a published
    /// chain rely on its links never changing.
    #[inline]
    pub(crate) fn set_next(&self, next: Option<Shared<Pair<V>>>) {
        drop(self.next.swap((next, Tag::None), Release));
    }

    /// Returns a guarded pointer to the next [`Pair`].
    #[inline]
    pub(crate) fn next_ptr<'g>(&self, guard: &'g Guard) -> Ptr<'g, Pair<V>> {
        self.next.load(Acquire, guard)
    }

    /// Returns a strong reference to the next [`Pair`].
    #[inline]
    pub(crate) fn next_shared(&self, guard: &Guard) -> Option<Shared<Pair<V>>> {
        self.next.get_shared(Acquire, guard)
    }

    /// Replaces the element with an existing handle.
    #[inline]
    pub(crate) fn replace_element(&self, element: Shared<V>) {
        drop(self.element.swap((Some(element), Tag::None), Release));
    }
}

impl<V: Debug> Debug for Pair<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = Guard::new();
        f.debug_struct("Pair")
            .field("key", &self.key())
            .field("hash", &self.hash)
            .field("element", &self.element_ref(&guard))
            .field("next_key", &self.next(&guard).map(Pair::key))
            .finish()
    }
}

impl<V: Display> Display for Pair<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = Guard::new();
        write!(f, "pair{{key:{}, hash:{}, element:", self.key, self.hash)?;
        if let Some(element) = self.element_ref(&guard) {
            write!(f, "{element}")?;
        }
        f.write_str(", nextKey:")?;
        if let Some(next) = self.next(&guard) {
            f.write_str(next.key())?;
        }
        f.write_str("}")
    }
}
