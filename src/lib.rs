#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Segmented concurrent hash map.
//!
//! # cmap::ConcurrentMap
//! A concurrent hash map that routes every key to one of a fixed number of independently locked
//! segments; each segment grows its bucket table on its own.
//!
//! # cmap::Bucket
//! A bucket chain of which reads never block: removing an entry clones its predecessors
//! instead of relinking published entries.

mod concurrent_map;
mod config;
mod error;
mod redistributor;
mod segment;

// cmap::ConcurrentMap
pub use concurrent_map::ConcurrentMap;

// cmap::Config
pub use config::{
    Config, DEFAULT_BUCKET_LOAD_FACTOR, DEFAULT_BUCKET_MAX_SIZE, DEFAULT_BUCKET_NUMBER,
    DEFAULT_CONCURRENCY, MAX_CONCURRENCY,
};

// cmap::Error
pub use error::Error;

// cmap::PairRedistributor
pub use redistributor::{
    BucketStatus, DefaultRedistributor, PairRedistributor, MIN_AVERAGE_BUCKET_SIZE,
    MIN_BUCKET_NUMBER, MIN_SHRINKABLE_BUCKET_NUMBER,
};

// cmap::Segment
pub use segment::bucket::{Bucket, Pairs};
pub use segment::pair::Pair;
pub use segment::Segment;

// Reclamation primitives appearing in the public interface.
pub use sdd::{Guard, Shared};
