use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::{Arc, Barrier};
use std::thread;

use cmap::{
    Bucket, BucketStatus, ConcurrentMap, Config, DefaultRedistributor, Error, PairRedistributor,
};

/// Wraps [`DefaultRedistributor`] and counts the rebuilds it performs.
#[derive(Clone, Debug, Default)]
struct Counting {
    inner: DefaultRedistributor,
    rebuilds: Arc<AtomicUsize>,
}

impl<V: 'static> PairRedistributor<V> for Counting {
    fn update_threshold(&mut self, pair_total: usize, bucket_count: usize) {
        PairRedistributor::<V>::update_threshold(&mut self.inner, pair_total, bucket_count);
    }

    fn check_bucket_status(&mut self, pair_total: usize, bucket_size: usize) -> BucketStatus {
        PairRedistributor::<V>::check_bucket_status(&mut self.inner, pair_total, bucket_size)
    }

    fn redistribute(
        &mut self,
        status: BucketStatus,
        buckets: &[Bucket<V>],
    ) -> Option<Vec<Bucket<V>>> {
        let rebuilt = self.inner.redistribute(status, buckets);
        if rebuilt.is_some() {
            self.rebuilds.fetch_add(1, Relaxed);
        }
        rebuilt
    }
}

#[test]
fn put_get_delete() {
    let map: ConcurrentMap<u64> = ConcurrentMap::new(4).unwrap();
    assert_eq!(map.put("a", 1_u64), Ok(true));
    assert_eq!(map.put("a", 2_u64), Ok(false));
    assert_eq!(map.get("a").map(|v| *v), Some(2));
    assert!(map.delete("a"));
    assert!(map.get("a").is_none());
    assert_eq!(map.len(), 0);
}

#[test]
fn string_elements() {
    let map: ConcurrentMap<String> = ConcurrentMap::default();
    assert_eq!(map.concurrency(), cmap::DEFAULT_CONCURRENCY);
    for i in 0..1024 {
        assert_eq!(map.put(&format!("key{i}"), format!("value{i}")), Ok(true));
    }
    assert_eq!(map.len(), 1024);
    for i in 0..1024 {
        let key = format!("key{i}");
        assert_eq!(map.read(&key, |_, v| v.clone()), Some(format!("value{i}")));
        assert!(map.delete(&key));
    }
    assert!(map.is_empty());
    assert_eq!(format!("{map:?}"), "ConcurrentMap { concurrency: 16, len: 0, .. }");
}

#[test]
fn invalid_arguments() {
    let redistributor = DefaultRedistributor::default();
    assert!(matches!(
        ConcurrentMap::<u64, _>::with_redistributor(0, redistributor.clone()),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        ConcurrentMap::<u64, _>::with_redistributor(cmap::MAX_CONCURRENCY + 1, redistributor),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(
        Error::InvalidArgument("concurrency is too small").to_string(),
        "invalid argument: concurrency is too small"
    );
}

#[cfg_attr(miri, ignore)]
#[test]
fn churn_with_rebuilds() {
    let num_threads = if cfg!(miri) { 2 } else { 8 };
    let num_keys = if cfg!(miri) { 16 } else { 2048 };
    let rebuilds = Arc::new(AtomicUsize::new(0));
    let redistributor = Counting {
        inner: DefaultRedistributor::with_config(
            &Config::default().initial_buckets(2).load_factor(0.015),
        ),
        rebuilds: rebuilds.clone(),
    };
    let map: Arc<ConcurrentMap<usize, Counting>> =
        Arc::new(ConcurrentMap::with_redistributor(4, redistributor).unwrap());

    // An emptied bucket makes the next overweight bucket of its segment trigger growth.
    for i in 0..64 {
        let key = format!("prime/{i}");
        assert_eq!(map.put(&key, i), Ok(true));
        assert!(map.delete(&key));
    }
    assert!(rebuilds.load(Relaxed) > 0);
    assert!(map.is_empty());

    let barrier = Arc::new(Barrier::new(num_threads));
    let mut threads = Vec::with_capacity(num_threads);
    for t in 0..num_threads {
        let map = map.clone();
        let barrier = barrier.clone();
        threads.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..num_keys {
                let key = format!("{t}/{i}");
                assert_eq!(map.put(&key, i), Ok(true));
                if i % 4 == 0 {
                    assert!(map.delete(&key));
                }
            }
        }));
    }
    for thread in threads {
        assert!(thread.join().is_ok());
    }

    assert!(rebuilds.load(Relaxed) > 0);
    assert_eq!(map.len(), num_threads * (num_keys - num_keys / 4));
    assert_eq!(map.segment_sizes().iter().sum::<usize>(), map.len());
    assert!(map.bucket_counts().iter().any(|count| *count > 16));
    for t in 0..num_threads {
        for i in 0..num_keys {
            let expected = (i % 4 != 0).then_some(i);
            assert_eq!(map.get(&format!("{t}/{i}")).map(|v| *v), expected);
        }
    }
}
