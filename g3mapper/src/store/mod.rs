/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use foldhash::fast::FixedState;
use log::trace;

use crate::identity::metric_identity;
use crate::types::LabelSet;

mod counter;
pub use counter::{Counter, NegativeCounterValue};

mod gauge;
pub use gauge::Gauge;

mod histogram;
pub use histogram::Histogram;

const SHARD_COUNT: usize = 16;

/// Name, labels and help text the accumulator was created with.
#[derive(Clone, Debug)]
pub struct MetricMeta {
    pub name: String,
    pub labels: LabelSet,
    pub help: String,
}

impl MetricMeta {
    pub fn new(name: &str, labels: &LabelSet, help: &str) -> Self {
        MetricMeta {
            name: name.to_string(),
            labels: labels.clone(),
            help: help.to_string(),
        }
    }
}

pub trait StoreEntry {
    fn create(meta: MetricMeta) -> Self;
    fn meta(&self) -> &MetricMeta;
}

type Shard<T> = RwLock<HashMap<u64, Arc<T>, FixedState>>;

/// Accumulators keyed by metric identity, spread over fixed shards.
pub struct MetricContainer<T> {
    shards: Box<[Shard<T>]>,
}

impl<T: StoreEntry> Default for MetricContainer<T> {
    fn default() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::with_hasher(FixedState::default())))
            .collect();
        MetricContainer { shards }
    }
}

impl<T: StoreEntry> MetricContainer<T> {
    fn shard(&self, id: u64) -> &Shard<T> {
        &self.shards[(id % SHARD_COUNT as u64) as usize]
    }

    /// Get the accumulator of this identity, creating it if absent.
    ///
    /// Racing creators of the same identity all get the same instance.
    pub fn get_or_create(&self, name: &str, labels: &LabelSet, help: &str) -> Arc<T> {
        let id = metric_identity(name, labels);
        let shard = self.shard(id);

        if let Some(v) = shard.read().unwrap_or_else(|e| e.into_inner()).get(&id) {
            return v.clone();
        }

        let mut map = shard.write().unwrap_or_else(|e| e.into_inner());
        map.entry(id)
            .or_insert_with(|| Arc::new(T::create(MetricMeta::new(name, labels, help))))
            .clone()
    }

    /// Remove and return all current entries.
    ///
    /// Shards are drained one at a time, so an entry created while flushing
    /// shows up in exactly one flush.
    pub fn flush(&self) -> Vec<Arc<T>> {
        let mut all = Vec::new();
        for shard in self.shards.iter() {
            let map = std::mem::take(&mut *shard.write().unwrap_or_else(|e| e.into_inner()));
            all.extend(map.into_values());
        }
        all
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct MetricStores {
    pub counters: MetricContainer<Counter>,
    pub gauges: MetricContainer<Gauge>,
    pub histograms: MetricContainer<Histogram>,
}

impl MetricStores {
    /// Drain all containers, returning the number of flushed accumulators.
    pub fn flush(&self) -> usize {
        let mut total = 0;
        for c in self.counters.flush() {
            let meta = c.meta();
            trace!("flush counter {} {{{}}} = {}", meta.name, meta.labels, c.value());
            total += 1;
        }
        for g in self.gauges.flush() {
            let meta = g.meta();
            trace!("flush gauge {} {{{}}} = {}", meta.name, meta.labels, g.value());
            total += 1;
        }
        for h in self.histograms.flush() {
            let meta = h.meta();
            trace!(
                "flush histogram {} {{{}}} with {} observations",
                meta.name,
                meta.labels,
                h.count()
            );
            total += 1;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn labels(v: &str) -> LabelSet {
        [("host", v)].into_iter().collect()
    }

    #[test]
    fn same_identity_same_entry() {
        let c: MetricContainer<Counter> = MetricContainer::default();
        let a = c.get_or_create("foo", &labels("a"), "help");
        let b = c.get_or_create("foo", &labels("a"), "other help");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.meta().help, "help");

        let d = c.get_or_create("foo", &labels("b"), "help");
        assert!(!Arc::ptr_eq(&a, &d));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn poisoned_shard() {
        let c: Arc<MetricContainer<Counter>> = Arc::new(MetricContainer::default());
        let a = c.get_or_create("foo", &labels("a"), "help");
        a.add(1.0).unwrap();

        let c2 = c.clone();
        let r: std::thread::Result<()> = std::thread::spawn(move || {
            let _guards: Vec<_> = c2.shards.iter().map(|s| s.write().unwrap()).collect();
            panic!("poison all shards");
        })
        .join();
        assert!(r.is_err());
        assert!(c.shards.iter().all(|s| s.is_poisoned()));

        let b = c.get_or_create("foo", &labels("a"), "help");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(c.len(), 1);
        assert_eq!(c.flush().len(), 1);
        assert!(c.is_empty());
    }

    #[test]
    fn concurrent_get_or_create() {
        let c: Arc<MetricContainer<Counter>> = Arc::new(MetricContainer::default());
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = c.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                let entry = c.get_or_create("race", &LabelSet::default(), "help");
                entry.add(1.0).unwrap();
                entry
            }));
        }
        let entries: Vec<Arc<Counter>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for e in &entries[1..] {
            assert!(Arc::ptr_eq(&entries[0], e));
        }
        assert_eq!(c.len(), 1);
        assert_eq!(entries[0].value(), 8.0);
    }

    #[test]
    fn flush_drains() {
        let stores = MetricStores::default();
        stores
            .counters
            .get_or_create("c", &LabelSet::default(), "h")
            .inc();
        stores
            .gauges
            .get_or_create("g", &LabelSet::default(), "h")
            .set(1.0);
        for i in 0..20 {
            stores
                .histograms
                .get_or_create("t", &labels(&i.to_string()), "h")
                .observe(1.0);
        }
        assert_eq!(stores.flush(), 22);
        assert!(stores.counters.is_empty());
        assert!(stores.gauges.is_empty());
        assert!(stores.histograms.is_empty());
        assert_eq!(stores.flush(), 0);
    }

    #[test]
    fn flush_during_create() {
        let c: Arc<MetricContainer<Gauge>> = Arc::new(MetricContainer::default());
        let writer = {
            let c = c.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    c.get_or_create("g", &labels(&i.to_string()), "h");
                }
            })
        };
        let mut flushed = 0;
        while !writer.is_finished() {
            flushed += c.flush().len();
        }
        writer.join().unwrap();
        flushed += c.flush().len();
        assert_eq!(flushed, 2000);
    }
}
