/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};

use super::{MetricMeta, StoreEntry};

pub struct Gauge {
    meta: MetricMeta,
    bits: AtomicU64,
}

impl StoreEntry for Gauge {
    fn create(meta: MetricMeta) -> Self {
        Gauge {
            meta,
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn meta(&self) -> &MetricMeta {
        &self.meta
    }
}

impl Gauge {
    pub fn set(&self, v: f64) {
        self.bits.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Add a delta of any sign, returning the updated value.
    pub fn add(&self, v: f64) -> f64 {
        let mut cur = self.bits.load(Ordering::Relaxed);
        loop {
            let new = f64::from_bits(cur) + v;
            match self.bits.compare_exchange_weak(
                cur,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return new,
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}
