/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use super::{MetricMeta, StoreEntry};

#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("counter cannot decrease in value, got {0}")]
pub struct NegativeCounterValue(pub f64);

/// Monotonic counter.
///
/// Exact integer additions go to an integer cell, everything else to a
/// float cell updated with compare and swap. Reads sum both cells.
pub struct Counter {
    meta: MetricMeta,
    int_value: AtomicU64,
    float_bits: AtomicU64,
}

impl StoreEntry for Counter {
    fn create(meta: MetricMeta) -> Self {
        Counter {
            meta,
            int_value: AtomicU64::new(0),
            float_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn meta(&self) -> &MetricMeta {
        &self.meta
    }
}

impl Counter {
    pub fn add(&self, v: f64) -> Result<(), NegativeCounterValue> {
        // also rejects NaN
        if !(v >= 0.0) {
            return Err(NegativeCounterValue(v));
        }

        if v.fract() == 0.0 && v < u64::MAX as f64 {
            let n = v as u64;
            // on overflow the whole value goes to the float cell
            if self
                .int_value
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                    cur.checked_add(n)
                })
                .is_ok()
            {
                return Ok(());
            }
        }

        let mut cur = self.float_bits.load(Ordering::Relaxed);
        loop {
            let new = (f64::from_bits(cur) + v).to_bits();
            match self.float_bits.compare_exchange_weak(
                cur,
                new,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn inc(&self) {
        let _ = self.add(1.0);
    }

    pub fn value(&self) -> f64 {
        let int_value = self.int_value.load(Ordering::Relaxed);
        let float_value = f64::from_bits(self.float_bits.load(Ordering::Relaxed));
        int_value as f64 + float_value
    }
}
