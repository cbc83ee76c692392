/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Mutex;

use super::{MetricMeta, StoreEntry};

/// Raw observations in arrival order, bucketing is left to the sink.
pub struct Histogram {
    meta: MetricMeta,
    values: Mutex<Vec<f64>>,
}

impl StoreEntry for Histogram {
    fn create(meta: MetricMeta) -> Self {
        Histogram {
            meta,
            values: Mutex::new(Vec::new()),
        }
    }

    fn meta(&self) -> &MetricMeta {
        &self.meta
    }
}

impl Histogram {
    pub fn observe(&self, v: f64) {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).push(v);
    }

    pub fn values(&self) -> Vec<f64> {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self) -> usize {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
