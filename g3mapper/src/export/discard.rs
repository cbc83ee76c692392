/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};

use super::Exporter;
use crate::pipeline::MetricDocument;

#[derive(Default)]
pub struct DiscardExporter {
    discarded: AtomicU64,
}

impl DiscardExporter {
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl Exporter for DiscardExporter {
    #[inline]
    fn name(&self) -> &str {
        "discard"
    }

    #[inline]
    fn r#type(&self) -> &'static str {
        "Discard"
    }

    fn add_document(&self, _doc: &MetricDocument) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }
}
