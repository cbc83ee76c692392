/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Mutex;

use super::Exporter;
use crate::pipeline::MetricDocument;

/// Keep every document in memory, in arrival order.
#[derive(Default)]
pub struct MemoryExporter {
    documents: Mutex<Vec<MetricDocument>>,
}

impl MemoryExporter {
    pub fn documents(&self) -> Vec<MetricDocument> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Remove and return the stored documents.
    pub fn take(&self) -> Vec<MetricDocument> {
        std::mem::take(&mut *self.documents.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Exporter for MemoryExporter {
    #[inline]
    fn name(&self) -> &str {
        "memory"
    }

    #[inline]
    fn r#type(&self) -> &'static str {
        "Memory"
    }

    fn add_document(&self, doc: &MetricDocument) {
        self.documents.lock().unwrap_or_else(|e| e.into_inner()).push(doc.clone());
    }
}
