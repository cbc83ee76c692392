/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::Write;

use chrono::{DateTime, Utc};

use crate::pipeline::MetricDocument;

/// Name of the daily index the document at `time` goes to.
pub(super) fn daily_index(index: &str, time: &DateTime<Utc>) -> String {
    format!("{index}-{}", time.format("%Y.%m.%d"))
}

/// NDJSON body of a `_bulk` request.
#[derive(Default)]
pub(super) struct BulkBody {
    buf: Vec<u8>,
    actions: usize,
}

impl BulkBody {
    pub(super) fn with_capacity(capacity: usize) -> Self {
        BulkBody {
            buf: Vec::with_capacity(capacity),
            actions: 0,
        }
    }

    pub(super) fn push(&mut self, index: &str, doc: &MetricDocument) {
        let index = daily_index(index, &doc.timestamp);
        let _ = writeln!(
            &mut self.buf,
            "{{\"index\":{{\"_index\":{}}}}}",
            serde_json::Value::String(index)
        );
        doc.write_json(&mut self.buf);
        self.buf.push(b'\n');
        self.actions += 1;
    }

    pub(super) fn actions(&self) -> usize {
        self.actions
    }

    pub(super) fn size(&self) -> usize {
        self.buf.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.actions == 0
    }

    /// Whether one of the non zero thresholds has been reached.
    pub(super) fn reached(&self, actions_threshold: usize, size_threshold: usize) -> bool {
        (actions_threshold > 0 && self.actions >= actions_threshold)
            || (size_threshold > 0 && self.buf.len() >= size_threshold)
    }

    /// Move the encoded body out, leaving an empty one with the same capacity.
    pub(super) fn take(&mut self) -> (usize, Vec<u8>) {
        let capacity = self.buf.capacity();
        let buf = std::mem::replace(&mut self.buf, Vec::with_capacity(capacity));
        let actions = std::mem::take(&mut self.actions);
        (actions, buf)
    }
}
