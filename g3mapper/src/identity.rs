/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::hash::Hasher;

use fnv::FnvHasher;

use crate::types::LabelSet;

const SEPARATOR_BYTE: u8 = 0xff;

/// Signature of the empty label set, the FNV-1a 64 offset basis.
pub const EMPTY_LABEL_SIGNATURE: u64 = 0xcbf29ce484222325;

pub fn label_signature(labels: &LabelSet) -> u64 {
    if labels.is_empty() {
        return EMPTY_LABEL_SIGNATURE;
    }

    let mut hasher = FnvHasher::default();
    // LabelSet iterates in ascending key order
    for (k, v) in labels.iter() {
        hasher.write(k.as_bytes());
        hasher.write_u8(SEPARATOR_BYTE);
        hasher.write(v.as_bytes());
        hasher.write_u8(SEPARATOR_BYTE);
    }
    hasher.finish()
}

/// Identity of a metric series. Collisions are not detected.
pub fn metric_identity(name: &str, labels: &LabelSet) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(name.as_bytes());
    hasher.write(&label_signature(labels).to_be_bytes());
    hasher.finish()
}
