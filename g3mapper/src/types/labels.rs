/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use serde_json::{Map, Value};

use super::escape_metric_name;

/// Label key to label value mapping, iterated in ascending key order.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelSet {
    inner: BTreeMap<String, String>,
}

impl LabelSet {
    pub fn new() -> Self {
        LabelSet::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(|v| v.as_str())
    }

    /// Insert a label, replacing the value of an existing key.
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.inner.insert(key.into(), value.into());
    }

    /// Copy all labels of `other` into self, `other` wins on key collision.
    pub fn merge_from(&mut self, other: &LabelSet) {
        for (k, v) in other.iter() {
            self.inner.insert(k.to_string(), v.to_string());
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter(self.inner.iter())
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.inner.len());
        for (k, v) in self.iter() {
            map.insert(k.to_string(), Value::String(v.to_string()));
        }
        Value::Object(map)
    }

    /// Parse a DogStatsD tag section like `#host:web-1,env:prod`.
    ///
    /// Malformed tags are dropped one by one, the returned value is the
    /// number of dropped tags.
    pub(crate) fn parse_dogstatsd(&mut self, section: &str) -> usize {
        let mut dropped = 0;
        for r in TagKvIter::new(section, b':', b',') {
            match r {
                Some((name, value)) => {
                    self.inner.insert(escape_metric_name(name), value.to_string());
                }
                None => dropped += 1,
            }
        }
        dropped
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut labels = LabelSet::default();
        for (k, v) in iter {
            labels.insert(k, v);
        }
        labels
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.inner.iter();
        let Some((name, value)) = iter.next() else {
            return Ok(());
        };
        f.write_str(name)?;
        f.write_str(": ")?;
        f.write_str(value)?;

        for (name, value) in iter {
            f.write_str(", ")?;
            f.write_str(name)?;
            f.write_str(": ")?;
            f.write_str(value)?;
        }
        Ok(())
    }
}

pub struct Iter<'a>(btree_map::Iter<'a, String, String>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

struct TagKvIter<'a> {
    data: &'a str,
    value_delimiter: u8,
    multi_delimiter: u8,
    offset: usize,
}

impl<'a> TagKvIter<'a> {
    fn new(data: &'a str, value_delimiter: u8, multi_delimiter: u8) -> Self {
        TagKvIter {
            data,
            value_delimiter,
            multi_delimiter,
            offset: 0,
        }
    }

    fn next_field(&mut self) -> Option<&'a str> {
        if self.offset > self.data.len() {
            return None;
        }

        let left = &self.data[self.offset..];
        match memchr::memchr(self.multi_delimiter, left.as_bytes()) {
            Some(p) => {
                self.offset += p + 1;
                Some(&left[..p])
            }
            None => {
                self.offset = self.data.len() + 1;
                Some(left)
            }
        }
    }
}

impl<'a> Iterator for TagKvIter<'a> {
    /// `None` marks a malformed tag
    type Item = Option<(&'a str, &'a str)>;

    fn next(&mut self) -> Option<Self::Item> {
        let part = self.next_field()?;
        let part = part.strip_prefix('#').unwrap_or(part);

        let Some(p) = memchr::memchr(self.value_delimiter, part.as_bytes()) else {
            return Some(None);
        };
        let name = &part[..p];
        let value = &part[p + 1..];
        if name.is_empty() || value.is_empty() {
            return Some(None);
        }
        Some(Some((name, value)))
    }
}
