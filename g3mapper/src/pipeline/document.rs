/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::types::LabelSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocumentType {
    Counter,
    Gauge,
    RawTimer,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Counter => "counter",
            DocumentType::Gauge => "gauge",
            DocumentType::RawTimer => "raw_timer",
        }
    }
}

/// The record handed to the sink for every forwarded event.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricDocument {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub value: f64,
    pub labels: LabelSet,
    pub metric_type: DocumentType,
}

impl MetricDocument {
    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(6);
        map.insert(
            "@timestamp".to_string(),
            Value::String(
                self.timestamp
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
        );
        map.insert("name".to_string(), Value::String(self.name.clone()));
        map.insert(
            "description".to_string(),
            Value::String(self.description.clone()),
        );
        // non finite values become null
        map.insert("value".to_string(), Value::from(self.value));
        map.insert("labels".to_string(), self.labels.to_json());
        map.insert(
            "metricType".to_string(),
            Value::String(self.metric_type.as_str().to_string()),
        );
        Value::Object(map)
    }

    /// Append the compact JSON encoding to `buf`.
    pub fn write_json(&self, buf: &mut Vec<u8>) {
        // writing a Value into a Vec can not fail
        let _ = serde_json::to_writer(&mut *buf, &self.to_json());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(value: f64) -> MetricDocument {
        MetricDocument {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap(),
            name: "app_checkout_latency".to_string(),
            description: "help".to_string(),
            value,
            labels: [("service", "checkout")].into_iter().collect(),
            metric_type: DocumentType::RawTimer,
        }
    }

    #[test]
    fn json_fields() {
        let v = doc(12.5).to_json();
        assert_eq!(v["@timestamp"], "2024-03-05T10:20:30Z");
        assert_eq!(v["name"], "app_checkout_latency");
        assert_eq!(v["description"], "help");
        assert_eq!(v["value"], 12.5);
        assert_eq!(v["labels"]["service"], "checkout");
        assert_eq!(v["metricType"], "raw_timer");
    }

    #[test]
    fn non_finite_value() {
        let v = doc(f64::NAN).to_json();
        assert!(v["value"].is_null());
        let v = doc(f64::INFINITY).to_json();
        assert!(v["value"].is_null());
    }

    #[test]
    fn write_compact() {
        let mut buf = Vec::new();
        doc(1.0).write_json(&mut buf);
        let s = String::from_utf8(buf).unwrap();
        assert!(!s.contains('\n'));
        let v: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["metricType"], "raw_timer");
    }
}
