/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};

mod labels;
pub use labels::LabelSet;

mod name;
pub use name::escape_metric_name;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    Counter,
    Gauge,
    Timer,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Timer => "timer",
        }
    }
}

impl FromStr for MetricType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricType::Counter),
            "gauge" => Ok(MetricType::Gauge),
            "timer" => Ok(MetricType::Timer),
            _ => Err(anyhow!("invalid metric type '{s}'")),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type specific part of a parsed sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Counter,
    /// `relative` is set when the value carried an explicit sign.
    Gauge { relative: bool },
    Timer,
}

/// One parsed sample, created by the parser and consumed once by the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricEvent {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: f64,
    pub labels: LabelSet,
    pub kind: EventKind,
}

impl MetricEvent {
    pub fn new(name: &str, value: f64, kind: EventKind, labels: LabelSet) -> Self {
        MetricEvent {
            timestamp: Utc::now(),
            name: name.to_string(),
            value,
            labels,
            kind,
        }
    }

    pub fn metric_type(&self) -> MetricType {
        match self.kind {
            EventKind::Counter => MetricType::Counter,
            EventKind::Gauge { .. } => MetricType::Gauge,
            EventKind::Timer => MetricType::Timer,
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self.kind, EventKind::Gauge { relative: true })
    }
}

/// Events produced by a single network read, kept in parse order.
pub type EventBatch = Vec<MetricEvent>;
