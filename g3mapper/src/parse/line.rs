/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use super::{ParsedLine, StatsdParseError};
use crate::types::{EventKind, LabelSet, MetricEvent};

const SAMPLE_DELIMITER: u8 = b':';
const COMPONENT_DELIMITER: char = '|';
const DOGSTATSD_TAG_MARKER: &[u8] = b"|#";

/// Upper bound of the events a single sampled timer may expand to.
pub(super) const MAX_TIMER_REPLICATION: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StatType {
    Counter,
    Gauge,
    TimerMs,
    Histogram,
}

impl StatType {
    fn parse(s: &str) -> Result<Self, StatsdParseError> {
        match s {
            "c" => Ok(StatType::Counter),
            "g" => Ok(StatType::Gauge),
            "ms" => Ok(StatType::TimerMs),
            "h" => Ok(StatType::Histogram),
            "s" => Err(StatsdParseError::UnsupportedSet),
            _ => Err(StatsdParseError::InvalidType(s.to_string())),
        }
    }

    fn allow_sample_factor(&self) -> bool {
        matches!(self, StatType::Counter | StatType::TimerMs)
    }

    fn event_kind(&self, relative: bool) -> EventKind {
        match self {
            StatType::Counter => EventKind::Counter,
            StatType::Gauge => EventKind::Gauge { relative },
            StatType::TimerMs | StatType::Histogram => EventKind::Timer,
        }
    }
}

pub(super) struct LineParser<'a> {
    name: &'a str,
    rest: &'a str,
}

impl<'a> LineParser<'a> {
    pub(super) fn new(line: &'a [u8]) -> Result<Self, StatsdParseError> {
        let line = std::str::from_utf8(line).map_err(|_| StatsdParseError::MalformedLine)?;
        let Some(p) = memchr::memchr(SAMPLE_DELIMITER, line.as_bytes()) else {
            return Err(StatsdParseError::MalformedLine);
        };
        if p == 0 {
            return Err(StatsdParseError::MalformedLine);
        }
        Ok(LineParser {
            name: &line[..p],
            rest: &line[p + 1..],
        })
    }

    pub(super) fn parse_into(self, out: &mut ParsedLine) {
        if memchr::memmem::find(self.rest.as_bytes(), DOGSTATSD_TAG_MARKER).is_some() {
            // a tagged line carries exactly one sample
            self.parse_sample(self.rest, out);
        } else {
            for sample in self.rest.split(SAMPLE_DELIMITER as char) {
                self.parse_sample(sample, out);
            }
        }
    }

    fn parse_sample(&self, sample: &str, out: &mut ParsedLine) {
        out.samples += 1;
        match self.build_sample(sample, out) {
            Ok((event, count)) => {
                for _ in 1..count {
                    out.events.push(event.clone());
                }
                out.events.push(event);
            }
            Err(e) => out.errors.push(e),
        }
    }

    fn build_sample(
        &self,
        sample: &str,
        out: &mut ParsedLine,
    ) -> Result<(MetricEvent, usize), StatsdParseError> {
        let components: Vec<&str> = sample.split(COMPONENT_DELIMITER).collect();
        if components.len() < 2 || components.len() > 4 {
            return Err(StatsdParseError::MalformedComponent(sample.to_string()));
        }

        let value_s = components[0];
        let relative = value_s.starts_with('+') || value_s.starts_with('-');
        let mut value = f64::from_str(value_s)
            .map_err(|_| StatsdParseError::InvalidValue(value_s.to_string()))?;

        let stat_type = StatType::parse(components[1])?;

        let modifiers = &components[2..];
        if modifiers.iter().any(|m| m.is_empty()) {
            return Err(StatsdParseError::EmptyComponent);
        }

        let mut count = 1usize;
        let mut labels = LabelSet::default();
        for m in modifiers {
            if let Some(factor_s) = m.strip_prefix('@') {
                // a bad factor is reported and skipped, the sample is kept
                if !stat_type.allow_sample_factor() {
                    out.errors.push(StatsdParseError::IllegalSampleFactor(
                        components[1].to_string(),
                    ));
                    continue;
                }
                let factor = parse_sample_factor(factor_s).unwrap_or_else(|e| {
                    out.errors.push(e);
                    1.0
                });
                match stat_type {
                    StatType::Counter => value /= factor,
                    _ => count = timer_replication(factor),
                }
            } else if m.starts_with('#') {
                out.tags += 1;
                let mut section = LabelSet::default();
                out.tag_errors += section.parse_dogstatsd(m);
                labels = section;
            } else {
                return Err(StatsdParseError::InvalidModifier(m.to_string()));
            }
        }

        let event = MetricEvent::new(self.name, value, stat_type.event_kind(relative), labels);
        Ok((event, count))
    }
}

fn parse_sample_factor(s: &str) -> Result<f64, StatsdParseError> {
    let factor = f64::from_str(s).map_err(|_| StatsdParseError::InvalidSampleFactor(s.to_string()))?;
    if !factor.is_finite() || factor < 0.0 {
        return Err(StatsdParseError::InvalidSampleFactor(s.to_string()));
    }
    if factor == 0.0 { Ok(1.0) } else { Ok(factor) }
}

fn timer_replication(factor: f64) -> usize {
    let n = (1.0 / factor).round();
    if n < 1.0 {
        1
    } else if n >= MAX_TIMER_REPLICATION as f64 {
        MAX_TIMER_REPLICATION
    } else {
        n as usize
    }
}
