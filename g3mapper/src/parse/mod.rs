/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

use crate::types::MetricEvent;

mod line;
use line::LineParser;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsdParseError {
    #[error("malformed line")]
    MalformedLine,
    #[error("malformed component '{0}'")]
    MalformedComponent(String),
    #[error("empty component")]
    EmptyComponent,
    #[error("invalid value '{0}'")]
    InvalidValue(String),
    #[error("no support for StatsD sets")]
    UnsupportedSet,
    #[error("bad stat type '{0}'")]
    InvalidType(String),
    #[error("illegal sampling factor for stat type '{0}'")]
    IllegalSampleFactor(String),
    #[error("invalid sampling factor '{0}'")]
    InvalidSampleFactor(String),
    #[error("invalid modifier '{0}'")]
    InvalidModifier(String),
}

impl StatsdParseError {
    pub const REASONS: [&'static str; 9] = [
        "malformed_line",
        "malformed_component",
        "empty_component",
        "malformed_value",
        "unsupported_set",
        "invalid_type",
        "illegal_sample_factor",
        "invalid_sample_factor",
        "invalid_modifier",
    ];

    /// Position of this error's reason in [`Self::REASONS`].
    pub fn reason_index(&self) -> usize {
        match self {
            StatsdParseError::MalformedLine => 0,
            StatsdParseError::MalformedComponent(_) => 1,
            StatsdParseError::EmptyComponent => 2,
            StatsdParseError::InvalidValue(_) => 3,
            StatsdParseError::UnsupportedSet => 4,
            StatsdParseError::InvalidType(_) => 5,
            StatsdParseError::IllegalSampleFactor(_) => 6,
            StatsdParseError::InvalidSampleFactor(_) => 7,
            StatsdParseError::InvalidModifier(_) => 8,
        }
    }

    pub fn reason(&self) -> &'static str {
        Self::REASONS[self.reason_index()]
    }
}

/// Result of parsing one or more lines.
///
/// Skipped samples and ignored sampling factors are reported in `errors`
/// while the accepted samples are kept in `events` in parse order.
#[derive(Debug, Default)]
pub struct ParsedLine {
    pub events: Vec<MetricEvent>,
    pub errors: Vec<StatsdParseError>,
    pub lines: usize,
    pub samples: usize,
    pub tags: usize,
    pub tag_errors: usize,
}

impl ParsedLine {
    fn add_line(&mut self, line: &[u8]) {
        self.lines += 1;
        match LineParser::new(line) {
            Ok(parser) => parser.parse_into(self),
            Err(e) => self.errors.push(e),
        }
    }
}

/// Parse a single line without the trailing newline.
pub fn parse_line(line: &[u8]) -> ParsedLine {
    let mut parsed = ParsedLine::default();
    if !line.is_empty() {
        parsed.add_line(line);
    }
    parsed
}

/// Parse a payload holding any number of `\n` separated lines.
pub fn parse_packet(buf: &[u8]) -> ParsedLine {
    let mut parsed = ParsedLine::default();
    for line in StatsdLineVisitor::new(buf) {
        parsed.add_line(line);
    }
    parsed
}

struct StatsdLineVisitor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> StatsdLineVisitor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        StatsdLineVisitor { buf, offset: 0 }
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.offset >= self.buf.len() {
            return None;
        }

        let left = &self.buf[self.offset..];
        match memchr::memchr(b'\n', left) {
            Some(p) => {
                self.offset += p + 1;
                Some(&left[..p])
            }
            None => {
                self.offset = self.buf.len();
                Some(left)
            }
        }
    }
}

impl<'a> Iterator for StatsdLineVisitor<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.next_line()?;
            if !line.is_empty() {
                return Some(line);
            }
        }
    }
}
