/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use regex::Regex;

use super::template;
use crate::types::{LabelSet, MetricType};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimerType {
    #[default]
    Default,
    Raw,
    Histogram,
    Summary,
}

impl TimerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerType::Default => "default",
            TimerType::Raw => "raw",
            TimerType::Histogram => "histogram",
            TimerType::Summary => "summary",
        }
    }
}

impl FromStr for TimerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "default" => Ok(TimerType::Default),
            "raw" => Ok(TimerType::Raw),
            "histogram" => Ok(TimerType::Histogram),
            "summary" => Ok(TimerType::Summary),
            _ => Err(anyhow!("invalid timer type '{s}'")),
        }
    }
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchType {
    #[default]
    Glob,
    Regex,
}

impl FromStr for MatchType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "glob" => Ok(MatchType::Glob),
            "regex" => Ok(MatchType::Regex),
            _ => Err(anyhow!("invalid match type '{s}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MappingAction {
    #[default]
    Map,
    Drop,
}

impl FromStr for MappingAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "map" => Ok(MappingAction::Map),
            "drop" => Ok(MappingAction::Drop),
            _ => Err(anyhow!("invalid action '{s}'")),
        }
    }
}

/// A compiled mapping rule.
#[derive(Debug)]
pub struct MappingRule {
    pub(super) source: String,
    pub(super) regex: Regex,
    pub(super) name: String,
    pub(super) labels: Vec<(String, String)>,
    pub(super) timer_type: TimerType,
    pub(super) match_type: MatchType,
    pub(super) help: Option<String>,
    pub(super) action: MappingAction,
    pub(super) match_metric_type: Option<MetricType>,
}

impl MappingRule {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name_template(&self) -> &str {
        &self.name
    }

    pub fn timer_type(&self) -> TimerType {
        self.timer_type
    }

    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn action(&self) -> MappingAction {
        self.action
    }

    pub fn match_metric_type(&self) -> Option<MetricType> {
        self.match_metric_type
    }

    /// Try this rule, returning the expanded name and labels on match.
    pub(super) fn apply(&self, name: &str, metric_type: MetricType) -> Option<(String, LabelSet)> {
        if let Some(t) = self.match_metric_type
            && t != metric_type
        {
            return None;
        }

        let caps = self.regex.captures(name)?;
        let expanded = template::expand(&self.name, &caps);
        let labels = self
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), template::expand(v, &caps)))
            .collect();
        Some((expanded, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_type() {
        assert_eq!(TimerType::from_str("").unwrap(), TimerType::Default);
        assert_eq!(TimerType::from_str("default").unwrap(), TimerType::Default);
        assert_eq!(TimerType::from_str("raw").unwrap(), TimerType::Raw);
        assert_eq!(
            TimerType::from_str("histogram").unwrap(),
            TimerType::Histogram
        );
        assert_eq!(TimerType::from_str("summary").unwrap(), TimerType::Summary);
        assert!(TimerType::from_str("quantile").is_err());
    }

    #[test]
    fn action() {
        assert_eq!(MappingAction::from_str("").unwrap(), MappingAction::Map);
        assert_eq!(MappingAction::from_str("drop").unwrap(), MappingAction::Drop);
        assert!(MappingAction::from_str("keep").is_err());
    }

    #[test]
    fn match_type() {
        assert_eq!(MatchType::from_str("glob").unwrap(), MatchType::Glob);
        assert_eq!(MatchType::from_str("regex").unwrap(), MatchType::Regex);
        assert!(MatchType::from_str("").is_err());
    }
}
