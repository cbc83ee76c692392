/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use anyhow::{Context, anyhow};
use regex::Regex;
use yaml_rust::{Yaml, yaml};

use super::grammar;
use super::{MappingAction, MappingRule, MappingRuleSet, MatchType, TimerType};
use crate::config::yaml as conf;
use crate::types::MetricType;

#[derive(Clone, Copy, Debug, Default)]
struct MappingDefaults {
    timer_type: TimerType,
    match_type: MatchType,
}

impl MappingDefaults {
    fn parse(v: &Yaml) -> anyhow::Result<Self> {
        let mut defaults = MappingDefaults::default();
        match v {
            Yaml::Hash(map) => {
                conf::foreach_kv(map, |k, v| match conf::normalize_key(k).as_str() {
                    "timer_type" => {
                        defaults.timer_type = TimerType::from_str(&conf::as_string(v)?)?;
                        Ok(())
                    }
                    "match_type" => {
                        defaults.match_type = MatchType::from_str(&conf::as_string(v)?)?;
                        Ok(())
                    }
                    _ => Err(anyhow!("invalid key {k}")),
                })?;
            }
            Yaml::Null => {}
            _ => return Err(anyhow!("yaml value type for 'defaults' should be 'map'")),
        }
        Ok(defaults)
    }
}

#[derive(Default)]
struct MappingRuleBuilder {
    source: String,
    name: String,
    labels: Vec<(String, String)>,
    timer_type: Option<TimerType>,
    match_type: Option<MatchType>,
    help: Option<String>,
    action: MappingAction,
    match_metric_type: Option<MetricType>,
}

impl MappingRuleBuilder {
    fn parse(map: &yaml::Hash) -> anyhow::Result<Self> {
        let mut builder = MappingRuleBuilder::default();
        conf::foreach_kv(map, |k, v| builder.set(k, v))?;
        Ok(builder)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match conf::normalize_key(k).as_str() {
            "match" => {
                self.source = conf::as_string(v)?;
                Ok(())
            }
            "name" => {
                self.name = conf::as_string(v)?;
                Ok(())
            }
            "labels" => {
                let Yaml::Hash(map) = v else {
                    return Err(anyhow!("yaml value type for 'labels' should be 'map'"));
                };
                self.labels.clear();
                conf::foreach_kv(map, |k, v| {
                    if !grammar::is_valid_label_name(k) {
                        return Err(anyhow!("invalid label key: {k}"));
                    }
                    self.labels.push((k.to_string(), conf::as_string(v)?));
                    Ok(())
                })
            }
            "timer_type" => {
                self.timer_type = Some(TimerType::from_str(&conf::as_string(v)?)?);
                Ok(())
            }
            "match_type" => {
                self.match_type = Some(MatchType::from_str(&conf::as_string(v)?)?);
                Ok(())
            }
            "help" => {
                let help = conf::as_string(v)?;
                self.help = if help.is_empty() { None } else { Some(help) };
                Ok(())
            }
            "action" => {
                self.action = MappingAction::from_str(&conf::as_string(v)?)?;
                Ok(())
            }
            "match_metric_type" => {
                let s = conf::as_string(v)?;
                self.match_metric_type = if s.is_empty() {
                    None
                } else {
                    Some(MetricType::from_str(&s)?)
                };
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn build(self, defaults: &MappingDefaults) -> anyhow::Result<MappingRule> {
        if self.name.is_empty() {
            return Err(anyhow!("metric mapping didn't set a metric name"));
        }
        if !grammar::is_valid_name_template(&self.name) {
            return Err(anyhow!("invalid metric name '{}'", self.name));
        }

        let match_type = self.match_type.unwrap_or(defaults.match_type);
        let regex = match match_type {
            MatchType::Glob => {
                if !grammar::is_valid_glob(&self.source) {
                    return Err(anyhow!("invalid match: {}", self.source));
                }
                Regex::new(&grammar::glob_to_regex(&self.source))
                    .map_err(|e| anyhow!("invalid match {}: {e}", self.source))?
            }
            MatchType::Regex => Regex::new(&self.source)
                .map_err(|e| anyhow!("invalid regex {} in mapping: {e}", self.source))?,
        };

        Ok(MappingRule {
            source: self.source,
            regex,
            name: self.name,
            labels: self.labels,
            timer_type: self.timer_type.unwrap_or(defaults.timer_type),
            match_type,
            help: self.help,
            action: self.action,
            match_metric_type: self.match_metric_type,
        })
    }
}

/// Compile all rules of a mapping document, failing on the first bad rule.
pub(super) fn compile(doc: &Yaml) -> anyhow::Result<MappingRuleSet> {
    let map = match doc {
        Yaml::Hash(map) => map,
        // an empty document is an empty rule set
        Yaml::Null | Yaml::BadValue => return Ok(MappingRuleSet::default()),
        _ => return Err(anyhow!("yaml doc root should be hash")),
    };

    let mut defaults = MappingDefaults::default();
    let mut rules_node: Option<&Yaml> = None;
    conf::foreach_kv(map, |k, v| match conf::normalize_key(k).as_str() {
        "defaults" => {
            defaults = MappingDefaults::parse(v)?;
            Ok(())
        }
        "mappings" => {
            rules_node = Some(v);
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k} in mapping doc")),
    })?;

    let mut rules = Vec::new();
    match rules_node {
        Some(Yaml::Array(seq)) => {
            for (i, v) in seq.iter().enumerate() {
                let Yaml::Hash(map) = v else {
                    return Err(anyhow!("mapping #{i} should be a map"));
                };
                let rule = MappingRuleBuilder::parse(map)
                    .and_then(|b| b.build(&defaults))
                    .context(format!("invalid mapping #{i}"))?;
                rules.push(rule);
            }
        }
        Some(Yaml::Null) | None => {}
        Some(_) => return Err(anyhow!("yaml value type for 'mappings' should be 'seq'")),
    }

    Ok(MappingRuleSet::new(rules, defaults.timer_type))
}

pub(super) fn compile_str(content: &str) -> anyhow::Result<MappingRuleSet> {
    let docs = conf::load_str(content)?;
    match docs.first() {
        Some(doc) => compile(doc),
        None => Ok(MappingRuleSet::default()),
    }
}
