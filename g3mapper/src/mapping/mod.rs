/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use arc_swap::ArcSwap;
use log::{debug, info, warn};

use crate::types::{LabelSet, MetricType};

mod document;
mod grammar;
mod template;

mod rule;
pub use rule::{MappingAction, MappingRule, MatchType, TimerType};

/// Result of a successful lookup.
#[derive(Debug)]
pub struct MappingMatch {
    pub rule: Arc<MappingRule>,
    pub name: String,
    pub labels: LabelSet,
}

/// An immutable list of compiled rules, tried in declaration order.
#[derive(Debug, Default)]
pub struct MappingRuleSet {
    rules: Vec<Arc<MappingRule>>,
    default_timer_type: TimerType,
}

impl MappingRuleSet {
    fn new(rules: Vec<MappingRule>, default_timer_type: TimerType) -> Self {
        MappingRuleSet {
            rules: rules.into_iter().map(Arc::new).collect(),
            default_timer_type,
        }
    }

    /// Compile a YAML mapping document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        document::compile_str(content)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Timer type of events no rule matched.
    pub fn default_timer_type(&self) -> TimerType {
        self.default_timer_type
    }

    pub fn rules(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn lookup(&self, name: &str, metric_type: MetricType) -> Option<MappingMatch> {
        self.rules.iter().find_map(|rule| {
            rule.apply(name, metric_type)
                .map(|(name, labels)| MappingMatch {
                    rule: rule.clone(),
                    name,
                    labels,
                })
        })
    }
}

/// The active rule set, replaceable while lookups are running.
pub struct MetricMapper {
    rules: ArcSwap<MappingRuleSet>,
    reload_success: AtomicU64,
    reload_failure: AtomicU64,
}

impl Default for MetricMapper {
    fn default() -> Self {
        MetricMapper::new(MappingRuleSet::default())
    }
}

impl MetricMapper {
    pub fn new(rules: MappingRuleSet) -> Self {
        MetricMapper {
            rules: ArcSwap::from_pointee(rules),
            reload_success: AtomicU64::new(0),
            reload_failure: AtomicU64::new(0),
        }
    }

    /// Compile `content` and make it active, returning the rule count.
    ///
    /// On error the active rule set is left untouched.
    pub fn replace_rules(&self, content: &str) -> anyhow::Result<usize> {
        match MappingRuleSet::parse(content) {
            Ok(rules) => {
                let count = rules.len();
                self.rules.store(Arc::new(rules));
                self.reload_success.fetch_add(1, Ordering::Relaxed);
                debug!("mapping rule set replaced, {count} rules active");
                Ok(count)
            }
            Err(e) => {
                self.reload_failure.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub fn load_file(&self, path: &Path) -> anyhow::Result<usize> {
        let content = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                self.reload_failure.fetch_add(1, Ordering::Relaxed);
                return Err(anyhow!(
                    "failed to read mapping file {}: {e}",
                    path.display()
                ));
            }
        };
        let count = self
            .replace_rules(&content)
            .map_err(|e| anyhow!("failed to load mapping file {}: {e:?}", path.display()))?;
        info!("loaded {count} mapping rules from {}", path.display());
        Ok(count)
    }

    /// Reload from `path`, keeping the old rules on error.
    pub fn reload_file(&self, path: &Path) {
        if let Err(e) = self.load_file(path) {
            warn!("mapping reload failed, the old rules are kept: {e:?}");
        }
    }

    pub fn snapshot(&self) -> Arc<MappingRuleSet> {
        self.rules.load_full()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.load().len()
    }

    pub fn lookup(&self, name: &str, metric_type: MetricType) -> Option<MappingMatch> {
        self.rules.load().lookup(name, metric_type)
    }

    pub fn reload_success(&self) -> u64 {
        self.reload_success.load(Ordering::Relaxed)
    }

    pub fn reload_failure(&self) -> u64 {
        self.reload_failure.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPING_DOC: &str = r#"
defaults:
  timer_type: raw
mappings:
- match: app.*.latency
  name: app_$1_latency
  labels:
    service: $1
    job: app
- match: test.dispatcher.*.*.*
  name: dispatcher_events_total
  labels:
    processor: $1
    action: $2
    outcome: $3
  help: dispatcher events
- match: noisy.*
  name: noisy
  action: drop
- match: "^req\\.(\\w+)\\.count$"
  match_type: regex
  name: requests_${1}_total
  match_metric_type: counter
  timer_type: histogram
"#;

    #[test]
    fn glob_lookup() {
        let rules = MappingRuleSet::parse(MAPPING_DOC).unwrap();
        assert_eq!(rules.len(), 4);
        assert_eq!(rules.default_timer_type(), TimerType::Raw);

        let m = rules
            .lookup("app.checkout.latency", MetricType::Timer)
            .unwrap();
        assert_eq!(m.name, "app_checkout_latency");
        assert_eq!(m.labels.get("service"), Some("checkout"));
        assert_eq!(m.labels.get("job"), Some("app"));
        assert_eq!(m.rule.timer_type(), TimerType::Raw);
        assert_eq!(m.rule.match_type(), MatchType::Glob);

        let m = rules
            .lookup("test.dispatcher.FooProcessor.send.success", MetricType::Counter)
            .unwrap();
        assert_eq!(m.name, "dispatcher_events_total");
        assert_eq!(m.labels.get("processor"), Some("FooProcessor"));
        assert_eq!(m.labels.get("action"), Some("send"));
        assert_eq!(m.labels.get("outcome"), Some("success"));
        assert_eq!(m.rule.help(), Some("dispatcher events"));

        // glob captures never cross a dot
        assert!(rules.lookup("app.a.b.latency", MetricType::Timer).is_none());
        assert!(rules.lookup("other", MetricType::Counter).is_none());
    }

    #[test]
    fn drop_action() {
        let rules = MappingRuleSet::parse(MAPPING_DOC).unwrap();
        let m = rules.lookup("noisy.x", MetricType::Gauge).unwrap();
        assert_eq!(m.rule.action(), MappingAction::Drop);
    }

    #[test]
    fn metric_type_filter() {
        let rules = MappingRuleSet::parse(MAPPING_DOC).unwrap();
        let m = rules.lookup("req.login.count", MetricType::Counter).unwrap();
        assert_eq!(m.name, "requests_login_total");
        assert_eq!(m.rule.timer_type(), TimerType::Histogram);
        assert!(rules.lookup("req.login.count", MetricType::Gauge).is_none());
    }

    #[test]
    fn first_match_wins() {
        let doc = r#"
mappings:
- match: ab.*
  name: first
- match: ab.cd
  name: second
"#;
        let rules = MappingRuleSet::parse(doc).unwrap();
        let m = rules.lookup("ab.cd", MetricType::Counter).unwrap();
        assert_eq!(m.name, "first");
        assert_eq!(m.rule.timer_type(), TimerType::Default);
        assert_eq!(m.rule.action(), MappingAction::Map);
    }

    #[test]
    fn default_match_type() {
        let doc = r#"
defaults:
  match_type: regex
mappings:
- match: "^x(\\d+)"
  name: x_$1
"#;
        let rules = MappingRuleSet::parse(doc).unwrap();
        let m = rules.lookup("x42.foo", MetricType::Gauge).unwrap();
        assert_eq!(m.name, "x_42");
        assert_eq!(m.rule.match_type(), MatchType::Regex);
    }

    #[test]
    fn invalid_documents() {
        let cases = [
            // missing name
            "mappings:\n- match: ab.cd\n",
            // bad name
            "mappings:\n- match: ab.cd\n  name: a.b\n",
            // bad glob
            "mappings:\n- match: a\n  name: a\n",
            // bad label key
            "mappings:\n- match: ab.cd\n  name: a\n  labels:\n    x-y: z\n",
            // bad regex
            "mappings:\n- match: \"(\"\n  match_type: regex\n  name: a\n",
            // bad timer type
            "mappings:\n- match: ab.cd\n  name: a\n  timer_type: quantile\n",
            // bad action
            "mappings:\n- match: ab.cd\n  name: a\n  action: keep\n",
            // unknown key
            "mappings:\n- match: ab.cd\n  name: a\n  foo: bar\n",
            "mapping:\n- match: ab.cd\n  name: a\n",
            "- a\n- b\n",
        ];
        for doc in cases {
            assert!(MappingRuleSet::parse(doc).is_err(), "{doc}");
        }
    }

    #[test]
    fn empty_document() {
        assert!(MappingRuleSet::parse("").unwrap().is_empty());
        assert!(MappingRuleSet::parse("mappings:\n").unwrap().is_empty());
    }

    #[test]
    fn reload_is_idempotent() {
        let mapper = MetricMapper::default();
        assert_eq!(mapper.replace_rules(MAPPING_DOC).unwrap(), 4);
        let m1 = mapper.lookup("app.checkout.latency", MetricType::Timer).unwrap();
        assert_eq!(mapper.replace_rules(MAPPING_DOC).unwrap(), 4);
        let m2 = mapper.lookup("app.checkout.latency", MetricType::Timer).unwrap();
        assert_eq!(m1.name, m2.name);
        assert_eq!(m1.labels, m2.labels);
        assert_eq!(mapper.reload_success(), 2);
    }

    #[test]
    fn failed_reload_keeps_rules() {
        let mapper = MetricMapper::default();
        mapper.replace_rules(MAPPING_DOC).unwrap();
        let before = mapper.snapshot();

        let bad = format!("{MAPPING_DOC}- match: broken\n  name: x\n");
        assert!(mapper.replace_rules(&bad).is_err());
        assert_eq!(mapper.reload_failure(), 1);
        assert!(Arc::ptr_eq(&before, &mapper.snapshot()));
        assert_eq!(mapper.rule_count(), 4);
        assert!(mapper.lookup("app.x.latency", MetricType::Timer).is_some());
    }

    #[test]
    fn snapshot_survives_reload() {
        let mapper = MetricMapper::default();
        mapper.replace_rules(MAPPING_DOC).unwrap();
        let old = mapper.snapshot();
        mapper.replace_rules("mappings:\n").unwrap();
        assert_eq!(old.len(), 4);
        assert_eq!(mapper.rule_count(), 0);
        assert!(mapper.lookup("app.x.latency", MetricType::Timer).is_none());
    }

    #[test]
    fn load_missing_file() {
        let mapper = MetricMapper::default();
        assert!(mapper.load_file(Path::new("/nonexistent/mapping.yaml")).is_err());
        assert_eq!(mapper.reload_failure(), 1);
    }
}
