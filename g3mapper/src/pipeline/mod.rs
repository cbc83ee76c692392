/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::export::ArcExporter;
use crate::mapping::{MappingAction, MetricMapper, TimerType};
use crate::stat::RelayStats;
use crate::store::MetricStores;
use crate::types::{EventBatch, EventKind, MetricEvent, escape_metric_name};

mod document;
pub use document::{DocumentType, MetricDocument};

pub const DEFAULT_HELP: &str = "Metric autogenerated by g3mapper.";

const BATCH_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("unsupported timer type '{timer_type}' for metric {name}")]
    UnsupportedTimerType { name: String, timer_type: TimerType },
}

/// What happened to one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// matched a drop rule
    Dropped,
    /// negative counter value
    Rejected,
    Forwarded(DocumentType),
}

/// Turns events into accumulator updates and sink documents.
pub struct Pipeline {
    mapper: Arc<MetricMapper>,
    stores: MetricStores,
    exporter: ArcExporter,
    stats: Arc<RelayStats>,
}

impl Pipeline {
    pub fn new(mapper: Arc<MetricMapper>, exporter: ArcExporter, stats: Arc<RelayStats>) -> Self {
        Pipeline {
            mapper,
            stores: MetricStores::default(),
            exporter,
            stats,
        }
    }

    pub fn stores(&self) -> &MetricStores {
        &self.stores
    }

    /// Map one event, update its accumulator and forward the document.
    pub fn process_event(&self, event: MetricEvent) -> Result<EventOutcome, PipelineError> {
        let outcome = self.dispatch(event)?;
        self.stats.add_outcome(outcome);
        Ok(outcome)
    }

    fn dispatch(&self, event: MetricEvent) -> Result<EventOutcome, PipelineError> {
        let rules = self.mapper.snapshot();
        let metric_type = event.metric_type();

        let (name, labels, help, timer_type) = match rules.lookup(&event.name, metric_type) {
            Some(m) => {
                if m.rule.action() == MappingAction::Drop {
                    trace!("metric {} dropped by rule {}", event.name, m.rule.source());
                    return Ok(EventOutcome::Dropped);
                }
                let mut labels = event.labels;
                labels.merge_from(&m.labels);
                let help = m.rule.help().unwrap_or(DEFAULT_HELP).to_string();
                (escape_metric_name(&m.name), labels, help, m.rule.timer_type())
            }
            None => {
                self.stats.add_unmapped();
                (
                    escape_metric_name(&event.name),
                    event.labels,
                    DEFAULT_HELP.to_string(),
                    rules.default_timer_type(),
                )
            }
        };

        let (value, metric_type) = match event.kind {
            EventKind::Counter => {
                if event.value < 0.0 {
                    debug!(
                        "counter {name} is {}, counter must be non-negative value",
                        event.value
                    );
                    return Ok(EventOutcome::Rejected);
                }
                let counter = self.stores.counters.get_or_create(&name, &labels, &help);
                if let Err(e) = counter.add(event.value) {
                    debug!("counter {name} rejected: {e}");
                    return Ok(EventOutcome::Rejected);
                }
                (event.value, DocumentType::Counter)
            }
            EventKind::Gauge { relative } => {
                let gauge = self.stores.gauges.get_or_create(&name, &labels, &help);
                let value = if relative {
                    gauge.add(event.value)
                } else {
                    gauge.set(event.value);
                    event.value
                };
                (value, DocumentType::Gauge)
            }
            EventKind::Timer => match timer_type {
                TimerType::Default | TimerType::Raw => {
                    let histogram = self.stores.histograms.get_or_create(&name, &labels, &help);
                    histogram.observe(event.value);
                    (event.value, DocumentType::RawTimer)
                }
                TimerType::Histogram | TimerType::Summary => {
                    return Err(PipelineError::UnsupportedTimerType { name, timer_type });
                }
            },
        };

        self.forward(MetricDocument {
            timestamp: event.timestamp,
            name,
            description: help,
            value,
            labels,
            metric_type,
        });
        Ok(EventOutcome::Forwarded(metric_type))
    }

    fn forward(&self, doc: MetricDocument) {
        self.exporter.add_document(&doc);
    }

    /// Process all events of one read, stopping at the first fatal error.
    pub fn process_batch(&self, batch: EventBatch) -> Result<(), PipelineError> {
        for event in batch {
            self.process_event(event)?;
        }
        Ok(())
    }

    /// Drain the accumulators.
    pub fn flush(&self) -> usize {
        let n = self.stores.flush();
        debug!("flushed {n} metric accumulators");
        n
    }

    /// Consume batches until all senders are gone, then do a final flush.
    pub async fn into_running(
        self,
        mut receiver: mpsc::Receiver<EventBatch>,
        flush_interval: Duration,
    ) -> Result<(), PipelineError> {
        let mut interval = tokio::time::interval(flush_interval);
        interval.tick().await;

        let mut buf = Vec::with_capacity(BATCH_SIZE);
        loop {
            tokio::select! {
                biased;

                n = receiver.recv_many(&mut buf, BATCH_SIZE) => {
                    if n == 0 {
                        break;
                    }
                    for batch in buf.drain(..) {
                        self.process_batch(batch)?;
                    }
                }
                _ = interval.tick() => {
                    self.flush();
                }
            }
        }

        self.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::MemoryExporter;
    use crate::parse::parse_packet;
    use crate::types::LabelSet;

    const MAPPINGS: &str = r#"
mappings:
- match: app.*.latency
  name: "app_${1}_latency"
  labels:
    service: "$1"
  help: Latency of the service.
- match: app.*.dropped
  name: dropped
  action: drop
- match: app.*.histo
  name: "histo_$1"
  timer_type: histogram
- match: gauge.*.value
  name: gauge_value
  labels:
    shard: "$1"
"#;

    fn pipeline() -> (Pipeline, Arc<MemoryExporter>, Arc<RelayStats>) {
        let mapper = Arc::new(MetricMapper::default());
        mapper.replace_rules(MAPPINGS).unwrap();
        let exporter = Arc::new(MemoryExporter::default());
        let stats = Arc::new(RelayStats::default());
        let pipeline = Pipeline::new(mapper, exporter.clone(), stats.clone());
        (pipeline, exporter, stats)
    }

    fn events(packet: &str) -> EventBatch {
        let parsed = parse_packet(packet.as_bytes());
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        parsed.events
    }

    #[test]
    fn mapped_timer() {
        let (pipeline, exporter, _) = pipeline();
        pipeline
            .process_batch(events("app.checkout.latency:12|ms|#env:prod"))
            .unwrap();

        let docs = exporter.documents();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.name, "app_checkout_latency");
        assert_eq!(doc.description, "Latency of the service.");
        assert_eq!(doc.value, 12.0);
        assert_eq!(doc.metric_type, DocumentType::RawTimer);
        assert_eq!(doc.labels.get("service"), Some("checkout"));
        assert_eq!(doc.labels.get("env"), Some("prod"));
        assert_eq!(pipeline.stores().histograms.len(), 1);
    }

    #[test]
    fn unmapped() {
        let (pipeline, exporter, stats) = pipeline();
        let outcome = pipeline
            .process_event(events("foo.bar-baz:3|c").remove(0))
            .unwrap();
        assert_eq!(outcome, EventOutcome::Forwarded(DocumentType::Counter));

        let docs = exporter.documents();
        assert_eq!(docs[0].name, "foo_bar_baz");
        assert_eq!(docs[0].description, DEFAULT_HELP);
        assert_eq!(docs[0].value, 3.0);
        assert!(docs[0].labels.is_empty());

        let s = stats.snapshot();
        assert_eq!(s.events_unmapped, 1);
        assert_eq!(s.events_counter, 1);
    }

    #[test]
    fn rule_labels_win() {
        let (pipeline, exporter, _) = pipeline();
        pipeline
            .process_batch(events("app.cart.latency:1|ms|#service:other"))
            .unwrap();
        assert_eq!(exporter.documents()[0].labels.get("service"), Some("cart"));
    }

    #[test]
    fn drop_rule() {
        let (pipeline, exporter, stats) = pipeline();
        let outcome = pipeline
            .process_event(events("app.x.dropped:1|c").remove(0))
            .unwrap();
        assert_eq!(outcome, EventOutcome::Dropped);
        assert!(exporter.is_empty());
        assert!(pipeline.stores().counters.is_empty());
        assert_eq!(stats.snapshot().events_dropped, 1);
    }

    #[test]
    fn negative_counter() {
        let (pipeline, exporter, stats) = pipeline();
        let outcome = pipeline
            .process_event(events("requests:-5|c").remove(0))
            .unwrap();
        assert_eq!(outcome, EventOutcome::Rejected);
        assert!(exporter.is_empty());
        assert!(pipeline.stores().counters.is_empty());
        assert_eq!(stats.snapshot().events_illegal_negative, 1);
    }

    #[test]
    fn gauge_updates() {
        let (pipeline, exporter, _) = pipeline();
        pipeline
            .process_batch(events(
                "gauge.a.value:10|g\ngauge.a.value:+5|g\ngauge.a.value:-3|g\ngauge.b.value:-3|g",
            ))
            .unwrap();

        let values: Vec<f64> = exporter.documents().iter().map(|d| d.value).collect();
        assert_eq!(values, vec![10.0, 15.0, 12.0, -3.0]);
        assert_eq!(pipeline.stores().gauges.len(), 2);

        let labels: LabelSet = [("shard", "a")].into_iter().collect();
        let gauge = pipeline
            .stores()
            .gauges
            .get_or_create("gauge_value", &labels, DEFAULT_HELP);
        assert_eq!(gauge.value(), 12.0);
    }

    #[test]
    fn counter_accumulates() {
        let (pipeline, exporter, _) = pipeline();
        pipeline
            .process_batch(events("hits:1|c\nhits:2|c\nhits:3|c|@0.5"))
            .unwrap();
        let values: Vec<f64> = exporter.documents().iter().map(|d| d.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 6.0]);
        let counter = pipeline
            .stores()
            .counters
            .get_or_create("hits", &LabelSet::new(), DEFAULT_HELP);
        assert_eq!(counter.value(), 9.0);
    }

    #[test]
    fn unsupported_timer_type() {
        let (pipeline, exporter, _) = pipeline();
        let e = pipeline
            .process_batch(events("app.x.histo:1|ms\nother:1|c"))
            .unwrap_err();
        assert_eq!(
            e,
            PipelineError::UnsupportedTimerType {
                name: "histo_x".to_string(),
                timer_type: TimerType::Histogram,
            }
        );
        // the batch stops at the fatal event
        assert!(exporter.is_empty());
    }

    #[test]
    fn unmapped_timer_uses_default_timer_type() {
        let mapper = Arc::new(MetricMapper::default());
        mapper
            .replace_rules("defaults:\n  timer_type: summary\nmappings: []\n")
            .unwrap();
        let exporter = Arc::new(MemoryExporter::default());
        let pipeline = Pipeline::new(mapper, exporter, Arc::new(RelayStats::default()));
        assert!(pipeline.process_batch(events("t:1|ms")).is_err());
        assert!(pipeline.process_batch(events("c:1|c")).is_ok());
    }

    #[test]
    fn flush_drains_stores() {
        let (pipeline, _, _) = pipeline();
        pipeline
            .process_batch(events("a:1|c\nb:1|g\nc:1|ms\na:1|c"))
            .unwrap();
        assert_eq!(pipeline.flush(), 3);
        assert!(pipeline.stores().counters.is_empty());
        assert_eq!(pipeline.flush(), 0);
    }

    #[tokio::test]
    async fn running_until_closed() {
        let (pipeline, exporter, _) = pipeline();
        let (sender, receiver) = mpsc::channel(4);
        let task = tokio::spawn(pipeline.into_running(receiver, Duration::from_secs(60)));
        for i in 0..10 {
            sender
                .send(events(&format!("n{i}:1|c\nm{i}:2|g")))
                .await
                .unwrap();
        }
        drop(sender);
        task.await.unwrap().unwrap();
        assert_eq!(exporter.len(), 20);
        assert_eq!(exporter.documents()[1].name, "m0");
    }

    #[tokio::test]
    async fn running_stops_on_fatal_error() {
        let (pipeline, exporter, _) = pipeline();
        let (sender, receiver) = mpsc::channel(4);
        let task = tokio::spawn(pipeline.into_running(receiver, Duration::from_secs(60)));
        sender.send(events("a:1|c")).await.unwrap();
        sender.send(events("app.y.histo:2|ms")).await.unwrap();
        let r = task.await.unwrap();
        assert!(matches!(r, Err(PipelineError::UnsupportedTimerType { .. })));
        assert_eq!(exporter.len(), 1);
        // the receiver is gone with the pipeline
        assert!(sender.send(events("b:1|c")).await.is_err());
    }
}
