/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::broadcast;

use crate::mapping::MetricMapper;
use crate::parse::{ParsedLine, StatsdParseError};
use crate::pipeline::{DocumentType, EventOutcome};

const REASON_COUNT: usize = StatsdParseError::REASONS.len();

/// Process wide relay counters.
#[derive(Default)]
pub struct RelayStats {
    lines: AtomicU64,
    samples: AtomicU64,
    sample_errors: [AtomicU64; REASON_COUNT],
    tags: AtomicU64,
    tag_errors: AtomicU64,

    udp_packets: AtomicU64,
    tcp_connections: AtomicU64,
    tcp_errors: AtomicU64,
    tcp_line_too_long: AtomicU64,

    events_counter: AtomicU64,
    events_gauge: AtomicU64,
    events_timer: AtomicU64,
    events_dropped: AtomicU64,
    events_illegal_negative: AtomicU64,
    events_unmapped: AtomicU64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub lines: u64,
    pub samples: u64,
    pub sample_errors: [u64; REASON_COUNT],
    pub tags: u64,
    pub tag_errors: u64,
    pub udp_packets: u64,
    pub tcp_connections: u64,
    pub tcp_errors: u64,
    pub tcp_line_too_long: u64,
    pub events_counter: u64,
    pub events_gauge: u64,
    pub events_timer: u64,
    pub events_dropped: u64,
    pub events_illegal_negative: u64,
    pub events_unmapped: u64,
}

impl RelayStatsSnapshot {
    pub fn sample_error(&self, reason: &str) -> u64 {
        StatsdParseError::REASONS
            .iter()
            .position(|r| *r == reason)
            .map(|i| self.sample_errors[i])
            .unwrap_or(0)
    }

    pub fn total_sample_errors(&self) -> u64 {
        self.sample_errors.iter().sum()
    }
}

impl RelayStats {
    pub fn add_parsed(&self, parsed: &ParsedLine) {
        self.lines
            .fetch_add(parsed.lines as u64, Ordering::Relaxed);
        self.samples
            .fetch_add(parsed.samples as u64, Ordering::Relaxed);
        self.tags.fetch_add(parsed.tags as u64, Ordering::Relaxed);
        self.tag_errors
            .fetch_add(parsed.tag_errors as u64, Ordering::Relaxed);
        for e in &parsed.errors {
            self.sample_errors[e.reason_index()].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add_udp_packet(&self) {
        self.udp_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tcp_connection(&self) {
        self.tcp_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tcp_error(&self) {
        self.tcp_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tcp_line_too_long(&self) {
        self.tcp_line_too_long.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_unmapped(&self) {
        self.events_unmapped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_outcome(&self, outcome: EventOutcome) {
        let counter = match outcome {
            EventOutcome::Dropped => &self.events_dropped,
            EventOutcome::Rejected => &self.events_illegal_negative,
            EventOutcome::Forwarded(DocumentType::Counter) => &self.events_counter,
            EventOutcome::Forwarded(DocumentType::Gauge) => &self.events_gauge,
            EventOutcome::Forwarded(DocumentType::RawTimer) => &self.events_timer,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        RelayStatsSnapshot {
            lines: load(&self.lines),
            samples: load(&self.samples),
            sample_errors: std::array::from_fn(|i| load(&self.sample_errors[i])),
            tags: load(&self.tags),
            tag_errors: load(&self.tag_errors),
            udp_packets: load(&self.udp_packets),
            tcp_connections: load(&self.tcp_connections),
            tcp_errors: load(&self.tcp_errors),
            tcp_line_too_long: load(&self.tcp_line_too_long),
            events_counter: load(&self.events_counter),
            events_gauge: load(&self.events_gauge),
            events_timer: load(&self.events_timer),
            events_dropped: load(&self.events_dropped),
            events_illegal_negative: load(&self.events_illegal_negative),
            events_unmapped: load(&self.events_unmapped),
        }
    }
}

fn log_snapshot(s: &RelayStatsSnapshot, mapper: &MetricMapper) {
    info!(
        "lines: {} samples: {} sample_errors: {} tags: {} tag_errors: {}",
        s.lines,
        s.samples,
        s.total_sample_errors(),
        s.tags,
        s.tag_errors
    );
    info!(
        "udp_packets: {} tcp_connections: {} tcp_errors: {} tcp_line_too_long: {}",
        s.udp_packets, s.tcp_connections, s.tcp_errors, s.tcp_line_too_long
    );
    info!(
        "events counter: {} gauge: {} timer: {} dropped: {} illegal_negative_counter: {} unmapped: {}",
        s.events_counter,
        s.events_gauge,
        s.events_timer,
        s.events_dropped,
        s.events_illegal_negative,
        s.events_unmapped
    );
    info!(
        "mapping rules: {} reload success: {} failure: {}",
        mapper.rule_count(),
        mapper.reload_success(),
        mapper.reload_failure()
    );
    for (reason, count) in StatsdParseError::REASONS.iter().zip(s.sample_errors) {
        if count > 0 {
            debug!("sample errors {reason}: {count}");
        }
    }
}

/// Log a stats snapshot every `interval` until quit.
pub async fn run_logger(
    stats: Arc<RelayStats>,
    mapper: Arc<MetricMapper>,
    interval: Duration,
    mut quit_receiver: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(interval);
    interval.tick().await;
    loop {
        tokio::select! {
            biased;

            _ = quit_receiver.recv() => break,
            _ = interval.tick() => log_snapshot(&stats.snapshot(), &mapper),
        }
    }
    log_snapshot(&stats.snapshot(), &mapper);
}
