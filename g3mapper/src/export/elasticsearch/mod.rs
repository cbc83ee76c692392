/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, anyhow};
use arc_swap::ArcSwapOption;
use http::Method;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Interval;

use super::Exporter;
use crate::config::exporter::ElasticsearchExporterConfig;
use crate::pipeline::MetricDocument;

mod bulk;
use bulk::BulkBody;

mod client;
use client::ElasticsearchClient;

mod template;

const BULK_API_PATH: &str = "/_bulk";
const BATCH_SIZE: usize = 128;

enum ElasticsearchCommand {
    Document(MetricDocument),
    Flush,
    ReloadTemplate,
}

#[derive(Default)]
struct ElasticsearchStats {
    queue_dropped: AtomicU64,
    sent: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

/// Index documents into daily indices through the bulk api.
pub struct ElasticsearchExporter {
    index: String,
    template: Option<PathBuf>,
    sender: ArcSwapOption<mpsc::Sender<ElasticsearchCommand>>,
    stats: Arc<ElasticsearchStats>,
}

impl ElasticsearchExporter {
    /// Start the bulk runtime, which ends after [`Exporter::stop`] once all
    /// queued documents have been sent.
    pub fn spawn(
        config: ElasticsearchExporterConfig,
    ) -> anyhow::Result<(ElasticsearchExporter, JoinHandle<()>)> {
        let handle = tokio::runtime::Handle::try_current()
            .context("no tokio runtime to run the elasticsearch exporter")?;

        let (sender, receiver) = mpsc::channel(config.queue_size);
        let stats = Arc::new(ElasticsearchStats::default());
        let exporter = ElasticsearchExporter {
            index: config.index.clone(),
            template: config.template.clone(),
            sender: ArcSwapOption::from_pointee(sender),
            stats: stats.clone(),
        };
        let runtime = ElasticsearchRuntime::new(config, receiver, stats);
        let task = handle.spawn(runtime.into_running());
        Ok((exporter, task))
    }

    fn send_command(&self, cmd: ElasticsearchCommand) -> bool {
        let guard = self.sender.load();
        let Some(sender) = guard.as_ref() else {
            return false;
        };
        match sender.try_send(cmd) {
            Ok(_) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Documents that were not sent, for any reason.
    pub fn dropped(&self) -> u64 {
        self.stats.queue_dropped.load(Ordering::Relaxed) + self.stats.dropped.load(Ordering::Relaxed)
    }

    /// Documents accepted by the server.
    pub fn sent(&self) -> u64 {
        self.stats.sent.load(Ordering::Relaxed)
    }

    /// Documents the server refused to index.
    pub fn rejected(&self) -> u64 {
        self.stats.rejected.load(Ordering::Relaxed)
    }
}

impl Exporter for ElasticsearchExporter {
    #[inline]
    fn name(&self) -> &str {
        &self.index
    }

    #[inline]
    fn r#type(&self) -> &'static str {
        "Elasticsearch"
    }

    fn add_document(&self, doc: &MetricDocument) {
        if !self.send_command(ElasticsearchCommand::Document(doc.clone())) {
            self.stats.queue_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self) {
        self.send_command(ElasticsearchCommand::Flush);
    }

    fn stop(&self) {
        self.sender.store(None);
    }

    fn watch_files(&self) -> Vec<PathBuf> {
        self.template.iter().cloned().collect()
    }

    fn reload(&self) {
        if self.template.is_some() {
            self.send_command(ElasticsearchCommand::ReloadTemplate);
        }
    }
}

/// Outcome of one bulk request the server answered.
#[derive(Debug, Default, PartialEq, Eq)]
struct BulkResult {
    failed: usize,
    first_error: Option<String>,
}

fn parse_bulk_response(body: &[u8]) -> anyhow::Result<BulkResult> {
    let v: Value = serde_json::from_slice(body).context("invalid json body in bulk response")?;
    let mut result = BulkResult::default();
    if v.get("errors").and_then(Value::as_bool) != Some(true) {
        return Ok(result);
    }
    let Some(items) = v.get("items").and_then(Value::as_array) else {
        return Err(anyhow!("bulk response has errors but no items"));
    };
    for item in items {
        let Some(action) = item.as_object().and_then(|m| m.values().next()) else {
            continue;
        };
        let status = action.get("status").and_then(Value::as_u64).unwrap_or(0);
        if (200..300).contains(&status) {
            continue;
        }
        result.failed += 1;
        if result.first_error.is_none() {
            result.first_error = action.get("error").map(|e| e.to_string());
        }
    }
    Ok(result)
}

impl BulkResult {
    fn accepted(&self, actions: usize) -> usize {
        actions.saturating_sub(self.failed)
    }
}

async fn interval_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

struct ElasticsearchRuntime {
    config: ElasticsearchExporterConfig,
    client: ElasticsearchClient,
    receiver: mpsc::Receiver<ElasticsearchCommand>,
    stats: Arc<ElasticsearchStats>,
    bulk: BulkBody,
}

impl ElasticsearchRuntime {
    fn new(
        config: ElasticsearchExporterConfig,
        receiver: mpsc::Receiver<ElasticsearchCommand>,
        stats: Arc<ElasticsearchStats>,
    ) -> Self {
        let client = ElasticsearchClient::new(&config);
        let bulk = BulkBody::with_capacity(config.size_threshold.clamp(4096, 8 << 20));
        ElasticsearchRuntime {
            config,
            client,
            receiver,
            stats,
            bulk,
        }
    }

    async fn into_running(mut self) {
        self.upload_template().await;

        // a zero interval disables the periodic flush
        let mut flush_interval = if self.config.flush_interval.is_zero() {
            None
        } else {
            let mut interval = tokio::time::interval(self.config.flush_interval);
            interval.tick().await;
            Some(interval)
        };

        let mut buf = Vec::with_capacity(BATCH_SIZE);
        loop {
            tokio::select! {
                biased;

                n = self.receiver.recv_many(&mut buf, BATCH_SIZE) => {
                    if n == 0 {
                        break;
                    }
                    for cmd in buf.drain(..) {
                        self.handle_command(cmd).await;
                    }
                }
                _ = interval_tick(&mut flush_interval) => {
                    self.send_bulk().await;
                }
            }
        }

        self.send_bulk().await;
        info!(
            "elasticsearch exporter {} quit, sent: {} rejected: {} dropped: {}",
            self.config.index,
            self.stats.sent.load(Ordering::Relaxed),
            self.stats.rejected.load(Ordering::Relaxed),
            self.stats.dropped.load(Ordering::Relaxed)
                + self.stats.queue_dropped.load(Ordering::Relaxed)
        );
    }

    async fn handle_command(&mut self, cmd: ElasticsearchCommand) {
        match cmd {
            ElasticsearchCommand::Document(doc) => {
                self.bulk.push(&self.config.index, &doc);
                if self
                    .bulk
                    .reached(self.config.actions_threshold, self.config.size_threshold)
                {
                    self.send_bulk().await;
                }
            }
            ElasticsearchCommand::Flush => self.send_bulk().await,
            ElasticsearchCommand::ReloadTemplate => self.upload_template().await,
        }
    }

    async fn upload_template(&mut self) {
        let Some(path) = self.config.template.clone() else {
            return;
        };
        let name = self.config.template_name().to_string();
        info!("creating template {name} from file {}", path.display());
        match template::put_template(&mut self.client, &name, &path).await {
            Ok(_) => info!("template {name} updated"),
            Err(e) => warn!("failed to put template {name}: {e:?}"),
        }
    }

    async fn post_bulk(&mut self, body: &[u8]) -> anyhow::Result<BulkResult> {
        let rsp = self
            .client
            .send(Method::POST, BULK_API_PATH, "application/x-ndjson", body)
            .await?;
        rsp.check_status()?;
        parse_bulk_response(&rsp.body)
    }

    async fn send_bulk(&mut self) {
        if self.bulk.is_empty() {
            return;
        }
        let (actions, body) = self.bulk.take();
        debug!(
            "elasticsearch: sending bulk request with {actions} actions, {} bytes",
            body.len()
        );

        let mut retry = 0;
        loop {
            match self.post_bulk(&body).await {
                Ok(r) => {
                    if let Some(e) = &r.first_error {
                        warn!(
                            "elasticsearch: {} of {actions} documents rejected, first error: {e}",
                            r.failed
                        );
                    }
                    self.stats
                        .sent
                        .fetch_add(r.accepted(actions) as u64, Ordering::Relaxed);
                    self.stats
                        .rejected
                        .fetch_add(r.failed as u64, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    if retry >= self.config.max_retries {
                        warn!(
                            "elasticsearch: bulk request failed after {} attempts, {actions} documents dropped: {e:?}",
                            retry + 1
                        );
                        self.stats
                            .dropped
                            .fetch_add(actions as u64, Ordering::Relaxed);
                        return;
                    }
                    retry += 1;
                    warn!(
                        "elasticsearch: bulk request failed, will retry in {:?}: {e:?}",
                        self.config.connect_retry_wait
                    );
                    tokio::time::sleep(self.config.connect_retry_wait).await;
                }
            }
        }
    }
}
