/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use log::{error, info};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::MapperConfig;
use crate::export::SpawnedExporter;
use crate::listen::ListenHandles;
use crate::mapping::MetricMapper;
use crate::pipeline::{Pipeline, PipelineError};
use crate::stat::RelayStats;
use crate::watch::Reloader;

/// Load the mapping file configured in `config`, if any.
pub fn load_mapper(config: &MapperConfig) -> anyhow::Result<Arc<MetricMapper>> {
    let mapper = MetricMapper::default();
    if let Some(path) = &config.mapping.path {
        mapper.load_file(path)?;
    }
    Ok(Arc::new(mapper))
}

/// All the running tasks of one relay instance.
pub struct RelayRuntime {
    quit_sender: broadcast::Sender<()>,
    listen: ListenHandles,
    pipeline: JoinHandle<Result<(), PipelineError>>,
    exporter: SpawnedExporter,
    stats: Arc<RelayStats>,
    stats_logger: JoinHandle<()>,
    watcher: Option<JoinHandle<()>>,
    reloader: Arc<Reloader>,
}

impl RelayRuntime {
    /// Spawn the exporter from config and start everything else.
    pub fn spawn(config: &MapperConfig, mapper: Arc<MetricMapper>) -> anyhow::Result<Self> {
        let exporter = crate::export::spawn(&config.exporter).context(format!(
            "failed to spawn {} exporter",
            config.exporter.exporter_type()
        ))?;
        Self::spawn_with_exporter(config, mapper, exporter)
    }

    pub fn spawn_with_exporter(
        config: &MapperConfig,
        mapper: Arc<MetricMapper>,
        exporter: SpawnedExporter,
    ) -> anyhow::Result<Self> {
        let stats = Arc::new(RelayStats::default());
        let (quit_sender, _) = broadcast::channel(4);
        let (sender, receiver) = mpsc::channel(config.pipeline.queue_size);

        let listen = crate::listen::spawn_all(&config.listen, &sender, &stats, &quit_sender)
            .context("failed to spawn listeners")?;
        // the queue closes once all listeners are gone
        drop(sender);

        let pipeline = Pipeline::new(mapper.clone(), exporter.exporter.clone(), stats.clone());
        let pipeline = tokio::spawn(pipeline.into_running(receiver, config.pipeline.flush_interval));

        let stats_logger = tokio::spawn(crate::stat::run_logger(
            stats.clone(),
            mapper.clone(),
            config.pipeline.stats_interval,
            quit_sender.subscribe(),
        ));

        let reloader = Arc::new(Reloader::new(
            mapper,
            config.mapping.path.clone(),
            config.mapping.watch,
            exporter.exporter.clone(),
        ));
        let watcher = crate::watch::spawn_watcher(reloader.clone(), quit_sender.subscribe())
            .context("failed to spawn file watcher")?;

        info!(
            "relay started with {} exporter {}",
            exporter.exporter.r#type(),
            exporter.exporter.name()
        );
        Ok(RelayRuntime {
            quit_sender,
            listen,
            pipeline,
            exporter,
            stats,
            stats_logger,
            watcher,
            reloader,
        })
    }

    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.listen.udp_addr
    }

    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.listen.tcp_addr
    }

    pub fn quit_sender(&self) -> broadcast::Sender<()> {
        self.quit_sender.clone()
    }

    pub fn reloader(&self) -> Arc<Reloader> {
        self.reloader.clone()
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Wait until the relay is told to quit or hits a fatal error.
    ///
    /// Listeners stop first, then the pipeline drains the queue and flushes,
    /// and the exporter sends what it still holds.
    pub async fn wait(self) -> anyhow::Result<()> {
        let r = match self.pipeline.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!(e).context("fatal pipeline error")),
            Err(e) => Err(anyhow!("pipeline task failed: {e}")),
        };
        if let Err(e) = &r {
            error!("{e:?}");
        }
        // the pipeline also ends when every listener is gone
        let _ = self.quit_sender.send(());

        self.listen.join().await;
        self.exporter.shutdown().await;
        if let Some(watcher) = self.watcher {
            let _ = watcher.await;
        }
        let _ = self.stats_logger.await;
        info!("relay stopped");
        r
    }
}
