/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::ExporterConfig;
use crate::pipeline::MetricDocument;

mod console;
pub use console::ConsoleExporter;

mod discard;
pub use discard::DiscardExporter;

mod memory;
pub use memory::MemoryExporter;

pub mod elasticsearch;
pub use elasticsearch::ElasticsearchExporter;

/// The sink of all forwarded documents.
///
/// Calls are made from the pipeline task and must not block.
pub trait Exporter {
    fn name(&self) -> &str;
    fn r#type(&self) -> &'static str;

    fn add_document(&self, doc: &MetricDocument);

    /// Ask for pending documents to be sent as soon as possible.
    fn flush(&self) {}

    /// No more documents will be added after this call.
    fn stop(&self) {}

    /// Files whose change should trigger [`Exporter::reload`].
    fn watch_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn reload(&self) {}
}

pub type ArcExporter = Arc<dyn Exporter + Send + Sync>;

/// An exporter and its background task, if it has one.
pub struct SpawnedExporter {
    pub exporter: ArcExporter,
    pub task: Option<JoinHandle<()>>,
}

impl SpawnedExporter {
    fn without_task(exporter: ArcExporter) -> Self {
        SpawnedExporter {
            exporter,
            task: None,
        }
    }

    /// Stop the exporter and wait for its task to send what is left.
    pub async fn shutdown(self) {
        self.exporter.stop();
        if let Some(task) = self.task {
            let _ = task.await;
        }
    }
}

/// Create the exporter described by `config`.
///
/// Must be called inside a tokio runtime.
pub fn spawn(config: &ExporterConfig) -> anyhow::Result<SpawnedExporter> {
    match config {
        ExporterConfig::Discard => Ok(SpawnedExporter::without_task(Arc::new(
            DiscardExporter::default(),
        ))),
        ExporterConfig::Console => Ok(SpawnedExporter::without_task(Arc::new(
            ConsoleExporter::default(),
        ))),
        ExporterConfig::Memory => Ok(SpawnedExporter::without_task(Arc::new(
            MemoryExporter::default(),
        ))),
        ExporterConfig::Elasticsearch(config) => {
            let (exporter, task) = ElasticsearchExporter::spawn(config.as_ref().clone())?;
            Ok(SpawnedExporter {
                exporter: Arc::new(exporter),
                task: Some(task),
            })
        }
    }
}
