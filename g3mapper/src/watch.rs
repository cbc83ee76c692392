/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use crate::export::ArcExporter;
use crate::mapping::MetricMapper;

static RELOAD_MUTEX: Mutex<()> = Mutex::const_new(());

/// Everything that can be reloaded at runtime.
pub struct Reloader {
    mapper: Arc<MetricMapper>,
    mapping_file: Option<PathBuf>,
    watch_mapping: bool,
    exporter: ArcExporter,
}

impl Reloader {
    pub fn new(
        mapper: Arc<MetricMapper>,
        mapping_file: Option<PathBuf>,
        watch_mapping: bool,
        exporter: ArcExporter,
    ) -> Self {
        Reloader {
            mapper,
            mapping_file,
            watch_mapping,
            exporter,
        }
    }

    /// Reload the mapping file and the exporter's own files.
    pub async fn reload_all(&self) {
        let _guard = RELOAD_MUTEX.lock().await;
        info!("reloading mapping");
        if let Some(path) = &self.mapping_file {
            self.mapper.reload_file(path);
        }
        self.exporter.reload();
        info!("reload finished");
    }

    /// Reload whatever depends on `path`.
    pub async fn reload_changed(&self, path: &Path) {
        let _guard = RELOAD_MUTEX.lock().await;
        if self.watch_mapping && self.mapping_file.as_deref() == Some(path) {
            info!("mapping file {} changed", path.display());
            self.mapper.reload_file(path);
        }
        if self.exporter.watch_files().iter().any(|p| p == path) {
            info!(
                "file {} of exporter {} changed",
                path.display(),
                self.exporter.name()
            );
            self.exporter.reload();
        }
    }

    /// Files whose changes should trigger a reload.
    pub fn watch_files(&self) -> Vec<PathBuf> {
        let mut files = self.exporter.watch_files();
        if self.watch_mapping
            && let Some(path) = &self.mapping_file
        {
            files.push(path.clone());
        }
        files
    }
}

/// Watch the parent directories of all reloadable files.
///
/// The parent directory is watched instead of the file itself so that a
/// file replaced by rename keeps being watched.
#[cfg(target_os = "linux")]
pub fn spawn_watcher(
    reloader: Arc<Reloader>,
    mut quit_receiver: broadcast::Receiver<()>,
) -> anyhow::Result<Option<JoinHandle<()>>> {
    use std::future::poll_fn;

    use anyhow::anyhow;
    use futures_util::StreamExt;
    use inotify::{Inotify, WatchMask};
    use log::{debug, warn};

    let files = reloader.watch_files();
    if files.is_empty() {
        return Ok(None);
    }

    let inotify = Inotify::init().map_err(|e| anyhow!("failed to init inotify instance: {e}"))?;
    let mut dirs = Vec::new();
    for file in &files {
        let Some(dir) = file.parent() else {
            continue;
        };
        if dirs.iter().any(|(_, d)| d == dir) {
            continue;
        }
        let wd = inotify
            .watches()
            .add(dir, WatchMask::CLOSE_WRITE | WatchMask::MOVED_TO)
            .map_err(|e| anyhow!("failed to watch dir {}: {e}", dir.display()))?;
        debug!("watching dir {} for file changes", dir.display());
        dirs.push((wd, dir.to_path_buf()));
    }

    let buffer = [0u8; 4096];
    let mut event_stream = inotify.into_event_stream(buffer)?;

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = quit_receiver.recv() => break,
                ev = poll_fn(|cx| event_stream.poll_next_unpin(cx)) => {
                    match ev {
                        Some(Ok(v)) => {
                            let Some(name) = v.name else {
                                continue;
                            };
                            let Some((_, dir)) = dirs.iter().find(|(wd, _)| *wd == v.wd) else {
                                continue;
                            };
                            let path = dir.join(name);
                            if files.contains(&path) {
                                reloader.reload_changed(&path).await;
                            }
                        }
                        Some(Err(e)) => warn!("inotify watch failed: {e}"),
                        None => {
                            warn!("inotify watch ended unexpected");
                            break;
                        }
                    }
                }
            }
        }
    });
    Ok(Some(handle))
}

#[cfg(not(target_os = "linux"))]
pub fn spawn_watcher(
    reloader: Arc<Reloader>,
    _quit_receiver: broadcast::Receiver<()>,
) -> anyhow::Result<Option<JoinHandle<()>>> {
    if !reloader.watch_files().is_empty() {
        info!("file watching is not supported on this platform, use SIGHUP to reload");
    }
    Ok(None)
}
