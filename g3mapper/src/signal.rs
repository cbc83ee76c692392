/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use log::info;
use tokio::sync::broadcast;

use crate::watch::Reloader;

pub trait AsyncSignalAction: Clone {
    fn run(&self) -> impl Future<Output = ()> + Send;
}

#[derive(Clone)]
pub struct QuitAction {
    quit_sender: broadcast::Sender<()>,
}

impl QuitAction {
    pub fn new(quit_sender: broadcast::Sender<()>) -> Self {
        QuitAction { quit_sender }
    }
}

impl AsyncSignalAction for QuitAction {
    async fn run(&self) {
        info!("shutting down");
        let _ = self.quit_sender.send(());
    }
}

#[derive(Clone)]
pub struct ReloadAction {
    reloader: Arc<Reloader>,
}

impl ReloadAction {
    pub fn new(reloader: Arc<Reloader>) -> Self {
        ReloadAction { reloader }
    }
}

impl AsyncSignalAction for ReloadAction {
    async fn run(&self) {
        self.reloader.reload_all().await
    }
}

#[cfg(unix)]
mod unix {
    use std::future::poll_fn;

    use anyhow::anyhow;
    use log::info;
    use tokio::signal::unix::{SignalKind, signal};

    use super::AsyncSignalAction;

    pub(super) fn register_quit<QUIT>(do_quit: QUIT) -> anyhow::Result<()>
    where
        QUIT: AsyncSignalAction + Send + 'static,
    {
        let kinds = [
            (SignalKind::quit(), "SIGQUIT"),
            (SignalKind::interrupt(), "SIGINT"),
            (SignalKind::terminate(), "SIGTERM"),
        ];
        for (kind, name) in kinds {
            let mut sig =
                signal(kind).map_err(|e| anyhow!("failed to create {name} listener: {e}"))?;
            let do_quit = do_quit.clone();
            tokio::spawn(async move {
                if poll_fn(|cx| sig.poll_recv(cx)).await.is_some() {
                    info!("got quit signal {name}");
                    do_quit.run().await;
                }
            });
        }
        Ok(())
    }

    pub(super) fn register_reload<RELOAD>(call_reload: RELOAD) -> anyhow::Result<()>
    where
        RELOAD: AsyncSignalAction + Send + 'static,
    {
        let mut hup_sig = signal(SignalKind::hangup())
            .map_err(|e| anyhow!("failed to create SIGHUP listener: {e}"))?;
        tokio::spawn(async move {
            loop {
                if poll_fn(|cx| hup_sig.poll_recv(cx)).await.is_none() {
                    break;
                }
                info!("got reload signal");
                call_reload.run().await;
            }
        });
        Ok(())
    }
}

#[cfg(windows)]
mod windows {
    use anyhow::anyhow;
    use log::info;
    use tokio::signal::windows::ctrl_c;

    use super::AsyncSignalAction;

    pub(super) fn register_quit<QUIT>(do_quit: QUIT) -> anyhow::Result<()>
    where
        QUIT: AsyncSignalAction + Send + 'static,
    {
        let mut quit_sig =
            ctrl_c().map_err(|e| anyhow!("failed to create Ctrl-C listener: {e}"))?;
        tokio::spawn(async move {
            if quit_sig.recv().await.is_some() {
                info!("got quit signal");
                do_quit.run().await;
            }
        });
        Ok(())
    }
}

/// Register the quit and reload signal handlers, must be called inside the runtime.
pub fn register(quit_sender: broadcast::Sender<()>, reloader: Arc<Reloader>) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        unix::register_reload(ReloadAction::new(reloader))?;
        unix::register_quit(QuitAction::new(quit_sender))
    }
    #[cfg(windows)]
    {
        let _ = reloader;
        windows::register_quit(QuitAction::new(quit_sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quit_action() {
        let (quit_sender, mut quit_receiver) = broadcast::channel(1);
        QuitAction::new(quit_sender).run().await;
        assert!(quit_receiver.recv().await.is_ok());
    }
}
