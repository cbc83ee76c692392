/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::ListenConfig;
use crate::stat::RelayStats;
use crate::types::EventBatch;

mod tcp;
mod udp;

/// Running listeners and their bound addresses.
pub struct ListenHandles {
    pub udp_addr: Option<SocketAddr>,
    pub tcp_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenHandles {
    /// Wait for all listener tasks to stop.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }

    #[cfg(test)]
    pub(crate) fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Bind and start all configured listeners.
///
/// Every listener holds its own clone of `sender`, and all of them stop once
/// a quit command is sent through `quit_sender`.
pub fn spawn_all(
    config: &ListenConfig,
    sender: &mpsc::Sender<EventBatch>,
    stats: &Arc<RelayStats>,
    quit_sender: &broadcast::Sender<()>,
) -> anyhow::Result<ListenHandles> {
    let mut handles = ListenHandles {
        udp_addr: None,
        tcp_addr: None,
        tasks: Vec::with_capacity(2),
    };

    if let Some(addr) = config.udp {
        let socket = udp::new_std_bind_listen(addr, config.read_buffer)
            .context(format!("failed to bind udp socket to {addr}"))?;
        let listen_addr = socket.local_addr()?;
        let runtime = udp::UdpListenRuntime::new(listen_addr, sender.clone(), stats.clone());
        let task = runtime
            .into_running(socket, quit_sender.subscribe())
            .context("failed to register udp socket")?;
        handles.udp_addr = Some(listen_addr);
        handles.tasks.push(task);
    }

    if let Some(addr) = config.tcp {
        let listener =
            tcp::new_std_listener(addr).context(format!("failed to listen on tcp {addr}"))?;
        let listen_addr = listener.local_addr()?;
        let runtime = tcp::TcpListenRuntime::new(
            listen_addr,
            config.max_line_length,
            sender.clone(),
            stats.clone(),
            quit_sender.clone(),
        );
        let task = runtime
            .into_running(listener)
            .context("failed to register tcp listener")?;
        handles.tcp_addr = Some(listen_addr);
        handles.tasks.push(task);
    }

    if handles.tasks.is_empty() {
        return Err(anyhow!("no udp or tcp listen address configured"));
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpStream, UdpSocket};

    fn local_config() -> ListenConfig {
        ListenConfig {
            udp: Some("127.0.0.1:0".parse().unwrap()),
            tcp: Some("127.0.0.1:0".parse().unwrap()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn udp_and_tcp() {
        let (sender, mut receiver) = mpsc::channel(16);
        let stats = Arc::new(RelayStats::default());
        let (quit_sender, _) = broadcast::channel(1);
        let handles = spawn_all(&local_config(), &sender, &stats, &quit_sender).unwrap();
        drop(sender);

        let udp_addr = handles.udp_addr.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(b"foo:1|c\nbar:2|g\nbroken", udp_addr)
            .await
            .unwrap();
        let batch = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].name, "foo");
        assert_eq!(batch[1].name, "bar");

        let mut stream = TcpStream::connect(handles.tcp_addr.unwrap()).await.unwrap();
        stream.write_all(b"baz:3|ms|#a:b\r\n").await.unwrap();
        let batch = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name, "baz");
        assert_eq!(batch[0].labels.get("a"), Some("b"));

        quit_sender.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handles.join())
            .await
            .unwrap();
        // the open tcp connection quits too, closing the queue
        let closed = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap();
        assert!(closed.is_none());

        let s = stats.snapshot();
        assert_eq!(s.udp_packets, 1);
        assert_eq!(s.tcp_connections, 1);
        assert_eq!(s.sample_error("malformed_line"), 1);
    }

    #[test]
    fn nothing_to_listen() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = rt.enter();
        let (sender, _receiver) = mpsc::channel(1);
        let (quit_sender, _) = broadcast::channel(1);
        let stats = Arc::new(RelayStats::default());
        assert!(spawn_all(&ListenConfig::default(), &sender, &stats, &quit_sender).is_err());
    }
}
