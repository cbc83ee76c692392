/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use socket2::{Domain, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::parse::parse_packet;
use crate::stat::RelayStats;
use crate::types::EventBatch;

const RECV_BUFFER_SIZE: usize = 65536;

pub(super) fn new_std_bind_listen(
    addr: SocketAddr,
    read_buffer: Option<usize>,
) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, None)?;
    socket.set_nonblocking(true)?;
    if addr.port() != 0 {
        #[cfg(unix)]
        socket.set_reuse_address(true)?;
    }
    if let Some(size) = read_buffer {
        socket.set_recv_buffer_size(size)?;
    }
    socket.bind(&SockAddr::from(addr))?;
    Ok(std::net::UdpSocket::from(socket))
}

pub(super) struct UdpListenRuntime {
    listen_addr: SocketAddr,
    sender: mpsc::Sender<EventBatch>,
    stats: Arc<RelayStats>,
}

impl UdpListenRuntime {
    pub(super) fn new(
        listen_addr: SocketAddr,
        sender: mpsc::Sender<EventBatch>,
        stats: Arc<RelayStats>,
    ) -> Self {
        UdpListenRuntime {
            listen_addr,
            sender,
            stats,
        }
    }

    async fn run(self, socket: UdpSocket, mut quit_receiver: broadcast::Receiver<()>) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            tokio::select! {
                biased;

                _ = quit_receiver.recv() => {
                    info!("udp listener {} will go offline", self.listen_addr);
                    break;
                }
                r = socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, peer_addr)) => {
                            self.stats.add_udp_packet();
                            let parsed = parse_packet(&buf[..len]);
                            self.stats.add_parsed(&parsed);
                            for e in &parsed.errors {
                                debug!("bad sample from {peer_addr}: {e}");
                            }
                            if parsed.events.is_empty() {
                                continue;
                            }
                            if self.sender.send(parsed.events).await.is_err() {
                                warn!("udp listener {}: event queue closed", self.listen_addr);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("udp listener {} error receiving data from socket, error: {e}",
                                self.listen_addr);
                            break;
                        }
                    }
                }
            }
        }
        info!("stopped udp listener {}", self.listen_addr);
    }

    pub(super) fn into_running(
        self,
        socket: std::net::UdpSocket,
        quit_receiver: broadcast::Receiver<()>,
    ) -> io::Result<JoinHandle<()>> {
        // register the socket with the current reactor
        let socket = UdpSocket::from_std(socket)?;
        info!("started udp listener {}", self.listen_addr);
        Ok(tokio::spawn(self.run(socket, quit_receiver)))
    }
}
