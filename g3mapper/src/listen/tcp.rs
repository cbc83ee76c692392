/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use socket2::{Domain, SockAddr, Socket, Type};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::parse::parse_line;
use crate::stat::RelayStats;
use crate::types::EventBatch;

const LISTEN_BACKLOG: i32 = 1024;

pub(super) fn new_std_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_nonblocking(true)?;
    if addr.port() != 0 {
        #[cfg(unix)]
        socket.set_reuse_address(true)?;
    }
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(std::net::TcpListener::from(socket))
}

#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Line,
    /// last line without the trailing newline
    LastLine,
    TooLong,
    Eof,
}

/// Read one `\n` terminated line into `buf` with the line ending stripped.
async fn read_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_line_length: usize,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = max_line_length as u64 + 1;
    let n = reader.take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    let complete = buf.last() == Some(&b'\n');
    if complete {
        buf.pop();
    } else if n as u64 >= limit {
        return Ok(LineRead::TooLong);
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if complete {
        Ok(LineRead::Line)
    } else {
        Ok(LineRead::LastLine)
    }
}

struct TcpConnection {
    peer_addr: SocketAddr,
    max_line_length: usize,
    sender: mpsc::Sender<EventBatch>,
    stats: Arc<RelayStats>,
}

impl TcpConnection {
    /// Parse and forward one line, returns false if the event queue is closed.
    async fn handle_line(&self, line: &[u8]) -> bool {
        if line.is_empty() {
            return true;
        }
        let parsed = parse_line(line);
        self.stats.add_parsed(&parsed);
        for e in &parsed.errors {
            debug!("bad sample from {}: {e}", self.peer_addr);
        }
        if parsed.events.is_empty() {
            return true;
        }
        self.sender.send(parsed.events).await.is_ok()
    }

    async fn run<R>(self, stream: R, mut quit_receiver: broadcast::Receiver<()>)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(self.max_line_length.min(4096));
        loop {
            tokio::select! {
                biased;

                _ = quit_receiver.recv() => break,
                r = read_line(&mut reader, &mut buf, self.max_line_length) => {
                    match r {
                        Ok(LineRead::Line) => {
                            if !self.handle_line(&buf).await {
                                break;
                            }
                        }
                        Ok(LineRead::LastLine) => {
                            self.handle_line(&buf).await;
                            break;
                        }
                        Ok(LineRead::TooLong) => {
                            self.stats.add_tcp_line_too_long();
                            debug!("line from {} exceeds {} bytes, closing connection",
                                self.peer_addr, self.max_line_length);
                            break;
                        }
                        Ok(LineRead::Eof) => break,
                        Err(e) => {
                            self.stats.add_tcp_error();
                            debug!("error reading from {}: {e}", self.peer_addr);
                            break;
                        }
                    }
                }
            }
        }
    }
}

pub(super) struct TcpListenRuntime {
    listen_addr: SocketAddr,
    max_line_length: usize,
    sender: mpsc::Sender<EventBatch>,
    stats: Arc<RelayStats>,
    quit_sender: broadcast::Sender<()>,
}

impl TcpListenRuntime {
    pub(super) fn new(
        listen_addr: SocketAddr,
        max_line_length: usize,
        sender: mpsc::Sender<EventBatch>,
        stats: Arc<RelayStats>,
        quit_sender: broadcast::Sender<()>,
    ) -> Self {
        TcpListenRuntime {
            listen_addr,
            max_line_length,
            sender,
            stats,
            quit_sender,
        }
    }

    fn run_task(&self, stream: TcpStream, peer_addr: SocketAddr) {
        self.stats.add_tcp_connection();
        let conn = TcpConnection {
            peer_addr,
            max_line_length: self.max_line_length,
            sender: self.sender.clone(),
            stats: self.stats.clone(),
        };
        let quit_receiver = self.quit_sender.subscribe();
        tokio::spawn(async move {
            conn.run(stream, quit_receiver).await;
        });
    }

    async fn run(self, listener: TcpListener) {
        let mut quit_receiver = self.quit_sender.subscribe();
        loop {
            tokio::select! {
                biased;

                _ = quit_receiver.recv() => {
                    info!("tcp listener {} will go offline", self.listen_addr);
                    break;
                }
                r = listener.accept() => {
                    match r {
                        Ok((stream, peer_addr)) => self.run_task(stream, peer_addr),
                        Err(e) => {
                            warn!("tcp listener {} accept: {e:?}", self.listen_addr);
                            break;
                        }
                    }
                }
            }
        }
        info!("stopped tcp listener {}", self.listen_addr);
    }

    pub(super) fn into_running(self, listener: std::net::TcpListener) -> io::Result<JoinHandle<()>> {
        let listener = TcpListener::from_std(listener)?;
        info!("started tcp listener {}", self.listen_addr);
        Ok(tokio::spawn(self.run(listener)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(input: &[u8], max: usize) -> Vec<(LineRead, Vec<u8>)> {
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();
        let mut out = Vec::new();
        loop {
            let r = read_line(&mut reader, &mut buf, max).await.unwrap();
            let stop = r != LineRead::Line;
            out.push((r, buf.clone()));
            if stop {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn lines() {
        let out = read_all(b"a:1|c\r\nb:2|g\nc:3|ms", 64).await;
        assert_eq!(out[0], (LineRead::Line, b"a:1|c".to_vec()));
        assert_eq!(out[1], (LineRead::Line, b"b:2|g".to_vec()));
        assert_eq!(out[2], (LineRead::LastLine, b"c:3|ms".to_vec()));
        assert_eq!(out.len(), 3);

        let out = read_all(b"a:1|c\n", 64).await;
        assert_eq!(out[1].0, LineRead::Eof);
    }

    #[tokio::test]
    async fn too_long() {
        let out = read_all(b"12345\n123456\n", 5).await;
        assert_eq!(out[0], (LineRead::Line, b"12345".to_vec()));
        assert_eq!(out[1].0, LineRead::TooLong);
    }

    #[tokio::test]
    async fn connection() {
        let (sender, mut receiver) = mpsc::channel(16);
        let stats = Arc::new(RelayStats::default());
        let conn = TcpConnection {
            peer_addr: "127.0.0.1:1234".parse().unwrap(),
            max_line_length: 16,
            sender,
            stats: stats.clone(),
        };
        let (_quit_sender, quit_receiver) = broadcast::channel(1);
        let input: &[u8] = b"a:1|c\n\nbad\nb:2|g\nthis-line-is-far-too-long:1|c\nc:3|c\n";
        conn.run(input, quit_receiver).await;

        let batch = receiver.recv().await.unwrap();
        assert_eq!(batch[0].name, "a");
        let batch = receiver.recv().await.unwrap();
        assert_eq!(batch[0].name, "b");
        assert!(receiver.recv().await.is_none());

        let s = stats.snapshot();
        assert_eq!(s.lines, 3);
        assert_eq!(s.tcp_line_too_long, 1);
    }
}
