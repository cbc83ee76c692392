/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use http::{HeaderMap, HeaderValue, Method, header};
use log::{debug, warn};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::exporter::{ElasticsearchExporterConfig, ElasticsearchPeer};

const MAX_BODY_SIZE: usize = 64 << 20;

#[derive(Debug, Error)]
pub(super) enum HttpResponseError {
    #[error("remote closed")]
    RemoteClosed,
    #[error("too large header, should be less than {0}")]
    TooLargeHeader(usize),
    #[error("invalid status line")]
    InvalidStatusLine,
    #[error("invalid header line")]
    InvalidHeaderLine,
    #[error("invalid chunked transfer-encoding")]
    InvalidChunkedTransferEncoding,
    #[error("invalid content length")]
    InvalidContentLength,
    #[error("too large body, should be less than {0}")]
    TooLargeBody(usize),
    #[error("io failed: {0:?}")]
    IoFailed(#[from] io::Error),
}

#[derive(Debug)]
pub(super) struct HttpResponse {
    pub(super) code: u16,
    pub(super) keep_alive: bool,
    pub(super) body: Vec<u8>,
}

impl HttpResponse {
    pub(super) fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Turn a non 2xx response into an error carrying the body text.
    pub(super) fn check_status(&self) -> anyhow::Result<()> {
        if self.is_success() {
            return Ok(());
        }
        if let Ok(detail) = std::str::from_utf8(&self.body) {
            Err(anyhow!("error response: {} {detail}", self.code))
        } else {
            Err(anyhow!("error response: {}", self.code))
        }
    }
}

/// Read until `\n`, but never more than `max_len` bytes.
///
/// Returns whether the delimiter was found and the number of bytes read.
async fn limited_read_line<R>(
    reader: &mut R,
    max_len: usize,
    buf: &mut Vec<u8>,
) -> io::Result<(bool, usize)>
where
    R: AsyncBufRead + Unpin,
{
    let nr = (&mut *reader)
        .take(max_len as u64)
        .read_until(b'\n', buf)
        .await?;
    Ok((buf.last() == Some(&b'\n'), nr))
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[derive(Default)]
struct ResponseHead {
    code: u16,
    keep_alive: bool,
    content_length: Option<usize>,
    chunked: bool,
}

impl ResponseHead {
    fn parse_status_line(line: &[u8]) -> Result<Self, HttpResponseError> {
        let line = trim_line(line);
        let Some(p) = memchr::memchr(b' ', line) else {
            return Err(HttpResponseError::InvalidStatusLine);
        };
        let keep_alive = match &line[..p] {
            b"HTTP/1.1" => true,
            b"HTTP/1.0" => false,
            _ => return Err(HttpResponseError::InvalidStatusLine),
        };
        let left = &line[p + 1..];
        if left.len() < 3 {
            return Err(HttpResponseError::InvalidStatusLine);
        }
        let code = std::str::from_utf8(&left[..3])
            .ok()
            .and_then(|s| u16::from_str(s).ok())
            .ok_or(HttpResponseError::InvalidStatusLine)?;
        if left.len() > 3 && left[3] != b' ' {
            return Err(HttpResponseError::InvalidStatusLine);
        }
        Ok(ResponseHead {
            code,
            keep_alive,
            ..Default::default()
        })
    }

    fn parse_header_line(&mut self, line: &[u8]) -> Result<(), HttpResponseError> {
        let line = trim_line(line);
        let Some(p) = memchr::memchr(b':', line) else {
            return Err(HttpResponseError::InvalidHeaderLine);
        };
        let name = std::str::from_utf8(&line[..p])
            .map_err(|_| HttpResponseError::InvalidHeaderLine)?
            .trim();
        let value = std::str::from_utf8(&line[p + 1..])
            .map_err(|_| HttpResponseError::InvalidHeaderLine)?
            .trim();

        if name.eq_ignore_ascii_case("content-length") {
            let len =
                usize::from_str(value).map_err(|_| HttpResponseError::InvalidContentLength)?;
            if let Some(old) = self.content_length
                && old != len
            {
                return Err(HttpResponseError::InvalidContentLength);
            }
            self.content_length = Some(len);
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            let v = value.to_lowercase();
            if v.ends_with("chunked") {
                self.chunked = true;
            } else if v.contains("chunked") {
                return Err(HttpResponseError::InvalidChunkedTransferEncoding);
            }
        } else if name.eq_ignore_ascii_case("connection") {
            for v in value.split(',') {
                let v = v.trim();
                if v.eq_ignore_ascii_case("close") {
                    self.keep_alive = false;
                } else if v.eq_ignore_ascii_case("keep-alive") {
                    self.keep_alive = true;
                }
            }
        }
        Ok(())
    }

    fn expect_no_body(&self) -> bool {
        self.code < 200 || self.code == 204 || self.code == 304
    }
}

async fn read_chunked_body<R>(reader: &mut R, body: &mut Vec<u8>) -> Result<(), HttpResponseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line_buf = Vec::with_capacity(32);
    loop {
        line_buf.clear();
        let (found, _) = limited_read_line(reader, 1024, &mut line_buf).await?;
        if !found {
            return Err(HttpResponseError::InvalidChunkedTransferEncoding);
        }
        let line = trim_line(&line_buf);
        let size_part = match memchr::memchr(b';', line) {
            Some(p) => &line[..p],
            None => line,
        };
        let size = std::str::from_utf8(size_part)
            .ok()
            .and_then(|s| usize::from_str_radix(s.trim(), 16).ok())
            .ok_or(HttpResponseError::InvalidChunkedTransferEncoding)?;

        if size == 0 {
            // skip the trailer
            loop {
                line_buf.clear();
                let (found, _) = limited_read_line(reader, 8192, &mut line_buf).await?;
                if !found {
                    return Err(HttpResponseError::InvalidChunkedTransferEncoding);
                }
                if trim_line(&line_buf).is_empty() {
                    return Ok(());
                }
            }
        }

        if body.len() + size > MAX_BODY_SIZE {
            return Err(HttpResponseError::TooLargeBody(MAX_BODY_SIZE));
        }
        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..]).await?;

        line_buf.clear();
        let (found, _) = limited_read_line(reader, 2, &mut line_buf).await?;
        if !found || !trim_line(&line_buf).is_empty() {
            return Err(HttpResponseError::InvalidChunkedTransferEncoding);
        }
    }
}

/// Read a full HTTP/1.x response, body included.
pub(super) async fn read_response<R>(
    reader: &mut R,
    max_header_size: usize,
) -> Result<HttpResponse, HttpResponseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line_buf = Vec::<u8>::with_capacity(1024);
    let mut header_size: usize = 0;

    let (found, nr) = limited_read_line(reader, max_header_size, &mut line_buf).await?;
    if nr == 0 {
        return Err(HttpResponseError::RemoteClosed);
    }
    if !found {
        return if nr < max_header_size {
            Err(HttpResponseError::RemoteClosed)
        } else {
            Err(HttpResponseError::TooLargeHeader(max_header_size))
        };
    }
    header_size += nr;
    let mut head = ResponseHead::parse_status_line(&line_buf)?;

    loop {
        if header_size >= max_header_size {
            return Err(HttpResponseError::TooLargeHeader(max_header_size));
        }
        line_buf.clear();
        let max_len = max_header_size - header_size;
        let (found, nr) = limited_read_line(reader, max_len, &mut line_buf).await?;
        if nr == 0 {
            return Err(HttpResponseError::RemoteClosed);
        }
        if !found {
            return if nr < max_len {
                Err(HttpResponseError::RemoteClosed)
            } else {
                Err(HttpResponseError::TooLargeHeader(max_header_size))
            };
        }
        header_size += nr;
        if trim_line(&line_buf).is_empty() {
            break;
        }
        head.parse_header_line(&line_buf)?;
    }

    let mut body = Vec::new();
    if head.expect_no_body() {
        // no body even if there is a content-length header
    } else if head.chunked {
        read_chunked_body(reader, &mut body).await?;
    } else if let Some(len) = head.content_length {
        if len > MAX_BODY_SIZE {
            return Err(HttpResponseError::TooLargeBody(MAX_BODY_SIZE));
        }
        body.resize(len, 0);
        reader.read_exact(&mut body).await?;
    } else {
        // read to end and close the connection
        head.keep_alive = false;
        (&mut *reader)
            .take(MAX_BODY_SIZE as u64)
            .read_to_end(&mut body)
            .await?;
    }

    Ok(HttpResponse {
        code: head.code,
        keep_alive: head.keep_alive,
        body,
    })
}

struct Connection {
    host: String,
    stream: BufReader<TcpStream>,
}

/// A keep-alive HTTP/1.1 client over the configured nodes.
pub(super) struct ElasticsearchClient {
    peers: Vec<ElasticsearchPeer>,
    static_headers: HeaderMap,
    request_timeout: Duration,
    rsp_head_max_size: usize,
    conn: Option<Connection>,
}

impl ElasticsearchClient {
    pub(super) fn new(config: &ElasticsearchExporterConfig) -> Self {
        let mut static_headers = HeaderMap::new();
        static_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(v) = config.basic_auth() {
            static_headers.insert(header::AUTHORIZATION, v);
        }
        ElasticsearchClient {
            peers: config.peers.clone(),
            static_headers,
            request_timeout: config.request_timeout,
            rsp_head_max_size: config.rsp_head_max_size,
            conn: None,
        }
    }

    async fn select_peer(&self) -> Option<(String, SocketAddr)> {
        let peer = fastrand::choice(&self.peers)?;
        let peer_s = peer.lookup_str();
        let addrs: Vec<SocketAddr> = match tokio::net::lookup_host(peer_s.as_str()).await {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                warn!("elasticsearch: failed to resolve {peer_s}: {e}");
                return None;
            }
        };
        let addr = fastrand::choice(&addrs).copied()?;
        Some((peer_s, addr))
    }

    async fn connect(&self) -> anyhow::Result<Connection> {
        let Some((host, addr)) = self.select_peer().await else {
            return Err(anyhow!("no usable elasticsearch peer address"));
        };
        let stream = tokio::time::timeout(self.request_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| anyhow!("timed out to connect to {host} ({addr})"))?
            .map_err(|e| anyhow!("failed to connect to {host} ({addr}): {e}"))?;
        let _ = stream.set_nodelay(true);
        debug!("elasticsearch: connected to {host} ({addr})");
        Ok(Connection {
            host,
            stream: BufReader::new(stream),
        })
    }

    pub(super) fn write_request_header(
        &self,
        method: &Method,
        host: &str,
        path: &str,
        content_type: &'static str,
        content_length: usize,
        header_buf: &mut Vec<u8>,
    ) {
        header_buf.extend_from_slice(method.as_str().as_bytes());
        header_buf.push(b' ');
        header_buf.extend_from_slice(path.as_bytes());
        header_buf.extend_from_slice(b" HTTP/1.1\r\n");
        header_buf.extend_from_slice(b"Host: ");
        header_buf.extend_from_slice(host.as_bytes());
        header_buf.extend_from_slice(b"\r\n");
        header_buf.extend_from_slice(b"Connection: keep-alive\r\n");
        for (header, value) in &self.static_headers {
            header_buf.extend_from_slice(header.as_str().as_bytes());
            header_buf.extend_from_slice(b": ");
            header_buf.extend_from_slice(value.as_bytes());
            header_buf.extend_from_slice(b"\r\n");
        }
        header_buf.extend_from_slice(b"Content-Type: ");
        header_buf.extend_from_slice(content_type.as_bytes());
        header_buf.extend_from_slice(b"\r\n");
        let mut len_buffer = itoa::Buffer::new();
        header_buf.extend_from_slice(b"Content-Length: ");
        header_buf.extend_from_slice(len_buffer.format(content_length).as_bytes());
        header_buf.extend_from_slice(b"\r\n\r\n");
    }

    async fn send_on(
        &self,
        conn: &mut Connection,
        method: &Method,
        path: &str,
        content_type: &'static str,
        body: &[u8],
    ) -> anyhow::Result<HttpResponse> {
        let mut header_buf = Vec::with_capacity(512);
        self.write_request_header(
            method,
            &conn.host,
            path,
            content_type,
            body.len(),
            &mut header_buf,
        );

        let stream = conn.stream.get_mut();
        stream.write_all(&header_buf).await?;
        stream.write_all(body).await?;
        stream.flush().await?;

        let rsp = read_response(&mut conn.stream, self.rsp_head_max_size).await?;
        Ok(rsp)
    }

    /// Send one request, reusing the idle connection if there is one.
    pub(super) async fn send(
        &mut self,
        method: Method,
        path: &str,
        content_type: &'static str,
        body: &[u8],
    ) -> anyhow::Result<HttpResponse> {
        // an idle connection may have been closed by the server meanwhile
        if let Some(mut conn) = self.conn.take() {
            match tokio::time::timeout(
                self.request_timeout,
                self.send_on(&mut conn, &method, path, content_type, body),
            )
            .await
            {
                Ok(Ok(rsp)) => {
                    if rsp.keep_alive {
                        self.conn = Some(conn);
                    }
                    return Ok(rsp);
                }
                Ok(Err(e)) => debug!("elasticsearch: request on idle connection failed: {e}"),
                Err(_) => return Err(anyhow!("request timed out")),
            }
        }

        let mut conn = self.connect().await?;
        match tokio::time::timeout(
            self.request_timeout,
            self.send_on(&mut conn, &method, path, content_type, body),
        )
        .await
        {
            Ok(Ok(rsp)) => {
                if rsp.keep_alive {
                    self.conn = Some(conn);
                }
                Ok(rsp)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow!("request timed out")),
        }
    }
}
