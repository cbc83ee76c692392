/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;

use super::yaml;

const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenConfig {
    pub udp: Option<SocketAddr>,
    pub tcp: Option<SocketAddr>,
    /// SO_RCVBUF of the UDP socket
    pub read_buffer: Option<usize>,
    pub max_line_length: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            udp: None,
            tcp: None,
            read_buffer: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ListenConfig {
    pub(super) fn parse(v: &Yaml) -> anyhow::Result<Self> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("yaml value type for 'listen' should be 'map'"));
        };
        let mut config = ListenConfig::default();
        yaml::foreach_kv(map, |k, v| config.set(k, v))?;
        config.check()?;
        Ok(config)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml::normalize_key(k).as_str() {
            "udp" => {
                self.udp = as_listen_addr(v).context(format!("invalid listen address for key {k}"))?;
                Ok(())
            }
            "tcp" => {
                self.tcp = as_listen_addr(v).context(format!("invalid listen address for key {k}"))?;
                Ok(())
            }
            "read_buffer" => {
                let size = yaml::as_humanize_usize(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                self.read_buffer = if size == 0 { None } else { Some(size) };
                Ok(())
            }
            "max_line_length" => {
                self.max_line_length = yaml::as_humanize_usize(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.udp.is_none() && self.tcp.is_none() {
            return Err(anyhow!("at least one of udp / tcp listen address should be set"));
        }
        if self.max_line_length == 0 {
            return Err(anyhow!("max line length should not be zero"));
        }
        Ok(())
    }
}

/// `host:port`, `:port` or a bare port, an empty value disables the listener.
fn as_listen_addr(v: &Yaml) -> anyhow::Result<Option<SocketAddr>> {
    let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    match v {
        Yaml::Null => Ok(None),
        Yaml::Integer(i) => {
            let port = u16::try_from(*i)?;
            Ok(Some(SocketAddr::new(any, port)))
        }
        Yaml::String(s) => {
            if s.is_empty() {
                return Ok(None);
            }
            if let Some(port) = s.strip_prefix(':') {
                let port = u16::from_str(port)?;
                return Ok(Some(SocketAddr::new(any, port)));
            }
            if let Ok(port) = u16::from_str(s) {
                return Ok(Some(SocketAddr::new(any, port)));
            }
            let addr = SocketAddr::from_str(s).map_err(|e| anyhow!("invalid socket address {s}: {e}"))?;
            Ok(Some(addr))
        }
        _ => Err(anyhow!(
            "yaml value type for listen address should be 'string' or 'integer'"
        )),
    }
}
