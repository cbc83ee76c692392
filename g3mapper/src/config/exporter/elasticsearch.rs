/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use base64::prelude::*;
use http::HeaderValue;
use http::uri::{Authority, Scheme, Uri};
use yaml_rust::{Yaml, yaml};

use crate::config::yaml as conf;

const DEFAULT_PORT: u16 = 9200;
const DEFAULT_INDEX: &str = "statsdexporter";

/// One Elasticsearch node given as `host:port` or `http://host:port`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElasticsearchPeer {
    pub authority: Authority,
}

impl ElasticsearchPeer {
    pub fn host(&self) -> &str {
        self.authority.host()
    }

    pub fn port(&self) -> u16 {
        self.authority.port_u16().unwrap_or(DEFAULT_PORT)
    }

    /// `host:port` string usable with `lookup_host`.
    pub fn lookup_str(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }
}

impl FromStr for ElasticsearchPeer {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let uri = if s.contains("://") {
            Uri::from_str(s).map_err(|e| anyhow!("invalid url {s}: {e}"))?
        } else {
            Uri::from_str(&format!("http://{s}")).map_err(|e| anyhow!("invalid address {s}: {e}"))?
        };
        if let Some(scheme) = uri.scheme()
            && *scheme != Scheme::HTTP
        {
            return Err(anyhow!("unsupported url scheme {scheme}"));
        }
        let Some(authority) = uri.authority() else {
            return Err(anyhow!("no host found in {s}"));
        };
        if authority.host().is_empty() {
            return Err(anyhow!("no host found in {s}"));
        }
        Ok(ElasticsearchPeer {
            authority: authority.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElasticsearchExporterConfig {
    pub peers: Vec<ElasticsearchPeer>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index: String,
    pub template: Option<PathBuf>,
    pub template_name: Option<String>,
    pub actions_threshold: usize,
    pub size_threshold: usize,
    pub flush_interval: Duration,
    pub connect_retry_wait: Duration,
    pub max_retries: usize,
    pub request_timeout: Duration,
    pub rsp_head_max_size: usize,
    pub queue_size: usize,
}

impl Default for ElasticsearchExporterConfig {
    fn default() -> Self {
        ElasticsearchExporterConfig {
            peers: Vec::new(),
            username: None,
            password: None,
            index: DEFAULT_INDEX.to_string(),
            template: None,
            template_name: None,
            actions_threshold: 1000,
            size_threshold: 5_000_000,
            flush_interval: Duration::from_secs(30),
            connect_retry_wait: Duration::from_secs(5),
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
            rsp_head_max_size: 8192,
            queue_size: 65536,
        }
    }
}

impl ElasticsearchExporterConfig {
    pub(crate) fn parse(map: &yaml::Hash, lookup_dir: &Path) -> anyhow::Result<Self> {
        let mut config = ElasticsearchExporterConfig::default();
        conf::foreach_kv(map, |k, v| config.set(k, v, lookup_dir))?;
        config.check()?;
        Ok(config)
    }

    fn set(&mut self, k: &str, v: &Yaml, lookup_dir: &Path) -> anyhow::Result<()> {
        match conf::normalize_key(k).as_str() {
            super::CONFIG_KEY_EXPORTER_TYPE => Ok(()),
            "url" | "urls" => {
                self.peers.clear();
                for s in conf::as_list(v, conf::as_string)? {
                    // a single string may hold comma separated urls
                    for part in s.split(',').filter(|p| !p.trim().is_empty()) {
                        self.peers.push(ElasticsearchPeer::from_str(part)?);
                    }
                }
                Ok(())
            }
            "username" => {
                self.username = Some(conf::as_string(v)?).filter(|s| !s.is_empty());
                Ok(())
            }
            "password" => {
                self.password = Some(conf::as_string(v)?);
                Ok(())
            }
            "index" => {
                self.index = conf::as_string(v)?;
                Ok(())
            }
            "template" => {
                self.template = Some(conf::as_file_path(v, lookup_dir)?);
                Ok(())
            }
            "template_name" => {
                self.template_name = Some(conf::as_string(v)?).filter(|s| !s.is_empty());
                Ok(())
            }
            "actions_threshold" => {
                self.actions_threshold =
                    conf::as_usize(v).context(format!("invalid usize value for key {k}"))?;
                Ok(())
            }
            "size_threshold" => {
                self.size_threshold = conf::as_humanize_usize(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                Ok(())
            }
            "flush_interval" => {
                self.flush_interval = conf::as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                Ok(())
            }
            "connect_retry_wait" => {
                self.connect_retry_wait = conf::as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                Ok(())
            }
            "max_retries" => {
                self.max_retries =
                    conf::as_usize(v).context(format!("invalid usize value for key {k}"))?;
                Ok(())
            }
            "request_timeout" => {
                self.request_timeout = conf::as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                Ok(())
            }
            "rsp_header_max_size" => {
                self.rsp_head_max_size = conf::as_humanize_usize(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                Ok(())
            }
            "queue_size" => {
                self.queue_size =
                    conf::as_usize(v).context(format!("invalid usize value for key {k}"))?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&mut self) -> anyhow::Result<()> {
        if self.peers.is_empty() {
            self.peers.push(ElasticsearchPeer::from_str("localhost:9200")?);
        }
        if self.index.is_empty() {
            return Err(anyhow!("index name should not be empty"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(anyhow!("password is set but username is not"));
        }
        if self.queue_size == 0 {
            return Err(anyhow!("queue size should not be zero"));
        }
        Ok(())
    }

    pub fn template_name(&self) -> &str {
        self.template_name.as_deref().unwrap_or(&self.index)
    }

    /// The `Authorization` header value when a username is set.
    pub fn basic_auth(&self) -> Option<HeaderValue> {
        let username = self.username.as_ref()?;
        let password = self.password.as_deref().unwrap_or_default();
        let encoded = BASE64_STANDARD.encode(format!("{username}:{password}"));
        HeaderValue::from_str(&format!("Basic {encoded}")).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> anyhow::Result<ElasticsearchExporterConfig> {
        let docs = conf::load_str(s).unwrap();
        let map = docs[0].as_hash().unwrap();
        ElasticsearchExporterConfig::parse(map, Path::new("/etc/g3mapper"))
    }

    #[test]
    fn defaults() {
        let c = parse("type: elasticsearch\n").unwrap();
        assert_eq!(c.peers.len(), 1);
        assert_eq!(c.peers[0].lookup_str(), "localhost:9200");
        assert_eq!(c.index, "statsdexporter");
        assert_eq!(c.template_name(), "statsdexporter");
        assert_eq!(c.actions_threshold, 1000);
        assert_eq!(c.size_threshold, 5_000_000);
        assert_eq!(c.flush_interval, Duration::from_secs(30));
        assert!(c.basic_auth().is_none());
    }

    #[test]
    fn full() {
        let c = parse(
            r#"
type: elasticsearch
url: "es1:9201, http://es2"
username: elastic
password: changeme
index: metrics
template: template.json
actions_threshold: 10
size_threshold: 1MB
flush_interval: 5s
max_retries: 0
"#,
        )
        .unwrap();
        assert_eq!(c.peers.len(), 2);
        assert_eq!(c.peers[0].lookup_str(), "es1:9201");
        assert_eq!(c.peers[1].lookup_str(), "es2:9200");
        assert_eq!(c.template, Some(PathBuf::from("/etc/g3mapper/template.json")));
        assert_eq!(c.template_name(), "metrics");
        assert_eq!(c.size_threshold, 1_000_000);
        assert_eq!(c.flush_interval, Duration::from_secs(5));
        assert_eq!(c.max_retries, 0);
        assert_eq!(
            c.basic_auth().unwrap(),
            HeaderValue::from_static("Basic ZWxhc3RpYzpjaGFuZ2VtZQ==")
        );
    }

    #[test]
    fn url_list() {
        let c = parse("url:\n- a1:9200\n- a2:9300\n").unwrap();
        assert_eq!(c.peers.len(), 2);
        assert_eq!(c.peers[1].port(), 9300);
    }

    #[test]
    fn invalid() {
        assert!(parse("url: https://es:9200\n").is_err());
        assert!(parse("index: \"\"\n").is_err());
        assert!(parse("password: x\n").is_err());
        assert!(parse("foo: bar\n").is_err());
    }
}
