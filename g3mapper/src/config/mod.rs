/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;

pub mod yaml;

mod listen;
pub use listen::ListenConfig;

pub mod exporter;
pub use exporter::ExporterConfig;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// worker threads of the main runtime, tokio default if not set
    pub thread_number: Option<usize>,
}

impl RuntimeConfig {
    fn parse(v: &Yaml) -> anyhow::Result<Self> {
        let mut config = RuntimeConfig::default();
        match v {
            Yaml::Hash(map) => {
                yaml::foreach_kv(map, |k, v| match yaml::normalize_key(k).as_str() {
                    "thread_number" => {
                        let n = yaml::as_usize(v)?;
                        config.thread_number = if n == 0 { None } else { Some(n) };
                        Ok(())
                    }
                    _ => Err(anyhow!("invalid key {k}")),
                })?;
            }
            Yaml::Integer(_) | Yaml::String(_) => {
                config.thread_number = Some(yaml::as_usize(v)?).filter(|n| *n > 0);
            }
            Yaml::Null => {}
            _ => return Err(anyhow!("invalid yaml value type for 'runtime'")),
        }
        Ok(config)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingConfig {
    pub path: Option<PathBuf>,
    pub watch: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        MappingConfig {
            path: None,
            watch: true,
        }
    }
}

impl MappingConfig {
    fn parse(v: &Yaml, lookup_dir: &Path) -> anyhow::Result<Self> {
        let mut config = MappingConfig::default();
        match v {
            Yaml::Hash(map) => {
                yaml::foreach_kv(map, |k, v| match yaml::normalize_key(k).as_str() {
                    "path" | "file" => {
                        config.path = Some(yaml::as_file_path(v, lookup_dir)?);
                        Ok(())
                    }
                    "watch" => {
                        config.watch = yaml::as_bool(v)?;
                        Ok(())
                    }
                    _ => Err(anyhow!("invalid key {k}")),
                })?;
            }
            // short form, the value is the path
            Yaml::String(_) => config.path = Some(yaml::as_file_path(v, lookup_dir)?),
            Yaml::Null => {}
            _ => return Err(anyhow!("invalid yaml value type for 'mapping'")),
        }
        Ok(config)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub queue_size: usize,
    pub flush_interval: Duration,
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            queue_size: 1024,
            flush_interval: Duration::from_secs(10),
            stats_interval: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    fn parse(v: &Yaml) -> anyhow::Result<Self> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("yaml value type for 'pipeline' should be 'map'"));
        };
        let mut config = PipelineConfig::default();
        yaml::foreach_kv(map, |k, v| config.set(k, v))?;
        config.check()?;
        Ok(config)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml::normalize_key(k).as_str() {
            "queue_size" => {
                self.queue_size =
                    yaml::as_usize(v).context(format!("invalid usize value for key {k}"))?;
                Ok(())
            }
            "flush_interval" => {
                self.flush_interval = yaml::as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                Ok(())
            }
            "stats_interval" => {
                self.stats_interval = yaml::as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.queue_size == 0 {
            return Err(anyhow!("queue size should not be zero"));
        }
        if self.flush_interval.is_zero() {
            return Err(anyhow!("flush interval should not be zero"));
        }
        if self.stats_interval.is_zero() {
            return Err(anyhow!("stats interval should not be zero"));
        }
        Ok(())
    }
}

/// The main process configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapperConfig {
    pub runtime: RuntimeConfig,
    pub listen: ListenConfig,
    pub mapping: MappingConfig,
    pub pipeline: PipelineConfig,
    pub exporter: ExporterConfig,
}

impl MapperConfig {
    /// Load the config file, relative paths in it are resolved against its directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let conf_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let docs = yaml::load_file(path)?;
        let Some(doc) = docs.first() else {
            return Err(anyhow!("no yaml doc found in {}", path.display()));
        };
        MapperConfig::parse(doc, &conf_dir)
            .context(format!("failed to load config file {}", path.display()))
    }

    pub fn load_str(content: &str, conf_dir: &Path) -> anyhow::Result<Self> {
        let docs = yaml::load_str(content)?;
        let Some(doc) = docs.first() else {
            return Err(anyhow!("empty config"));
        };
        MapperConfig::parse(doc, conf_dir)
    }

    fn parse(doc: &Yaml, conf_dir: &Path) -> anyhow::Result<Self> {
        let Yaml::Hash(map) = doc else {
            return Err(anyhow!("yaml doc root should be hash"));
        };
        MapperConfig::parse_map(map, conf_dir)
    }

    fn parse_map(map: &yaml_rust::yaml::Hash, conf_dir: &Path) -> anyhow::Result<Self> {
        let mut runtime = RuntimeConfig::default();
        let mut listen = None;
        let mut mapping = MappingConfig::default();
        let mut pipeline = PipelineConfig::default();
        let mut exporter = None;

        yaml::foreach_kv(map, |k, v| match yaml::normalize_key(k).as_str() {
            "runtime" => {
                runtime = RuntimeConfig::parse(v)?;
                Ok(())
            }
            "listen" => {
                listen = Some(ListenConfig::parse(v)?);
                Ok(())
            }
            "mapping" => {
                mapping = MappingConfig::parse(v, conf_dir)?;
                Ok(())
            }
            "pipeline" => {
                pipeline = PipelineConfig::parse(v)?;
                Ok(())
            }
            "exporter" => {
                exporter = Some(ExporterConfig::parse(v, conf_dir)?);
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k} in main conf")),
        })?;

        Ok(MapperConfig {
            runtime,
            listen: listen.ok_or_else(|| anyhow!("no listen config found"))?,
            mapping,
            pipeline,
            exporter: exporter.ok_or_else(|| anyhow!("no exporter config found"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONF: &str = r#"
runtime:
  thread_number: 2
listen:
  udp: 9125
  tcp: 127.0.0.1:9125
mapping:
  path: mappings.yaml
  watch: false
pipeline:
  queue_size: 64
  flush_interval: 1s
  stats_interval: 1m
exporter:
  type: elasticsearch
  url: 127.0.0.1:9200
"#;

    #[test]
    fn full() {
        let c = MapperConfig::load_str(FULL_CONF, Path::new("/etc/g3mapper")).unwrap();
        assert_eq!(c.runtime.thread_number, Some(2));
        assert!(c.listen.udp.is_some());
        assert!(c.listen.tcp.is_some());
        assert_eq!(
            c.mapping.path,
            Some(PathBuf::from("/etc/g3mapper/mappings.yaml"))
        );
        assert!(!c.mapping.watch);
        assert_eq!(c.pipeline.queue_size, 64);
        assert_eq!(c.pipeline.flush_interval, Duration::from_secs(1));
        assert_eq!(c.pipeline.stats_interval, Duration::from_secs(60));
        assert_eq!(c.exporter.exporter_type(), "Elasticsearch");
    }

    #[test]
    fn minimal() {
        let c = MapperConfig::load_str(
            "listen:\n  udp: 9125\nexporter:\n  type: discard\n",
            Path::new("."),
        )
        .unwrap();
        assert_eq!(c.runtime, RuntimeConfig::default());
        assert_eq!(c.mapping, MappingConfig::default());
        assert_eq!(c.pipeline, PipelineConfig::default());
        assert_eq!(c.exporter, ExporterConfig::Discard);
    }

    #[test]
    fn mapping_short_form() {
        let c = MapperConfig::load_str(
            "listen:\n  udp: 9125\nmapping: /abs/m.yaml\nexporter:\n  type: memory\n",
            Path::new("/etc"),
        )
        .unwrap();
        assert_eq!(c.mapping.path, Some(PathBuf::from("/abs/m.yaml")));
        assert!(c.mapping.watch);
    }

    #[test]
    fn invalid() {
        // no exporter
        assert!(MapperConfig::load_str("listen:\n  udp: 9125\n", Path::new(".")).is_err());
        // no listen
        assert!(MapperConfig::load_str("exporter:\n  type: discard\n", Path::new(".")).is_err());
        assert!(
            MapperConfig::load_str(
                "listen:\n  udp: 9125\nexporter:\n  type: discard\nfoo: 1\n",
                Path::new(".")
            )
            .is_err()
        );
        assert!(
            MapperConfig::load_str(
                "listen:\n  udp: 9125\nexporter:\n  type: discard\npipeline:\n  queue_size: 0\n",
                Path::new(".")
            )
            .is_err()
        );
        assert!(MapperConfig::load_str("", Path::new(".")).is_err());
    }

    #[test]
    fn missing_file() {
        assert!(MapperConfig::load(Path::new("/nonexistent/g3mapper.yaml")).is_err());
    }
}
