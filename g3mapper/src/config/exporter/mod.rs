/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::Path;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;

use crate::config::yaml as conf;

mod elasticsearch;
pub use elasticsearch::{ElasticsearchExporterConfig, ElasticsearchPeer};

const CONFIG_KEY_EXPORTER_TYPE: &str = "type";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExporterConfig {
    Discard,
    Console,
    Memory,
    Elasticsearch(Box<ElasticsearchExporterConfig>),
}

impl ExporterConfig {
    pub fn exporter_type(&self) -> &'static str {
        match self {
            ExporterConfig::Discard => "Discard",
            ExporterConfig::Console => "Console",
            ExporterConfig::Memory => "Memory",
            ExporterConfig::Elasticsearch(_) => "Elasticsearch",
        }
    }

    pub(crate) fn parse(v: &Yaml, lookup_dir: &Path) -> anyhow::Result<Self> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("yaml value type for 'exporter' should be 'map'"));
        };
        let exporter_type = conf::get_required_str(map, CONFIG_KEY_EXPORTER_TYPE)?;
        match conf::normalize_key(exporter_type).as_str() {
            "discard" => {
                check_no_extra_keys(map).context("failed to load this Discard exporter")?;
                Ok(ExporterConfig::Discard)
            }
            "console" => {
                check_no_extra_keys(map).context("failed to load this Console exporter")?;
                Ok(ExporterConfig::Console)
            }
            "memory" => {
                check_no_extra_keys(map).context("failed to load this Memory exporter")?;
                Ok(ExporterConfig::Memory)
            }
            "elasticsearch" | "es" => {
                let config = ElasticsearchExporterConfig::parse(map, lookup_dir)
                    .context("failed to load this Elasticsearch exporter")?;
                Ok(ExporterConfig::Elasticsearch(Box::new(config)))
            }
            _ => Err(anyhow!("unsupported exporter type {exporter_type}")),
        }
    }
}

fn check_no_extra_keys(map: &yaml_rust::yaml::Hash) -> anyhow::Result<()> {
    conf::foreach_kv(map, |k, _v| match conf::normalize_key(k).as_str() {
        CONFIG_KEY_EXPORTER_TYPE => Ok(()),
        _ => Err(anyhow!("invalid key {k}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> anyhow::Result<ExporterConfig> {
        ExporterConfig::parse(&conf::load_str(s).unwrap()[0], Path::new("/tmp"))
    }

    #[test]
    fn simple_types() {
        assert_eq!(parse("type: discard\n").unwrap(), ExporterConfig::Discard);
        assert_eq!(parse("type: Console\n").unwrap(), ExporterConfig::Console);
        assert_eq!(parse("type: memory\n").unwrap(), ExporterConfig::Memory);
        let c = parse("type: elasticsearch\nindex: abc\n").unwrap();
        assert_eq!(c.exporter_type(), "Elasticsearch");
    }

    #[test]
    fn invalid() {
        assert!(parse("index: abc\n").is_err());
        assert!(parse("type: graphite\n").is_err());
        assert!(parse("type: console\nindex: abc\n").is_err());
        assert!(parse("- console\n").is_err());
    }
}
