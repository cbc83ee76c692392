/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use humanize_rs::ParseError;
use humanize_rs::bytes::Bytes;
use yaml_rust::{Yaml, YamlLoader, yaml};

pub fn normalize_key(raw: &str) -> String {
    raw.to_lowercase().replace('-', "_")
}

pub fn foreach_kv<'a, F>(table: &'a yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&'a str, &'a Yaml) -> anyhow::Result<()>,
{
    for (k, v) in table.iter() {
        if let Yaml::String(key) = k {
            f(key, v).context(format!("failed to parse value of key {key}"))?;
        } else {
            return Err(anyhow!("key in hash should be string"));
        }
    }
    Ok(())
}

pub fn get_required_str<'a>(map: &'a yaml::Hash, k: &str) -> anyhow::Result<&'a str> {
    let key = Yaml::String(k.to_owned());
    match map.get(&key) {
        Some(Yaml::String(s)) => Ok(s),
        Some(_) => Err(anyhow!("invalid string value for required key {k}")),
        None => Err(anyhow!("no required key {k} found in this map")),
    }
}

pub fn as_string(v: &Yaml) -> anyhow::Result<String> {
    match v {
        Yaml::String(s) => Ok(s.to_string()),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Real(s) => Ok(s.to_string()),
        _ => Err(anyhow!(
            "yaml value type for string should be 'string' / 'integer' / 'real'"
        )),
    }
}

pub fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    match v {
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!("invalid yaml string value for 'bool': {s}")),
        },
        Yaml::Boolean(value) => Ok(*value),
        Yaml::Integer(i) => Ok(*i != 0),
        _ => Err(anyhow!(
            "yaml value type for 'bool' should be 'boolean' / 'string' / 'integer'"
        )),
    }
}

pub fn as_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(s) => Ok(usize::from_str(s)?),
        Yaml::Integer(i) => Ok(usize::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'usize' should be 'string' or 'integer'"
        )),
    }
}

/// Parse a size value like `5MB` or a plain integer.
pub fn as_humanize_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(value) => {
            let v = value.parse::<Bytes>()?;
            Ok(v.size())
        }
        Yaml::Integer(value) => Ok(usize::try_from(*value)?),
        _ => Err(anyhow!(
            "yaml value type for humanize usize should be 'string' or 'integer'"
        )),
    }
}

/// Parse a duration value like `30s`, a unitless value means seconds.
pub fn as_duration(v: &Yaml) -> anyhow::Result<Duration> {
    match v {
        Yaml::String(value) => match humanize_rs::duration::parse(value) {
            Ok(v) => Ok(v),
            Err(ParseError::MissingUnit) => {
                if let Ok(u) = u64::from_str(value) {
                    Ok(Duration::from_secs(u))
                } else if let Ok(f) = f64::from_str(value) {
                    Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
                } else {
                    Err(anyhow!("invalid duration string"))
                }
            }
            Err(e) => Err(anyhow!("invalid humanize duration string: {e}")),
        },
        Yaml::Integer(value) => {
            if let Ok(u) = u64::try_from(*value) {
                Ok(Duration::from_secs(u))
            } else {
                Err(anyhow!("unsupported duration string"))
            }
        }
        Yaml::Real(s) => {
            let f = f64::from_str(s).map_err(|e| anyhow!("invalid f64 value: {e}"))?;
            Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
        }
        _ => Err(anyhow!(
            "yaml value type for humanize duration should be 'string' or 'integer' or 'real'"
        )),
    }
}

pub fn as_list<T, F>(v: &Yaml, convert: F) -> anyhow::Result<Vec<T>>
where
    F: Fn(&Yaml) -> anyhow::Result<T>,
{
    let mut vec = Vec::new();
    match v {
        Yaml::Array(seq) => {
            for (i, v) in seq.iter().enumerate() {
                let node = convert(v).context(format!("invalid value for list element #{i}"))?;
                vec.push(node);
            }
        }
        _ => {
            let node = convert(v).context("invalid single value for the list")?;
            vec.push(node);
        }
    }
    Ok(vec)
}

/// Resolve a file path, relative paths are looked up in `lookup_dir`.
///
/// The file itself is not required to exist.
pub fn as_file_path(v: &Yaml, lookup_dir: &Path) -> anyhow::Result<PathBuf> {
    let Yaml::String(path) = v else {
        return Err(anyhow!("yaml value type for path should be string"));
    };
    if path.is_empty() {
        return Err(anyhow!("empty path"));
    }
    let path = PathBuf::from(path);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(lookup_dir.join(path))
    }
}

/// Load all YAML documents in `content`.
pub fn load_str(content: &str) -> anyhow::Result<Vec<Yaml>> {
    YamlLoader::load_from_str(content).map_err(|e| anyhow!("invalid yaml content: {e}"))
}

pub fn load_file(path: &Path) -> anyhow::Result<Vec<Yaml>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read file {}: {e}", path.display()))?;
    load_str(&content).context(format!("failed to load yaml file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(s: &str) -> Yaml {
        load_str(s).unwrap().remove(0)
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_key("Abc"), "abc");
        assert_eq!(normalize_key("A-B_C"), "a_b_c");
    }

    #[test]
    fn foreach_kv_err() {
        let yaml = doc("123: 1");
        assert!(foreach_kv(yaml.as_hash().unwrap(), |_, _| Ok(())).is_err());

        let yaml = doc("a: 1");
        let r = foreach_kv(yaml.as_hash().unwrap(), |k, _| Err(anyhow!("error at {k}")));
        assert!(r.is_err());
    }

    #[test]
    fn foreach_kv_keep_value() {
        let yaml = doc("a: 1\nb: [x]");
        let mut found: Option<&Yaml> = None;
        foreach_kv(yaml.as_hash().unwrap(), |k, v| {
            if k == "b" {
                found = Some(v);
            }
            Ok(())
        })
        .unwrap();
        assert!(matches!(found, Some(Yaml::Array(_))));
    }

    #[test]
    fn required_str() {
        let yaml = doc("key: value\nnum: 1");
        let map = yaml.as_hash().unwrap();
        assert_eq!(get_required_str(map, "key").unwrap(), "value");
        assert!(get_required_str(map, "num").is_err());
        assert!(get_required_str(map, "missing").is_err());
    }

    #[test]
    fn duration() {
        assert_eq!(
            as_duration(&doc("30s")).unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            as_duration(&doc("1h2m")).unwrap(),
            Duration::from_secs(3600 + 120)
        );
        assert_eq!(as_duration(&doc("10")).unwrap(), Duration::from_secs(10));
        assert!(as_duration(&doc("-1")).is_err());
        assert!(as_duration(&doc("abc")).is_err());
    }

    #[test]
    fn humanize_size() {
        assert_eq!(as_humanize_usize(&doc("4096")).unwrap(), 4096);
        assert_eq!(as_humanize_usize(&doc("1KB")).unwrap(), 1000);
        assert_eq!(as_humanize_usize(&doc("1KiB")).unwrap(), 1024);
        assert!(as_humanize_usize(&doc("[]")).is_err());
    }

    #[test]
    fn list() {
        let v = as_list(&doc("[a, b]"), as_string).unwrap();
        assert_eq!(v, ["a", "b"]);
        let v = as_list(&doc("a"), as_string).unwrap();
        assert_eq!(v, ["a"]);
    }

    #[test]
    fn file_path() {
        let dir = Path::new("/etc/g3mapper");
        assert_eq!(
            as_file_path(&doc("mapping.yaml"), dir).unwrap(),
            PathBuf::from("/etc/g3mapper/mapping.yaml")
        );
        assert_eq!(
            as_file_path(&doc("/tmp/m.yaml"), dir).unwrap(),
            PathBuf::from("/tmp/m.yaml")
        );
        assert!(as_file_path(&doc("1"), dir).is_err());
    }
}
