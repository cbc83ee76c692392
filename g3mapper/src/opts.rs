/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint, value_parser};
use clap_complete::Shell;

const ARGS_COMPLETION: &str = "completion";
const ARGS_VERSION: &str = "version";
const ARGS_VERBOSE: &str = "verbose";
const ARGS_TEST_CONFIG: &str = "test-config";
const ARGS_CONFIG_FILE: &str = "config-file";

#[derive(Debug)]
pub struct ProcArgs {
    pub verbose_level: u8,
    pub test_config: bool,
    pub config_file: PathBuf,
}

fn build_cli_args() -> Command {
    Command::new(crate::build::PKG_NAME)
        .about(crate::build::PKG_DESCRIPTION)
        .disable_version_flag(true)
        .arg(
            Arg::new(ARGS_COMPLETION)
                .num_args(1)
                .value_name("SHELL")
                .long("completion")
                .value_parser(value_parser!(Shell))
                .exclusive(true),
        )
        .arg(
            Arg::new(ARGS_VERSION)
                .help("Show version")
                .action(ArgAction::SetTrue)
                .short('V')
                .long("version"),
        )
        .arg(
            Arg::new(ARGS_VERBOSE)
                .help("Show verbose output")
                .num_args(0)
                .action(ArgAction::Count)
                .short('v')
                .long(ARGS_VERBOSE),
        )
        .arg(
            Arg::new(ARGS_TEST_CONFIG)
                .help("Test the format of config file and exit")
                .action(ArgAction::SetTrue)
                .short('t')
                .long("test-config"),
        )
        .arg(
            Arg::new(ARGS_CONFIG_FILE)
                .help("Config file path")
                .num_args(1)
                .value_name("CONFIG FILE")
                .value_hint(ValueHint::FilePath)
                .value_parser(value_parser!(PathBuf))
                .required_unless_present_any([ARGS_COMPLETION, ARGS_VERSION])
                .short('c')
                .long("config-file"),
        )
}

fn absolute_config_file(path: &Path) -> anyhow::Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cur_dir =
            std::env::current_dir().map_err(|e| anyhow!("failed to get current dir: {e}"))?;
        cur_dir.join(path)
    };
    path.canonicalize()
        .map_err(|e| anyhow!("failed to canonicalize path {}: {e}", path.display()))
}

fn parse_matches(args: &ArgMatches) -> anyhow::Result<Option<ProcArgs>> {
    if let Some(target) = args.get_one::<Shell>(ARGS_COMPLETION) {
        let mut app = build_cli_args();
        let bin_name = app.get_name().to_string();
        clap_complete::generate(*target, &mut app, bin_name, &mut io::stdout());
        return Ok(None);
    }

    let verbose_level = args.get_one::<u8>(ARGS_VERBOSE).copied().unwrap_or_default();
    if args.get_flag(ARGS_VERSION) {
        crate::build::print_version(verbose_level);
        return Ok(None);
    }

    let Some(config_file) = args.get_one::<PathBuf>(ARGS_CONFIG_FILE) else {
        return Err(anyhow!("no config file set"));
    };
    let config_file = absolute_config_file(config_file)
        .context(format!("invalid config file {}", config_file.display()))?;

    Ok(Some(ProcArgs {
        verbose_level,
        test_config: args.get_flag(ARGS_TEST_CONFIG),
        config_file,
    }))
}

pub fn parse_clap() -> anyhow::Result<Option<ProcArgs>> {
    let args = build_cli_args().get_matches();
    parse_matches(&args)
}

pub fn parse_clap_from<I, T>(iter: I) -> anyhow::Result<Option<ProcArgs>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = build_cli_args().try_get_matches_from(iter)?;
    parse_matches(&args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        build_cli_args().debug_assert();
    }

    #[test]
    fn config_and_flags() {
        let dir = std::env::temp_dir().join(format!("g3mapper-opts-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let conf = dir.join("g3mapper.yaml");
        std::fs::write(&conf, "").unwrap();

        let args = parse_clap_from(["g3mapper", "-c", conf.to_str().unwrap(), "-vv", "-t"])
            .unwrap()
            .unwrap();
        assert_eq!(args.verbose_level, 2);
        assert!(args.test_config);
        assert!(args.config_file.is_absolute());
        assert!(args.config_file.ends_with("g3mapper.yaml"));

        let args = parse_clap_from(["g3mapper", "--config-file", conf.to_str().unwrap()])
            .unwrap()
            .unwrap();
        assert_eq!(args.verbose_level, 0);
        assert!(!args.test_config);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_args() {
        assert!(parse_clap_from(["g3mapper"]).is_err());
        assert!(parse_clap_from(["g3mapper", "-c", "/no/such/dir/g3mapper.yaml"]).is_err());
    }
}
