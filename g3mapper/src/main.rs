/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use anyhow::Context;
use log::{debug, error, info};

use g3mapper::config::MapperConfig;
use g3mapper::mapping::MetricMapper;
use g3mapper::relay::RelayRuntime;

fn main() -> anyhow::Result<()> {
    let Some(proc_args) =
        g3mapper::opts::parse_clap().context("failed to parse command line options")?
    else {
        return Ok(());
    };

    // set up process logger early, only proc args is used inside
    let _log_guard =
        g3mapper::log::setup(proc_args.verbose_level).context("failed to setup logger")?;

    let config = MapperConfig::load(&proc_args.config_file)
        .context(format!("failed to load config, opts: {:?}", &proc_args))?;
    debug!("loaded config from {}", proc_args.config_file.display());

    let mapper = g3mapper::relay::load_mapper(&config).context("failed to load mapping")?;

    if proc_args.test_config {
        info!("the format of the config file is ok");
        return Ok(());
    }

    match tokio_run(config, mapper) {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("{e:?}");
            Err(e)
        }
    }
}

fn tokio_run(config: MapperConfig, mapper: Arc<MetricMapper>) -> anyhow::Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("main-worker");
    if let Some(n) = config.runtime.thread_number {
        builder.worker_threads(n);
    }
    let rt = builder.build().context("failed to start runtime")?;

    rt.block_on(async {
        let relay = RelayRuntime::spawn(&config, mapper)?;
        g3mapper::signal::register(relay.quit_sender(), relay.reloader())
            .context("failed to setup signal handler")?;
        relay.wait().await
    })
}
