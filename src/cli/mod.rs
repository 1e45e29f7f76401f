// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod subcommands;

use std::ffi::OsString;

use crate::cli_shared::logger;
use clap::Parser;
use tracing::debug;

use self::subcommands::Cli;

pub fn main<ArgT>(args: impl IntoIterator<Item = ArgT>) -> anyhow::Result<()>
where
    ArgT: Into<OsString> + Clone,
{
    // Capture Cli inputs
    let Cli { opts, cmd } = Cli::parse_from(args);
    let (config_path, config) = opts.to_config()?;
    logger::setup_logger(&opts, &config.log);
    if let Some(path) = config_path {
        debug!("using configuration at {}", path.to_path_buf().display());
    }
    cmd.run(&config, &mut std::io::stdout())
}
