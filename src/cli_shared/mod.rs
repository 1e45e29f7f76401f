// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod cli;
pub mod logger;

use crate::cli_shared::cli::{Config, ConfigPath, find_config_path};
use crate::db::db_engine::db_root;
use crate::utils::io::read_toml;
use std::path::PathBuf;

/// Gets the channel database directory
pub fn db_path(config: &Config) -> PathBuf {
    db_root(&config.client.data_dir)
}

pub fn read_config(config_path_opt: Option<&PathBuf>) -> anyhow::Result<(Option<ConfigPath>, Config)> {
    let (path, config) = match find_config_path(config_path_opt) {
        Some(path) => {
            // Read from config file
            let toml = std::fs::read_to_string(path.to_path_buf())?;
            // Parse and return the configuration file
            let config = read_toml(&toml)?;
            (Some(path), config)
        }
        None => (None, Config::default()),
    };
    Ok((path, config))
}
