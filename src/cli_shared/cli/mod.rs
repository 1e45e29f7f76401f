// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod client;
mod config;

pub use self::{client::*, config::*};
use crate::utils::misc::LoggingColor;

use clap::Args;
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::info;

pub const CONFIG_PATH_ENV: &str = "FOREST_PAYCH_CONFIG_PATH";

/// Options shared by every subcommand.
#[derive(Default, Debug, Args)]
pub struct CliOpts {
    /// A TOML file containing relevant configurations
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Overrides the data directory holding the channel database
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Enable or disable colored logging in `stdout`
    #[arg(long, default_value = "auto")]
    pub color: LoggingColor,
    /// Writes logs to hourly rotated files in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl CliOpts {
    pub fn to_config(&self) -> anyhow::Result<(Option<ConfigPath>, Config)> {
        let (path, mut config) = super::read_config(self.config.as_ref())?;
        if let Some(data_dir) = &self.data_dir {
            config.client.data_dir.clone_from(data_dir);
        }
        Ok((path, config))
    }
}

/// Where the configuration file was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    Cli(PathBuf),
    Env(PathBuf),
    Project(PathBuf),
}

impl ConfigPath {
    pub fn to_path_buf(&self) -> &PathBuf {
        match self {
            ConfigPath::Cli(path) | ConfigPath::Env(path) | ConfigPath::Project(path) => path,
        }
    }
}

/// Looks for a configuration file given on the command line, then in
/// [`CONFIG_PATH_ENV`], then in the project configuration directory.
pub fn find_config_path(config: Option<&PathBuf>) -> Option<ConfigPath> {
    if let Some(s) = config {
        return Some(ConfigPath::Cli(s.clone()));
    }
    if let Ok(s) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(s);
        if path.exists() {
            info!("{CONFIG_PATH_ENV} detected, using configuration at {}", path.display());
            return Some(ConfigPath::Env(path));
        }
    }
    if let Some(dir) = ProjectDirs::from("com", "ChainSafe", "ForestPaych") {
        let path = dir.config_dir().join("config.toml");
        if path.exists() {
            return Some(ConfigPath::Project(path));
        }
    }
    None
}
