// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cli_shared::cli::Config;
use anyhow::Context as _;
use clap::Subcommand;
use std::io::Write;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Dump the effective configuration as TOML
    Dump,
}

impl ConfigCommands {
    pub fn run(self, config: &Config, sink: &mut impl Write) -> anyhow::Result<()> {
        match self {
            Self::Dump => writeln!(
                sink,
                "{}",
                toml::to_string(config).context("failed to serialize the configuration")?
            )
            .context("failed to write the configuration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::io::read_toml;
    use pretty_assertions::assert_eq;

    #[test]
    fn dumped_config_reads_back() {
        let mut config = Config::default();
        config.paych.message_confidence = 12;
        let mut sink = Vec::new();
        ConfigCommands::Dump.run(&config, &mut sink).unwrap();
        let read: Config = read_toml(std::str::from_utf8(&sink).unwrap()).unwrap();
        assert_eq!(read, config);
    }
}
