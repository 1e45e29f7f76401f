// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod channel_cmd;
mod config_cmd;
mod voucher_cmd;

pub(super) use self::{
    channel_cmd::ChannelCommands, config_cmd::ConfigCommands, voucher_cmd::VoucherCommands,
};
use crate::cli_shared::{
    cli::{CliOpts, Config},
    db_path,
};
use crate::db::db_engine::{Db, open_db};
use crate::paychmgr::PaychStore;
use crate::shim::address::{Address, Network};
use anyhow::Context as _;
use clap::Parser;
use std::io::Write;

/// Inspects the payment channel records of a node
#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), bin_name = "forest-paych", author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(flatten)]
    pub opts: CliOpts,
    #[command(subcommand)]
    pub cmd: Subcommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum Subcommand {
    /// Inspect payment channels
    #[command(subcommand)]
    Channel(ChannelCommands),

    /// Inspect vouchers
    #[command(subcommand)]
    Voucher(VoucherCommands),

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

impl Subcommand {
    pub fn run(self, config: &Config, out: &mut impl Write) -> anyhow::Result<()> {
        match self {
            Subcommand::Channel(cmd) => cmd.run(&open_store(config)?, out),
            Subcommand::Voucher(cmd) => cmd.run(&open_store(config)?, out),
            Subcommand::Config(cmd) => cmd.run(config, out),
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<PaychStore<Db>> {
    let path = db_path(config);
    let db = open_db(&path, config.db_config())
        .with_context(|| format!("failed to open channel database at {}", path.display()))?;
    Ok(PaychStore::new(db))
}

/// Parses an address of either network.
pub(super) fn parse_address(s: &str) -> anyhow::Result<Address> {
    Network::Mainnet
        .parse_address(s)
        .or_else(|_| Network::Testnet.parse_address(s))
        .with_context(|| format!("invalid address {s}"))
}
