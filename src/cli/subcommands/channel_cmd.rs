// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::parse_address;
use crate::db::SettingsStore;
use crate::paychmgr::{ChannelInfo, PaychStore};
use anyhow::Context as _;
use clap::Subcommand;
use itertools::Itertools as _;
use std::io::Write;
use tabled::{builder::Builder, settings::Style};

#[derive(Debug, Subcommand)]
pub enum ChannelCommands {
    /// List channels with their funding
    List {
        /// Include retired channels
        #[arg(long)]
        all: bool,
    },
    /// Print the full record of a channel
    Status {
        /// Channel address
        channel: String,
    },
    /// Stop selecting a channel for funding. The record is kept.
    Remove {
        /// Channel address
        channel: String,
    },
}

impl ChannelCommands {
    pub fn run<DB: SettingsStore>(
        self,
        store: &PaychStore<DB>,
        out: &mut impl Write,
    ) -> anyhow::Result<()> {
        match self {
            Self::List { all } => {
                let infos = store
                    .list_channel_infos()?
                    .into_iter()
                    .filter(|ci| all || !ci.retired)
                    .sorted_by_key(|ci| (ci.channel.map(|a| a.to_string()), ci.id.clone()))
                    .collect_vec();
                writeln!(out, "{}", channel_table(&infos))?;
                Ok(())
            }
            Self::Status { channel } => {
                let ch = parse_address(&channel)?;
                let ci = store
                    .by_address(&ch)
                    .with_context(|| format!("channel {ch}"))?;
                write_status(&ci, out)
            }
            Self::Remove { channel } => {
                let ch = parse_address(&channel)?;
                let ci = store
                    .by_address(&ch)
                    .with_context(|| format!("channel {ch}"))?;
                store
                    .remove_channel(&ci.id)
                    .with_context(|| format!("failed to retire channel {ch}"))?;
                writeln!(out, "retired channel {ch}")?;
                Ok(())
            }
        }
    }
}

fn state(ci: &ChannelInfo) -> &'static str {
    if ci.retired {
        "retired"
    } else if ci.settling {
        "settling"
    } else if ci.channel.is_none() {
        "creating"
    } else {
        "open"
    }
}

fn channel_table(infos: &[ChannelInfo]) -> String {
    let mut builder = Builder::default();
    builder.push_record([
        "Channel",
        "Direction",
        "From",
        "To",
        "Amount (attoFIL)",
        "Pending (attoFIL)",
        "Vouchers",
        "State",
    ]);
    for ci in infos {
        builder.push_record([
            ci.channel.map(|a| a.to_string()).unwrap_or_else(|| "-".into()),
            ci.direction.to_string(),
            ci.from().to_string(),
            ci.to().to_string(),
            ci.amount.atto().to_string(),
            ci.pending_amount.atto().to_string(),
            ci.vouchers.len().to_string(),
            state(ci).to_string(),
        ]);
    }
    builder.build().with(Style::markdown()).to_string()
}

fn write_status(ci: &ChannelInfo, out: &mut impl Write) -> anyhow::Result<()> {
    let opt = |v: Option<cid::Cid>| v.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
    writeln!(out, "id:              {}", ci.id)?;
    writeln!(
        out,
        "channel:         {}",
        ci.channel.map(|a| a.to_string()).unwrap_or_else(|| "-".into())
    )?;
    writeln!(out, "direction:       {}", ci.direction)?;
    writeln!(out, "from:            {}", ci.from())?;
    writeln!(out, "to:              {}", ci.to())?;
    writeln!(out, "state:           {}", state(ci))?;
    writeln!(out, "amount:          {}", ci.amount.atto())?;
    writeln!(out, "pending amount:  {}", ci.pending_amount.atto())?;
    writeln!(out, "next lane:       {}", ci.next_lane)?;
    writeln!(out, "vouchers:        {}", ci.vouchers.len())?;
    writeln!(out, "create msg:      {}", opt(ci.create_msg))?;
    writeln!(out, "add funds msg:   {}", opt(ci.add_funds_msg))?;
    writeln!(out, "settle msg:      {}", opt(ci.settle_msg))?;
    writeln!(out, "collect msg:     {}", opt(ci.collect_msg))?;
    Ok(())
}
