// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::parse_address;
use crate::db::SettingsStore;
use crate::paychmgr::{PaychStore, SignedVoucher, best_spendable_vouchers};
use anyhow::Context as _;
use clap::Subcommand;
use std::io::Write;
use tabled::{builder::Builder, settings::Style};

#[derive(Debug, Subcommand)]
pub enum VoucherCommands {
    /// List the stored vouchers of a channel, ordered by lane and nonce
    List {
        /// Channel address
        channel: String,
        /// Print the encoded vouchers
        #[arg(long)]
        export: bool,
    },
    /// Per lane, the voucher worth submitting. Redemptions that only
    /// happened on chain are not known offline.
    Best {
        /// Channel address
        channel: String,
    },
    /// Decode a voucher as exchanged with the counterparty
    Inspect {
        /// Base64url encoded voucher
        voucher: String,
        /// Also verify the voucher was signed by this address
        #[arg(long)]
        signer: Option<String>,
    },
}

impl VoucherCommands {
    pub fn run<DB: SettingsStore>(
        self,
        store: &PaychStore<DB>,
        out: &mut impl Write,
    ) -> anyhow::Result<()> {
        match self {
            Self::List { channel, export } => {
                let ch = parse_address(&channel)?;
                let mut vouchers = store
                    .vouchers_for_paych(&ch)
                    .with_context(|| format!("channel {ch}"))?;
                vouchers.sort_by_key(|vi| (vi.voucher.lane, vi.voucher.nonce));
                let mut builder = header(export);
                for vi in &vouchers {
                    builder.push_record(row(&vi.voucher, Some(vi.submitted), export)?);
                }
                writeln!(out, "{}", builder.build().with(Style::markdown()))?;
                Ok(())
            }
            Self::Best { channel } => {
                let ch = parse_address(&channel)?;
                let vouchers = store
                    .vouchers_for_paych(&ch)
                    .with_context(|| format!("channel {ch}"))?;
                let mut builder = header(true);
                for sv in best_spendable_vouchers(vouchers, &Default::default()).values() {
                    builder.push_record(row(sv, None, true)?);
                }
                writeln!(out, "{}", builder.build().with(Style::markdown()))?;
                Ok(())
            }
            Self::Inspect { voucher, signer } => {
                let sv = SignedVoucher::decode_string(voucher.trim())
                    .context("failed to decode voucher")?;
                writeln!(out, "channel:           {}", sv.channel_addr)?;
                writeln!(out, "lane:              {}", sv.lane)?;
                writeln!(out, "nonce:             {}", sv.nonce)?;
                writeln!(out, "amount:            {}", sv.amount.atto())?;
                writeln!(out, "time lock min:     {}", sv.time_lock_min)?;
                writeln!(out, "time lock max:     {}", sv.time_lock_max)?;
                writeln!(out, "min settle height: {}", sv.min_settle_height)?;
                writeln!(out, "secret pre-image:  {}", hex::encode(&sv.secret_pre_image))?;
                writeln!(out, "signed:            {}", sv.signature.is_some())?;
                if let Some(signer) = signer {
                    let signer = parse_address(&signer)?;
                    sv.verify(&signer)
                        .with_context(|| format!("voucher is not signed by {signer}"))?;
                    writeln!(out, "signature valid:   true")?;
                }
                Ok(())
            }
        }
    }
}

fn header(export: bool) -> Builder {
    let mut builder = Builder::default();
    let mut columns = vec!["Lane", "Nonce", "Amount (attoFIL)", "Submitted"];
    if export {
        columns.push("Voucher");
    }
    builder.push_record(columns);
    builder
}

fn row(sv: &SignedVoucher, submitted: Option<bool>, export: bool) -> anyhow::Result<Vec<String>> {
    let mut row = vec![
        sv.lane.to_string(),
        sv.nonce.to_string(),
        sv.amount.atto().to_string(),
        submitted.map_or_else(|| "-".into(), |s| s.to_string()),
    ];
    if export {
        row.push(sv.encode_string()?);
    }
    Ok(row)
}
