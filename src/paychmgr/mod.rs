// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Payment channel manager: funding of outbound channels, the per-lane
//! voucher ledger and settlement.

mod accessor;
mod chain;
mod channel_info;
mod config;
mod errors;
mod funds_req;
mod manager;
mod msg_listener;
mod store;
mod voucher;

pub use accessor::*;
pub use chain::*;
pub use channel_info::*;
pub use config::*;
pub use errors::*;
pub use funds_req::*;
pub use manager::*;
pub use msg_listener::*;
pub use store::*;
pub use voucher::*;

#[cfg(test)]
pub(crate) mod tests;
