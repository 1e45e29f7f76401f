// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Payment channel management for Filecoin nodes: funding of outbound
//! channels, the per-lane voucher ledger and settlement.

mod cli;
mod cli_shared;
pub mod db;
pub mod key_management;
pub mod paychmgr;
pub mod shim;
mod utils;

/// These items are semver-exempt, and exist for forest author use only
// We want to have doctests, but don't want our internals to be public.
//
// So we re-export the relevant items and test with `cargo test --doc --features doctest-private`
#[cfg(feature = "doctest-private")]
#[doc(hidden)]
pub mod doctest_private {
    pub use crate::utils::{encoding::blake2b_256, io::read_toml};
}

pub use cli::main as forest_paych_main;
pub use cli_shared::cli::{Client, Config};
