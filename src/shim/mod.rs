// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Filecoin primitives used across the payment channel manager. Everything is
//! re-exported from the latest `fvm_shared` so the rest of the crate never
//! names a versioned crate directly.

pub use fvm_shared4 as fvm_shared_latest;

pub mod crypto;

pub mod address {
    pub use super::fvm_shared_latest::address::{Address, Error as AddressError, Network, Protocol};
}

pub mod econ {
    pub use super::fvm_shared_latest::econ::TokenAmount;
}

pub mod clock {
    pub use super::fvm_shared_latest::clock::ChainEpoch;
}

pub mod error {
    pub use super::fvm_shared_latest::error::ExitCode;
}
