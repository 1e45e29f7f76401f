// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::shim::{address::Address, clock::ChainEpoch, econ::TokenAmount, error::ExitCode};
use cid::Cid;
use thiserror::Error;

/// Payment channel errors.
///
/// `Clone` so that a single funding failure can be handed to every waiter of
/// the same wait sentinel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // not found
    #[error("channel not tracked")]
    ChannelNotTracked,
    #[error("message {0} not tracked")]
    MsgNotFound(Cid),
    #[error("channel {0} has no on-chain address yet")]
    NoChannelAddress(String),

    // validation
    #[error("invalid voucher: {0}")]
    InvalidVoucher(String),
    #[error("invalid voucher signature: {0}")]
    InvalidSignature(String),
    #[error("voucher delta {} is lower than the minimum delta {}", .delta.atto(), .min_delta.atto())]
    LowDelta {
        delta: TokenAmount,
        min_delta: TokenAmount,
    },
    #[error("insufficient funds: required {}, available {}", .required.atto(), .available.atto())]
    InsufficientFunds {
        required: TokenAmount,
        available: TokenAmount,
    },
    #[error("lane {lane} has not been allocated, next lane is {next_lane}")]
    InvalidLane { lane: u64, next_lane: u64 },
    #[error("channel {0} is already settling")]
    ChannelSettling(Address),
    #[error("channel {0} settled")]
    ChannelSettled(Address),
    #[error("channel {0} is not settling")]
    NotSettling(Address),
    #[error(
        "challenge period of channel {channel} ends at epoch {settling_at}, chain head is at {head}"
    )]
    ChallengePeriod {
        channel: Address,
        settling_at: ChainEpoch,
        head: ChainEpoch,
    },
    #[error("{0}")]
    WrongDirection(String),
    #[error("wallet does not hold a key for {0}")]
    NotOwned(Address),
    #[error("cannot submit voucher that has already been submitted")]
    AlreadySubmitted,
    #[error("already tracking channel {0}")]
    AlreadyTracked(Address),
    #[error("funding of channel {0} may have been sent but its message was not recorded")]
    UnrecordedFunding(String),

    // chain, transient
    #[error("waiting for message {mcid}: {reason}")]
    MsgWait { mcid: Cid, reason: String },
    #[error("timed out waiting for funding{}", .0.map(|c| format!(" message {c}")).unwrap_or_default())]
    WaitTimeout(Option<Cid>),

    // chain, terminal
    #[error("message {mcid} failed with exit code {}", .exit_code.value())]
    MsgFailed { mcid: Cid, exit_code: ExitCode },

    // collaborators
    #[error("store: {0}")]
    Store(String),
    #[error("chain: {0}")]
    Chain(String),
    #[error("wallet: {0}")]
    Wallet(String),
    #[error("encoding: {0}")]
    Encoding(String),
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn store(e: impl std::fmt::Display) -> Self {
        Error::Store(e.to_string())
    }

    pub(crate) fn chain(e: impl std::fmt::Display) -> Self {
        Error::Chain(e.to_string())
    }

    /// Returns `true` for failures that may go away by waiting again without
    /// re-sending the underlying message.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::MsgWait { .. } | Error::WaitTimeout(_))
    }
}

impl From<fvm_ipld_encoding::Error> for Error {
    fn from(e: fvm_ipld_encoding::Error) -> Error {
        Error::Encoding(e.to_string())
    }
}

impl From<crate::key_management::Error> for Error {
    fn from(e: crate::key_management::Error) -> Error {
        Error::Wallet(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paychmgr::tests::test_cid;
    use rstest::rstest;

    #[rstest]
    #[case(Error::MsgWait { mcid: test_cid(1), reason: "lookup failed".into() }, true)]
    #[case(Error::WaitTimeout(None), true)]
    #[case(Error::MsgFailed { mcid: test_cid(1), exit_code: ExitCode::USR_ILLEGAL_STATE }, false)]
    #[case(Error::ChannelNotTracked, false)]
    #[case(Error::InvalidVoucher("nonce too low".into()), false)]
    #[case(Error::UnrecordedFunding("c1".into()), false)]
    fn transient_errors(#[case] err: Error, #[case] transient: bool) {
        assert_eq!(err.is_transient(), transient);
    }

    #[test]
    fn messages_carry_identifiers() {
        let mcid = test_cid(7);
        let err = Error::MsgFailed {
            mcid,
            exit_code: ExitCode::USR_INSUFFICIENT_FUNDS,
        };
        assert_eq!(
            err.to_string(),
            format!("message {mcid} failed with exit code 19")
        );
        assert_eq!(
            Error::WaitTimeout(Some(mcid)).to_string(),
            format!("timed out waiting for funding message {mcid}")
        );
        assert_eq!(
            Error::WaitTimeout(None).to_string(),
            "timed out waiting for funding"
        );
    }
}
