// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::Error;
use crate::shim::{
    address::Address,
    clock::ChainEpoch,
    crypto::{self, Signature},
    econ::TokenAmount,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use fvm_ipld_encoding::{
    RawBytes, strict_bytes,
    tuple::{Deserialize_tuple, Serialize_tuple},
};

/// Parameters used to verify a voucher's `extra` payload against another
/// actor before redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ModVerifyParams {
    pub actor: Address,
    pub method: u64,
    pub data: RawBytes,
}

/// Lane merge instruction carried by a voucher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct Merge {
    pub lane: u64,
    pub nonce: u64,
}

/// A signed promise from the channel payer to pay `amount` on `lane` once
/// redeemed on chain.
///
/// The field order is the on-chain tuple layout of the payment channel
/// actor, so encoded vouchers are accepted by other implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct SignedVoucher {
    /// Channel the voucher is drawn on.
    pub channel_addr: Address,
    /// Earliest epoch the voucher can be redeemed at.
    pub time_lock_min: ChainEpoch,
    /// Latest epoch the voucher can be redeemed at, `0` for no limit.
    pub time_lock_max: ChainEpoch,
    /// Hash of the secret that must be revealed on redemption, if any.
    #[serde(with = "strict_bytes")]
    pub secret_pre_image: Vec<u8>,
    pub extra: Option<ModVerifyParams>,
    pub lane: u64,
    /// Monotonically increasing within a lane.
    pub nonce: u64,
    /// Cumulative amount owed on the lane, not an increment.
    pub amount: TokenAmount,
    pub min_settle_height: ChainEpoch,
    pub merges: Vec<Merge>,
    pub signature: Option<Signature>,
}

impl SignedVoucher {
    /// Unsigned voucher for `amount` on `lane` of `channel_addr`.
    pub fn new(channel_addr: Address, lane: u64, nonce: u64, amount: TokenAmount) -> Self {
        Self {
            channel_addr,
            time_lock_min: 0,
            time_lock_max: 0,
            secret_pre_image: Vec::new(),
            extra: None,
            lane,
            nonce,
            amount,
            min_settle_height: 0,
            merges: Vec::new(),
            signature: None,
        }
    }

    /// Canonical bytes covered by the signature: the voucher encoding with
    /// the signature field left empty.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, Error> {
        #[derive(Serialize_tuple)]
        struct SignedVoucherSer<'a> {
            channel_addr: &'a Address,
            time_lock_min: ChainEpoch,
            time_lock_max: ChainEpoch,
            #[serde(with = "strict_bytes")]
            secret_pre_image: &'a [u8],
            extra: &'a Option<ModVerifyParams>,
            lane: u64,
            nonce: u64,
            amount: &'a TokenAmount,
            min_settle_height: ChainEpoch,
            merges: &'a [Merge],
            signature: (),
        }
        let osv = SignedVoucherSer {
            channel_addr: &self.channel_addr,
            time_lock_min: self.time_lock_min,
            time_lock_max: self.time_lock_max,
            secret_pre_image: &self.secret_pre_image,
            extra: &self.extra,
            lane: self.lane,
            nonce: self.nonce,
            amount: &self.amount,
            min_settle_height: self.min_settle_height,
            merges: &self.merges,
            signature: (),
        };
        Ok(fvm_ipld_encoding::to_vec(&osv)?)
    }

    /// Checks the signature against `signer`.
    pub fn verify(&self, signer: &Address) -> Result<(), Error> {
        let sig = self
            .signature
            .as_ref()
            .ok_or_else(|| Error::InvalidSignature("voucher is not signed".into()))?;
        let msg = self.signing_bytes()?;
        crypto::verify(sig, &msg, signer).map_err(|e| Error::InvalidSignature(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(fvm_ipld_encoding::to_vec(self)?)
    }

    pub fn from_bytes(bz: &[u8]) -> Result<Self, Error> {
        Ok(fvm_ipld_encoding::from_slice(bz)?)
    }

    /// URL-safe base64 of the canonical encoding, the form vouchers take
    /// when handed between parties out of band.
    pub fn encode_string(&self) -> Result<String, Error> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_bytes()?))
    }

    pub fn decode_string(s: &str) -> Result<Self, Error> {
        let bz = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| Error::Encoding(format!("invalid voucher string: {e}")))?;
        Self::from_bytes(&bz)
    }
}
