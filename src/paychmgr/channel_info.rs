// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Error, SignedVoucher};
use crate::shim::{address::Address, econ::TokenAmount};
use cid::Cid;
use fvm_ipld_encoding::{
    repr::{Deserialize_repr, Serialize_repr},
    strict_bytes,
    tuple::{Deserialize_tuple, Serialize_tuple},
};
use strum::Display;

/// Whether this node pays into (`Outbound`) or is paid by (`Inbound`) a
/// channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr, Display)]
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Inbound = 1,
    Outbound = 2,
}

/// A voucher together with its redemption proof and local submission state.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct VoucherInfo {
    pub voucher: SignedVoucher,
    #[serde(with = "strict_bytes")]
    pub proof: Vec<u8>,
    pub submitted: bool,
    /// Submission message still in flight.
    pub submit_msg: Option<Cid>,
}

impl VoucherInfo {
    pub fn new(voucher: SignedVoucher, proof: Vec<u8>) -> Self {
        Self {
            voucher,
            proof,
            submitted: false,
            submit_msg: None,
        }
    }
}

/// Persisted state of a single payment channel.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct ChannelInfo {
    /// Local identifier, stable before the channel has an on-chain address.
    pub id: String,
    /// On-chain address, set once the create message is confirmed.
    pub channel: Option<Address>,
    /// The party this node signs with.
    pub control: Address,
    /// The counterparty.
    pub target: Address,
    pub direction: Direction,
    pub vouchers: Vec<VoucherInfo>,
    pub next_lane: u64,
    /// Confirmed on-chain funding.
    pub amount: TokenAmount,
    /// Funding sent but not yet confirmed.
    pub pending_amount: TokenAmount,
    pub create_msg: Option<Cid>,
    pub add_funds_msg: Option<Cid>,
    pub settle_msg: Option<Cid>,
    pub collect_msg: Option<Cid>,
    /// Set once a settle message has been confirmed.
    pub settling: bool,
    /// Retired channels stay readable by id and address but are never
    /// selected for new funding.
    pub retired: bool,
}

impl ChannelInfo {
    fn new(control: Address, target: Address, direction: Direction) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel: None,
            control,
            target,
            direction,
            vouchers: Vec::new(),
            next_lane: 0,
            amount: TokenAmount::default(),
            pending_amount: TokenAmount::default(),
            create_msg: None,
            add_funds_msg: None,
            settle_msg: None,
            collect_msg: None,
            settling: false,
            retired: false,
        }
    }

    /// A channel this node funds, before its create message has landed.
    pub fn new_outbound(from: Address, to: Address) -> Self {
        Self::new(from, to, Direction::Outbound)
    }

    /// A channel created by `from` paying this node at `to`.
    pub fn new_inbound(channel: Address, from: Address, to: Address) -> Self {
        Self {
            channel: Some(channel),
            ..Self::new(to, from, Direction::Inbound)
        }
    }

    /// Paying party.
    pub fn from(&self) -> Address {
        match self.direction {
            Direction::Outbound => self.control,
            Direction::Inbound => self.target,
        }
    }

    /// Receiving party.
    pub fn to(&self) -> Address {
        match self.direction {
            Direction::Outbound => self.target,
            Direction::Inbound => self.control,
        }
    }

    /// On-chain address, or an error if the create message has not landed.
    pub fn channel_addr(&self) -> Result<Address, Error> {
        self.channel
            .ok_or_else(|| Error::NoChannelAddress(self.id.clone()))
    }

    /// Funding message currently in flight, if any.
    pub fn pending_funding_msg(&self) -> Option<Cid> {
        self.create_msg.or(self.add_funds_msg)
    }

    /// Every message in flight: funding, settlement and voucher
    /// submissions.
    pub fn pending_messages(&self) -> Vec<Cid> {
        [
            self.create_msg,
            self.add_funds_msg,
            self.settle_msg,
            self.collect_msg,
        ]
        .into_iter()
        .chain(self.vouchers.iter().map(|vi| vi.submit_msg))
        .flatten()
        .collect()
    }

    pub fn has_pending_messages(&self) -> bool {
        !self.pending_messages().is_empty()
    }

    /// Funds available to cover vouchers, including unconfirmed funding.
    pub fn capacity(&self) -> TokenAmount {
        &self.amount + &self.pending_amount
    }

    /// `true` while vouchers may still be issued or accepted.
    pub fn is_open(&self) -> bool {
        !self.settling && !self.retired
    }

    pub fn has_voucher(&self, sv: &SignedVoucher) -> bool {
        self.vouchers.iter().any(|vi| &vi.voucher == sv)
    }

    pub fn was_voucher_submitted(&self, sv: &SignedVoucher) -> bool {
        self.vouchers
            .iter()
            .any(|vi| &vi.voucher == sv && vi.submitted)
    }

    /// Sets the submission flag of a stored voucher, returning `false` if the
    /// voucher is unknown.
    pub fn set_voucher_submitted(&mut self, sv: &SignedVoucher, submitted: bool) -> bool {
        match self.vouchers.iter_mut().find(|vi| &vi.voucher == sv) {
            Some(vi) => {
                vi.submitted = submitted;
                true
            }
            None => false,
        }
    }

    /// Records `mcid` as the in-flight submission of stored voucher `sv`,
    /// or clears it with `None`.
    pub fn set_voucher_submit_msg(&mut self, sv: &SignedVoucher, mcid: Option<Cid>) -> bool {
        match self.vouchers.iter_mut().find(|vi| &vi.voucher == sv) {
            Some(vi) => {
                vi.submit_msg = mcid;
                true
            }
            None => false,
        }
    }

    /// Voucher whose submission is the message `mcid`.
    pub fn voucher_submitted_by(&self, mcid: &Cid) -> Option<&SignedVoucher> {
        self.vouchers
            .iter()
            .find(|vi| vi.submit_msg.as_ref() == Some(mcid))
            .map(|vi| &vi.voucher)
    }

    /// Highest nonce of any stored voucher on `lane`.
    pub fn max_lane_nonce(&self, lane: u64) -> Option<u64> {
        self.vouchers
            .iter()
            .filter(|vi| vi.voucher.lane == lane)
            .map(|vi| vi.voucher.nonce)
            .max()
    }
}

/// Tracks a message sent on behalf of a channel so that its outcome
/// survives restarts.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct MsgInfo {
    pub channel_id: String,
    pub mcid: Cid,
    pub received: bool,
    /// Exit code of a message that executed unsuccessfully.
    pub exit_code: Option<u32>,
    pub err: String,
}

impl MsgInfo {
    pub fn new(channel_id: String, mcid: Cid) -> Self {
        Self {
            channel_id,
            mcid,
            received: false,
            exit_code: None,
            err: String::new(),
        }
    }
}

/// Snapshot of a channel's funds.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelAvailableFunds {
    /// Channel address, `None` while the create message is pending or when
    /// no channel exists.
    pub channel: Option<Address>,
    pub from: Address,
    pub to: Address,
    /// Funding confirmed on chain.
    pub confirmed_amt: TokenAmount,
    /// Funding sent but not yet confirmed.
    pub pending_amt: TokenAmount,
    /// Message to wait on for the pending funds.
    pub pending_wait_sentinel: Option<Cid>,
    /// Funding requested while another message was in flight.
    pub queued_amt: TokenAmount,
    /// Amount redeemed by vouchers, on chain and in the local store.
    pub voucher_redeemed_amt: TokenAmount,
}

impl ChannelAvailableFunds {
    pub fn empty(from: Address, to: Address) -> Self {
        Self {
            channel: None,
            from,
            to,
            confirmed_amt: TokenAmount::default(),
            pending_amt: TokenAmount::default(),
            pending_wait_sentinel: None,
            queued_amt: TokenAmount::default(),
            voucher_redeemed_amt: TokenAmount::default(),
        }
    }

    /// Funds not yet promised by a voucher.
    pub fn spendable(&self) -> TokenAmount {
        &self.confirmed_amt + &self.pending_amt - &self.voucher_redeemed_amt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paychmgr::tests::test_cid;
    use num_traits::Zero as _;

    #[test]
    fn outbound_defaults() {
        let ci = ChannelInfo::new_outbound(Address::new_id(1), Address::new_id(2));
        assert!(!ci.id.is_empty());
        assert_eq!(ci.channel, None);
        assert_eq!(ci.channel_addr(), Err(Error::NoChannelAddress(ci.id.clone())));
        assert_eq!(ci.next_lane, 0);
        assert!(ci.amount.is_zero());
        assert!(ci.is_open());
        assert_eq!(ci.from(), Address::new_id(1));
        assert_eq!(ci.to(), Address::new_id(2));
        assert_ne!(
            ci.id,
            ChannelInfo::new_outbound(Address::new_id(1), Address::new_id(2)).id
        );
    }

    #[test]
    fn inbound_parties_are_swapped() {
        let ci = ChannelInfo::new_inbound(Address::new_id(100), Address::new_id(1), Address::new_id(2));
        assert_eq!(ci.control, Address::new_id(2));
        assert_eq!(ci.from(), Address::new_id(1));
        assert_eq!(ci.to(), Address::new_id(2));
        assert_eq!(ci.channel_addr().unwrap(), Address::new_id(100));
    }

    #[test]
    fn channel_info_cbor() {
        let mut ci = ChannelInfo::new_outbound(Address::new_id(1), Address::new_id(2));
        ci.channel = Some(Address::new_id(100));
        ci.amount = TokenAmount::from_atto(10);
        let sv = SignedVoucher::new(Address::new_id(100), 0, 1, TokenAmount::from_atto(4));
        ci.vouchers.push(VoucherInfo::new(sv.clone(), vec![1, 2, 3]));
        ci.set_voucher_submitted(&sv, true);
        ci.set_voucher_submit_msg(&sv, Some(test_cid(1)));
        let bz = fvm_ipld_encoding::to_vec(&ci).unwrap();
        let decoded: ChannelInfo = fvm_ipld_encoding::from_slice(&bz).unwrap();
        assert_eq!(decoded, ci);
        assert_eq!(decoded.max_lane_nonce(0), Some(1));
        assert_eq!(decoded.max_lane_nonce(1), None);
        assert!(decoded.was_voucher_submitted(&sv));
        assert_eq!(
            decoded.voucher_submitted_by(&test_cid(1)),
            Some(&sv)
        );
    }

    #[test]
    fn in_flight_submission_is_a_pending_message() {
        let ch = Address::new_id(100);
        let mut ci = ChannelInfo::new_inbound(ch, Address::new_id(1), Address::new_id(2));
        let sv = SignedVoucher::new(ch, 0, 1, TokenAmount::from_atto(4));
        ci.vouchers.push(VoucherInfo::new(sv.clone(), vec![]));
        assert!(!ci.has_pending_messages());

        let mcid = test_cid(2);
        assert!(ci.set_voucher_submit_msg(&sv, Some(mcid)));
        assert_eq!(ci.pending_messages(), vec![mcid]);

        ci.set_voucher_submit_msg(&sv, None);
        assert!(!ci.has_pending_messages());
        assert_eq!(ci.voucher_submitted_by(&mcid), None);
    }
}
