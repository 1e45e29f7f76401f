// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::SignedVoucher;
use crate::shim::{address::Address, clock::ChainEpoch, econ::TokenAmount, error::ExitCode};
use ahash::HashMap;
use async_trait::async_trait;
use cid::Cid;

/// Outcome of an executed message.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageLookup {
    pub exit_code: ExitCode,
    /// Robust address of the channel, for create messages.
    pub channel: Option<Address>,
}

/// Redemption state of a single lane.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LaneState {
    pub redeemed: TokenAmount,
    pub nonce: u64,
}

/// On-chain state of a payment channel actor.
#[derive(Clone, Debug, PartialEq)]
pub struct PaychActorState {
    pub from: Address,
    pub to: Address,
    pub to_send: TokenAmount,
    /// Epoch at which the channel can be collected, `0` when not settling.
    pub settling_at: ChainEpoch,
    pub min_settle_height: ChainEpoch,
    pub lane_states: HashMap<u64, LaneState>,
}

/// Boundary to the chain: message submission, message confirmation and
/// payment channel actor state.
///
/// Every `send_*` method returns once the message has been accepted for
/// inclusion, not once it has executed.
#[async_trait]
pub trait ChainGateway: Send + Sync + 'static {
    async fn send_create_channel(
        &self,
        from: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> anyhow::Result<Cid>;

    async fn send_add_funds(
        &self,
        from: &Address,
        channel: &Address,
        amount: &TokenAmount,
    ) -> anyhow::Result<Cid>;

    async fn send_settle(&self, from: &Address, channel: &Address) -> anyhow::Result<Cid>;

    async fn send_collect(&self, from: &Address, channel: &Address) -> anyhow::Result<Cid>;

    async fn send_voucher_submit(
        &self,
        from: &Address,
        channel: &Address,
        voucher: &SignedVoucher,
        secret: &[u8],
    ) -> anyhow::Result<Cid>;

    /// Blocks until `mcid` has executed with `confidence` epochs on top.
    async fn wait_for_message(&self, mcid: &Cid, confidence: i64) -> anyhow::Result<MessageLookup>;

    async fn channel_balance(&self, channel: &Address) -> anyhow::Result<TokenAmount>;

    async fn channel_state(&self, channel: &Address) -> anyhow::Result<PaychActorState>;

    async fn head_epoch(&self) -> anyhow::Result<ChainEpoch>;
}
