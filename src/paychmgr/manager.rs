// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{
    ChainGateway, ChannelAccessor, ChannelAvailableFunds, ChannelInfo, Direction, Error,
    PaychConfig, PaychFundsRes, PaychStore, ResourceAccessor, SignedVoucher, VoucherCreateResult,
    VoucherInfo, VoucherSpec, WaitSentinel,
};
use crate::db::SettingsStore;
use crate::key_management::Wallet;
use crate::shim::{address::Address, econ::TokenAmount};
use ahash::HashMap;
use cid::Cid;
use parking_lot::{Mutex, RwLock};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::info;

/// Options of a funding request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetPaychOptions {
    /// Only check that uncommitted funds cover the amount, never send.
    pub reserve_only: bool,
}

/// Thread safe payment channel management.
///
/// Operations on channels between different payer/payee pairs run
/// concurrently; operations on the same pair are serialized.
pub struct PaychManager<DB, C> {
    state: Arc<ResourceAccessor<DB, C>>,
    #[allow(clippy::type_complexity)]
    channels: RwLock<HashMap<(Address, Address), Arc<ChannelAccessor<DB, C>>>>,
}

impl<DB, C> PaychManager<DB, C>
where
    DB: SettingsStore + Send + Sync + 'static,
    C: ChainGateway,
{
    pub fn new(db: DB, chain: Arc<C>, wallet: Arc<Mutex<Wallet>>, config: PaychConfig) -> Self {
        PaychManager {
            state: Arc::new(ResourceAccessor {
                store: Arc::new(PaychStore::new(db)),
                chain,
                wallet,
                config,
            }),
            channels: RwLock::new(HashMap::default()),
        }
    }

    pub fn store(&self) -> &PaychStore<DB> {
        &self.state.store
    }

    /// Restarts tracking of any messages that were sent to chain, returning
    /// how many were resumed. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<usize, Error> {
        let mut resumed = 0;
        for ci in self.store().with_pending_messages()? {
            resumed += self.accessor_for(&ci).restart_pending(&ci);
        }
        if resumed > 0 {
            info!("resumed waiting for {resumed} payment channel messages");
        }
        Ok(resumed)
    }

    /// Ensures that a channel exists between `from` and `to` and that it can
    /// cover `amt`, sending a create or add-funds message if needed.
    ///
    /// Returns once the message is accepted; redeem the sentinel with
    /// [`PaychManager::wait_ready`] to wait for confirmation.
    pub async fn get_paych(
        &self,
        from: Address,
        to: Address,
        amt: TokenAmount,
        opts: GetPaychOptions,
    ) -> Result<PaychFundsRes, Error> {
        self.accessor_by_from_to(from, to)
            .get_paych(amt, opts.reserve_only)
            .await
    }

    /// Blocks until the funds behind `sentinel` are confirmed, bounded by
    /// the configured timeout.
    pub async fn wait_ready(&self, sentinel: &WaitSentinel) -> Result<Address, Error> {
        match self.state.config.wait_ready_timeout {
            Some(timeout) => self.wait_ready_timeout(sentinel, timeout).await,
            None => self.wait_ready_unbounded(sentinel).await,
        }
    }

    /// Like [`PaychManager::wait_ready`] with an explicit bound. The funding
    /// is unaffected by a timeout and can be waited on again.
    pub async fn wait_ready_timeout(
        &self,
        sentinel: &WaitSentinel,
        timeout: Duration,
    ) -> Result<Address, Error> {
        tokio::time::timeout(timeout, self.wait_ready_unbounded(sentinel))
            .await
            .map_err(|_| Error::WaitTimeout(sentinel.mcid()))?
    }

    async fn wait_ready_unbounded(&self, sentinel: &WaitSentinel) -> Result<Address, Error> {
        let ci = self.store().by_channel_id(sentinel.channel_id())?;
        self.accessor_for(&ci).wait_ready(sentinel).await
    }

    /// Blocks until funding message `mcid` is confirmed.
    pub async fn wait_ready_msg(&self, mcid: Cid) -> Result<Address, Error> {
        self.wait_msg(mcid).await
    }

    /// Blocks until any message sent by the manager has executed, returning
    /// the channel address on success.
    pub async fn wait_msg(&self, mcid: Cid) -> Result<Address, Error> {
        let ci = self.store().by_message_cid(&mcid)?;
        self.accessor_for(&ci).wait_msg_outcome(mcid).await
    }

    pub async fn available_funds(&self, ch: &Address) -> Result<ChannelAvailableFunds, Error> {
        let ci = self.store().by_address(ch)?;
        self.accessor_for(&ci).current_available_funds(&ci).await
    }

    /// Funds of the active outbound channel between `from` and `to`. An
    /// empty snapshot is returned when there is none, so callers can check
    /// for a channel without handling an error.
    pub async fn available_funds_by_from_to(
        &self,
        from: Address,
        to: Address,
    ) -> Result<ChannelAvailableFunds, Error> {
        self.accessor_by_from_to(from, to).available_funds().await
    }

    /// Addresses of all active channels.
    pub fn list_channels(&self) -> Result<Vec<Address>, Error> {
        self.store().list_channels()
    }

    pub fn get_channel_info(&self, ch: &Address) -> Result<ChannelInfo, Error> {
        self.store().by_address(ch)
    }

    /// Starts tracking a channel created by someone else that pays an
    /// address held by the wallet.
    pub async fn track_inbound_channel(&self, ch: &Address) -> Result<ChannelInfo, Error> {
        match self.store().by_address(ch) {
            Ok(ci) => return Ok(ci),
            Err(Error::ChannelNotTracked) => {}
            Err(e) => return Err(e),
        }

        let state = self
            .state
            .chain
            .channel_state(ch)
            .await
            .map_err(Error::chain)?;
        if !self.state.wallet.lock().has_key(&state.to) {
            return Err(Error::NotOwned(state.to));
        }
        self.accessor_by_from_to(state.from, state.to)
            .track_inbound(ch, &state)
            .await
    }

    pub async fn allocate_lane(&self, ch: &Address) -> Result<u64, Error> {
        self.accessor_by_address(ch)?.allocate_lane(ch).await
    }

    pub async fn next_sequence_for_lane(&self, ch: &Address, lane: u64) -> Result<u64, Error> {
        self.accessor_by_address(ch)?
            .next_sequence_for_lane(ch, lane)
            .await
    }

    /// Creates and stores a voucher for `amount` on `lane` of `ch`.
    pub async fn create_voucher(
        &self,
        ch: &Address,
        lane: u64,
        amount: TokenAmount,
    ) -> Result<VoucherCreateResult, Error> {
        self.create_voucher_with(ch, VoucherSpec::new(lane, amount))
            .await
    }

    pub async fn create_voucher_with(
        &self,
        ch: &Address,
        spec: VoucherSpec,
    ) -> Result<VoucherCreateResult, Error> {
        self.accessor_by_address(ch)?.create_voucher(ch, spec).await
    }

    pub async fn check_voucher_valid(&self, ch: &Address, sv: &SignedVoucher) -> Result<(), Error> {
        self.accessor_by_address(ch)?
            .check_voucher_valid(ch, sv)
            .await
    }

    /// Stores a voucher received for a channel this node pays into.
    pub async fn add_voucher_outbound(
        &self,
        ch: &Address,
        sv: SignedVoucher,
        proof: Vec<u8>,
        min_delta: &TokenAmount,
    ) -> Result<TokenAmount, Error> {
        let ci = self.store().by_address(ch)?;
        if ci.direction != Direction::Outbound {
            return Err(Error::WrongDirection(format!(
                "cannot add outbound voucher to inbound channel {ch}"
            )));
        }
        self.accessor_for(&ci)
            .add_voucher(ch, sv, proof, min_delta)
            .await
    }

    /// Stores a voucher received from the payer of `ch`, tracking the
    /// channel first if it is new.
    pub async fn add_voucher_inbound(
        &self,
        ch: &Address,
        sv: SignedVoucher,
        proof: Vec<u8>,
        min_delta: &TokenAmount,
    ) -> Result<TokenAmount, Error> {
        let ci = self.track_inbound_channel(ch).await?;
        if ci.direction != Direction::Inbound {
            return Err(Error::WrongDirection(format!(
                "cannot add inbound voucher to outbound channel {ch}"
            )));
        }
        self.accessor_for(&ci)
            .add_voucher(ch, sv, proof, min_delta)
            .await
    }

    pub async fn list_vouchers(&self, ch: &Address) -> Result<Vec<VoucherInfo>, Error> {
        self.accessor_by_address(ch)?.list_vouchers(ch).await
    }

    pub async fn best_spendable(&self, ch: &Address) -> Result<BTreeMap<u64, SignedVoucher>, Error> {
        self.accessor_by_address(ch)?.best_spendable(ch).await
    }

    pub async fn voucher_spendable_delta(
        &self,
        ch: &Address,
        sv: &SignedVoucher,
    ) -> Result<TokenAmount, Error> {
        self.accessor_by_address(ch)?
            .voucher_spendable_delta(ch, sv)
            .await
    }

    pub async fn settle(&self, ch: &Address) -> Result<Cid, Error> {
        self.accessor_by_address(ch)?.settle(ch).await
    }

    pub async fn collect(&self, ch: &Address) -> Result<Cid, Error> {
        self.accessor_by_address(ch)?.collect(ch).await
    }

    pub async fn submit_voucher(
        &self,
        ch: &Address,
        sv: &SignedVoucher,
        secret: &[u8],
        proof: &[u8],
    ) -> Result<Cid, Error> {
        self.accessor_by_address(ch)?
            .submit_voucher(ch, sv, secret, proof)
            .await
    }

    /// Messages watched across every accessor.
    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.channels.read().values().map(|ca| ca.watcher_count()).sum()
    }

    fn accessor_by_address(&self, ch: &Address) -> Result<Arc<ChannelAccessor<DB, C>>, Error> {
        let ci = self.store().by_address(ch)?;
        Ok(self.accessor_for(&ci))
    }

    fn accessor_for(&self, ci: &ChannelInfo) -> Arc<ChannelAccessor<DB, C>> {
        self.accessor_by_from_to(ci.from(), ci.to())
    }

    fn accessor_by_from_to(&self, from: Address, to: Address) -> Arc<ChannelAccessor<DB, C>> {
        if let Some(ca) = self.channels.read().get(&(from, to)) {
            return ca.clone();
        }
        self.channels
            .write()
            .entry((from, to))
            .or_insert_with(|| Arc::new(ChannelAccessor::new(from, to, self.state.clone())))
            .clone()
    }
}
