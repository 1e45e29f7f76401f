// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per payer/payee state machine. Every mutation of a channel's record
//! happens while holding the accessor lock, and every message sent for a
//! channel is watched by exactly one background task.

mod funding;
mod ledger;
mod settlement;

pub use funding::{PaychFundsRes, WaitSentinel};
pub use ledger::{VoucherCreateResult, VoucherSpec, best_spendable_vouchers};

use super::{
    ChainGateway, ChannelInfo, Error, FundsReq, LaneState, MessageLookup, MsgInfo, MsgListeners,
    PaychActorState, PaychConfig, PaychStore, SignedVoucher,
};
use crate::db::SettingsStore;
use crate::key_management::Wallet;
use crate::shim::{address::Address, econ::TokenAmount, error::ExitCode};
use ahash::HashMap;
use cid::Cid;
use futures::future::{BoxFuture, FutureExt as _, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Single-flight handle on the outcome of a message. Resolves to the channel
/// address on success.
pub(super) type MsgFuture = Shared<BoxFuture<'static, Result<Address, Error>>>;

/// What a watched message does to its channel once it executes.
#[derive(Clone, Debug, PartialEq)]
pub(super) enum MsgKind {
    Create,
    AddFunds,
    Settle,
    Collect,
    Submit(Box<SignedVoucher>),
    /// A message whose effect is no longer known, only its outcome is
    /// recorded.
    Untracked,
}

impl MsgKind {
    fn is_funding(&self) -> bool {
        matches!(self, MsgKind::Create | MsgKind::AddFunds)
    }

    /// Kind of `mcid` as referenced by the channel record.
    fn of(ci: &ChannelInfo, mcid: Cid) -> MsgKind {
        let msg = Some(mcid);
        if ci.create_msg == msg {
            MsgKind::Create
        } else if ci.add_funds_msg == msg {
            MsgKind::AddFunds
        } else if ci.settle_msg == msg {
            MsgKind::Settle
        } else if ci.collect_msg == msg {
            MsgKind::Collect
        } else if let Some(sv) = ci.voucher_submitted_by(&mcid) {
            MsgKind::Submit(Box::new(sv.clone()))
        } else {
            MsgKind::Untracked
        }
    }
}

/// Message and key resources shared by the manager and every accessor.
pub struct ResourceAccessor<DB, C> {
    pub store: Arc<PaychStore<DB>>,
    pub chain: Arc<C>,
    pub wallet: Arc<Mutex<Wallet>>,
    pub config: PaychConfig,
}

/// Serializes all operations on the channels between one payer and one
/// payee.
pub struct ChannelAccessor<DB, C> {
    from: Address,
    to: Address,
    state: Arc<ResourceAccessor<DB, C>>,
    lock: tokio::sync::Mutex<()>,
    msg_listeners: MsgListeners,
    funds_req_queue: Mutex<Vec<FundsReq>>,
    watchers: Mutex<HashMap<Cid, MsgFuture>>,
}

impl<DB, C> ChannelAccessor<DB, C>
where
    DB: SettingsStore + Send + Sync + 'static,
    C: ChainGateway,
{
    pub fn new(from: Address, to: Address, state: Arc<ResourceAccessor<DB, C>>) -> Self {
        ChannelAccessor {
            from,
            to,
            state,
            lock: Default::default(),
            msg_listeners: MsgListeners::new(),
            funds_req_queue: Default::default(),
            watchers: Default::default(),
        }
    }

    pub fn msg_listeners(&self) -> &MsgListeners {
        &self.msg_listeners
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    fn store(&self) -> &PaychStore<DB> {
        &self.state.store
    }

    fn chain(&self) -> &C {
        &self.state.chain
    }

    /// Starts tracking inbound channel `ch` described by `state`, returning
    /// the existing record if it is already tracked.
    pub async fn track_inbound(&self, ch: &Address, state: &PaychActorState) -> Result<ChannelInfo, Error> {
        let _guard = self.lock.lock().await;
        match self.store().by_address(ch) {
            Ok(ci) => return Ok(ci),
            Err(Error::ChannelNotTracked) => {}
            Err(e) => return Err(e),
        }

        let mut ci = ChannelInfo::new_inbound(*ch, state.from, state.to);
        ci.amount = self.chain().channel_balance(ch).await.map_err(Error::chain)?;
        ci.next_lane = state.lane_states.keys().max().map_or(0, |lane| lane + 1);
        ci.settling = state.settling_at != 0;
        self.store().track_channel(&ci)?;
        info!(channel = %ch, from = %state.from, to = %state.to, "tracking inbound channel");
        Ok(ci)
    }

    /// Re-attaches watchers to every message `ci` still has in flight.
    pub(super) fn restart_pending(self: &Arc<Self>, ci: &ChannelInfo) -> usize {
        let mut n = 0;
        for mcid in ci.pending_messages() {
            debug!(channel_id = %ci.id, %mcid, "resuming wait for message");
            let _ = self.watch_msg(ci.id.clone(), mcid, MsgKind::of(ci, mcid));
            n += 1;
        }
        n
    }

    /// Returns the watcher of `mcid`, spawning one if none is running.
    pub(super) fn watch_msg(self: &Arc<Self>, channel_id: String, mcid: Cid, kind: MsgKind) -> MsgFuture {
        let mut watchers = self.watchers.lock();
        if let Some(fut) = watchers.get(&mcid) {
            return fut.clone();
        }
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.wait_msg(channel_id, mcid, kind).await });
        let fut = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(Error::Other(format!("watcher of message {mcid} aborted: {e}"))))
        }
        .boxed()
        .shared();
        watchers.insert(mcid, fut.clone());
        fut
    }

    /// Waits for any message sent on behalf of this accessor's channels.
    pub async fn wait_msg_outcome(self: &Arc<Self>, mcid: Cid) -> Result<Address, Error> {
        let fut = {
            let _guard = self.lock.lock().await;
            let running = self.watchers.lock().get(&mcid).cloned();
            if let Some(fut) = running {
                fut
            } else {
                let msg = self.store().get_message(&mcid)?;
                let ci = self.store().by_channel_id(&msg.channel_id)?;
                if msg.received {
                    return msg_outcome(&ci, &msg);
                }
                self.watch_msg(ci.id.clone(), mcid, MsgKind::of(&ci, mcid))
            }
        };
        fut.await
    }

    async fn wait_msg(self: Arc<Self>, channel_id: String, mcid: Cid, kind: MsgKind) -> Result<Address, Error> {
        let res = match self
            .chain()
            .wait_for_message(&mcid, self.state.config.message_confidence)
            .await
        {
            Ok(lookup) => self.msg_wait_completed(&channel_id, mcid, &kind, lookup).await,
            Err(e) => {
                warn!(%channel_id, %mcid, "waiting for message failed: {e:#}");
                Err(Error::MsgWait {
                    mcid,
                    reason: format!("{e:#}"),
                })
            }
        };
        // later waiters read the recorded outcome, or start a new watcher
        // if nothing was recorded
        self.watchers.lock().remove(&mcid);
        self.msg_listeners
            .fire_msg_complete(mcid, res.as_ref().map(|_| ()).map_err(Clone::clone));

        if kind.is_funding() {
            match &res {
                Err(e) if e.is_transient() => self.fail_queue(e),
                _ => self.process_queue().await,
            }
        }
        res
    }

    /// Applies the outcome of an executed message. Applying the same message
    /// twice returns the recorded outcome without touching the channel.
    async fn msg_wait_completed(
        &self,
        channel_id: &str,
        mcid: Cid,
        kind: &MsgKind,
        lookup: MessageLookup,
    ) -> Result<Address, Error> {
        let _guard = self.lock.lock().await;
        let mut msg = self.store().get_message(&mcid)?;
        let mut ci = self.store().by_channel_id(channel_id)?;
        if msg.received {
            return msg_outcome(&ci, &msg);
        }

        msg.received = true;
        let res = match kind {
            MsgKind::Create | MsgKind::AddFunds => self.apply_funding_msg(&mut ci, mcid, &lookup),
            _ => self.apply_settlement_msg(&mut ci, mcid, kind, &lookup),
        };
        if let Err(e) = &res {
            msg.err = e.to_string();
            if let Error::MsgFailed { exit_code, .. } = e {
                msg.exit_code = Some(exit_code.value());
            }
        }
        self.store().put_channel_and_message(&ci, &msg)?;
        res
    }

    /// Lane states on chain with the locally stored vouchers applied on top.
    async fn lane_states(&self, ci: &ChannelInfo) -> Result<HashMap<u64, LaneState>, Error> {
        let mut lane_states = self.chain_lane_states(ci).await?;

        for v in &ci.vouchers {
            if !v.voucher.merges.is_empty() {
                return Err(Error::Other("voucher has already been merged".into()));
            }
            let ls = lane_states.entry(v.voucher.lane).or_default();
            if v.voucher.nonce < ls.nonce {
                continue;
            }
            ls.nonce = v.voucher.nonce;
            ls.redeemed = v.voucher.amount.clone();
        }
        Ok(lane_states)
    }

    async fn chain_lane_states(&self, ci: &ChannelInfo) -> Result<HashMap<u64, LaneState>, Error> {
        match ci.channel {
            Some(ch) => Ok(self
                .chain()
                .channel_state(&ch)
                .await
                .map_err(Error::chain)?
                .lane_states),
            None => Ok(HashMap::default()),
        }
    }
}

/// Total amount owed by the channel if `sv` were redeemed on top of
/// `lane_states`.
fn total_redeemed_with_voucher(
    lane_states: &HashMap<u64, LaneState>,
    sv: &SignedVoucher,
) -> Result<TokenAmount, Error> {
    if !sv.merges.is_empty() {
        return Err(Error::InvalidVoucher("merges not supported yet".into()));
    }

    let total = lane_states
        .values()
        .fold(TokenAmount::default(), |acc, ls| &acc + &ls.redeemed);
    Ok(match lane_states.get(&sv.lane) {
        // the voucher replaces the lane's redeemed amount
        Some(ls) if sv.nonce > ls.nonce => &total + &(&sv.amount - &ls.redeemed),
        Some(_) => total,
        None => &total + &sv.amount,
    })
}

/// Recorded outcome of an executed message.
fn msg_outcome(ci: &ChannelInfo, msg: &MsgInfo) -> Result<Address, Error> {
    match msg.exit_code {
        Some(code) => Err(Error::MsgFailed {
            mcid: msg.mcid,
            exit_code: ExitCode::new(code),
        }),
        None if !msg.err.is_empty() => Err(Error::Other(msg.err.clone())),
        None => ci.channel_addr(),
    }
}
