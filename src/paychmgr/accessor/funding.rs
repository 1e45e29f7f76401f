// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{ChannelAccessor, MsgFuture, MsgKind};
use crate::db::SettingsStore;
use crate::paychmgr::{
    ChainGateway, ChannelAvailableFunds, ChannelInfo, Error, FundsReq, MergeFundsReq,
    MessageLookup, MsgInfo,
};
use crate::shim::{address::Address, econ::TokenAmount};
use cid::Cid;
use futures::future::FutureExt as _;
use num_traits::Zero as _;
use std::{fmt, sync::Arc};
use tracing::{error, info, warn};

/// Handle returned by a funding request, redeemed with `wait_ready`.
///
/// Cloning is cheap and every clone observes the same outcome.
#[derive(Clone)]
pub struct WaitSentinel {
    channel_id: String,
    kind: SentinelKind,
}

#[derive(Clone)]
enum SentinelKind {
    /// Capacity already sufficed, nothing was sent.
    Ready(Address),
    /// Funds arrive with this create or add-funds message.
    Message(Cid),
    /// The request waits behind another funding message.
    Queued(MsgFuture),
}

impl WaitSentinel {
    fn ready(channel_id: String, ch: Address) -> Self {
        Self {
            channel_id,
            kind: SentinelKind::Ready(ch),
        }
    }

    pub(in crate::paychmgr) fn message(channel_id: String, mcid: Cid) -> Self {
        Self {
            channel_id,
            kind: SentinelKind::Message(mcid),
        }
    }

    /// Channel the request was made against.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Funding message the sentinel waits on, if one was sent for it.
    pub fn mcid(&self) -> Option<Cid> {
        match &self.kind {
            SentinelKind::Message(mcid) => Some(*mcid),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.kind, SentinelKind::Ready(_))
    }
}

impl fmt::Debug for WaitSentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("WaitSentinel");
        d.field("channel_id", &self.channel_id);
        match &self.kind {
            SentinelKind::Ready(ch) => d.field("ready", ch),
            SentinelKind::Message(mcid) => d.field("message", mcid),
            SentinelKind::Queued(_) => d.field("queued", &true),
        };
        d.finish()
    }
}

impl PartialEq for WaitSentinel {
    fn eq(&self, other: &Self) -> bool {
        self.channel_id == other.channel_id
            && match (&self.kind, &other.kind) {
                (SentinelKind::Ready(a), SentinelKind::Ready(b)) => a == b,
                (SentinelKind::Message(a), SentinelKind::Message(b)) => a == b,
                (SentinelKind::Queued(a), SentinelKind::Queued(b)) => a.ptr_eq(b),
                _ => false,
            }
    }
}

/// Response to a channel or add funds request.
#[derive(Clone, Debug, PartialEq)]
pub struct PaychFundsRes {
    /// Address of the channel, `None` until its create message executes.
    pub channel: Option<Address>,
    pub wait_sentinel: WaitSentinel,
}

/// Where a funding request left the channel.
enum FundStep {
    /// Capacity already covers the request.
    Ready(ChannelInfo),
    /// The funding message `Cid` covers the request once it executes.
    Pending(ChannelInfo, Cid),
    /// A message is in flight that does not cover the request.
    Busy(ChannelInfo, Cid),
}

impl<DB, C> ChannelAccessor<DB, C>
where
    DB: SettingsStore + Send + Sync + 'static,
    C: ChainGateway,
{
    /// Ensures the outbound channel from `from` to `to` can cover `amt`,
    /// creating or topping it up as needed. Never blocks on confirmation.
    ///
    /// With `reserve_only` nothing is sent: the call succeeds only if the
    /// funds not yet promised by vouchers already cover `amt`.
    pub async fn get_paych(
        self: &Arc<Self>,
        amt: TokenAmount,
        reserve_only: bool,
    ) -> Result<PaychFundsRes, Error> {
        let _guard = self.lock.lock().await;
        let ci = self.active_channel()?;
        if reserve_only {
            return self.reserve_funds(ci, &amt).await;
        }

        Ok(match self.fund(ci, &amt).await? {
            FundStep::Ready(ci) => {
                let ch = ci.channel_addr()?;
                PaychFundsRes {
                    channel: Some(ch),
                    wait_sentinel: WaitSentinel::ready(ci.id, ch),
                }
            }
            FundStep::Pending(ci, mcid) => PaychFundsRes {
                channel: ci.channel,
                wait_sentinel: WaitSentinel::message(ci.id, mcid),
            },
            FundStep::Busy(ci, mcid) => {
                // whoever confirms the in-flight message serves the queue
                let _ = self.watch_msg(ci.id.clone(), mcid, MsgKind::of(&ci, mcid));
                let (req, rx) = FundsReq::new(amt);
                self.funds_req_queue.lock().push(req);
                let fut = rx
                    .map(|res| {
                        res.unwrap_or_else(|_| Err(Error::Other("funding request dropped".into())))
                    })
                    .boxed()
                    .shared();
                PaychFundsRes {
                    channel: ci.channel,
                    wait_sentinel: WaitSentinel {
                        channel_id: ci.id,
                        kind: SentinelKind::Queued(fut),
                    },
                }
            }
        })
    }

    /// Blocks until the funds behind `sentinel` are confirmed.
    pub async fn wait_ready(self: &Arc<Self>, sentinel: &WaitSentinel) -> Result<Address, Error> {
        match &sentinel.kind {
            SentinelKind::Ready(ch) => Ok(*ch),
            SentinelKind::Message(mcid) => self.wait_ready_msg(*mcid).await,
            SentinelKind::Queued(fut) => fut.clone().await,
        }
    }

    /// Blocks until the funding message `mcid` is confirmed. Returns the
    /// recorded outcome straight away if it already was.
    pub async fn wait_ready_msg(self: &Arc<Self>, mcid: Cid) -> Result<Address, Error> {
        self.wait_msg_outcome(mcid).await
    }

    /// Funds snapshot of the active channel, or of none.
    pub async fn available_funds(self: &Arc<Self>) -> Result<ChannelAvailableFunds, Error> {
        let ci = {
            let _guard = self.lock.lock().await;
            self.active_channel()?
        };
        match ci {
            Some(ci) => self.current_available_funds(&ci).await,
            None => Ok(ChannelAvailableFunds::empty(self.from, self.to)),
        }
    }

    pub async fn current_available_funds(
        &self,
        ci: &ChannelInfo,
    ) -> Result<ChannelAvailableFunds, Error> {
        let lane_states = self.lane_states(ci).await?;
        let voucher_redeemed_amt = lane_states
            .values()
            .fold(TokenAmount::default(), |acc, ls| &acc + &ls.redeemed);

        let queued = {
            let mut queue = self.funds_req_queue.lock();
            queue.retain(FundsReq::is_active);
            queue
                .iter()
                .map(|r| r.amt().clone())
                .max()
                .unwrap_or_default()
        };
        let capacity = ci.capacity();
        let queued_amt = if queued > capacity {
            &queued - &capacity
        } else {
            TokenAmount::default()
        };

        Ok(ChannelAvailableFunds {
            channel: ci.channel,
            from: ci.from(),
            to: ci.to(),
            confirmed_amt: ci.amount.clone(),
            pending_amt: ci.pending_amount.clone(),
            pending_wait_sentinel: ci.pending_funding_msg(),
            queued_amt,
            voucher_redeemed_amt,
        })
    }

    fn active_channel(&self) -> Result<Option<ChannelInfo>, Error> {
        match self.store().outbound_active_by_from_to(&self.from, &self.to) {
            Ok(ci) => Ok(Some(ci)),
            Err(Error::ChannelNotTracked) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn reserve_funds(
        &self,
        ci: Option<ChannelInfo>,
        amt: &TokenAmount,
    ) -> Result<PaychFundsRes, Error> {
        let Some(ci) = ci else {
            return Err(Error::InsufficientFunds {
                required: amt.clone(),
                available: TokenAmount::default(),
            });
        };
        let funds = self.current_available_funds(&ci).await?;
        let available = funds.spendable();
        if &available < amt {
            return Err(Error::InsufficientFunds {
                required: amt.clone(),
                available,
            });
        }
        let wait_sentinel = match ci.pending_funding_msg() {
            Some(mcid) => WaitSentinel::message(ci.id.clone(), mcid),
            None => WaitSentinel::ready(ci.id.clone(), ci.channel_addr()?),
        };
        Ok(PaychFundsRes {
            channel: ci.channel,
            wait_sentinel,
        })
    }

    /// Sends whatever message brings the channel up to `required`.
    /// Caller holds the accessor lock.
    async fn fund(
        self: &Arc<Self>,
        ci: Option<ChannelInfo>,
        required: &TokenAmount,
    ) -> Result<FundStep, Error> {
        let Some(mut ci) = ci else {
            let (ci, mcid) = self.create_paych(required).await?;
            return Ok(FundStep::Pending(ci, mcid));
        };

        let capacity = ci.capacity();
        if let Some(mcid) = ci.pending_funding_msg() {
            return Ok(if &capacity >= required {
                FundStep::Pending(ci, mcid)
            } else {
                FundStep::Busy(ci, mcid)
            });
        }
        if !ci.pending_amount.is_zero() {
            // sent, or about to be, without a recorded message to wait on
            return Err(Error::UnrecordedFunding(ci.id));
        }
        if &capacity >= required {
            return Ok(FundStep::Ready(ci));
        }
        let mcid = self.add_funds(&mut ci, required - &capacity).await?;
        Ok(FundStep::Pending(ci, mcid))
    }

    /// Sends a message to create the channel and returns the message cid.
    ///
    /// The channel is on record with its pending amount before the message
    /// is sent.
    async fn create_paych(
        self: &Arc<Self>,
        amt: &TokenAmount,
    ) -> Result<(ChannelInfo, Cid), Error> {
        let mut ci = self.store().create_channel(self.from, self.to, amt.clone())?;
        let mcid = match self.chain().send_create_channel(&self.from, &self.to, amt).await {
            Ok(mcid) => mcid,
            Err(e) => {
                error!(from = %self.from, to = %self.to, "failed to send create channel message: {e:#}");
                ci.pending_amount = TokenAmount::default();
                ci.retired = true;
                self.roll_back(&ci);
                return Err(Error::chain(e));
            }
        };

        ci.create_msg = Some(mcid);
        self.record_funding_msg(&ci, mcid)?;
        info!(
            channel_id = %ci.id,
            %mcid,
            from = %self.from,
            to = %self.to,
            amount = %amt.atto(),
            "sent create payment channel message"
        );
        let _ = self.watch_msg(ci.id.clone(), mcid, MsgKind::Create);
        Ok((ci, mcid))
    }

    /// Records `amt` as pending and sends a message to add it to the
    /// channel.
    async fn add_funds(self: &Arc<Self>, ci: &mut ChannelInfo, amt: TokenAmount) -> Result<Cid, Error> {
        let ch = ci.channel_addr()?;
        ci.pending_amount = &ci.pending_amount + &amt;
        self.store().put_channel_info(ci)?;

        let mcid = match self.chain().send_add_funds(&ci.control, &ch, &amt).await {
            Ok(mcid) => mcid,
            Err(e) => {
                error!(channel = %ch, "failed to send add funds message: {e:#}");
                ci.pending_amount = &ci.pending_amount - &amt;
                self.roll_back(ci);
                return Err(Error::chain(e));
            }
        };

        ci.add_funds_msg = Some(mcid);
        self.record_funding_msg(ci, mcid)?;
        info!(channel = %ch, %mcid, amount = %amt.atto(), "sent add funds message");
        let _ = self.watch_msg(ci.id.clone(), mcid, MsgKind::AddFunds);
        Ok(mcid)
    }

    /// Attaches the sent funding message `mcid` to `ci`.
    fn record_funding_msg(&self, ci: &ChannelInfo, mcid: Cid) -> Result<(), Error> {
        self.store()
            .put_channel_and_message(ci, &MsgInfo::new(ci.id.clone(), mcid))
            .inspect_err(|e| {
                error!(channel_id = %ci.id, %mcid, "sent funding message but failed to record it: {e}");
            })
    }

    /// Writes back `ci` after a rejected send. If that fails too the
    /// pending amount stays without a message and the channel refuses
    /// further funding.
    fn roll_back(&self, ci: &ChannelInfo) {
        if let Err(e) = self.store().put_channel_info(ci) {
            error!(channel_id = %ci.id, "failed to roll back pending funding: {e}");
        }
    }

    /// Moves the outcome of a create or add-funds message into `ci`.
    pub(super) fn apply_funding_msg(
        &self,
        ci: &mut ChannelInfo,
        mcid: Cid,
        lookup: &MessageLookup,
    ) -> Result<Address, Error> {
        let is_create = ci.create_msg == Some(mcid);
        if !is_create && ci.add_funds_msg != Some(mcid) {
            return Err(Error::Other(format!(
                "message {mcid} is not a pending funding message of channel {}",
                ci.id
            )));
        }
        if is_create {
            ci.create_msg = None;
        } else {
            ci.add_funds_msg = None;
        }
        let pending = std::mem::take(&mut ci.pending_amount);

        let created = match (is_create, lookup.channel) {
            (true, Some(ch)) => Some(ch),
            (true, None) if lookup.exit_code.is_success() => {
                ci.retired = true;
                return Err(Error::Other(format!(
                    "create message {mcid} did not return a channel address"
                )));
            }
            _ => None,
        };

        if !lookup.exit_code.is_success() {
            if is_create {
                ci.retired = true;
            }
            warn!(
                channel_id = %ci.id,
                %mcid,
                exit_code = lookup.exit_code.value(),
                pending = %pending.atto(),
                "funding message failed"
            );
            return Err(Error::MsgFailed {
                mcid,
                exit_code: lookup.exit_code,
            });
        }

        if let Some(ch) = created {
            ci.channel = Some(ch);
        }
        ci.amount = &ci.amount + &pending;
        info!(
            channel_id = %ci.id,
            %mcid,
            amount = %ci.amount.atto(),
            "funding message confirmed"
        );
        ci.channel_addr()
    }

    /// Serves queued requests with a single message after a funding message
    /// completed.
    pub(super) async fn process_queue(self: &Arc<Self>) {
        let reqs = std::mem::take(&mut *self.funds_req_queue.lock());
        let Some(merged) = MergeFundsReq::new(reqs) else {
            return;
        };

        let required = merged.required();
        let step = {
            let _guard = self.lock.lock().await;
            match self.active_channel() {
                Ok(ci) => self.fund(ci, &required).await,
                Err(e) => Err(e),
            }
        };
        match step {
            Err(e) => merged.on_complete(Err(e)),
            Ok(FundStep::Ready(ci)) => merged.on_complete(ci.channel_addr()),
            Ok(FundStep::Busy(ci, mcid)) => {
                self.funds_req_queue.lock().extend(merged.into_reqs());
                let _ = self.watch_msg(ci.id.clone(), mcid, MsgKind::of(&ci, mcid));
            }
            Ok(FundStep::Pending(ci, mcid)) => {
                let fut = self.watch_msg(ci.id.clone(), mcid, MsgKind::of(&ci, mcid));
                tokio::spawn(async move { merged.on_complete(fut.await) });
            }
        }
    }

    /// Fails every queued request with `err`.
    pub(super) fn fail_queue(&self, err: &Error) {
        let reqs = std::mem::take(&mut *self.funds_req_queue.lock());
        if let Some(merged) = MergeFundsReq::new(reqs) {
            merged.on_complete(Err(err.clone()));
        }
    }
}
