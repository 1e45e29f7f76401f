// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{ChannelAccessor, MsgKind};
use crate::db::SettingsStore;
use crate::paychmgr::{ChainGateway, ChannelInfo, Error, MessageLookup, MsgInfo, SignedVoucher};
use crate::shim::{address::Address, econ::TokenAmount};
use cid::Cid;
use std::sync::Arc;
use tracing::{error, info, warn};

impl<DB, C> ChannelAccessor<DB, C>
where
    DB: SettingsStore + Send + Sync + 'static,
    C: ChainGateway,
{
    /// Starts the challenge period of channel `ch`.
    ///
    /// While a settle message is in flight, calling again returns that
    /// message instead of sending another one.
    pub async fn settle(self: &Arc<Self>, ch: &Address) -> Result<Cid, Error> {
        let _guard = self.lock.lock().await;
        let mut ci = self.store().by_address(ch)?;
        if ci.retired {
            return Err(Error::ChannelSettled(*ch));
        }
        if ci.settling {
            return Err(Error::ChannelSettling(*ch));
        }
        if let Some(mcid) = ci.settle_msg {
            return Ok(mcid);
        }

        let mcid = self
            .chain()
            .send_settle(&ci.control, ch)
            .await
            .map_err(|e| {
                error!(channel = %ch, "failed to send settle message: {e:#}");
                Error::chain(e)
            })?;
        ci.settle_msg = Some(mcid);
        self.record_msg(&ci, mcid, MsgKind::Settle)?;
        info!(channel = %ch, %mcid, "sent settle message");
        Ok(mcid)
    }

    /// Withdraws the channel balance once the challenge period is over.
    pub async fn collect(self: &Arc<Self>, ch: &Address) -> Result<Cid, Error> {
        let _guard = self.lock.lock().await;
        let mut ci = self.store().by_address(ch)?;
        if ci.retired {
            return Err(Error::ChannelSettled(*ch));
        }
        if let Some(mcid) = ci.collect_msg {
            return Ok(mcid);
        }
        if !ci.settling {
            return Err(Error::NotSettling(*ch));
        }

        let settling_at = self
            .chain()
            .channel_state(ch)
            .await
            .map_err(Error::chain)?
            .settling_at;
        let head = self.chain().head_epoch().await.map_err(Error::chain)?;
        if settling_at == 0 || head < settling_at {
            return Err(Error::ChallengePeriod {
                channel: *ch,
                settling_at,
                head,
            });
        }

        let mcid = self
            .chain()
            .send_collect(&ci.control, ch)
            .await
            .map_err(|e| {
                error!(channel = %ch, "failed to send collect message: {e:#}");
                Error::chain(e)
            })?;
        ci.collect_msg = Some(mcid);
        self.record_msg(&ci, mcid, MsgKind::Collect)?;
        info!(channel = %ch, %mcid, "sent collect message");
        Ok(mcid)
    }

    /// Submits `sv` for redemption on chain. Unknown vouchers are validated
    /// and stored first.
    pub async fn submit_voucher(
        self: &Arc<Self>,
        ch: &Address,
        sv: &SignedVoucher,
        secret: &[u8],
        proof: &[u8],
    ) -> Result<Cid, Error> {
        let _guard = self.lock.lock().await;
        let mut ci = self.store().by_address(ch)?;
        if ci.was_voucher_submitted(sv) {
            return Err(Error::AlreadySubmitted);
        }
        if !ci.has_voucher(sv) {
            self.add_voucher_unlocked(&mut ci, ch, sv.clone(), proof.to_vec(), &TokenAmount::default())
                .await?;
        }

        // marked before sending, a rejected send clears it again
        self.store().mark_voucher_submitted(&mut ci, sv)?;

        let mcid = match self.chain().send_voucher_submit(&ci.control, ch, sv, secret).await {
            Ok(mcid) => mcid,
            Err(e) => {
                error!(channel = %ch, lane = sv.lane, nonce = sv.nonce, "failed to submit voucher: {e:#}");
                ci.set_voucher_submitted(sv, false);
                if let Err(e) = self.store().put_channel_info(&ci) {
                    warn!(channel = %ch, "failed to roll back voucher submission: {e}");
                }
                return Err(Error::chain(e));
            }
        };
        ci.set_voucher_submit_msg(sv, Some(mcid));
        self.record_msg(&ci, mcid, MsgKind::Submit(Box::new(sv.clone())))?;
        info!(channel = %ch, %mcid, lane = sv.lane, nonce = sv.nonce, "submitted voucher");
        Ok(mcid)
    }

    /// Persists `ci` with the newly sent message `mcid` and watches it.
    fn record_msg(self: &Arc<Self>, ci: &ChannelInfo, mcid: Cid, kind: MsgKind) -> Result<(), Error> {
        self.store()
            .put_channel_and_message(ci, &MsgInfo::new(ci.id.clone(), mcid))
            .inspect_err(|e| error!(channel_id = %ci.id, %mcid, "sent message but failed to record it: {e}"))?;
        let _ = self.watch_msg(ci.id.clone(), mcid, kind);
        Ok(())
    }

    /// Moves the outcome of a settle, collect or submit message into `ci`.
    pub(super) fn apply_settlement_msg(
        &self,
        ci: &mut ChannelInfo,
        mcid: Cid,
        kind: &MsgKind,
        lookup: &MessageLookup,
    ) -> Result<Address, Error> {
        let ok = lookup.exit_code.is_success();
        match kind {
            MsgKind::Settle if ci.settle_msg == Some(mcid) => {
                ci.settle_msg = None;
                ci.settling |= ok;
            }
            MsgKind::Collect if ci.collect_msg == Some(mcid) => {
                ci.collect_msg = None;
                ci.retired |= ok;
            }
            MsgKind::Submit(sv) => {
                ci.set_voucher_submit_msg(sv, None);
                if !ok {
                    ci.set_voucher_submitted(sv, false);
                }
            }
            _ => {}
        }

        if !ok {
            warn!(
                channel_id = %ci.id,
                %mcid,
                exit_code = lookup.exit_code.value(),
                "channel message failed"
            );
            return Err(Error::MsgFailed {
                mcid,
                exit_code: lookup.exit_code,
            });
        }
        info!(channel_id = %ci.id, %mcid, settling = ci.settling, retired = ci.retired, "channel message confirmed");
        ci.channel_addr()
    }
}
