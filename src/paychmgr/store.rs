// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{ChannelInfo, Direction, Error, MsgInfo, SignedVoucher, VoucherInfo};
use crate::db::{SettingsStore, SettingsStoreExt};
use crate::shim::address::Address;
use cid::Cid;
use itertools::Itertools as _;

const CHANNEL_PREFIX: &str = "/paych/channel/";
const MSG_PREFIX: &str = "/paych/msg/";

fn channel_key(id: &str) -> String {
    format!("{CHANNEL_PREFIX}{id}")
}

fn msg_key(mcid: &Cid) -> String {
    format!("{MSG_PREFIX}{mcid}")
}

/// Durable payment channel records.
///
/// Every method is a single read or an atomic write; callers serialize
/// read-modify-write sequences on a channel themselves.
pub struct PaychStore<DB> {
    db: DB,
}

impl<DB: SettingsStore> PaychStore<DB> {
    pub fn new(db: DB) -> Self {
        PaychStore { db }
    }

    /// Upserts a channel record.
    pub fn put_channel_info(&self, ci: &ChannelInfo) -> Result<(), Error> {
        self.db
            .write_obj(&channel_key(&ci.id), ci)
            .map_err(Error::store)
    }

    /// Writes a channel record and a message record in one commit.
    pub fn put_channel_and_message(&self, ci: &ChannelInfo, msg: &MsgInfo) -> Result<(), Error> {
        let entries = [
            (channel_key(&ci.id), fvm_ipld_encoding::to_vec(ci)?),
            (msg_key(&msg.mcid), fvm_ipld_encoding::to_vec(msg)?),
        ];
        self.db.write_bins(&entries).map_err(Error::store)
    }

    /// Records a new outbound channel about to be created with `amt`. The
    /// create message is attached with [`PaychStore::put_channel_and_message`]
    /// once it has been sent.
    pub fn create_channel(
        &self,
        from: Address,
        to: Address,
        amt: crate::shim::econ::TokenAmount,
    ) -> Result<ChannelInfo, Error> {
        let mut ci = ChannelInfo::new_outbound(from, to);
        ci.pending_amount = amt;
        self.put_channel_info(&ci)?;
        Ok(ci)
    }

    /// Starts tracking an inbound channel, failing if it is already known.
    pub fn track_channel(&self, ci: &ChannelInfo) -> Result<(), Error> {
        let ch = ci.channel_addr()?;
        match self.by_address(&ch) {
            Err(Error::ChannelNotTracked) => self.put_channel_info(ci),
            Ok(_) => Err(Error::AlreadyTracked(ch)),
            Err(e) => Err(e),
        }
    }

    /// Marks a channel as retired. The record stays readable but is never
    /// selected for funding again.
    pub fn remove_channel(&self, channel_id: &str) -> Result<(), Error> {
        let mut ci = self.by_channel_id(channel_id)?;
        ci.retired = true;
        self.put_channel_info(&ci)
    }

    pub fn by_channel_id(&self, channel_id: &str) -> Result<ChannelInfo, Error> {
        self.db
            .read_obj(&channel_key(channel_id))
            .map_err(Error::store)?
            .ok_or(Error::ChannelNotTracked)
    }

    pub fn by_address(&self, ch: &Address) -> Result<ChannelInfo, Error> {
        self.find_channel(|ci| ci.channel.as_ref() == Some(ch))?
            .ok_or(Error::ChannelNotTracked)
    }

    /// Channel that sent the message `mcid`.
    pub fn by_message_cid(&self, mcid: &Cid) -> Result<ChannelInfo, Error> {
        let msg = self.get_message(mcid)?;
        self.by_channel_id(&msg.channel_id)
    }

    /// The outbound channel currently used to pay `to` from `from`.
    pub fn outbound_active_by_from_to(
        &self,
        from: &Address,
        to: &Address,
    ) -> Result<ChannelInfo, Error> {
        self.find_channel(|ci| {
            ci.direction == Direction::Outbound
                && ci.is_open()
                && &ci.control == from
                && &ci.target == to
        })?
        .ok_or(Error::ChannelNotTracked)
    }

    /// Channels with a create or add-funds message in flight.
    pub fn with_pending_add_funds(&self) -> Result<Vec<ChannelInfo>, Error> {
        self.find_channels(|ci| ci.pending_funding_msg().is_some())
    }

    /// Channels with any message in flight.
    pub fn with_pending_messages(&self) -> Result<Vec<ChannelInfo>, Error> {
        self.find_channels(ChannelInfo::has_pending_messages)
    }

    /// Addresses of every active channel that has landed on chain.
    pub fn list_channels(&self) -> Result<Vec<Address>, Error> {
        Ok(self
            .find_channels(|ci| !ci.retired)?
            .into_iter()
            .filter_map(|ci| ci.channel)
            .sorted_by_key(|addr| addr.to_string())
            .collect())
    }

    /// Every channel record, retired ones included.
    pub fn list_channel_infos(&self) -> Result<Vec<ChannelInfo>, Error> {
        self.find_channels(|_| true)
    }

    pub fn find_channel(
        &self,
        filter: impl Fn(&ChannelInfo) -> bool,
    ) -> Result<Option<ChannelInfo>, Error> {
        Ok(self.find_channels(filter)?.into_iter().next())
    }

    fn find_channels(&self, filter: impl Fn(&ChannelInfo) -> bool) -> Result<Vec<ChannelInfo>, Error> {
        let keys = self.db.setting_keys().map_err(Error::store)?;
        let mut out = Vec::new();
        for key in keys.iter().filter(|k| k.starts_with(CHANNEL_PREFIX)) {
            if let Some(ci) = self.db.read_obj::<ChannelInfo>(key).map_err(Error::store)?
                && filter(&ci)
            {
                out.push(ci);
            }
        }
        Ok(out)
    }

    /// Hands out the next unused lane of channel `ch`.
    pub fn allocate_lane(&self, ch: &Address) -> Result<u64, Error> {
        let mut ci = self.by_address(ch)?;
        let lane = ci.next_lane;
        ci.next_lane += 1;
        self.put_channel_info(&ci)?;
        Ok(lane)
    }

    pub fn vouchers_for_paych(&self, ch: &Address) -> Result<Vec<VoucherInfo>, Error> {
        Ok(self.by_address(ch)?.vouchers)
    }

    pub fn mark_voucher_submitted(
        &self,
        ci: &mut ChannelInfo,
        sv: &SignedVoucher,
    ) -> Result<(), Error> {
        if !ci.set_voucher_submitted(sv, true) {
            return Err(Error::InvalidVoucher(
                "cannot submit voucher that is not tracked".into(),
            ));
        }
        self.put_channel_info(ci)
    }

    pub fn get_message(&self, mcid: &Cid) -> Result<MsgInfo, Error> {
        self.db
            .read_obj(&msg_key(mcid))
            .map_err(Error::store)?
            .ok_or(Error::MsgNotFound(*mcid))
    }
}
