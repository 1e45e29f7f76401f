// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{ChannelAccessor, total_redeemed_with_voucher};
use crate::db::SettingsStore;
use crate::paychmgr::{
    ChainGateway, ChannelInfo, Direction, Error, LaneState, ModVerifyParams, SignedVoucher,
    VoucherInfo,
};
use crate::shim::{address::Address, clock::ChainEpoch, econ::TokenAmount};
use ahash::HashMap;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Terms of a voucher to create. Lane and amount are required, the rest
/// defaults to an unconstrained voucher.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoucherSpec {
    pub lane: u64,
    /// Cumulative amount owed on the lane.
    pub amount: TokenAmount,
    pub time_lock_min: ChainEpoch,
    pub time_lock_max: ChainEpoch,
    pub min_settle_height: ChainEpoch,
    pub secret_pre_image: Vec<u8>,
    pub extra: Option<ModVerifyParams>,
}

impl VoucherSpec {
    pub fn new(lane: u64, amount: TokenAmount) -> Self {
        Self {
            lane,
            amount,
            ..Default::default()
        }
    }
}

/// Result of a voucher creation: either a signed voucher, or the amount by
/// which the channel falls short of covering it.
#[derive(Clone, Debug, PartialEq)]
pub struct VoucherCreateResult {
    pub voucher: Option<SignedVoucher>,
    pub shortfall: TokenAmount,
}

impl<DB, C> ChannelAccessor<DB, C>
where
    DB: SettingsStore + Send + Sync + 'static,
    C: ChainGateway,
{
    /// Hands out a fresh lane on channel `ch`.
    pub async fn allocate_lane(&self, ch: &Address) -> Result<u64, Error> {
        let _guard = self.lock.lock().await;
        let ci = self.store().by_address(ch)?;
        ensure_open(&ci, ch)?;
        let lane = self.store().allocate_lane(ch)?;
        debug!(channel = %ch, lane, "allocated lane");
        Ok(lane)
    }

    /// Nonce the next voucher on `lane` must carry.
    pub async fn next_sequence_for_lane(&self, ch: &Address, lane: u64) -> Result<u64, Error> {
        let _guard = self.lock.lock().await;
        let ci = self.store().by_address(ch)?;
        let lane_states = self.lane_states(&ci).await?;
        Ok(next_nonce(&lane_states, lane))
    }

    /// Creates a voucher with the given terms, setting its nonce, signing it
    /// with the payer's key and storing it.
    ///
    /// If the channel does not hold enough funds, nothing is stored and the
    /// shortfall is returned instead.
    pub async fn create_voucher(
        &self,
        ch: &Address,
        spec: VoucherSpec,
    ) -> Result<VoucherCreateResult, Error> {
        let _guard = self.lock.lock().await;
        let mut ci = self.store().by_address(ch)?;
        if ci.direction != Direction::Outbound {
            return Err(Error::WrongDirection(format!(
                "cannot create voucher for inbound channel {ch}"
            )));
        }
        ensure_open(&ci, ch)?;
        if spec.lane >= ci.next_lane {
            return Err(Error::InvalidLane {
                lane: spec.lane,
                next_lane: ci.next_lane,
            });
        }

        let lane_states = self.lane_states(&ci).await?;
        let mut sv = SignedVoucher {
            channel_addr: *ch,
            time_lock_min: spec.time_lock_min,
            time_lock_max: spec.time_lock_max,
            secret_pre_image: spec.secret_pre_image,
            extra: spec.extra,
            lane: spec.lane,
            nonce: next_nonce(&lane_states, spec.lane),
            amount: spec.amount,
            min_settle_height: spec.min_settle_height,
            merges: Vec::new(),
            signature: None,
        };

        let total = total_redeemed_with_voucher(&lane_states, &sv)?;
        let capacity = ci.capacity();
        if total > capacity {
            let shortfall = &total - &capacity;
            debug!(channel = %ch, shortfall = %shortfall.atto(), "not enough funds to create voucher");
            return Ok(VoucherCreateResult {
                voucher: None,
                shortfall,
            });
        }

        let sig = self.state.wallet.lock().sign(&ci.control, &sv.signing_bytes()?)?;
        sv.signature = Some(sig);

        self.add_voucher_unlocked(&mut ci, ch, sv.clone(), Vec::new(), &TokenAmount::default())
            .await?;
        info!(channel = %ch, lane = sv.lane, nonce = sv.nonce, amount = %sv.amount.atto(), "created voucher");
        Ok(VoucherCreateResult {
            voucher: Some(sv),
            shortfall: TokenAmount::default(),
        })
    }

    /// Checks that `sv` could be stored on channel `ch`, without storing it.
    pub async fn check_voucher_valid(&self, ch: &Address, sv: &SignedVoucher) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let ci = self.store().by_address(ch)?;
        self.check_voucher_valid_unlocked(&ci, ch, sv).await.map(|_| ())
    }

    /// Validates and stores `sv`, returning the amount it adds over the
    /// lane's highest previously accepted voucher.
    pub async fn add_voucher(
        &self,
        ch: &Address,
        sv: SignedVoucher,
        proof: Vec<u8>,
        min_delta: &TokenAmount,
    ) -> Result<TokenAmount, Error> {
        let _guard = self.lock.lock().await;
        let mut ci = self.store().by_address(ch)?;
        self.add_voucher_unlocked(&mut ci, ch, sv, proof, min_delta).await
    }

    pub(super) async fn add_voucher_unlocked(
        &self,
        ci: &mut ChannelInfo,
        ch: &Address,
        sv: SignedVoucher,
        proof: Vec<u8>,
        min_delta: &TokenAmount,
    ) -> Result<TokenAmount, Error> {
        // re-adding a stored voucher is a no-op, the proof can be filled in
        if let Some(vi) = ci.vouchers.iter_mut().find(|vi| vi.voucher == sv) {
            if vi.proof.is_empty() && !proof.is_empty() {
                vi.proof = proof;
                self.store().put_channel_info(ci)?;
            }
            debug!(channel = %ch, lane = sv.lane, nonce = sv.nonce, "voucher already stored");
            return Ok(TokenAmount::default());
        }
        ensure_open(ci, ch)?;

        let lane_states = self.check_voucher_valid_unlocked(ci, ch, &sv).await?;
        let redeemed = lane_states
            .get(&sv.lane)
            .map(|ls| ls.redeemed.clone())
            .unwrap_or_default();
        let delta = &sv.amount - &redeemed;
        if &delta < min_delta {
            return Err(Error::LowDelta {
                delta,
                min_delta: min_delta.clone(),
            });
        }

        if ci.next_lane <= sv.lane {
            ci.next_lane = sv.lane + 1;
        }
        ci.vouchers.push(VoucherInfo::new(sv, proof));
        self.store().put_channel_info(ci)?;
        Ok(delta)
    }

    /// Validates `sv` against the channel and returns the lane states it
    /// was checked against.
    ///
    /// Nonce ordering is checked before the signature, so a stale voucher is
    /// reported as such whatever its signature.
    async fn check_voucher_valid_unlocked(
        &self,
        ci: &ChannelInfo,
        ch: &Address,
        sv: &SignedVoucher,
    ) -> Result<HashMap<u64, LaneState>, Error> {
        if &sv.channel_addr != ch {
            return Err(Error::InvalidVoucher(format!(
                "voucher channel address {} doesn't match channel address {ch}",
                sv.channel_addr
            )));
        }

        let lane_states = self.lane_states(ci).await?;
        if let Some(ls) = lane_states.get(&sv.lane) {
            if ls.nonce >= sv.nonce {
                return Err(Error::InvalidVoucher(format!(
                    "nonce {} is too low, lane {} is at nonce {}",
                    sv.nonce, sv.lane, ls.nonce
                )));
            }
            if ls.redeemed > sv.amount {
                return Err(Error::InvalidVoucher(
                    "voucher amount is lower than amount for voucher with lower nonce".into(),
                ));
            }
        }
        if !sv.merges.is_empty() {
            return Err(Error::InvalidVoucher(
                "don't currently support paych lane merges".into(),
            ));
        }

        sv.verify(&ci.from())?;

        let total = total_redeemed_with_voucher(&lane_states, sv)?;
        let available = match ci.direction {
            Direction::Outbound => ci.capacity(),
            Direction::Inbound => self
                .chain()
                .channel_balance(ch)
                .await
                .map_err(Error::chain)?,
        };
        if total > available {
            return Err(Error::InsufficientFunds {
                required: total,
                available,
            });
        }
        Ok(lane_states)
    }

    /// Every stored voucher of `ch`, ordered by lane then nonce.
    pub async fn list_vouchers(&self, ch: &Address) -> Result<Vec<VoucherInfo>, Error> {
        let mut vouchers = self.store().vouchers_for_paych(ch)?;
        vouchers.sort_by_key(|vi| (vi.voucher.lane, vi.voucher.nonce));
        Ok(vouchers)
    }

    /// Per lane, the highest-nonce voucher that has not been submitted and
    /// is not superseded on chain.
    pub async fn best_spendable(&self, ch: &Address) -> Result<BTreeMap<u64, SignedVoucher>, Error> {
        let ci = self.store().by_address(ch)?;
        let chain_lanes = self.chain_lane_states(&ci).await?;
        Ok(best_spendable_vouchers(ci.vouchers, &chain_lanes))
    }

    /// Amount redeeming `sv` would add on top of what its lane already
    /// redeemed on chain or through submitted vouchers.
    pub async fn voucher_spendable_delta(
        &self,
        ch: &Address,
        sv: &SignedVoucher,
    ) -> Result<TokenAmount, Error> {
        let ci = self.store().by_address(ch)?;
        let chain_lanes = self.chain_lane_states(&ci).await?;
        let on_chain = chain_lanes
            .get(&sv.lane)
            .map(|ls| ls.redeemed.clone())
            .unwrap_or_default();
        let redeemed = ci
            .vouchers
            .iter()
            .filter(|vi| vi.submitted && vi.voucher.lane == sv.lane)
            .map(|vi| vi.voucher.amount.clone())
            .fold(on_chain, |acc, amt| if amt > acc { amt } else { acc });
        Ok(&sv.amount - &redeemed)
    }
}

/// Per lane, the highest-nonce voucher of `vouchers` that is neither
/// submitted nor superseded by `chain_lanes` or by a submitted voucher.
pub fn best_spendable_vouchers(
    vouchers: Vec<VoucherInfo>,
    chain_lanes: &HashMap<u64, LaneState>,
) -> BTreeMap<u64, SignedVoucher> {
    let mut redeemed_nonce: HashMap<u64, u64> = chain_lanes
        .iter()
        .map(|(lane, ls)| (*lane, ls.nonce))
        .collect();
    for vi in vouchers.iter().filter(|vi| vi.submitted) {
        let nonce = redeemed_nonce.entry(vi.voucher.lane).or_default();
        *nonce = (*nonce).max(vi.voucher.nonce);
    }

    let mut best: BTreeMap<u64, SignedVoucher> = BTreeMap::new();
    for sv in vouchers
        .into_iter()
        .filter(|vi| !vi.submitted)
        .map(|vi| vi.voucher)
    {
        if redeemed_nonce
            .get(&sv.lane)
            .is_some_and(|nonce| sv.nonce <= *nonce)
        {
            continue;
        }
        match best.get(&sv.lane) {
            Some(b) if b.nonce >= sv.nonce => {}
            _ => {
                best.insert(sv.lane, sv);
            }
        }
    }
    best
}

fn next_nonce(lane_states: &HashMap<u64, LaneState>, lane: u64) -> u64 {
    lane_states.get(&lane).map_or(1, |ls| ls.nonce + 1)
}

pub(super) fn ensure_open(ci: &ChannelInfo, ch: &Address) -> Result<(), Error> {
    if ci.is_open() {
        Ok(())
    } else {
        Err(Error::ChannelSettled(*ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vi(lane: u64, nonce: u64, amount: u64, submitted: bool) -> VoucherInfo {
        VoucherInfo {
            submitted,
            ..VoucherInfo::new(
                SignedVoucher::new(
                    Address::new_id(1001),
                    lane,
                    nonce,
                    TokenAmount::from_atto(amount),
                ),
                vec![],
            )
        }
    }

    #[test]
    fn highest_nonce_per_lane() {
        let vouchers = vec![
            vi(0, 3, 40, false),
            vi(0, 1, 10, true),
            vi(0, 2, 25, false),
            vi(1, 1, 5, false),
        ];
        let best = best_spendable_vouchers(vouchers, &HashMap::default());
        assert_eq!(best.len(), 2);
        assert_eq!(best[&0].nonce, 3);
        assert_eq!(best[&0].amount, TokenAmount::from_atto(40));
        assert_eq!(best[&1].nonce, 1);
    }

    #[test]
    fn superseded_vouchers_are_not_spendable() {
        let vouchers = vec![vi(0, 1, 10, false), vi(0, 2, 20, true), vi(1, 4, 30, false)];
        let mut chain_lanes = HashMap::default();
        chain_lanes.insert(
            1,
            LaneState {
                redeemed: TokenAmount::from_atto(35),
                nonce: 4,
            },
        );
        assert!(best_spendable_vouchers(vouchers, &chain_lanes).is_empty());
    }

    #[test]
    fn nonce_of_unknown_lane_starts_at_one() {
        let mut lane_states = HashMap::default();
        lane_states.insert(2, LaneState::default());
        assert_eq!(next_nonce(&lane_states, 0), 1);
        assert_eq!(next_nonce(&lane_states, 2), 1);
    }
}
