// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod scenario;

use super::*;
use crate::db::{MemoryDB, SettingsStore};
use crate::key_management::Wallet;
use crate::shim::{
    address::Address, clock::ChainEpoch, crypto::SignatureType, econ::TokenAmount,
    error::ExitCode,
};
use ahash::HashMap;
use anyhow::{Context as _, bail};
use async_trait::async_trait;
use cid::Cid;
use fvm_ipld_encoding::DAG_CBOR;
use multihash_codetable::{Code, MultihashDigest};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::watch;

/// Epochs between a confirmed settle and the earliest collect.
pub const SETTLE_DELAY: ChainEpoch = 10;

pub fn test_cid(n: u64) -> Cid {
    Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&n.to_be_bytes()))
}

pub fn atto(n: u64) -> TokenAmount {
    TokenAmount::from_atto(n)
}

/// A message as the mock chain received it.
#[derive(Clone, Debug, PartialEq)]
pub enum MsgOp {
    Create {
        from: Address,
        to: Address,
        amount: TokenAmount,
    },
    AddFunds {
        channel: Address,
        amount: TokenAmount,
    },
    Settle {
        channel: Address,
    },
    Collect {
        channel: Address,
    },
    Submit {
        channel: Address,
        voucher: SignedVoucher,
    },
}

struct MockMsg {
    op: MsgOp,
    exit_code: ExitCode,
    executed: Option<MessageLookup>,
}

struct MockChannel {
    from: Address,
    to: Address,
    balance: TokenAmount,
    settling_at: ChainEpoch,
    lane_states: HashMap<u64, LaneState>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    head: ChainEpoch,
    msgs: HashMap<Cid, MockMsg>,
    sent: Vec<MsgOp>,
    channels: HashMap<Address, MockChannel>,
    fail_next_exit: Option<ExitCode>,
    fail_next_waits: usize,
    fail_next_send: bool,
}

impl MockState {
    fn send(&mut self, op: MsgOp) -> anyhow::Result<Cid> {
        if std::mem::take(&mut self.fail_next_send) {
            bail!("message pool rejected message");
        }
        self.next_id += 1;
        let mcid = test_cid(self.next_id);
        let exit_code = self.fail_next_exit.take().unwrap_or(ExitCode::OK);
        self.sent.push(op.clone());
        self.msgs.insert(
            mcid,
            MockMsg {
                op,
                exit_code,
                executed: None,
            },
        );
        Ok(mcid)
    }

    fn new_channel(&mut self, from: Address, to: Address, balance: TokenAmount) -> Address {
        self.next_id += 1;
        let ch = Address::new_id(1000 + self.next_id);
        self.channels.insert(
            ch,
            MockChannel {
                from,
                to,
                balance,
                settling_at: 0,
                lane_states: HashMap::default(),
            },
        );
        ch
    }

    fn execute(&mut self, mcid: &Cid) -> anyhow::Result<MessageLookup> {
        let msg = self.msgs.get(mcid).context("unknown message")?;
        if let Some(lookup) = &msg.executed {
            return Ok(lookup.clone());
        }
        let (op, exit_code) = (msg.op.clone(), msg.exit_code);

        let mut channel = None;
        if exit_code.is_success() {
            match op {
                MsgOp::Create { from, to, amount } => {
                    channel = Some(self.new_channel(from, to, amount));
                }
                MsgOp::AddFunds { channel, amount } => {
                    let ch = self.channels.get_mut(&channel).context("no channel")?;
                    ch.balance = &ch.balance + &amount;
                }
                MsgOp::Settle { channel } => {
                    let head = self.head;
                    let ch = self.channels.get_mut(&channel).context("no channel")?;
                    ch.settling_at = head + SETTLE_DELAY;
                }
                MsgOp::Collect { channel } => {
                    let ch = self.channels.get_mut(&channel).context("no channel")?;
                    ch.balance = TokenAmount::default();
                }
                MsgOp::Submit { channel, voucher } => {
                    let ch = self.channels.get_mut(&channel).context("no channel")?;
                    ch.lane_states.insert(
                        voucher.lane,
                        LaneState {
                            redeemed: voucher.amount.clone(),
                            nonce: voucher.nonce,
                        },
                    );
                }
            }
        }

        let lookup = MessageLookup { exit_code, channel };
        if let Some(msg) = self.msgs.get_mut(mcid) {
            msg.executed = Some(lookup.clone());
        }
        Ok(lookup)
    }
}

/// In-memory chain that executes messages once they are waited on.
///
/// Messages can be held back with [`MockChain::hold`] to observe the
/// pending state.
pub struct MockChain {
    state: Mutex<MockState>,
    release: watch::Sender<bool>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            release: watch::channel(true).0,
        }
    }
}

impl MockChain {
    /// Blocks message execution until [`MockChain::release`].
    pub fn hold(&self) {
        self.release.send_replace(false);
    }

    pub fn release(&self) {
        self.release.send_replace(true);
    }

    /// The next message sent executes with `exit_code`.
    pub fn fail_next_with(&self, exit_code: ExitCode) {
        self.state.lock().fail_next_exit = Some(exit_code);
    }

    /// The next wait fails without executing the message.
    pub fn fail_next_wait(&self) {
        self.state.lock().fail_next_waits += 1;
    }

    pub fn fail_next_send(&self) {
        self.state.lock().fail_next_send = true;
    }

    pub fn set_head(&self, head: ChainEpoch) {
        self.state.lock().head = head;
    }

    pub fn sent(&self) -> Vec<MsgOp> {
        self.state.lock().sent.clone()
    }

    /// Deploys a channel as if someone else had created it.
    pub fn create_channel(&self, from: Address, to: Address, balance: TokenAmount) -> Address {
        self.state.lock().new_channel(from, to, balance)
    }

    pub fn settling_at(&self, ch: &Address) -> Option<ChainEpoch> {
        self.state.lock().channels.get(ch).map(|c| c.settling_at)
    }
}

#[async_trait]
impl ChainGateway for MockChain {
    async fn send_create_channel(
        &self,
        from: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> anyhow::Result<Cid> {
        self.state.lock().send(MsgOp::Create {
            from: *from,
            to: *to,
            amount: amount.clone(),
        })
    }

    async fn send_add_funds(
        &self,
        _from: &Address,
        channel: &Address,
        amount: &TokenAmount,
    ) -> anyhow::Result<Cid> {
        self.state.lock().send(MsgOp::AddFunds {
            channel: *channel,
            amount: amount.clone(),
        })
    }

    async fn send_settle(&self, _from: &Address, channel: &Address) -> anyhow::Result<Cid> {
        self.state.lock().send(MsgOp::Settle { channel: *channel })
    }

    async fn send_collect(&self, _from: &Address, channel: &Address) -> anyhow::Result<Cid> {
        self.state.lock().send(MsgOp::Collect { channel: *channel })
    }

    async fn send_voucher_submit(
        &self,
        _from: &Address,
        channel: &Address,
        voucher: &SignedVoucher,
        _secret: &[u8],
    ) -> anyhow::Result<Cid> {
        self.state.lock().send(MsgOp::Submit {
            channel: *channel,
            voucher: voucher.clone(),
        })
    }

    async fn wait_for_message(&self, mcid: &Cid, _confidence: i64) -> anyhow::Result<MessageLookup> {
        let mut rx = self.release.subscribe();
        rx.wait_for(|released| *released).await?;
        let mut st = self.state.lock();
        if st.fail_next_waits > 0 {
            st.fail_next_waits -= 1;
            bail!("lookup of message {mcid} failed");
        }
        st.execute(mcid)
    }

    async fn channel_balance(&self, channel: &Address) -> anyhow::Result<TokenAmount> {
        let st = self.state.lock();
        let ch = st.channels.get(channel).context("actor not found")?;
        Ok(ch.balance.clone())
    }

    async fn channel_state(&self, channel: &Address) -> anyhow::Result<PaychActorState> {
        let st = self.state.lock();
        let ch = st.channels.get(channel).context("actor not found")?;
        Ok(PaychActorState {
            from: ch.from,
            to: ch.to,
            to_send: TokenAmount::default(),
            settling_at: ch.settling_at,
            min_settle_height: 0,
            lane_states: ch.lane_states.clone(),
        })
    }

    async fn head_epoch(&self) -> anyhow::Result<ChainEpoch> {
        Ok(self.state.lock().head)
    }
}

/// Store whose next writes can be made to fail.
#[derive(Default)]
pub struct FlakyDb {
    inner: MemoryDB,
    fail_next_write: AtomicBool,
    fail_next_batch: AtomicBool,
}

impl FlakyDb {
    /// The next single-entry write fails.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// The next batch write fails without writing anything.
    pub fn fail_next_batch(&self) {
        self.fail_next_batch.store(true, Ordering::SeqCst);
    }
}

impl SettingsStore for FlakyDb {
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.read_bin(key)
    }

    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            bail!("disk full");
        }
        self.inner.write_bin(key, value)
    }

    fn write_bins(&self, entries: &[(String, Vec<u8>)]) -> anyhow::Result<()> {
        if self.fail_next_batch.swap(false, Ordering::SeqCst) {
            bail!("disk full");
        }
        self.inner.write_bins(entries)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.exists(key)
    }

    fn setting_keys(&self) -> anyhow::Result<Vec<String>> {
        self.inner.setting_keys()
    }
}

pub struct Harness<DB = Arc<MemoryDB>> {
    pub mgr: PaychManager<DB, MockChain>,
    pub chain: Arc<MockChain>,
    pub db: DB,
    pub wallet: Arc<Mutex<Wallet>>,
    /// Address held by the wallet.
    pub local: Address,
    /// Counterparty, not held by the wallet.
    pub remote: Address,
    /// Wallet of the counterparty.
    pub remote_wallet: Wallet,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_db(Arc::new(MemoryDB::default()))
    }
}

impl<DB> Harness<DB>
where
    DB: SettingsStore + Clone + Send + Sync + 'static,
{
    pub fn with_db(db: DB) -> Self {
        let mut wallet = Wallet::default();
        let local = wallet.generate_addr(SignatureType::Secp256k1).unwrap();
        let mut remote_wallet = Wallet::default();
        let remote = remote_wallet
            .generate_addr(SignatureType::Secp256k1)
            .unwrap();
        let chain = Arc::new(MockChain::default());
        let wallet = Arc::new(Mutex::new(wallet));
        let mgr = PaychManager::new(
            db.clone(),
            chain.clone(),
            wallet.clone(),
            PaychConfig::default(),
        );
        Self {
            mgr,
            chain,
            db,
            wallet,
            local,
            remote,
            remote_wallet,
        }
    }

    /// A new manager over the same store, chain and wallet.
    pub fn restarted(&self) -> PaychManager<DB, MockChain> {
        PaychManager::new(
            self.db.clone(),
            self.chain.clone(),
            self.wallet.clone(),
            PaychConfig::default(),
        )
    }

    /// Funds an outbound channel to the counterparty with `amt` and waits
    /// for it.
    pub async fn funded_outbound(&self, amt: u64) -> Address {
        let res = self
            .mgr
            .get_paych(self.local, self.remote, atto(amt), GetPaychOptions::default())
            .await
            .unwrap();
        self.mgr.wait_ready(&res.wait_sentinel).await.unwrap()
    }

    /// A channel deployed by the counterparty paying the local address.
    pub async fn tracked_inbound(&self, balance: u64) -> Address {
        let ch = self
            .chain
            .create_channel(self.remote, self.local, atto(balance));
        self.mgr.track_inbound_channel(&ch).await.unwrap();
        ch
    }

    /// A voucher signed by the counterparty.
    pub fn remote_voucher(&mut self, ch: Address, lane: u64, nonce: u64, amount: u64) -> SignedVoucher {
        let mut sv = SignedVoucher::new(ch, lane, nonce, atto(amount));
        let sig = self
            .remote_wallet
            .sign(&self.remote, &sv.signing_bytes().unwrap())
            .unwrap();
        sv.signature = Some(sig);
        sv
    }
}
