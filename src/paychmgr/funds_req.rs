// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::Error;
use crate::shim::{address::Address, econ::TokenAmount};
use tokio::sync::oneshot;

/// Request to bring channel capacity up to `amt`, queued while another
/// funding message is in flight.
pub struct FundsReq {
    amt: TokenAmount,
    promise: oneshot::Sender<Result<Address, Error>>,
}

impl FundsReq {
    pub fn new(amt: TokenAmount) -> (Self, oneshot::Receiver<Result<Address, Error>>) {
        let (promise, rx) = oneshot::channel();
        (FundsReq { amt, promise }, rx)
    }

    /// A request is cancelled once its caller stops listening.
    pub fn is_active(&self) -> bool {
        !self.promise.is_closed()
    }

    pub fn amt(&self) -> &TokenAmount {
        &self.amt
    }

    /// Called when the request has been executed.
    pub fn on_complete(self, res: Result<Address, Error>) {
        let _ = self.promise.send(res);
    }
}

/// Merges queued requests so that a single message serves all of them.
pub struct MergeFundsReq {
    reqs: Vec<FundsReq>,
}

impl MergeFundsReq {
    /// Returns `None` if none of the requests is still active.
    pub fn new(reqs: Vec<FundsReq>) -> Option<Self> {
        let reqs: Vec<_> = reqs.into_iter().filter(FundsReq::is_active).collect();
        (!reqs.is_empty()).then_some(MergeFundsReq { reqs })
    }

    /// Capacity that satisfies every active request.
    pub fn required(&self) -> TokenAmount {
        self.reqs
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.amt.clone())
            .max()
            .unwrap_or_default()
    }

    /// Calls `on_complete` on each request in the merge.
    pub fn on_complete(self, res: Result<Address, Error>) {
        for r in self.reqs {
            r.on_complete(res.clone());
        }
    }

    pub fn into_reqs(self) -> Vec<FundsReq> {
        self.reqs
    }
}
