// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::Error;
use cid::Cid;
use tokio::sync::broadcast;

const CHANNEL_CAP: usize = 64;

/// Completion of a channel message, `Err` when it failed or was never
/// confirmed.
pub type MsgCompleteEvt = (Cid, Result<(), Error>);

/// Fans message completion events out to subscribers.
pub struct MsgListeners {
    ps: broadcast::Sender<MsgCompleteEvt>,
}

impl Default for MsgListeners {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgListeners {
    pub fn new() -> Self {
        let (ps, _) = broadcast::channel(CHANNEL_CAP);
        MsgListeners { ps }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MsgCompleteEvt> {
        self.ps.subscribe()
    }

    /// Called when a message completes. Events with no subscribers are
    /// dropped.
    pub fn fire_msg_complete(&self, mcid: Cid, res: Result<(), Error>) {
        let _ = self.ps.send((mcid, res));
    }
}

/// Waits on `rx` for the completion of `mcid`.
pub async fn wait_for_msg_complete(
    rx: &mut broadcast::Receiver<MsgCompleteEvt>,
    mcid: Cid,
) -> Result<(), Error> {
    loop {
        match rx.recv().await {
            Ok((c, res)) if c == mcid => return res,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                return Err(Error::Other("message listeners closed".into()));
            }
        }
    }
}
