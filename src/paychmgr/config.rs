// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use std::time::Duration;

/// Epochs a message must be buried under before it counts as executed.
pub const DEFAULT_MESSAGE_CONFIDENCE: i64 = 5;

/// Tuning of the payment channel manager.
#[serde_as]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(default)]
pub struct PaychConfig {
    pub message_confidence: i64,
    /// Upper bound for waiting on a funding message, unbounded when unset.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub wait_ready_timeout: Option<Duration>,
}

impl Default for PaychConfig {
    fn default() -> Self {
        Self {
            message_confidence: DEFAULT_MESSAGE_CONFIDENCE,
            wait_ready_timeout: None,
        }
    }
}
