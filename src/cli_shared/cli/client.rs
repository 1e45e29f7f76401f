// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Client {
    /// Root of the channel database.
    pub data_dir: PathBuf,
}

impl Default for Client {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("com", "ChainSafe", "ForestPaych")
            .map(|dir| dir.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".forest-paych"));
        Self { data_dir }
    }
}
