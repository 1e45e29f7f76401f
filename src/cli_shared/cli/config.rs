// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::client::Client;
use crate::db::db_engine::DbConfig;
use crate::paychmgr::PaychConfig;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use tracing_subscriber::filter::LevelFilter;

/// Log level of a single module, written as `off`, `error`, ... `trace`.
#[serde_as]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(transparent)]
pub struct LogLevelFilter(#[serde_as(as = "DisplayFromStr")] pub LevelFilter);

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct LogConfig {
    pub filters: Vec<LogValue>,
}

impl LogConfig {
    pub(in crate::cli_shared) fn to_filter_string(&self) -> String {
        self.filters
            .iter()
            .map(|f| format!("{}={}", f.module, f.level.0))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filters: vec![
                LogValue::new("forest_paych", LogLevelFilter(LevelFilter::INFO)),
                LogValue::new("parity_db", LogLevelFilter(LevelFilter::WARN)),
            ],
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct LogValue {
    pub module: String,
    pub level: LogLevelFilter,
}

impl LogValue {
    pub fn new(module: &str, level: LogLevelFilter) -> Self {
        Self {
            module: module.to_string(),
            level,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub client: Client,
    pub parity_db: crate::db::parity_db_config::ParityDbConfig,
    pub paych: PaychConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn db_config(&self) -> &DbConfig {
        &self.parity_db
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck::Arbitrary;
    use quickcheck_macros::quickcheck;
    use std::{path::PathBuf, time::Duration};
    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Debug)]
    struct ConfigPartial(Config);

    impl Arbitrary for ConfigPartial {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            ConfigPartial(Config {
                client: Client {
                    data_dir: PathBuf::arbitrary(g),
                },
                parity_db: crate::db::parity_db_config::ParityDbConfig {
                    enable_statistics: bool::arbitrary(g),
                },
                paych: PaychConfig {
                    message_confidence: i64::from(u32::arbitrary(g)),
                    wait_ready_timeout: Option::<u32>::arbitrary(g)
                        .map(|secs| Duration::from_secs(secs.into())),
                },
                log: LogConfig::default(),
            })
        }
    }

    #[quickcheck]
    fn test_config_all_params_under_section(config: ConfigPartial) {
        let serialized_config =
            toml::to_string(&config.0).expect("could not serialize the configuration");
        assert_eq!(
            serialized_config
                .trim_start()
                .chars()
                .next()
                .expect("configuration empty"),
            '['
        )
    }

    #[test]
    fn test_default_log_filters() {
        let config = LogConfig::default();
        EnvFilter::builder()
            .parse(config.to_filter_string())
            .unwrap();
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [paych]
            message_confidence = 2

            [[log.filters]]
            module = "forest_paych::paychmgr"
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.paych.message_confidence, 2);
        assert_eq!(config.paych.wait_ready_timeout, PaychConfig::default().wait_ready_timeout);
        assert_eq!(config.client, Client::default());
        assert_eq!(config.log.to_filter_string(), "forest_paych::paychmgr=debug");
    }
}
