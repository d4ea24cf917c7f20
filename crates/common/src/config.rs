// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Read path configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be at least 1")]
    ZeroThreshold { name: &'static str },

    #[error("column prefix {name} must not be empty")]
    EmptyPrefix { name: &'static str },

    #[error("tag and value column prefixes must differ, both are {prefix:?}")]
    PrefixClash { prefix: String },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// How a replica decorates read responses for the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentMode {
    /// Attach the local tag store record to the response
    #[default]
    LocalStore,
    /// Mark the response for second-round tag resolution
    SecondRound,
    /// Send the plain storage response
    Disabled,
}

impl EnrichmentMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "local_store" => Some(Self::LocalStore),
            "second_round" => Some(Self::SecondRound),
            "disabled" | "none" | "off" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Column naming contract between the storage rows and the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub tag_prefix: String,
    pub value_prefix: String,
    /// Always-present value column that never carries a share
    pub placeholder: String,
}

impl ColumnLayout {
    pub fn tag_column(&self, index: usize) -> String {
        format!("{}{}", self.tag_prefix, index)
    }

    pub fn value_column(&self, index: usize) -> String {
        format!("{}{}", self.value_prefix, index)
    }
}

impl Default for ColumnLayout {
    fn default() -> Self {
        TreasConfig::default().column_layout()
    }
}

/// Configuration for the erasure-coded read path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreasConfig {
    /// Minimum overlap between any two quorums; sightings needed to certify a tag
    pub intersection_threshold: usize,

    /// Minimum number of shares needed to erasure-decode a value
    pub recovery_threshold: usize,

    /// Name prefix of tag columns (`tag1`, `tag2`, ...)
    pub tag_column_prefix: String,

    /// Name prefix of value columns (`val1`, `val2`, ...)
    pub value_column_prefix: String,

    /// Reserved value column that is always present and never holds a share
    pub placeholder_column: String,

    /// Keyspace whose responses get local tag enrichment
    pub enriched_keyspace: String,

    /// Response enrichment strategy
    pub enrichment: EnrichmentMode,

    /// Coordinator deadline for collecting replica responses (ms)
    pub read_timeout_ms: u64,
}

impl Default for TreasConfig {
    fn default() -> Self {
        Self {
            intersection_threshold: 2,
            recovery_threshold: 2,
            tag_column_prefix: String::from("tag"),
            value_column_prefix: String::from("val"),
            placeholder_column: String::from("val0"),
            enriched_keyspace: String::from("ycsb"),
            enrichment: EnrichmentMode::LocalStore,
            read_timeout_ms: 5000,
        }
    }
}

impl TreasConfig {
    /// Defaults with `TREAS_*` environment overrides applied, then validated
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from any `TREAS_*` lookup source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn number<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::InvalidEnv { var, value })
        }

        if let Some(value) = lookup("TREAS_INTERSECTION_THRESHOLD") {
            self.intersection_threshold = number("TREAS_INTERSECTION_THRESHOLD", value)?;
        }
        if let Some(value) = lookup("TREAS_RECOVERY_THRESHOLD") {
            self.recovery_threshold = number("TREAS_RECOVERY_THRESHOLD", value)?;
        }
        if let Some(value) = lookup("TREAS_READ_TIMEOUT_MS") {
            self.read_timeout_ms = number("TREAS_READ_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("TREAS_ENRICHED_KEYSPACE") {
            self.enriched_keyspace = value;
        }
        if let Some(value) = lookup("TREAS_ENRICHMENT") {
            self.enrichment = EnrichmentMode::parse(&value).ok_or(ConfigError::InvalidEnv {
                var: "TREAS_ENRICHMENT",
                value,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.intersection_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                name: "intersection_threshold",
            });
        }
        if self.recovery_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                name: "recovery_threshold",
            });
        }
        if self.tag_column_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix {
                name: "tag_column_prefix",
            });
        }
        if self.value_column_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix {
                name: "value_column_prefix",
            });
        }
        if self.tag_column_prefix == self.value_column_prefix {
            return Err(ConfigError::PrefixClash {
                prefix: self.tag_column_prefix.clone(),
            });
        }
        if !self.placeholder_column.starts_with(&self.value_column_prefix) {
            warn!(
                placeholder = %self.placeholder_column,
                prefix = %self.value_column_prefix,
                "Placeholder column does not carry the value prefix and will never be matched"
            );
        }
        Ok(())
    }

    pub fn column_layout(&self) -> ColumnLayout {
        ColumnLayout {
            tag_prefix: self.tag_column_prefix.clone(),
            value_prefix: self.value_column_prefix.clone(),
            placeholder: self.placeholder_column.clone(),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
