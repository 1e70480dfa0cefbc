//! Signing configuration.
//!
//! Loaded from JSON; every field has a default so `{}` is a valid config.

use bitcoin::sighash::TapSighashType;
use serde::{Deserialize, Serialize};

use crate::error::{PsbtError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsbtConfig {
    /// Sighash types a signer accepts by default, as consensus bytes.
    #[serde(default = "default_sighash_types")]
    pub sighash_types: Vec<u8>,

    /// Number of wallet xpubs a PSBT must carry for signature validation
    /// arrays.
    #[serde(default = "default_global_xpub_count")]
    pub global_xpub_count: usize,
}

fn default_sighash_types() -> Vec<u8> {
    vec![
        TapSighashType::Default as u8,
        TapSighashType::All as u8,
    ]
}

fn default_global_xpub_count() -> usize {
    3
}

impl Default for PsbtConfig {
    fn default() -> Self {
        Self {
            sighash_types: default_sighash_types(),
            global_xpub_count: default_global_xpub_count(),
        }
    }
}

impl PsbtConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PsbtConfig =
            serde_json::from_str(json).map_err(|e| PsbtError::Config(e.to_string()))?;
        config.allowed_sighash_types()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PsbtError::Config(e.to_string()))
    }

    pub fn allowed_sighash_types(&self) -> Result<Vec<TapSighashType>> {
        self.sighash_types
            .iter()
            .map(|b| {
                TapSighashType::from_consensus_u8(*b)
                    .map_err(|e| PsbtError::Config(format!("sighash type 0x{:02x}: {}", b, e)))
            })
            .collect()
    }
}
