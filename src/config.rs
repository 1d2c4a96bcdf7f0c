//! Configuration schema.
//!
//! Everything defaults; deployments override the pieces they care about.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub adapter: AdapterConfig,
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

/// Graph store behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Merge inbound diffs into the snapshot in place instead of building
    /// fresh nodes. Off by default; aliasing is the main porting hazard.
    pub mutable: bool,
}

/// Storage adapter limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Largest accepted soul, in UTF-8 bytes.
    pub max_key_size: usize,
    /// Largest accepted node, measured as serialized JSON bytes.
    pub max_value_size: usize,
    /// Cap on the optimistic patch loop. The loop warns per retry and
    /// surfaces `RetriesExhausted` past the cap rather than livelocking.
    pub max_patch_retries: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_key_size: 1024,
            max_value_size: 1024 * 1024,
            max_patch_retries: 10,
        }
    }
}

/// Federation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Fan local diffs out to peers.
    pub put_to_peers: bool,
    /// Drain peer-originated changes back into persistence.
    pub reverse_peer_sync: bool,
    /// Skip the pre-persistence graph validation.
    pub disable_validation: bool,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            put_to_peers: true,
            reverse_peer_sync: true,
            disable_validation: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// 0 = error, 1 = info, 2+ = debug. `RUST_LOG` overrides.
    pub verbosity: u8,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verbosity: 1,
        }
    }
}
