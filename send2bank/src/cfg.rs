use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    chains::{ChainDescriptor, KnownChain},
    wallet::ConfirmationPolicy,
};

/// Environment variable substituted for a `private_key` of `"${PRIV_KEY}"`.
pub const PRIV_KEY_ENV_VAR: &str = "PRIV_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The wallet to bank from. Without one, connecting fails with a prompt to configure a wallet.
    #[serde(default)]
    pub wallet: Option<WalletConfig>,
    /// Chains to bank on, in addition to the built-in ones. An entry with the chain id of a built-in chain replaces
    /// it.
    #[serde(default)]
    pub chains: Vec<ChainDescriptor>,
    /// The chain selected when a session starts. Defaults to Base.
    #[serde(default = "default_chain_default")]
    pub default_chain: u64,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Keep separate usage statistics for each chain. If false, statistics are kept per account only.
    #[serde(default = "per_chain_stats_default")]
    pub per_chain_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            wallet: None,
            chains: vec![],
            default_chain: default_chain_default(),
            storage: StorageConfig::default(),
            confirmation: ConfirmationConfig::default(),
            per_chain_stats: per_chain_stats_default(),
        }
    }
}

pub fn default_chain_default() -> u64 {
    KnownChain::Base.chain_id()
}

pub fn per_chain_stats_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalletConfig {
    /// Hex-encoded secp256k1 private key, or `"${PRIV_KEY}"` to read it from the environment.
    pub private_key: String,
    /// Networks the wallet already knows about. Switching to any other network first requires adding it.
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Where usage statistics are kept. Defaults to `~/.send2bank`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Namespace of the statistics; each origin is a separate file.
    #[serde(default = "origin_default")]
    pub origin: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: None,
            origin: origin_default(),
        }
    }
}

pub fn origin_default() -> String {
    "send2bank".to_owned()
}

impl StorageConfig {
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(home::home_dir()
                .ok_or_else(|| anyhow!("cannot find home directory; set storage.data_dir"))?
                .join(".send2bank")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmationConfig {
    /// How many times to poll for a receipt. Defaults to 60.
    #[serde(default = "attempts_default")]
    pub attempts: usize,
    /// Delay between receipt polls, in milliseconds. Defaults to 2000.
    #[serde(default = "sleep_ms_default")]
    pub sleep_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        ConfirmationConfig {
            attempts: attempts_default(),
            sleep_ms: sleep_ms_default(),
        }
    }
}

pub fn attempts_default() -> usize {
    60
}

pub fn sleep_ms_default() -> u64 {
    2000
}

impl ConfirmationConfig {
    pub fn policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            attempts: self.attempts,
            sleep: Duration::from_millis(self.sleep_ms),
        }
    }
}

impl Config {
    /// Load and merge the given TOML files. Each top-level key may only appear in one file.
    pub fn load(files: &[impl AsRef<Path>]) -> Result<Config> {
        let mut merged = toml::Table::new();
        for file in files {
            let file = file.as_ref();
            let contents =
                fs::read_to_string(file).with_context(|| format!("Cannot read {}", file.display()))?;
            let table: toml::Table = toml::from_str(&contents)
                .with_context(|| format!("{} is not valid TOML", file.display()))?;
            for key in table.keys() {
                if merged.contains_key(key) {
                    return Err(anyhow!(
                        "configuration conflict: {file:?} contained a key {key:?} that was already included in an earlier file"
                    ));
                }
            }
            merged.extend(table);
        }
        Self::from_table(merged)
    }

    pub fn from_table(table: toml::Table) -> Result<Config> {
        let mut config: Config = Deserialize::deserialize(table)?;
        config.resolve_private_key(|name| env::var(name).ok())?;
        Ok(config)
    }

    fn resolve_private_key(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let placeholder = format!("${{{PRIV_KEY_ENV_VAR}}}");
        match &mut self.wallet {
            Some(wallet) if wallet.private_key == placeholder => {
                wallet.private_key = lookup(PRIV_KEY_ENV_VAR)
                    .ok_or_else(|| anyhow!("{PRIV_KEY_ENV_VAR} is not set"))?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
