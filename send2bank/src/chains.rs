use std::collections::BTreeMap;

use alloy::primitives::{Address, TxHash, address};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use strum::{EnumProperty, IntoEnumIterator};
use strum_macros::{Display, EnumIter, EnumString};
use url::Url;

/// Networks with a deployed bank contract that we know about out of the box.
#[derive(Clone, Copy, Debug, Display, EnumString, EnumIter, EnumProperty, PartialEq)]
pub enum KnownChain {
    #[strum(
        serialize = "base",
        props(
            display_name = "Base",
            rpc_url = "https://mainnet.base.org",
            native_currency_symbol = "ETH",
            block_explorer_url = "https://basescan.org"
        )
    )]
    Base,
}

impl KnownChain {
    pub fn chain_id(&self) -> u64 {
        match self {
            KnownChain::Base => 8453,
        }
    }

    pub fn contract_address(&self) -> Address {
        match self {
            KnownChain::Base => address!("0x1298900d55bcF2a6716a3470Ac880DA226b1c0B2"),
        }
    }

    fn prop(&self, name: &str) -> Result<&'static str> {
        self.get_str(name)
            .ok_or_else(|| anyhow!("{self} has no {name}"))
    }

    pub fn descriptor(&self) -> Result<ChainDescriptor> {
        Ok(ChainDescriptor {
            chain_id: self.chain_id(),
            display_name: self.prop("display_name")?.to_owned(),
            contract_address: self.contract_address(),
            rpc_url: self.prop("rpc_url")?.parse()?,
            native_currency_symbol: self.prop("native_currency_symbol")?.to_owned(),
            block_explorer_url: Some(self.prop("block_explorer_url")?.parse()?),
        })
    }
}

/// Everything we need to know about a network to bank on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub display_name: String,
    pub contract_address: Address,
    pub rpc_url: Url,
    #[serde(default = "native_currency_symbol_default")]
    pub native_currency_symbol: String,
    #[serde(default)]
    pub block_explorer_url: Option<Url>,
}

pub fn native_currency_symbol_default() -> String {
    "ETH".to_owned()
}

impl ChainDescriptor {
    /// The parameters to pass to a wallet's `wallet_addEthereumChain`.
    pub fn add_chain_params(&self) -> AddChainParams {
        AddChainParams {
            chain_id: format!("{:#x}", self.chain_id),
            chain_name: self.display_name.clone(),
            native_currency: NativeCurrency {
                name: self.native_currency_symbol.clone(),
                symbol: self.native_currency_symbol.clone(),
                decimals: 18,
            },
            rpc_urls: vec![self.rpc_url.to_string()],
            block_explorer_urls: self
                .block_explorer_url
                .iter()
                .map(|u| u.to_string())
                .collect(),
        }
    }

    /// A link to `hash` on the block explorer, if this chain has one.
    pub fn tx_url(&self, hash: &TxHash) -> Option<String> {
        self.block_explorer_url
            .as_ref()
            .map(|u| format!("{}/tx/{hash}", u.as_str().trim_end_matches('/')))
    }
}

/// EIP-3085 `wallet_addEthereumChain` parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    /// Hex-encoded chain id, `0x` prefixed.
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl AddChainParams {
    pub fn parsed_chain_id(&self) -> Option<u64> {
        u64::from_str_radix(self.chain_id.strip_prefix("0x")?, 16).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// The chains the application may bank on, keyed by chain id.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: BTreeMap<u64, ChainDescriptor>,
}

impl ChainRegistry {
    /// The built-in chains, overridden or extended by `extra`.
    pub fn new(extra: &[ChainDescriptor]) -> Result<Self> {
        let mut chains = BTreeMap::new();
        for known in KnownChain::iter() {
            let descriptor = known.descriptor()?;
            chains.insert(descriptor.chain_id, descriptor);
        }
        for descriptor in extra {
            chains.insert(descriptor.chain_id, descriptor.clone());
        }
        Ok(Self { chains })
    }

    pub fn get(&self, chain_id: u64) -> Option<&ChainDescriptor> {
        self.chains.get(&chain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainDescriptor> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
