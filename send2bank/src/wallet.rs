//! The wallet seam. Everything that needs a key, a signature or an RPC round trip goes through [WalletProvider], whose
//! methods mirror the EIP-1193 requests a dapp makes of an injected wallet.

use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

use alloy::{
    network::{EthereumWallet, TransactionBuilder as _},
    primitives::{Address, Log, TxHash, U256, utils::format_ether},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::{RpcError, TransportErrorKind},
};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::{cfg::NetworkConfig, chains::AddChainParams};

/// An error returned by a wallet. The message is meant to be shown to the user as-is.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct WalletError {
    pub code: i64,
    pub message: String,
}

impl WalletError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "User rejected the request.")
    }

    pub fn unauthorized() -> Self {
        Self::new(
            Self::UNAUTHORIZED,
            "The requested account and/or method has not been authorized by the user.",
        )
    }

    pub fn unrecognized_chain(chain_id: u64) -> Self {
        Self::new(
            Self::UNRECOGNIZED_CHAIN,
            format!(
                "Unrecognized chain ID \"{chain_id:#x}\". Try adding the chain using wallet_addEthereumChain first."
            ),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Self::UNRECOGNIZED_CHAIN
    }
}

impl From<RpcError<TransportErrorKind>> for WalletError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match err.as_error_resp() {
            Some(payload) => WalletError::new(payload.code, payload.message.to_string()),
            None => WalletError::internal(err.to_string()),
        }
    }
}

/// The outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    /// `false` if the transaction reverted.
    pub success: bool,
    pub logs: Vec<Log>,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// `eth_requestAccounts`: ask the user to authorise us and return the authorised accounts.
    async fn request_accounts(&mut self) -> Result<Vec<Address>, WalletError>;

    /// `eth_chainId`: the network the wallet is currently on.
    async fn chain_id(&self) -> Result<u64, WalletError>;

    /// `wallet_switchEthereumChain`. Fails with [WalletError::UNRECOGNIZED_CHAIN] if the wallet doesn't know the
    /// network.
    async fn switch_chain(&mut self, chain_id: u64) -> Result<(), WalletError>;

    /// `wallet_addEthereumChain`.
    async fn add_chain(&mut self, params: &AddChainParams) -> Result<(), WalletError>;

    /// `eth_sendTransaction`: sign and broadcast, returning as soon as the transaction is accepted.
    async fn send_transaction(&mut self, tx: TransactionRequest) -> Result<TxHash, WalletError>;

    /// Wait until `tx_hash` is mined on the current network.
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, WalletError>;
}

/// Lets the user accept or refuse a wallet request.
pub trait Approval: Send + Sync {
    fn approve(&self, request: &str) -> bool;
}

/// Approves everything. Used when running non-interactively.
pub struct AutoApprove;

impl Approval for AutoApprove {
    fn approve(&self, _: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
struct Network {
    name: String,
    rpc_url: Url,
}

/// How long [KeyWallet] waits for a receipt.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub attempts: usize,
    pub sleep: Duration,
}

/// A wallet holding a single local private key, which signs with `alloy` and talks to each network over HTTP.
pub struct KeyWallet {
    signer: PrivateKeySigner,
    approval: Arc<dyn Approval>,
    networks: HashMap<u64, Network>,
    authorised: bool,
    current: Option<(u64, DynProvider)>,
    confirmation: ConfirmationPolicy,
}

impl KeyWallet {
    pub fn new(
        private_key: &str,
        networks: &[NetworkConfig],
        approval: Arc<dyn Approval>,
        confirmation: ConfirmationPolicy,
    ) -> anyhow::Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key.trim())?;
        let networks = networks
            .iter()
            .map(|n| {
                (
                    n.chain_id,
                    Network {
                        name: n.name.clone(),
                        rpc_url: n.rpc_url.clone(),
                    },
                )
            })
            .collect();
        Ok(Self {
            signer,
            approval,
            networks,
            authorised: false,
            current: None,
            confirmation,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn connect(&self, rpc_url: &Url) -> DynProvider {
        let wallet = EthereumWallet::from(self.signer.clone());
        ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(rpc_url.clone())
            .erased()
    }

    fn provider(&self) -> Result<&(u64, DynProvider), WalletError> {
        self.current
            .as_ref()
            .ok_or_else(|| WalletError::internal("No network selected"))
    }
}

#[async_trait]
impl WalletProvider for KeyWallet {
    async fn request_accounts(&mut self) -> Result<Vec<Address>, WalletError> {
        if !self.authorised {
            let request = format!("Connect account {} to send2bank?", self.address());
            if !self.approval.approve(&request) {
                return Err(WalletError::user_rejected());
            }
            self.authorised = true;
        }
        Ok(vec![self.address()])
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.provider()?.0)
    }

    async fn switch_chain(&mut self, chain_id: u64) -> Result<(), WalletError> {
        if self.current.as_ref().is_some_and(|(id, _)| *id == chain_id) {
            return Ok(());
        }
        let network = self
            .networks
            .get(&chain_id)
            .ok_or_else(|| WalletError::unrecognized_chain(chain_id))?;
        info!(chain_id, name = %network.name, "switching network");
        let provider = self.connect(&network.rpc_url);
        self.current = Some((chain_id, provider));
        Ok(())
    }

    async fn add_chain(&mut self, params: &AddChainParams) -> Result<(), WalletError> {
        let chain_id = params.parsed_chain_id().ok_or_else(|| {
            WalletError::new(
                WalletError::INVALID_PARAMS,
                format!("Invalid chain ID \"{}\"", params.chain_id),
            )
        })?;
        if self.networks.contains_key(&chain_id) {
            return Ok(());
        }
        let rpc_url: Url = params
            .rpc_urls
            .first()
            .ok_or_else(|| WalletError::new(WalletError::INVALID_PARAMS, "No RPC URL provided"))?
            .parse()
            .map_err(|e| WalletError::new(WalletError::INVALID_PARAMS, format!("{e}")))?;

        let request = format!("Allow send2bank to add the {} network?", params.chain_name);
        if !self.approval.approve(&request) {
            return Err(WalletError::user_rejected());
        }

        // Refuse RPC endpoints which serve some other chain.
        let remote = self.connect(&rpc_url).get_chain_id().await?;
        if remote != chain_id {
            warn!(chain_id, remote, %rpc_url, "rpc chain id mismatch");
            return Err(WalletError::new(
                WalletError::INVALID_PARAMS,
                format!(
                    "Chain ID returned by RPC URL {rpc_url} ({remote:#x}) does not match {}",
                    params.chain_id
                ),
            ));
        }
        info!(chain_id, name = %params.chain_name, "added network");
        self.networks.insert(
            chain_id,
            Network {
                name: params.chain_name.clone(),
                rpc_url,
            },
        );
        Ok(())
    }

    async fn send_transaction(&mut self, tx: TransactionRequest) -> Result<TxHash, WalletError> {
        if !self.authorised {
            return Err(WalletError::unauthorized());
        }
        let (chain_id, provider) = self.provider()?;
        let value = tx.value.unwrap_or(U256::ZERO);
        let to = tx.to.and_then(|to| to.to().copied());
        let request = match to {
            Some(to) => format!("Send {} to {to} on chain {chain_id}?", format_ether(value)),
            None => format!("Send {} on chain {chain_id}?", format_ether(value)),
        };
        if !self.approval.approve(&request) {
            return Err(WalletError::user_rejected());
        }
        let tx = tx.with_chain_id(*chain_id);
        let pending = provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();
        debug!(%tx_hash, "transaction broadcast");
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, WalletError> {
        let (_, provider) = self.provider()?;
        for _ in 0..self.confirmation.attempts {
            match provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    return Ok(Confirmation {
                        tx_hash,
                        block_number: receipt.block_number,
                        success: receipt.status(),
                        logs: receipt
                            .inner
                            .logs()
                            .iter()
                            .map(|log| log.inner.clone())
                            .collect(),
                    });
                }
                Ok(None) => {}
                Err(e) => debug!(%tx_hash, "receipt not available: {e}"),
            }
            tokio::time::sleep(self.confirmation.sleep).await;
        }
        Err(WalletError::internal(format!(
            "transaction {tx_hash} not confirmed after {} attempts",
            self.confirmation.attempts
        )))
    }
}
