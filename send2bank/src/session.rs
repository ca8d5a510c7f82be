//! The session controller: connection state, the bank action, and the status line the UI renders.

use alloy::primitives::{Address, TxHash};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    bank::{self, BANK_AMOUNT},
    chains::{ChainDescriptor, ChainRegistry},
    stats::{self, UsageRecord, UsageScope},
    status::Status,
    storage::KeyValueStore,
    streak,
    wallet::{Confirmation, WalletError, WalletProvider},
};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("Please install a compatible wallet!")]
    NoWallet,
    #[error("Please connect your wallet first!")]
    NotConnected,
    #[error("A transaction is already pending.")]
    Pending,
    #[error("Unsupported network {0}")]
    UnknownChain(u64),
    #[error("wallet returned no accounts")]
    NoAccounts,
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    pub account: Option<Address>,
}

/// The in-flight state of the bank action. The user-facing message lives in [Session::status].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionState {
    pub pending: bool,
    pub last_tx_hash: Option<TxHash>,
}

/// A successful bank.
#[derive(Debug, Clone)]
pub struct Banked {
    pub confirmation: Confirmation,
    /// The updated usage record, or `None` if it couldn't be saved.
    pub usage: Option<UsageRecord>,
}

pub struct Session<W, S> {
    wallet: Option<W>,
    store: S,
    chains: ChainRegistry,
    selected: ChainDescriptor,
    per_chain_stats: bool,
    connection: ConnectionState,
    transaction: TransactionState,
    status: watch::Sender<Status>,
}

fn wallet_mut<W>(wallet: &mut Option<W>) -> Result<&mut W, SessionError> {
    wallet.as_mut().ok_or(SessionError::NoWallet)
}

impl<W: WalletProvider, S: KeyValueStore> Session<W, S> {
    pub fn new(
        wallet: Option<W>,
        store: S,
        chains: ChainRegistry,
        default_chain: u64,
        per_chain_stats: bool,
    ) -> Result<Self, SessionError> {
        let selected = chains
            .get(default_chain)
            .cloned()
            .ok_or(SessionError::UnknownChain(default_chain))?;
        let (status, _) = watch::channel(Status::ConnectPrompt);
        Ok(Session {
            wallet,
            store,
            chains,
            selected,
            per_chain_stats,
            connection: ConnectionState::default(),
            transaction: TransactionState::default(),
            status,
        })
    }

    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Watch status changes, including the intermediate phases of [Session::connect] and [Session::bank].
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn transaction(&self) -> &TransactionState {
        &self.transaction
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    pub fn selected_chain(&self) -> &ChainDescriptor {
        &self.selected
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn set_status(status: &watch::Sender<Status>, new: Status) -> Status {
        status.send_replace(new.clone());
        new
    }

    /// Ask the wallet for an account on the selected network, adding the network to the wallet if it doesn't know it.
    pub async fn connect(&mut self) -> Status {
        if self.wallet.is_none() {
            return Self::set_status(&self.status, Status::Error(SessionError::NoWallet.to_string()));
        }
        Self::set_status(&self.status, Status::Connecting);
        match self.try_connect().await {
            Ok(account) => {
                info!(%account, chain_id = self.selected.chain_id, "wallet connected");
                self.connection = ConnectionState {
                    connected: true,
                    account: Some(account),
                };
                Self::set_status(&self.status, Status::Connected)
            }
            Err(e) => {
                warn!("failed to connect wallet: {e}");
                Self::set_status(
                    &self.status,
                    Status::Error(format!("Failed to connect wallet: {e}")),
                )
            }
        }
    }

    async fn try_connect(&mut self) -> Result<Address, SessionError> {
        self.ensure_chain().await?;
        let accounts = wallet_mut(&mut self.wallet)?.request_accounts().await?;
        accounts.first().copied().ok_or(SessionError::NoAccounts)
    }

    async fn ensure_chain(&mut self) -> Result<(), SessionError> {
        let chain = self.selected_chain().clone();
        let wallet = wallet_mut(&mut self.wallet)?;
        match wallet.switch_chain(chain.chain_id).await {
            Err(e) if e.is_unrecognized_chain() => {
                info!(chain_id = chain.chain_id, "wallet doesn't know network, adding it");
                wallet.add_chain(&chain.add_chain_params()).await?;
                wallet.switch_chain(chain.chain_id).await?;
                Ok(())
            }
            result => Ok(result?),
        }
    }

    /// Forget the connection. This doesn't revoke anything the wallet has authorised.
    pub fn disconnect(&mut self) -> Status {
        if let Some(account) = self.connection.account {
            info!(%account, "disconnected");
        }
        self.connection = ConnectionState::default();
        self.transaction = TransactionState::default();
        Self::set_status(&self.status, Status::ConnectPrompt)
    }

    /// Select another registered chain. When connected, the wallet is switched too; if that fails the previous
    /// selection is kept.
    pub async fn select_chain(&mut self, chain_id: u64) -> Status {
        if self.transaction.pending {
            return Self::set_status(&self.status, Status::Error(SessionError::Pending.to_string()));
        }
        let Some(chain) = self.chains.get(chain_id).cloned() else {
            return Self::set_status(
                &self.status,
                Status::Error(SessionError::UnknownChain(chain_id).to_string()),
            );
        };
        let network = chain.display_name.clone();
        let previous = std::mem::replace(&mut self.selected, chain);
        if self.connection.connected {
            Self::set_status(&self.status, Status::Connecting);
            if let Err(e) = self.ensure_chain().await {
                warn!(chain_id, "failed to switch network: {e}");
                self.selected = previous;
                return Self::set_status(
                    &self.status,
                    Status::Error(format!("Failed to switch network: {e}")),
                );
            }
        }
        Self::set_status(&self.status, Status::NetworkSwitched { network })
    }

    /// Send the fixed bank payment from the connected account and wait for it to be mined.
    pub async fn bank(&mut self) -> Status {
        match self.try_bank().await {
            Ok(banked) => Self::set_status(
                &self.status,
                Status::Confirmed {
                    symbol: self.selected_chain().native_currency_symbol.clone(),
                    explorer_url: self.selected_chain().tx_url(&banked.confirmation.tx_hash),
                },
            ),
            Err(e @ (SessionError::NotConnected | SessionError::Pending)) => {
                Self::set_status(&self.status, Status::Error(e.to_string()))
            }
            Err(e) => {
                warn!("bank failed: {e}");
                Self::set_status(&self.status, Status::Error(format!("Error: {e}")))
            }
        }
    }

    /// Like [Session::bank], but returns the typed outcome. The status is still updated with the intermediate phases.
    ///
    /// If the returned future is dropped before it completes, the session stops treating the transaction as pending
    /// and reports that it stopped waiting. The transaction itself may still be mined.
    pub async fn try_bank(&mut self) -> Result<Banked, SessionError> {
        let account = match self.connection.account {
            Some(account) if self.connection.connected => account,
            _ => return Err(SessionError::NotConnected),
        };
        if self.transaction.pending {
            return Err(SessionError::Pending);
        }
        let wallet = wallet_mut(&mut self.wallet)?;
        let mut pending = PendingBank::start(&mut self.transaction, &self.status);
        let result = submit(
            wallet,
            &mut self.store,
            &self.selected,
            account,
            self.per_chain_stats,
            &mut pending,
        )
        .await;
        pending.finish();
        result
    }

    /// The usage record of the connected account on the selected chain.
    pub fn usage(&self) -> Option<UsageRecord> {
        let account = self.connection.account?;
        Some(self.usage_for(self.selected.chain_id, account))
    }

    pub fn usage_for(&self, chain_id: u64, account: Address) -> UsageRecord {
        UsageRecord::load(
            &self.store,
            &UsageScope::new(chain_id, account, self.per_chain_stats),
        )
    }
}

/// Marks the bank action as pending for as long as it lives.
struct PendingBank<'a> {
    transaction: &'a mut TransactionState,
    status: &'a watch::Sender<Status>,
    finished: bool,
}

impl<'a> PendingBank<'a> {
    fn start(transaction: &'a mut TransactionState, status: &'a watch::Sender<Status>) -> Self {
        transaction.pending = true;
        PendingBank {
            transaction,
            status,
            finished: false,
        }
    }

    fn submitted(&mut self, tx_hash: TxHash) {
        self.transaction.last_tx_hash = Some(tx_hash);
        self.status.send_replace(Status::Submitted { tx_hash });
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for PendingBank<'_> {
    fn drop(&mut self) {
        self.transaction.pending = false;
        if !self.finished {
            let message = match self.transaction.last_tx_hash {
                Some(tx_hash) => format!("Stopped waiting for transaction {tx_hash}."),
                None => "Stopped waiting for the wallet.".to_owned(),
            };
            warn!("bank abandoned: {message}");
            self.status.send_replace(Status::Error(message));
        }
    }
}

async fn submit<W: WalletProvider, S: KeyValueStore>(
    wallet: &mut W,
    store: &mut S,
    chain: &ChainDescriptor,
    account: Address,
    per_chain_stats: bool,
    pending: &mut PendingBank<'_>,
) -> Result<Banked, SessionError> {
    let tx_hash = wallet
        .send_transaction(bank::bank_call(chain, account))
        .await?;
    info!(%tx_hash, chain_id = chain.chain_id, "bank transaction sent");
    pending.submitted(tx_hash);

    let confirmation = wallet.wait_for_confirmation(tx_hash).await?;
    if !confirmation.success {
        return Err(SessionError::Reverted(tx_hash));
    }
    info!(%tx_hash, block = confirmation.block_number, "bank transaction confirmed");

    let amount =
        bank::banked_amount(&confirmation, chain.contract_address, account).unwrap_or(BANK_AMOUNT);
    let scope = UsageScope::new(chain.chain_id, account, per_chain_stats);
    // The payment has happened whether or not we manage to remember it.
    let usage = match stats::record_bank(store, &scope, amount, streak::today()) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(%tx_hash, "failed to save usage statistics: {e}");
            None
        }
    };
    Ok(Banked {
        confirmation,
        usage,
    })
}
