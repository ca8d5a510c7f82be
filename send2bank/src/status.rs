use std::fmt;

use alloy::primitives::TxHash;

/// The coarse phase a [Status] belongs to. Exactly one applies at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Waiting for the user to connect.
    Prompt,
    /// A request to the wallet or the chain is in flight.
    Pending,
    Success,
    Error,
}

/// The single status line shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    ConnectPrompt,
    Connecting,
    Connected,
    NetworkSwitched { network: String },
    Submitted { tx_hash: TxHash },
    Confirmed {
        symbol: String,
        explorer_url: Option<String>,
    },
    Error(String),
}

impl Status {
    pub fn kind(&self) -> StatusKind {
        match self {
            Status::ConnectPrompt => StatusKind::Prompt,
            Status::Connecting | Status::Submitted { .. } => StatusKind::Pending,
            Status::Connected | Status::NetworkSwitched { .. } | Status::Confirmed { .. } => {
                StatusKind::Success
            }
            Status::Error(_) => StatusKind::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind() == StatusKind::Error
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::ConnectPrompt => write!(f, "Connect your wallet to get started."),
            Status::Connecting => write!(f, "Connecting to wallet..."),
            Status::Connected => write!(f, "Wallet connected!"),
            Status::NetworkSwitched { network } => write!(f, "Switched to {network}."),
            Status::Submitted { .. } => write!(f, "Transaction sent! Waiting for confirmation..."),
            Status::Confirmed {
                symbol,
                explorer_url,
            } => {
                write!(f, "Success! 0.0001 {symbol} sent to the bank.")?;
                if let Some(url) = explorer_url {
                    write!(f, " View on explorer: {url}")?;
                }
                Ok(())
            }
            Status::Error(message) => write!(f, "{message}"),
        }
    }
}
