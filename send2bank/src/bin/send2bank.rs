use std::{
    backtrace::{Backtrace, BacktraceStatus},
    future::Future,
    path::PathBuf,
    sync::Arc,
};

use alloy::primitives::Address;
use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use colored::Colorize;
use send2bank::{
    cfg::Config,
    chains::ChainRegistry,
    session::Session,
    stats::{UsageRecord, UsageScope},
    status::{Status, StatusKind},
    storage::FileStore,
    streak,
    wallet::{Approval, AutoApprove, KeyWallet},
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(about = "Send 0.0001 ETH to the bank with a single click")]
struct Cli {
    /// Configuration files, merged in order. Each top-level key may appear in only one file.
    #[clap(long, short)]
    config: Vec<PathBuf>,
    #[clap(long, default_value = "false")]
    log_json: bool,
    /// Approve every wallet request without prompting.
    #[clap(long, short)]
    yes: bool,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect and bank from an interactive menu.
    Interactive,
    /// Connect, bank once and exit.
    Bank {
        /// Chain to bank on. Defaults to `default_chain` from the configuration.
        #[clap(long)]
        chain: Option<u64>,
    },
    /// Show the usage statistics recorded for an account.
    Stats {
        #[clap(long)]
        account: Address,
        #[clap(long)]
        chain: Option<u64>,
    },
    /// List the chains we can bank on.
    Chains,
}

/// Asks the user to confirm each wallet request on the terminal.
struct PromptApproval;

impl Approval for PromptApproval {
    fn approve(&self, request: &str) -> bool {
        // Wallet calls run on the runtime, and the prompt blocks on stdin.
        tokio::task::block_in_place(|| {
            cliclack::confirm(request)
                .initial_value(true)
                .interact()
                .unwrap_or(false)
        })
    }
}

type CliSession = Session<KeyWallet, FileStore>;

fn init_logging(log_json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_line_number(true)
        .with_ansi(false);
    if log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    // Record panics as `tracing` events at the `ERROR` verbosity level.
    std::panic::set_hook(Box::new(|panic| {
        let message = match panic.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };
        let backtrace = Backtrace::capture();
        let backtrace =
            (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());
        match (panic.location(), backtrace) {
            (Some(location), backtrace) => tracing::error!(
                message,
                panic.file = location.file(),
                panic.line = location.line(),
                backtrace = %backtrace.unwrap_or_default(),
            ),
            (None, backtrace) => {
                tracing::error!(message, backtrace = %backtrace.unwrap_or_default())
            }
        }
    }));
}

fn open_session(config: &Config, approval: Arc<dyn Approval>) -> Result<CliSession> {
    let wallet = config
        .wallet
        .as_ref()
        .map(|w| {
            KeyWallet::new(
                &w.private_key,
                &w.networks,
                approval,
                config.confirmation.policy(),
            )
        })
        .transpose()?;
    let store = FileStore::open(config.storage.data_dir()?, &config.storage.origin)?;
    let chains = ChainRegistry::new(&config.chains)?;
    Ok(Session::new(
        wallet,
        store,
        chains,
        config.default_chain,
        config.per_chain_stats,
    )?)
}

fn paint(status: &Status) -> String {
    let text = status.to_string();
    match status.kind() {
        StatusKind::Prompt => text,
        StatusKind::Pending => text.yellow().to_string(),
        StatusKind::Success => text.green().to_string(),
        StatusKind::Error => text.red().to_string(),
    }
}

/// Run a session action to completion, reporting every intermediate status it publishes.
async fn drive(
    action: impl Future<Output = Status>,
    mut updates: watch::Receiver<Status>,
    report: impl Fn(&Status),
) -> Status {
    tokio::pin!(action);
    loop {
        tokio::select! {
            status = &mut action => return status,
            Ok(()) = updates.changed() => {
                let status = updates.borrow_and_update().clone();
                report(&status);
            }
        }
    }
}

fn report_line(status: &Status) {
    if let Status::Submitted { tx_hash } = status {
        println!("{} ({tx_hash})", paint(status));
    } else if status.kind() == StatusKind::Pending {
        println!("{}", paint(status));
    }
}

async fn bank_once(
    config: &Config,
    chain: Option<u64>,
    approval: Arc<dyn Approval>,
) -> Result<()> {
    let mut session = open_session(config, approval)?;
    if let Some(chain_id) = chain {
        let status = session.select_chain(chain_id).await;
        if status.is_error() {
            return Err(anyhow!("{status}"));
        }
    }
    for step in [Step::Connect, Step::Bank] {
        let updates = session.subscribe();
        let status = match step {
            Step::Connect => drive(session.connect(), updates, report_line).await,
            Step::Bank => drive(session.bank(), updates, report_line).await,
        };
        println!("{}", paint(&status));
        if status.is_error() {
            return Err(anyhow!("{status}"));
        }
    }
    if let Some(usage) = session.usage() {
        println!(
            "{}",
            usage.display(
                streak::today(),
                &session.selected_chain().native_currency_symbol
            )
        );
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Step {
    Connect,
    Bank,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Action {
    Connect,
    Bank,
    Stats,
    SwitchNetwork,
    Disconnect,
    Quit,
}

async fn interactive(config: &Config, approval: Arc<dyn Approval>) -> Result<()> {
    let mut session = open_session(config, approval)?;
    cliclack::intro("send2bank".bold())?;
    cliclack::log::info(session.status())?;
    loop {
        let chain = session.selected_chain().clone();
        let action = match session.connection().account {
            Some(account) => {
                cliclack::log::step(format!("Connected: {account} on {}", chain.display_name))?;
                cliclack::select("What next?")
                    .item(
                        Action::Bank,
                        "Bank",
                        format!("send 0.0001 {}", chain.native_currency_symbol),
                    )
                    .item(Action::Stats, "Stats", "total sent and streak")
                    .item(Action::SwitchNetwork, "Switch network", "")
                    .item(Action::Disconnect, "Disconnect", "")
                    .item(Action::Quit, "Quit", "")
                    .interact()?
            }
            None => cliclack::select(format!("Network: {}", chain.display_name))
                .item(Action::Connect, "Connect Wallet", "")
                .item(Action::SwitchNetwork, "Switch network", "")
                .item(Action::Quit, "Quit", "")
                .interact()?,
        };

        let status = match action {
            Action::Connect => {
                // No spinner here: the wallet may prompt for approval while we wait.
                let updates = session.subscribe();
                drive(session.connect(), updates, |_| ()).await
            }
            Action::Bank => {
                let updates = session.subscribe();
                drive(session.bank(), updates, |s| {
                    if let Status::Submitted { tx_hash } = s {
                        let _ = cliclack::log::step(format!("{} {tx_hash}", paint(s)));
                    }
                })
                .await
            }
            Action::Stats => {
                if let Some(usage) = session.usage() {
                    let today = streak::today();
                    cliclack::log::info(usage.display(today, &chain.native_currency_symbol))?;
                }
                continue;
            }
            Action::SwitchNetwork => {
                let mut select = cliclack::select("Network");
                for descriptor in session.chains().iter() {
                    select = select.item(
                        descriptor.chain_id,
                        descriptor.display_name.clone(),
                        format!("chain {}", descriptor.chain_id),
                    );
                }
                let chain_id = select.initial_value(chain.chain_id).interact()?;
                session.select_chain(chain_id).await
            }
            Action::Disconnect => session.disconnect(),
            Action::Quit => break,
        };
        match status.kind() {
            StatusKind::Error => cliclack::log::error(status)?,
            StatusKind::Success => cliclack::log::success(status)?,
            _ => cliclack::log::info(status)?,
        }
    }
    cliclack::outro("Bye!")?;
    Ok(())
}

fn stats(config: &Config, account: Address, chain: Option<u64>) -> Result<()> {
    let chains = ChainRegistry::new(&config.chains)?;
    let chain_id = chain.unwrap_or(config.default_chain);
    let chain = chains
        .get(chain_id)
        .ok_or_else(|| anyhow!("Unsupported network {chain_id}"))?;
    let store = FileStore::open(config.storage.data_dir()?, &config.storage.origin)?;
    let usage = UsageRecord::load(
        &store,
        &UsageScope::new(chain_id, account, config.per_chain_stats),
    );
    println!("{account} on {}", chain.display_name.bold());
    println!(
        "{}",
        usage.display(streak::today(), &chain.native_currency_symbol)
    );
    Ok(())
}

fn list_chains(config: &Config) -> Result<()> {
    let chains = ChainRegistry::new(&config.chains)?;
    for chain in chains.iter() {
        let marker = if chain.chain_id == config.default_chain {
            "*".green().to_string()
        } else {
            " ".to_owned()
        };
        println!(
            "{marker} {:>8}  {:<20} {}  {}",
            chain.chain_id,
            chain.display_name,
            chain.contract_address,
            chain.rpc_url
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = Config::load(cli.config.as_slice())?;
    let approval: Arc<dyn Approval> = if cli.yes {
        Arc::new(AutoApprove)
    } else {
        Arc::new(PromptApproval)
    };

    match cli.command {
        Commands::Interactive => interactive(&config, approval).await,
        Commands::Bank { chain } => bank_once(&config, chain, approval).await,
        Commands::Stats { account, chain } => stats(&config, account, chain),
        Commands::Chains => list_chains(&config),
    }
}
