use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use couples_finance_core::config::AppConfig;
use couples_finance_core::log::init_logging;
use couples_finance_core::models::asset::AssetType;
use couples_finance_core::models::owner::OwnerScope;
use couples_finance_core::services::admin_service::{HashedTokenVerifier, TriggerKind};
use couples_finance_core::services::scheduler::run_scheduler;
use couples_finance_core::storage::{DocumentStore, MemoryStore, StorageManager};
use couples_finance_core::CouplesFinance;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Run the price synchronizer on its schedule until interrupted
    Daemon {
        /// Minutes between store snapshots
        #[arg(long, default_value_t = 5)]
        persist_every: u64,
    },
    /// Trigger a price update immediately
    Sync {
        /// crypto, stock, gold or all
        kind: TriggerKind,
        /// Admin token
        #[arg(long, env = "COUPLES_FINANCE_ADMIN_TOKEN")]
        token: String,
    },
    /// Delete expired error, dead-letter and audit logs
    Cleanup,
    /// Print last synchronizer run times and counts
    Status,
    /// Hash an admin token for the `admin.token_hashes` setting
    HashToken { token: String },
    /// Available-balance ledger
    Ledger {
        #[arg(long)]
        user: String,
        #[arg(long)]
        couple: Option<String>,
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Show the current available balance
    Balance,
    /// Record income
    Income {
        amount: Decimal,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "cli")]
        source: String,
    },
    /// Record spending
    Spend {
        amount: Decimal,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "cli")]
        source: String,
    },
    /// Record an investment purchase and deduct its cost
    Invest {
        symbol: String,
        #[arg(value_parser = parse_asset_type)]
        asset_type: AssetType,
        quantity: f64,
        total_cost: Decimal,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Show monthly records and ledger entries
    History {
        /// Show ledger entries instead of monthly records
        #[arg(long)]
        transactions: bool,
    },
}

fn parse_asset_type(s: &str) -> Result<AssetType, String> {
    match s.to_lowercase().as_str() {
        "crypto" => Ok(AssetType::Crypto),
        "stock" => Ok(AssetType::Stock),
        "gold" => Ok(AssetType::Gold),
        other => Err(format!("unknown asset type '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(cli.config_path.as_deref()),
        Some(Commands::HashToken { token }) => {
            println!("{}", HashedTokenVerifier::hash_token(&token)?);
            Ok(())
        }
        Some(cmd) => run(cmd, cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "Application failed");
    }
    result
}

fn setup(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::default_config_path()?,
    };
    if path.exists() {
        bail!("Configuration file already exists at {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(&path, AppConfig::default().to_yaml()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Configuration written to {}", path.display());
    Ok(())
}

/// Open the encrypted store, run `cmd` against it and persist the result.
///
/// The store is persisted even when the command fails, so batches a job
/// committed before the failure are kept.
async fn run(cmd: Commands, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("Failed to load configuration")?;
    let password = config.storage_password()?;
    let store_path = config.store_path()?;

    let memory = Arc::new(StorageManager::open_store(&store_path, &password)?);
    let store: Arc<dyn DocumentStore> = memory.clone();
    let app = CouplesFinance::new(&config, store);

    let read_only = matches!(cmd, Commands::Status);
    let result = execute(cmd, &app, &memory, &store_path, &password).await;
    if read_only {
        return result;
    }

    let persisted = StorageManager::persist_store(&memory, &store_path, &password).await;
    match (result, persisted) {
        (Err(e), Err(persist_err)) => {
            error!("Snapshot failed after command error: {persist_err}");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), persisted) => Ok(persisted?),
    }
}

async fn execute(
    cmd: Commands,
    app: &CouplesFinance,
    memory: &MemoryStore,
    store_path: &Path,
    password: &str,
) -> Result<()> {
    match cmd {
        Commands::Daemon { persist_every } => {
            daemon(app, memory, store_path, password, persist_every).await?;
        }
        Commands::Sync { kind, token } => {
            let header = format!("Bearer {token}");
            let response = app.admin().handle(Some(&header), kind).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Cleanup => {
            let summary = app.sync().try_weekly_cleanup().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Status => {
            let status = app.sync().status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Ledger { user, couple, action } => {
            let owner = match couple {
                Some(c) => OwnerScope::couple(user, c),
                None => OwnerScope::user(user),
            };
            ledger(app, &owner, action).await?;
        }
        Commands::Setup | Commands::HashToken { .. } => bail!("command does not use the store"),
    }
    Ok(())
}

async fn daemon(
    app: &CouplesFinance,
    memory: &MemoryStore,
    store_path: &Path,
    password: &str,
    persist_every: u64,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(run_scheduler(
        app.sync().clone(),
        app.sync().schedule().clone(),
        shutdown_rx,
    ));

    let mut ticker = tokio::time::interval(Duration::from_secs(persist_every.max(1) * 60));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = StorageManager::persist_store(memory, store_path, password).await {
                    error!("Snapshot failed: {e}");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Shutdown requested");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    scheduler.await.context("Scheduler task panicked")?;
    Ok(())
}

async fn ledger(app: &CouplesFinance, owner: &OwnerScope, action: LedgerAction) -> Result<()> {
    let ledger = app.ledger();
    match action {
        LedgerAction::Balance => {
            println!("{}", ledger.get_current_balance(owner).await?);
        }
        LedgerAction::Income {
            amount,
            description,
            source,
        } => {
            let entry = ledger.add_income(owner, amount, &description, &source).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        LedgerAction::Spend {
            amount,
            description,
            source,
        } => {
            let entry = ledger
                .deduct_spending(owner, amount, &description, &source)
                .await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        LedgerAction::Invest {
            symbol,
            asset_type,
            quantity,
            total_cost,
            description,
        } => {
            let (investment, entry) = app
                .investments()
                .record_investment(owner, &symbol, asset_type, quantity, total_cost, &description)
                .await?;
            println!("{}", serde_json::to_string_pretty(&investment)?);
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        LedgerAction::History { transactions } => {
            if transactions {
                let entries = ledger.get_transaction_history(owner).await?;
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                let records = ledger.get_balance_history(owner).await?;
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
        }
    }
    Ok(())
}
