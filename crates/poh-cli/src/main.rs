//! Proof-of-History Oracle CLI - deploy a registry, commit a dataset, verify it

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::Parser;
use poh_ledger::{DeploymentDescriptor, LocalLedger};
use poh_oracle::{Dataset, Identity, Oracle, OracleConfig, Principal};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "poh")]
#[command(about = "Proof-of-History Oracle - tamper-evident commitments for historical records")]
struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ledger database path (overrides the configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Deployment descriptor path (overrides the configuration)
    #[arg(long, global = true)]
    deployment: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Deploy a new registry and write its deployment descriptor
    Deploy {
        /// Registry owner (defaults to the configured caller)
        #[arg(long)]
        owner: Option<String>,
        /// Replace an existing descriptor
        #[arg(long)]
        force: bool,
    },
    /// Commit every row of the dataset
    Commit {
        /// Dataset CSV path (overrides the configuration)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
        /// Signing principal (overrides the configuration)
        #[arg(long)]
        caller: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify every row of the dataset against the registry
    Verify {
        /// Dataset CSV path (overrides the configuration)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the stored commitment for one record
    Get {
        /// Entity id, e.g. AAPL
        #[arg(long)]
        name: String,
        /// As-of date, YYYY-MM-DD
        #[arg(long)]
        date: String,
    },
    /// Show registry owner, entry count and state root
    Status,
    /// List the registry's commit events
    History {
        /// Print events as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check configuration, descriptor and dataset header
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => OracleConfig::load(path)?,
        None => OracleConfig::default(),
    };
    if let Some(db) = cli.db {
        config.ledger.db_path = db;
    }
    if let Some(deployment) = cli.deployment {
        config.ledger.deployment_path = deployment;
    }

    match cli.command {
        Commands::Deploy { owner, force } => deploy(&config, owner, force).await,
        Commands::Commit {
            dataset,
            caller,
            json,
        } => {
            if let Some(path) = dataset {
                config.dataset.path = path;
            }
            if let Some(caller) = caller {
                config.client.caller = caller;
            }
            config.validate()?;
            let (oracle, ledger) = connect(config)?;
            let dataset = oracle.load_dataset()?;
            let report = oracle.commit(&dataset).await;
            ledger.flush().await?;
            print(&report, json)?;
            match report.failure {
                Some(failure) => bail!("commit run failed: {failure}"),
                None => Ok(()),
            }
        }
        Commands::Verify { dataset, json } => {
            if let Some(path) = dataset {
                config.dataset.path = path;
            }
            let (oracle, _) = connect(config)?;
            let dataset = oracle.load_dataset()?;
            let report = oracle.verify(&dataset).await;
            print(&report, json)?;
            match report.failure {
                Some(failure) => bail!("verification run failed: {failure}"),
                None => Ok(()),
            }
        }
        Commands::Get { name, date } => {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("bad date {date:?}, expected YYYY-MM-DD"))?;
            let identity = Identity::new(name, date)?;
            let (oracle, _) = connect(config)?;
            match oracle.lookup(&identity).await? {
                Some(commitment) => println!("{identity}  {commitment}"),
                None => println!("{identity}  not committed"),
            }
            Ok(())
        }
        Commands::Status => {
            let (oracle, _) = connect(config)?;
            println!("{}", oracle.status().await?);
            Ok(())
        }
        Commands::History { json } => {
            let (oracle, _) = connect(config)?;
            let events = oracle.history().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for e in &events {
                    println!(
                        "{:>6}  {:<24} {}  {}  {}",
                        e.sequence,
                        e.identity.to_string(),
                        e.commitment,
                        e.caller,
                        e.timestamp.to_rfc3339()
                    );
                }
                println!("{} events", events.len());
            }
            Ok(())
        }
        Commands::Check => check(config),
    }
}

/// Opens the local ledger and binds an oracle to the configured deployment.
fn connect(config: OracleConfig) -> anyhow::Result<(Oracle, Arc<LocalLedger>)> {
    let ledger = open_ledger(&config.ledger.db_path)?;
    let oracle = Oracle::connect(config, Arc::clone(&ledger) as _)?;
    Ok((oracle, ledger))
}

fn open_ledger(path: &Path) -> anyhow::Result<Arc<LocalLedger>> {
    let ledger = LocalLedger::open(path)
        .with_context(|| format!("cannot open ledger at {}", path.display()))?;
    Ok(Arc::new(ledger))
}

async fn deploy(config: &OracleConfig, owner: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = &config.ledger.deployment_path;
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to deploy a new registry",
            path.display()
        );
    }

    let owner = Principal::new(owner.unwrap_or_else(|| config.client.caller.clone()));
    let ledger = open_ledger(&config.ledger.db_path)?;
    let descriptor = ledger.deploy(&owner).await?;
    descriptor.save(path, force)?;
    ledger.flush().await?;

    println!("registry deployed at {}", descriptor.address);
    println!("owner:      {}", descriptor.owner);
    println!("descriptor: {}", path.display());
    Ok(())
}

fn check(config: OracleConfig) -> anyhow::Result<()> {
    config.validate()?;
    println!("configuration: ok");

    let descriptor = DeploymentDescriptor::load(&config.ledger.deployment_path)?;
    println!(
        "descriptor:    ok ({} functions, registry {})",
        descriptor.interface.len(),
        descriptor.address
    );

    let dataset = Dataset::load(&config.dataset.path)?;
    println!(
        "dataset:       ok ({} rows, {} malformed)",
        dataset.len(),
        dataset.malformed()
    );

    let caller = config.client.caller();
    if descriptor.owner != caller {
        println!(
            "warning: caller {} is not the registry owner {}; commits will be refused",
            caller, descriptor.owner
        );
    }
    Ok(())
}

fn print<T: Serialize + std::fmt::Display>(report: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
