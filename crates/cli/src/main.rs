//! Certificate registry command line interface
//!
//! Submits registry actions against a local store and prints records and
//! receipts as JSON on stdout. Logs go to stderr.

mod app_config;

use anyhow::{Context, Result};
use certify_registry::{CallContext, CertifyContract};
use certify_storage::{MemoryStorage, SledStorage, Storage};
use certify_types::{AccountName, Action, CertificateId, OrganizationId, Signer};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app_config::{AppConfig, StorageBackend};

#[derive(Parser)]
#[command(name = "certify")]
#[command(about = "On-ledger certificate registry", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the sled store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage backend: sled or memory
    #[arg(long, global = true)]
    storage: Option<StorageBackend>,

    /// Account(s) authorizing the call. Defaults to the registry owner,
    /// plus the signer for signing actions.
    #[arg(long = "as", value_name = "ACCOUNT", global = true)]
    authorizers: Vec<AccountName>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Organization operations
    Org {
        #[command(subcommand)]
        action: OrgCommands,
    },
    /// Certificate operations
    Cert {
        #[command(subcommand)]
        action: CertCommands,
    },
    /// Submit a JSON array of actions as one transaction: all commit or none
    Apply {
        /// Path to the actions file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum OrgCommands {
    /// Register an issuing organization
    Register {
        id: OrganizationId,
        name: String,
    },
    /// Remove every organization
    Clear,
    /// Show one organization
    Show { id: OrganizationId },
    /// List all organizations
    List,
}

#[derive(Args)]
struct CertRef {
    /// Certificate id
    id: CertificateId,
    /// Owning organization id
    #[arg(long = "org")]
    organization_id: OrganizationId,
}

#[derive(Subcommand)]
enum CertCommands {
    /// Create a certificate
    Create {
        #[command(flatten)]
        cert: CertRef,
        /// Certificate content
        #[arg(long)]
        content: String,
        /// Participant account (repeatable)
        #[arg(long = "participant")]
        participants: Vec<AccountName>,
    },
    /// Delete a certificate
    Delete {
        #[command(flatten)]
        cert: CertRef,
    },
    /// Append unsigned signers to a certificate
    AddSigners {
        #[command(flatten)]
        cert: CertRef,
        #[arg(required = true)]
        signers: Vec<AccountName>,
    },
    /// Sign a certificate
    Sign {
        #[command(flatten)]
        cert: CertRef,
        #[arg(long)]
        signer: AccountName,
    },
    /// Remove every certificate of an organization
    Clear {
        #[arg(long = "org")]
        organization_id: OrganizationId,
    },
    /// Show one certificate
    Show {
        #[command(flatten)]
        cert: CertRef,
    },
    /// List the certificates of an organization
    List {
        #[arg(long = "org")]
        organization_id: OrganizationId,
    },
    /// Check whether an account participates in a certificate
    Participant {
        #[command(flatten)]
        cert: CertRef,
        account: AccountName,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }

    init_logging(&config)?;

    let storage = open_storage(&config)?;
    let contract = CertifyContract::new(config.owner.clone(), storage);

    let result = run(&contract, &cli.authorizers, cli.command);
    contract.flush().context("failed to flush storage")?;
    result
}

fn run(
    contract: &CertifyContract<dyn Storage>,
    authorizers: &[AccountName],
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Org { action } => match action {
            OrgCommands::Register { id, name } => {
                submit(contract, authorizers, Action::RegisterOrganization { id, name })
            }
            OrgCommands::Clear => submit(contract, authorizers, Action::ClearOrganizations),
            OrgCommands::Show { id } => print_json(&contract.organization(id)?),
            OrgCommands::List => print_json(&contract.organizations()?),
        },
        Commands::Cert { action } => match action {
            CertCommands::Create {
                cert,
                content,
                participants,
            } => submit(
                contract,
                authorizers,
                Action::CreateCertificate {
                    id: cert.id,
                    organization_id: cert.organization_id,
                    content,
                    participants,
                },
            ),
            CertCommands::Delete { cert } => submit(
                contract,
                authorizers,
                Action::DeleteCertificate {
                    id: cert.id,
                    organization_id: cert.organization_id,
                },
            ),
            CertCommands::AddSigners { cert, signers } => submit(
                contract,
                authorizers,
                Action::AddSigners {
                    id: cert.id,
                    organization_id: cert.organization_id,
                    signers: signers.into_iter().map(Signer::pending).collect(),
                },
            ),
            CertCommands::Sign { cert, signer } => submit(
                contract,
                authorizers,
                Action::SignCertificate {
                    id: cert.id,
                    organization_id: cert.organization_id,
                    signer,
                },
            ),
            CertCommands::Clear { organization_id } => submit(
                contract,
                authorizers,
                Action::ClearCertificates { organization_id },
            ),
            CertCommands::Show { cert } => {
                let certificate = contract.certificate(cert.id, cert.organization_id)?;
                print_json(&serde_json::json!({
                    "organization_id": cert.organization_id,
                    "status": certificate.status(),
                    "certificate": certificate,
                }))
            }
            CertCommands::List { organization_id } => {
                print_json(&contract.certificates(organization_id)?)
            }
            CertCommands::Participant { cert, account } => {
                let listed =
                    contract.has_participant(cert.id, cert.organization_id, &account)?;
                if !listed {
                    anyhow::bail!(
                        "{account} is not a participant of certificate {} in organization {}",
                        cert.id,
                        cert.organization_id
                    );
                }
                print_json(&serde_json::json!({ "participant": account, "listed": listed }))
            }
        },
        Commands::Apply { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let actions: Vec<Action> = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse actions in {}", file.display()))?;
            info!(count = actions.len(), file = %file.display(), "Applying actions");

            let ctx = batch_context(contract.owner(), authorizers, &actions);
            let receipts = contract
                .execute_batch(&ctx, actions)
                .with_context(|| format!("batch in {} was not applied", file.display()))?;
            print_json(&receipts)
        }
    }
}

/// Execute one action and print its receipt.
fn submit(
    contract: &CertifyContract<dyn Storage>,
    authorizers: &[AccountName],
    action: Action,
) -> Result<()> {
    let ctx = call_context(contract.owner(), authorizers, &action);
    let receipt = contract.execute(&ctx, action)?;
    print_json(&receipt)
}

/// The authorizers given on the command line, or the accounts a trusted
/// operator signs with by default: the owner, and the signer when signing.
fn call_context(owner: &AccountName, authorizers: &[AccountName], action: &Action) -> CallContext {
    if !authorizers.is_empty() {
        return CallContext::new(authorizers.iter().cloned());
    }

    match action {
        Action::SignCertificate { signer, .. } => {
            CallContext::new([owner.clone(), signer.clone()])
        }
        _ => CallContext::single(owner.clone()),
    }
}

/// Authority for a whole batch: the explicit authorizers, or the union of
/// the defaults of every action in it.
fn batch_context(
    owner: &AccountName,
    authorizers: &[AccountName],
    actions: &[Action],
) -> CallContext {
    if !authorizers.is_empty() {
        return CallContext::new(authorizers.iter().cloned());
    }

    let mut accounts = vec![owner.clone()];
    accounts.extend(actions.iter().filter_map(|action| match action {
        Action::SignCertificate { signer, .. } => Some(signer.clone()),
        _ => None,
    }));
    CallContext::new(accounts)
}

fn open_storage(config: &AppConfig) -> Result<Arc<dyn Storage>> {
    match config.storage {
        StorageBackend::Sled => {
            fs::create_dir_all(&config.data_dir).with_context(|| {
                format!("failed to create data dir {}", config.data_dir.display())
            })?;
            let path = config.data_dir.join("db");
            let storage = SledStorage::open(&path)
                .with_context(|| format!("failed to open store at {}", path.display()))?;
            info!(path = %path.display(), "Opened sled store");
            Ok(Arc::new(storage))
        }
        StorageBackend::Memory => {
            info!("Using in-memory store; nothing will be persisted");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "compact" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
