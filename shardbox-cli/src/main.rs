//! Shardbox CLI
//!
//! Command-line client for erasure-coded blobber storage.
//!
//! # Commands
//! - `wallet` - Create, recover, or inspect the client wallet
//! - `upload` - Store a file across the allocation's blobbers
//! - `update` - Replace a stored file's content
//! - `download` - Reassemble a file from its shards
//! - `shared` - Download a file shared via an auth ticket
//! - `repair` - Re-upload missing shards to recovered blobbers
//! - `delete` - Remove a file from every blobber
//! - `list` - List a remote directory
//! - `stats` - Per-blobber statistics for a file
//! - `share` - Issue a read ticket for another client
//! - `sync` - Rebuild the local tree from the blobbers
//! - `config` - Show or initialize configuration
//!
//! # Configuration
//! Config file: ~/.shardbox/config.toml
//! Wallet: ~/.shardbox/wallet.json

use anyhow::Result;
use clap::{Parser, Subcommand};
use shardbox_client::{AllocationSession, HttpTransport, SessionConfig};
use std::sync::Arc;

mod commands;
mod config;
mod progress;

#[derive(Parser)]
#[command(name = "shardbox")]
#[command(about = "Erasure-coded blobber storage CLI")]
#[command(version)]
struct Cli {
    /// Allocation id (overrides config file)
    #[arg(long, global = true, env = "SHARDBOX_ALLOCATION")]
    allocation: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the client wallet
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },

    /// Store a file across the allocation's blobbers
    Upload {
        /// Local file to store
        local_path: String,

        /// Remote path, e.g. /docs/report.pdf
        remote_path: String,
    },

    /// Replace a stored file's content
    Update {
        /// Local file with the new content
        local_path: String,

        /// Remote path of the existing file
        remote_path: String,
    },

    /// Reassemble a file from its shards
    Download {
        /// Remote path
        remote_path: String,

        /// Output file (defaults to the remote file name)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Download a file shared with this client
    Shared {
        /// Base64 auth ticket
        ticket: String,

        /// Output file
        #[arg(short, long)]
        output: String,
    },

    /// Re-upload missing shards to recovered blobbers
    Repair {
        /// Local file holding the current content
        local_path: String,

        /// Remote path
        remote_path: String,
    },

    /// Remove a file from every blobber
    Delete {
        /// Remote path
        remote_path: String,

        /// Delete without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// List a remote directory
    List {
        /// Remote directory
        #[arg(default_value = "/")]
        dir_path: String,

        /// Show sizes and hashes
        #[arg(short, long)]
        long: bool,
    },

    /// Per-blobber statistics for a file
    Stats {
        /// Remote path
        remote_path: String,
    },

    /// Issue a read ticket for another client
    Share {
        /// Remote path
        remote_path: String,

        /// Client id of the grantee
        #[arg(long = "with")]
        referee: String,
    },

    /// Rebuild the local tree from the blobbers
    Sync,

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a new wallet (or recover one from a mnemonic)
    Create {
        /// Recover keys from this mnemonic instead of generating
        #[arg(short, long)]
        mnemonic: Option<String>,

        /// Overwrite an existing wallet
        #[arg(short, long)]
        force: bool,
    },

    /// Show the stored wallet's identity
    Show,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config();
    if let Some(allocation) = cli.allocation {
        cfg.allocation.id = allocation;
    }

    match cli.command {
        Commands::Wallet { command } => match command {
            WalletCommands::Create { mnemonic, force } => commands::wallet::create(mnemonic, force),
            WalletCommands::Show => commands::wallet::show(),
        },

        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => {
                println!("{}", toml::to_string_pretty(&cfg)?);
                Ok(())
            }
            Some(ConfigCommands::Path) => {
                println!("{}", config::config_path().display());
                Ok(())
            }
            Some(ConfigCommands::Init { force }) => {
                if config::config_path().exists() && !force {
                    anyhow::bail!("config already exists; pass --force to overwrite it");
                }
                config::save_config(&config::ShardboxConfig::default())?;
                println!("wrote {}", config::config_path().display());
                Ok(())
            }
        },

        command => {
            let session = open_session(&cfg)?;
            let result = dispatch(&session, command).await;
            // Persist the tree even after a failed operation; it always
            // reflects the session's view
            if let Ok(tree) = session.dir_tree_json().await {
                let _ = config::save_tree(session.allocation_id(), &tree);
            }
            session.close().await;
            result
        }
    }
}

async fn dispatch(session: &AllocationSession, command: Commands) -> Result<()> {
    match command {
        Commands::Upload {
            local_path,
            remote_path,
        } => commands::upload::run(session, &local_path, &remote_path, false).await,

        Commands::Update {
            local_path,
            remote_path,
        } => commands::upload::run(session, &local_path, &remote_path, true).await,

        Commands::Download {
            remote_path,
            output,
        } => commands::download::run(session, &remote_path, output).await,

        Commands::Shared { ticket, output } => {
            commands::download::shared(session, &ticket, &output).await
        }

        Commands::Repair {
            local_path,
            remote_path,
        } => commands::upload::repair(session, &local_path, &remote_path).await,

        Commands::Delete { remote_path, force } => {
            commands::delete::run(session, &remote_path, force).await
        }

        Commands::List { dir_path, long } => commands::list::run(session, &dir_path, long).await,

        Commands::Stats { remote_path } => commands::list::stats(session, &remote_path).await,

        Commands::Share {
            remote_path,
            referee,
        } => commands::share::run(session, &remote_path, &referee).await,

        Commands::Sync => {
            session.sync().await?;
            println!("tree synchronized");
            Ok(())
        }

        Commands::Wallet { .. } | Commands::Config { .. } => unreachable!("handled above"),
    }
}

fn open_session(cfg: &config::ShardboxConfig) -> Result<AllocationSession> {
    let alloc = &cfg.allocation;
    if alloc.id.is_empty() {
        anyhow::bail!(
            "no allocation configured; set allocation.id in {} or pass --allocation",
            config::config_path().display()
        );
    }
    if alloc.blobbers.is_empty() {
        anyhow::bail!(
            "no blobbers configured; add [[allocation.blobbers]] entries to {}",
            config::config_path().display()
        );
    }
    let wallet = config::load_wallet()?;
    let transport = Arc::new(HttpTransport::new(&alloc.id, &wallet)?);
    let tree = config::load_tree(&alloc.id);
    let session = AllocationSession::open(
        SessionConfig::new(alloc.id.clone(), alloc.data_shards, alloc.parity_shards),
        wallet,
        alloc.blobbers.clone(),
        tree.as_deref(),
        transport,
    )?;
    Ok(session)
}
