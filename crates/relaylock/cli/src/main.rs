//! `relaylock`: reads MIFARE Classic tags and opens the cash register relay
//! for authorised ones

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use relaylock_controller::mifare::{CardUid, SectorKey};
use relaylock_controller::{
    Admin, CardController, Config, JsonRegistry, Poller, ProvisionRequest, SysfsGpioRelay,
};
use relaylock_mifare_pcsc::{PcscConfig, PcscDeviceManager, PcscTransport};
use tracing::info;

mod commands;
mod display;

#[derive(Parser)]
#[command(version, about = "Cash register access control with MIFARE Classic tags")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = relaylock_controller::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Debug level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll for tags and pulse the relay for authorised ones, until Ctrl-C
    Run,

    /// List available readers
    Readers,

    /// Print the UID of the next presented tag
    ReadUid,

    /// Print the record of the tag in the field
    Read {
        /// Keys to read with
        #[arg(long, value_enum, default_value_t = KeyChoice::Any)]
        key: KeyChoice,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report which keys open the tag in the field
    Probe,

    /// Provision the next presented blank tag and register it
    Provision {
        #[arg(long)]
        username: String,

        /// External identifier of the user
        #[arg(long)]
        identifier: String,

        #[arg(long)]
        password: String,

        /// Registration time stored in the registry (default: now, in Unix seconds)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Remove a tag from the registry
    Deregister {
        /// UID of the tag (default: the next presented tag)
        #[arg(long)]
        uid: Option<CardUid>,

        /// Erase the record and restore the factory key first
        #[arg(long)]
        reset: bool,
    },

    /// Rewrite the flags of a legacy-layout tag in the current layout
    Migrate {
        /// UID of the tag (default: the next presented tag)
        #[arg(long)]
        uid: Option<CardUid>,
    },

    /// List registered tags
    List {
        /// Print the registry as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Key selection for reading a record
#[derive(Clone, Copy, ValueEnum)]
enum KeyChoice {
    /// The factory key
    Default,
    /// The installation key
    Custom,
    /// The factory key, then the installation key
    Any,
}

impl KeyChoice {
    fn resolve(self, config: &Config) -> Option<SectorKey> {
        match self {
            Self::Default => Some(SectorKey::DEFAULT),
            Self::Custom => Some(config.custom_key()),
            Self::Any => None,
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Commands::Readers = cli.command {
        return commands::list_readers(&PcscDeviceManager::new()?);
    }

    let config = Config::load(&cli.config)?;
    let registry = Arc::new(JsonRegistry::new(&config.registry_path));
    if let Commands::List { json } = cli.command {
        return commands::list_tags(registry.as_ref(), json);
    }

    let manager = PcscDeviceManager::new()?;
    let transport = open_transport(&manager, &config)?;
    let controller = Arc::new(CardController::from_config(transport, &config));
    let admin = Admin::from_config(Arc::clone(&controller), registry, &config);

    match cli.command {
        Commands::Readers | Commands::List { .. } => unreachable!(), // Already handled above
        Commands::Run => {
            let relay = SysfsGpioRelay::open(config.relay.gpio, config.relay.active_low)?;
            let mut poller = Poller::from_config(controller, relay, &config);
            poller.run(shutdown_signal()).await;
        }
        Commands::ReadUid => commands::read_uid(&admin).await?,
        Commands::Read { key, json } => {
            commands::read_record(&controller, key.resolve(&config), json).await?
        }
        Commands::Probe => commands::probe(&admin).await?,
        Commands::Provision {
            username,
            identifier,
            password,
            timestamp,
        } => {
            let request = ProvisionRequest {
                username,
                identifier,
                password,
                timestamp: timestamp.unwrap_or_else(commands::now),
            };
            commands::provision(&admin, request).await?
        }
        Commands::Deregister { uid, reset } => commands::deregister(&admin, uid, reset).await?,
        Commands::Migrate { uid } => commands::migrate(&admin, uid).await?,
    }

    Ok(())
}

fn open_transport(manager: &PcscDeviceManager, config: &Config) -> eyre::Result<PcscTransport> {
    let transport = manager.open(config.reader.as_deref(), PcscConfig::default())?;
    info!("Using reader: {}", transport.reader_name());
    Ok(transport)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();
}
