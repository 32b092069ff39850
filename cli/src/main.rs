//! Connectkit CLI
//!
//! Command-line companion for the connectkit wallet connection client.
//! It inspects the chain registry, parses CAIP identifiers, manages the
//! client configuration and the persisted wallet choice, and can run an
//! in-process connection against a local wallet.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use connectkit_client::discovery::{AnnounceEvent, LocalDiscoveryChannel, ProviderInfo};
use connectkit_client::memory::{MemoryProvider, MemoryRelayFactory};
use connectkit_client::ModalClient;
use connectkit_core::config::{LogFormat, LoggingSettings, StorageSettings};
use connectkit_core::types::{DISCOVERY_CONNECTOR_ID, INJECTED_CONNECTOR_ID};
use connectkit_core::{
    CaipAddress, CaipNetworkId, ChainRegistry, ClientConfig, FileStore, MemoryStore,
    PersistentStore, WALLET_CHOICE_KEY,
};

/// Connectkit CLI
#[derive(Parser, Debug)]
#[command(
    name = "connectkit",
    version = env!("CARGO_PKG_VERSION"),
    about = "Command-line companion for the connectkit wallet connection client",
    long_about = "Inspect chain metadata and CAIP identifiers, manage the client \
                 configuration and the remembered wallet, and run a local connection."
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CONNECTKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Main CLI commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Chain registry commands
    #[command(subcommand, alias = "c")]
    Chains(ChainCommands),

    /// CAIP identifier helpers
    #[command(subcommand)]
    Caip(CaipCommands),

    /// Configuration management
    #[command(subcommand, alias = "cfg")]
    Config(ConfigCommands),

    /// Persisted session commands
    #[command(subcommand, alias = "s")]
    Session(SessionCommands),

    /// Connect a local wallet through the client and print the session
    Demo {
        /// Chain the local wallet starts on
        #[arg(long, default_value_t = 1)]
        chain: u64,

        /// Chain to switch to once connected
        #[arg(long)]
        switch_to: Option<u64>,

        /// Connect through the discovery handshake instead of the injected provider
        #[arg(long)]
        announced: bool,
    },

    /// Show current version
    Version,
}

/// Chain registry subcommands
#[derive(Subcommand, Debug)]
enum ChainCommands {
    /// List known chains
    List {
        /// Show RPC and explorer URLs
        #[arg(short, long)]
        detailed: bool,
    },

    /// Show one chain
    Show {
        /// Numeric chain id
        chain_id: u64,

        /// Print the wallet_addEthereumChain parameters as JSON
        #[arg(long)]
        add_params: bool,
    },
}

/// CAIP subcommands
#[derive(Subcommand, Debug)]
enum CaipCommands {
    /// Parse a CAIP-2 network id or CAIP-10 address
    Parse {
        /// Identifier, e.g. `eip155:137` or `eip155:1:0xab..`
        id: String,
    },
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Initialize configuration
    Init {
        /// Project id issued by the relay service
        #[arg(short, long)]
        project_id: String,

        /// Requested chains
        #[arg(long, value_delimiter = ',', default_value = "1")]
        chains: Vec<u64>,

        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
    },

    /// Validate the configuration
    Validate,
}

/// Persisted session subcommands
#[derive(Subcommand, Debug)]
enum SessionCommands {
    /// Show the remembered wallet choice
    Show {
        /// Storage directory, overriding the configuration
        #[arg(long)]
        storage_dir: Option<PathBuf>,
    },

    /// Forget the remembered wallet choice
    Forget {
        /// Storage directory, overriding the configuration
        #[arg(long)]
        storage_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

/// Initialize logging from the configured settings; `--verbose` forces debug
fn init_logging(verbose: bool, settings: &LoggingSettings) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        settings.level.to_tracing_level()
    };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr);

    let installed = match settings.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    installed.context("setting default subscriber failed")
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("connectkit")
        .join("config.yaml")
}

fn load_config(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        debug!("No configuration at {}, using defaults", path.display());
        return Ok(ClientConfig::default());
    }
    ClientConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

fn chain_registry(config: &ClientConfig) -> ChainRegistry {
    ChainRegistry::with_presets().with_images(config.networks.chain_images.clone())
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);

    // A broken file is reported by the command that loads it
    let logging = load_config(&config_path)
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(cli.verbose, &logging)?;

    debug!("Using configuration path {}", config_path.display());

    match cli.command {
        Commands::Chains(cmd) => handle_chain_command(cmd, &load_config(&config_path)?)?,
        Commands::Caip(cmd) => handle_caip_command(cmd)?,
        Commands::Config(cmd) => handle_config_command(cmd, &config_path)?,
        Commands::Session(cmd) => handle_session_command(cmd, &load_config(&config_path)?)?,
        Commands::Demo {
            chain,
            switch_to,
            announced,
        } => run_demo(load_config(&config_path)?, chain, switch_to, announced).await?,
        Commands::Version => {
            println!("connectkit CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Core library: {}", connectkit_core::VERSION);
            println!("Client library: {}", connectkit_client::VERSION);
        }
    }

    Ok(())
}

/// Handle chain commands
fn handle_chain_command(cmd: ChainCommands, config: &ClientConfig) -> Result<()> {
    let registry = chain_registry(config);

    match cmd {
        ChainCommands::List { detailed } => {
            for chain in registry.chains() {
                let name = chain.name.as_deref().unwrap_or("Unknown");
                let currency = chain.currency.as_deref().unwrap_or("-");
                if detailed {
                    println!(
                        "{:>12}  {:<20} {:<6} {}  {}",
                        chain.chain_id,
                        name,
                        currency,
                        chain.rpc_url.as_deref().unwrap_or("-"),
                        chain.explorer_url.as_deref().unwrap_or("-"),
                    );
                } else {
                    println!("{:>12}  {:<20} {}", chain.chain_id, name, currency);
                }
            }
        }
        ChainCommands::Show {
            chain_id,
            add_params,
        } => {
            if add_params {
                let params = registry
                    .add_chain_params(chain_id)
                    .with_context(|| format!("Chain {} is not fully described", chain_id))?;
                println!("{}", serde_json::to_string_pretty(&params)?);
                return Ok(());
            }

            let network = registry.network(chain_id);
            println!("Network:  {}", network.id);
            println!("Name:     {}", network.name.as_deref().unwrap_or("Unknown"));
            if let Some(currency) = registry.currency(chain_id) {
                println!("Currency: {}", currency);
            }
            if let Some(rpc_url) = registry.rpc_url(chain_id) {
                println!("RPC:      {}", rpc_url);
            }
            if let Some(explorer) = registry.explorer_url(chain_id) {
                println!("Explorer: {}", explorer);
            }
            if let Some(image) = network.image_url.as_deref().or(network.image_id.as_deref()) {
                println!("Image:    {}", image);
            }
        }
    }
    Ok(())
}

/// Handle CAIP commands
fn handle_caip_command(cmd: CaipCommands) -> Result<()> {
    match cmd {
        CaipCommands::Parse { id } => {
            if id.matches(':').count() >= 2 {
                let address: CaipAddress = id.parse()?;
                println!("Namespace: {}", address.network.namespace);
                println!("Reference: {}", address.network.reference);
                println!("Address:   {}", address.address);
            } else {
                let network: CaipNetworkId = id.parse()?;
                println!("Namespace: {}", network.namespace);
                println!("Reference: {}", network.reference);
                if let Some(chain_id) = network.chain_id() {
                    println!("Chain id:  {}", chain_id);
                }
            }
        }
    }
    Ok(())
}

/// Handle config commands
fn handle_config_command(cmd: ConfigCommands, path: &Path) -> Result<()> {
    match cmd {
        ConfigCommands::Init {
            project_id,
            chains,
            force,
        } => {
            if path.exists() && !force {
                bail!(
                    "Configuration already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut builder = ClientConfig::builder()
                .with_project_id(project_id)
                .with_chains(chains.clone());
            if let Some(first) = chains.first() {
                builder = builder.with_default_chain(*first);
            }
            let config = builder.build();
            config.validate()?;

            match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => config.save_to_json_file(path)?,
                _ => config.save_to_yaml_file(path)?,
            }
            info!("Configuration written to {}", path.display());
            println!("Configuration written to {}", path.display());
        }
        ConfigCommands::Show { format } => {
            let config = load_config(path)?;
            match format {
                Format::Yaml => print!("{}", serde_yaml::to_string(&config)?),
                Format::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            }
        }
        ConfigCommands::Validate => {
            let config = load_config(path)?;
            config.validate()?;
            println!("Configuration is valid");
        }
    }
    Ok(())
}

fn open_store(config: &ClientConfig, storage_dir: Option<PathBuf>) -> Result<FileStore> {
    let settings = match storage_dir {
        Some(path) => StorageSettings { path },
        None => config.storage.clone(),
    };
    FileStore::new(&settings)
        .with_context(|| format!("Failed to open storage at {}", settings.path.display()))
}

/// Handle session commands
fn handle_session_command(cmd: SessionCommands, config: &ClientConfig) -> Result<()> {
    match cmd {
        SessionCommands::Show { storage_dir } => {
            let store = open_store(config, storage_dir)?;
            match store.get(WALLET_CHOICE_KEY)? {
                Some(choice) => println!("Remembered wallet: {}", choice),
                None => println!("No wallet remembered"),
            }
        }
        SessionCommands::Forget { storage_dir } => {
            let store = open_store(config, storage_dir)?;
            store.remove(WALLET_CHOICE_KEY)?;
            println!("Wallet choice cleared");
        }
    }
    Ok(())
}

const DEMO_ADDRESS: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

/// Connect a local wallet and print how the session evolves
async fn run_demo(
    mut config: ClientConfig,
    chain: u64,
    switch_to: Option<u64>,
    announced: bool,
) -> Result<()> {
    if config.project.project_id.trim().is_empty() {
        warn!("No project id configured, using a local one");
        config.project.project_id = "local-demo".to_string();
    }
    if config.networks.chains.is_empty() {
        config.networks.chains = vec![chain];
    }

    let wallet = Arc::new(
        MemoryProvider::new()
            .with_accounts(vec![DEMO_ADDRESS.to_string()])
            .with_chain_id(chain)
            .with_flag("isMetaMask"),
    );
    let discovery = Arc::new(LocalDiscoveryChannel::new());
    discovery.register(AnnounceEvent::new(
        ProviderInfo::new("Local Wallet", "", "dev.connectkit.local"),
        wallet.clone(),
    ));

    let client = ModalClient::builder(config)
        .with_relay_factory(Arc::new(MemoryRelayFactory::new(Arc::new(
            MemoryProvider::new(),
        ))))
        .with_injected(wallet.clone())
        .with_discovery(discovery)
        .with_persistent_store(Arc::new(MemoryStore::new()))
        .build()?;
    client.ready().await;

    println!("Connectors:");
    for connector in client.connectors() {
        println!("  {:<16} {}", connector.id, connector.name);
    }

    let connector = client
        .connectors()
        .into_iter()
        .find(|connector| {
            if announced {
                connector.id == DISCOVERY_CONNECTOR_ID
            } else {
                connector.id == INJECTED_CONNECTOR_ID
            }
        })
        .context("No matching connector")?;
    client.connect_external(&connector).await?;
    print_state(&client);

    if let Some(target) = switch_to {
        let outcome = client.switch_network(target).await?;
        println!("Switch to {}: {:?}", target, outcome);
        print_state(&client);
    }

    client.disconnect().await?;
    println!("Disconnected");
    Ok(())
}

fn print_state(client: &ModalClient) {
    let state = client.get_state();
    let connection = client.connection();
    println!("Provider: {}", connection.provider_kind);
    if let Some(caip) = &state.caip_address {
        println!("Account:  {}", caip);
    }
    if let Some(network) = &state.selected_network {
        println!(
            "Network:  {} ({})",
            network.id,
            network.name.as_deref().unwrap_or("Unknown")
        );
    }
    if let Some(url) = &state.address_explorer_url {
        println!("Explorer: {}", url);
    }
}
