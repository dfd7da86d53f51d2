//! wgclient - WireGuard client config generator
//!
//! Reads the user registry, resolves the allow-listed DNS names and writes one
//! client config per user and variant.

use clap::{Parser, Subcommand};
use libwgclient::*;
use std::path::PathBuf;
use std::process;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "wgclient")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "WireGuard client config generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Registry JSON document
    #[arg(short = 'r', long, global = true)]
    registry: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(short = 's', long, global = true)]
    settings: Option<PathBuf>,

    /// DNS server (ip, ip:port or host:port) used to resolve DNSNames instead of the system resolver
    #[arg(long, global = true)]
    nameserver: Option<String>,

    /// Keep AllowedIPs as written in the registry, skip DNSNames
    #[arg(long, global = true)]
    no_resolve: bool,

    /// Debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write client configs for the selected users
    Generate {
        /// Output directory
        #[arg(short = 'o', long)]
        out: Option<PathBuf>,

        /// Only users whose name or email contains this text (repeatable)
        #[arg(short = 'm', long = "match")]
        matches: Vec<String>,

        /// Only users with this tag (repeatable)
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,
    },

    /// List users in the registry
    List,

    /// Print one client config
    Show {
        /// User name
        name: String,

        /// Interface index
        #[arg(long = "if", default_value_t = 0)]
        interface: u32,

        /// Leave out the DNS line
        #[arg(long)]
        no_dns: bool,

        /// Route the DNS servers through the tunnel
        #[arg(long)]
        route_dns: bool,
    },

    /// Print the resolved AllowedIPs list
    AllowedIps,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so rendered configs can be piped
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> WgClientResult<()> {
    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(path) = &cli.registry {
        settings.paths.registry = path.clone();
    }
    if let Some(nameserver) = &cli.nameserver {
        settings.resolver.nameserver = Some(nameserver.clone());
    }

    let mut registry = Registry::load(&settings.paths.registry)?;

    match cli.command {
        Commands::Generate { out, matches, tags } => {
            if !cli.no_resolve {
                update_allowed_ips(&mut registry, &settings).await?;
            }

            let mut users = registry.users.clone();
            if !matches.is_empty() {
                users = users.matching(&matches);
            }
            if !tags.is_empty() {
                users = users.with_tags(&tags);
            }
            if users.is_empty() {
                warn!("No users selected");
            }

            let dir = out.unwrap_or_else(|| settings.paths.output_dir.clone());
            let written = write_client_configs(&dir, &registry, &users, settings.output.file_mode).await?;
            for path in &written {
                println!("{}", path.display());
            }
        }
        Commands::List => {
            for (key, user) in registry.users.sorted() {
                println!("{}\t{}\t{}\t{}", key, user.name, user.email, user.tags.join(","));
            }
        }
        Commands::Show { name, interface, no_dns, route_dns } => {
            if !cli.no_resolve {
                update_allowed_ips(&mut registry, &settings).await?;
            }

            let (key, user) = registry.users.find_by_name(&name)?;
            let cc = ClientConfig { interface, no_dns, route_dns };
            let ctx = TemplateContext::for_client(&registry, key, user, &cc)?;
            info!("Rendering {}", user.filename(&cc));
            print!("{}", render_client_config(&ctx));
        }
        Commands::AllowedIps => {
            if !cli.no_resolve {
                update_allowed_ips(&mut registry, &settings).await?;
            }
            for cidr in &registry.allowed_ips {
                println!("{}", cidr);
            }
        }
    }

    Ok(())
}

async fn make_resolver(settings: &Settings) -> WgClientResult<Box<dyn Resolve>> {
    match &settings.resolver.nameserver {
        Some(address) => {
            let resolver = NameserverResolver::from_endpoint(address)
                .await?
                .with_timeout(settings.resolver.timeout());
            info!("Resolving DNSNames via {}", resolver.server_addr());
            Ok(Box::new(resolver))
        }
        None => Ok(Box::new(SystemResolver::new())),
    }
}

/// Replace the registry's AllowedIPs with the built list, Ctrl+C aborts
async fn update_allowed_ips(registry: &mut Registry, settings: &Settings) -> WgClientResult<()> {
    let builder = AllowlistBuilder::new(make_resolver(settings).await?);

    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler, never cancel
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, aborting allow-list build");
    };

    registry
        .update_allowed_ips(&builder, interrupted, settings.resolver.build_timeout())
        .await
}
