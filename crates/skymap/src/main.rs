mod commands;
mod load;

use clap::{Parser, Subcommand};
use skymap_cloud::{Cloud, ProviderRegistry, StubDriver};
use skymap_core::RunOptions;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sky")]
#[command(about = "Map-driven cloud provisioning", version)]
struct Cli {
    /// Main cloud configuration file
    #[arg(
        short = 'C',
        long,
        env = "SKYMAP_CONFIG",
        default_value = "/etc/skymap/cloud"
    )]
    config: PathBuf,

    /// Provider definitions file
    #[arg(
        short = 'P',
        long,
        env = "SKYMAP_PROVIDERS",
        default_value = "/etc/skymap/providers"
    )]
    providers: PathBuf,

    /// Profile definitions file
    #[arg(
        short = 'p',
        long,
        env = "SKYMAP_PROFILES",
        default_value = "/etc/skymap/profiles"
    )]
    profiles: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a map run would do, without touching any provider
    Plan {
        /// Map file
        map: PathBuf,
        /// Plan as a hard map (includes the destroy set)
        #[arg(long)]
        hard: bool,
    },
    /// Execute a map
    Apply {
        /// Map file
        map: PathBuf,
        /// Provision independent entries through the worker pool
        #[arg(long)]
        parallel: bool,
        /// Destroy live instances absent from the map
        #[arg(long)]
        hard: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Destroy named instances wherever they run
    Destroy {
        /// Instance names
        #[arg(required = true)]
        names: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Query provider inventory
    Query {
        /// Listing flavor: full, select or min
        #[arg(long)]
        kind: Option<String>,
    },
}

/// Every driver named by the provider configs is registered with the
/// compiled-in backend for it. This build ships the offline stub backend.
fn build_cloud(providers: &load::ProviderConfigs) -> Cloud {
    let mut registry = ProviderRegistry::new();
    let driver_names: BTreeSet<&String> = providers
        .values()
        .flat_map(|drivers| drivers.keys())
        .collect();
    for name in driver_names {
        registry.register_driver(Arc::new(StubDriver::new(name)));
    }
    for (alias, drivers) in providers {
        for (driver, config) in drivers {
            registry.add_provider(alias, driver, config.clone());
        }
    }
    Cloud::new(registry)
}

fn load_options(cli: &Cli) -> anyhow::Result<RunOptions> {
    if cli.config.is_file() {
        Ok(RunOptions::from_yaml_file(&cli.config)?)
    } else {
        Ok(RunOptions::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let providers = load::load_providers(&cli.providers)?;
    let cloud = build_cloud(&providers);
    let mut options = load_options(&cli)?;

    match cli.command {
        Commands::Plan { ref map, hard } => {
            options.hard = hard;
            let profiles = load::load_profiles(&cli.profiles)?;
            let rendered = load::load_map(map)?;
            commands::plan::handle(cloud, options, profiles, rendered).await
        }
        Commands::Apply {
            ref map,
            parallel,
            hard,
            yes,
        } => {
            options.parallel = options.parallel || parallel;
            options.hard = options.hard || hard;
            let profiles = load::load_profiles(&cli.profiles)?;
            let rendered = load::load_map(map)?;
            commands::apply::handle(cloud, options, profiles, rendered, yes).await
        }
        Commands::Destroy { names, yes } => {
            commands::destroy::handle(cloud, options, names, yes).await
        }
        Commands::Query { kind } => commands::query::handle(cloud, kind.as_deref()).await,
    }
}
