// src/main.rs - Command line host for a single board driver
use clap::{Parser, Subcommand};
use firmata_bridge::config::{self, DriverConfig};
use firmata_bridge::{driver, parse_item_name, EventKind, ItemValue};
use std::path::PathBuf;

/// Expose the pins of a Firmata board as named items.
#[derive(Parser, Debug)]
#[command(name = "firmata-bridge", version, about)]
struct Cli {
    /// Path to a TOML config file; defaults are used if it does not exist
    #[arg(short, long, default_value = "driver.toml")]
    config: PathBuf,

    /// Use the simulated board
    #[arg(long)]
    sim: bool,

    /// Serial port of the board (overrides the config file)
    #[arg(long)]
    port: Option<String>,

    /// Item to register, in addition to the configured ones (repeatable)
    #[arg(long = "item")]
    items: Vec<String>,

    /// Print value changes as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the driver and print value changes until Ctrl-C (default)
    Run,
    /// Validate item names and exit
    Check {
        names: Vec<String>,
    },
}

fn load(cli: &Cli) -> Result<DriverConfig, config::ConfigError> {
    let mut config = if cli.config.exists() {
        config::load_config(&cli.config.to_string_lossy())?
    } else {
        DriverConfig::default()
    };
    config.apply_env_overrides()?;
    if cli.sim {
        config.sim_mode = true;
    }
    if let Some(port) = &cli.port {
        config.port_name = Some(port.clone());
    }
    config.items.extend(cli.items.iter().cloned());
    config.validate()?;
    Ok(config)
}

fn print_value(value: &ItemValue, json: bool) {
    if json {
        match serde_json::to_string(value) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to encode {}: {}", value.name, e),
        }
    } else {
        println!("{} = {} (quality {})", value.name, value.value, value.quality.code());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    let config = load(&cli).map_err(|e| {
        eprintln!("Failed to load config from '{}': {}", cli.config.display(), e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.log_filter()?)
        .init();

    if let Some(Commands::Check { names }) = &cli.command {
        let mut failed = false;
        for name in names {
            match parse_item_name(name) {
                Ok(kind) => println!("{}: ok ({:?})", name, kind),
                Err(e) => {
                    println!("{}: {}", name, e);
                    failed = true;
                }
            }
        }
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }

    tracing::info!("Starting firmata-bridge {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Board: {} ({}), sampling every {} ms",
        config.port_label(),
        if config.sim_mode { "simulated" } else { "serial" },
        config.sampling_interval
    );

    let driver = driver::create(&config);
    let json = cli.json;
    driver.subscribe(EventKind::ItemValue, move |value| print_value(value, json))?;
    for item in &config.items {
        // Already logged by the driver; keep going with the valid ones.
        let _ = driver.register(item);
    }
    driver.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    driver.shutdown().await;
    Ok(())
}
