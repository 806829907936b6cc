//! Parley: multi-threaded modular TCP MITM proxy with TLS support.
//!
//! Grounded on `libs/messaging/relays/bin/relay.rs` for shape
//! (`#[tokio::main]`, `init_logging`, startup banner, `ctrl_c` shutdown
//! wait) with the relay domain/config-file logic replaced by the
//! CLI-driven [`Config`].

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use relay_core::{CliArgs, Config, ModuleRegistry};
use relay_engine::ConnectionBroker;

// Referenced so the crate is linked in and its `inventory::submit!`
// module registrations (display_client, display_server, hex_dump_client,
// hex_dump_server) are compiled into this binary.
use relay_modules as _;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const TAGLINE: &str = "Multi-Threaded Modular TCP Proxy with TLS support";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(&args.log_level, args.json_logs)?;

    info!("Parley v{VERSION} - {TAGLINE}");

    let config = Config::try_from_args(args).context("invalid configuration")?;

    info!("Loading client modules from {:?}", config.modules_client_dir);
    let modules_client = ModuleRegistry::load(&config.modules_client_dir)
        .context("failed to load client modules")?;
    for (name, description) in modules_client.module_descriptions() {
        info!("\t<-> {name} - {description}");
    }

    info!("Loading server modules from {:?}", config.modules_server_dir);
    let modules_server = ModuleRegistry::load(&config.modules_server_dir)
        .context("failed to load server modules")?;
    for (name, description) in modules_server.module_descriptions() {
        info!("\t<-> {name} - {description}");
    }

    let broker = ConnectionBroker::new(config, modules_client, modules_server)
        .context("invalid TLS configuration")?;

    let broker_task = tokio::spawn(async move {
        if let Err(e) = broker.run().await {
            error!("relay broker failed: {e}");
            std::process::exit(1);
        }
    });

    tokio::select! {
        res = broker_task => {
            res.context("broker task panicked")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}

fn init_logging(log_level: &str, json_logs: bool) -> anyhow::Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt().with_max_level(level);
    if json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

