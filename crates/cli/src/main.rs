//! cartsync CLI - drive the cart engine from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart (remote when CARTSYNC_AUTH_TOKEN is set, local otherwise)
//! cartsync show
//!
//! # Add two of a product to the local cart
//! cartsync add P1 2
//!
//! # Set a quantity from free-form text (invalid input is ignored)
//! cartsync set P1 5
//!
//! # Machine-readable output
//! cartsync --json show
//! ```
//!
//! # Commands
//!
//! - `show` - Print the cart
//! - `count` - Print the badge count (distinct lines)
//! - `add` - Add to the local cart
//! - `set` / `inc` / `dec` / `remove` - Change a line
//! - `clear` - Empty the cart

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartsync::config::CartConfig;

mod commands;

#[derive(Parser)]
#[command(name = "cartsync")]
#[command(author, version, about = "Shopping cart sync engine CLI")]
struct Cli {
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the cart
    Show,
    /// Show the number of distinct lines
    Count,
    /// Add a product to the local cart
    Add {
        /// Product id
        product_id: String,
        /// Quantity to add
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Set a line's quantity from text
    Set {
        /// Product id
        product_id: String,
        /// New quantity; anything but a positive integer is ignored
        #[arg(allow_hyphen_values = true)]
        quantity: String,
    },
    /// Increase a line's quantity by one
    Inc {
        /// Product id
        product_id: String,
    },
    /// Decrease a line's quantity by one (not below 1)
    Dec {
        /// Product id
        product_id: String,
    },
    /// Remove a line
    Remove {
        /// Product id
        product_id: String,
    },
    /// Empty the cart
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to warn so command output stays readable; RUST_LOG overrides
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartsync=warn".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match CartConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartConfig) -> Result<(), commands::CliError> {
    let session = commands::Session::open(config, cli.json)?;

    match cli.command {
        Commands::Show => session.show().await?,
        Commands::Count => session.count().await?,
        Commands::Add {
            product_id,
            quantity,
        } => session.add(&product_id, quantity).await?,
        Commands::Set {
            product_id,
            quantity,
        } => session.set(&product_id, &quantity).await?,
        Commands::Inc { product_id } => session.increment(&product_id).await?,
        Commands::Dec { product_id } => session.decrement(&product_id).await?,
        Commands::Remove { product_id } => session.remove(&product_id).await?,
        Commands::Clear => session.clear().await?,
    }
    Ok(())
}
