//! Compute Gate CLI
//!
//! Operator tool for the token-gated compute meter: inspect the configured
//! backend, quote prices, read balances and run a real authorization.
//!
//! # Usage
//!
//! ```bash
//! # Dry run against the in-memory ledger (the default chain)
//! computegate quote 3
//!
//! # Solana devnet, key from a keypair file
//! COMPUTEGATE__CHAIN__FAMILY=solana \
//! COMPUTEGATE__CHAIN__RPC_URL=https://api.devnet.solana.com \
//! COMPUTEGATE__CHAIN__MINT=<mint> \
//! COMPUTEGATE__CHAIN__CREDENTIAL_FILE=~/.config/solana/id.json \
//!     computegate authorize <holder> 3
//!
//! # Everything from a file
//! computegate --config gate.toml balance 0xabc...
//! ```

mod backend;
mod config;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use computegate_meter::{price_request, Authorization, ComputeMeter, MeterConfig};
use computegate_types::{ComputeUnits, Identity};

use crate::config::{GateConfig, LoggingConfig};
use crate::output::Format;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Compute Gate - admit compute only after its token price is charged
#[derive(Parser, Debug)]
#[command(name = "computegate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, global = true, env = "COMPUTEGATE_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "COMPUTEGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, global = true, env = "COMPUTEGATE_LOG_FORMAT")]
    log_format: Option<String>,

    /// Output format for results
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Text)]
    output: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Price a number of compute units without touching the ledger
    Quote {
        /// Compute units to price
        units: u64,
    },

    #[command(flatten)]
    Ledger(LedgerCommand),
}

/// Commands that need the configured backend
#[derive(Subcommand, Debug)]
enum LedgerCommand {
    /// Show the chain, treasury and signing address in use
    Address,

    /// Read a holder's confirmed token balance
    Balance {
        /// Holder address on the configured chain
        holder: String,
    },

    /// Run one full authorization: price, balance check, charge
    Authorize {
        /// Requesting holder's address
        holder: String,

        /// Compute units requested
        units: u64,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut gate_config = GateConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        gate_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        gate_config.logging.format = format;
    }

    init_logging(&gate_config.logging)?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "computegate starting");

    let pricing = gate_config.pricing.build()?;

    let command = match args.command {
        Command::Quote { units } => {
            let amount = price_request(pricing.as_ref(), ComputeUnits::new(units))?;
            output::print_quote(args.output, pricing.name(), units, amount);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Ledger(command) => command,
    };

    let backend = backend::build(&gate_config.chain).await?;
    let signer = backend.signer;
    let meter = ComputeMeter::from_boxed(
        backend.chain,
        pricing,
        MeterConfig::from(&gate_config.meter),
    );

    match command {
        LedgerCommand::Address => {
            output::print_address(args.output, meter.backend(), signer.as_deref());
            Ok(ExitCode::SUCCESS)
        }
        LedgerCommand::Balance { holder } => {
            let holder = Identity::new(holder);
            let balance = meter.backend().get_balance(&holder).await?;
            output::print_balance(args.output, &holder, balance);
            Ok(ExitCode::SUCCESS)
        }
        LedgerCommand::Authorize { holder, units } => {
            let holder = Identity::new(holder);
            let outcome = meter.authorize(&holder, ComputeUnits::new(units)).await?;
            output::print_authorization(args.output, &holder, units, &outcome);
            Ok(exit_code(&outcome))
        }
    }
}

/// Admitted: 0, denied: 2, charge failed: 3 (errors exit with 1)
fn exit_code(outcome: &Authorization) -> ExitCode {
    match outcome {
        Authorization::Admitted { .. } => ExitCode::SUCCESS,
        Authorization::Denied { .. } => ExitCode::from(2),
        Authorization::ChargeFailed { .. } => ExitCode::from(3),
    }
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging; logs go to stderr so stdout carries results
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        _ => {
            subscriber
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }

    Ok(())
}
