//! Veloura CLI - checkout quotes and sandbox dry runs.
//!
//! # Usage
//!
//! ```bash
//! # Price a cart against every shipping rate
//! vl-cli quote cart.yaml
//!
//! # Run a full checkout against the in-process sandbox
//! vl-cli checkout cart.yaml --payment-method pm_card_visa
//!
//! # Same, with a declining test card
//! vl-cli checkout cart.yaml --payment-method pm_card_chargeDeclined
//!
//! # Check a cart file without pricing it
//! vl-cli validate cart.yaml
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "vl-cli")]
#[command(author, version, about = "Veloura checkout tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price a cart file against every shipping rate
    Quote {
        /// Path to the YAML cart file
        file: PathBuf,
    },
    /// Run a full checkout against the sandbox backends
    Checkout {
        /// Path to the YAML cart file
        file: PathBuf,

        /// Payment method reference to pay with
        #[arg(short, long, default_value = "pm_card_visa")]
        payment_method: String,

        /// Stock level to seed for every line
        #[arg(short, long)]
        stock: Option<u32>,
    },
    /// Validate a cart file
    Validate {
        /// Path to the YAML cart file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Quote { file } => commands::quote::run(&file).await?,
        Commands::Checkout {
            file,
            payment_method,
            stock,
        } => {
            commands::checkout::run(commands::checkout::DryRun {
                file_path: &file,
                payment_method: &payment_method,
                stock,
            })
            .await?;
        }
        Commands::Validate { file } => {
            let cart = commands::cart_file::CartFile::load(&file).await?;
            tracing::info!(items = cart.items.len(), currency = ?cart.currency, "Cart file is valid");
        }
    }
    Ok(())
}
