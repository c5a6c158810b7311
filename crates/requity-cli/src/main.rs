//! Requity CLI
//!
//! Operator command surface for the attribution & payout engine: register
//! websites, verify domain ownership, record conversions, and inspect
//! stats, the conversion log, and the payout escrow. Operation failures
//! print the error and exit nonzero; they never panic.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use requity_core::{amount, config, tracing_init};
use requity_engine::{
    AttributionEngine, EngineSettings, HttpDomainVerifier, OrderInfo, PaymentsApiClient,
};

#[derive(Parser, Debug)]
#[command(name = "requity")]
#[command(version, about = "Attribution & payout engine for referral conversions", long_about = None)]
struct Cli {
    /// Project directory for config resolution (.requity/settings.json)
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Path of the persisted state file (overrides config)
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// Emit machine-readable JSON instead of human output
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a website domain for attribution payouts
    Register {
        /// Domain to register, e.g. example.com
        domain: String,
        /// Wallet address that receives payouts
        owner: String,
    },
    /// Verify domain ownership and drain escrowed payouts
    Verify {
        website_id: String,
    },
    /// Record a conversion attributed to a website id or domain
    Track {
        /// Website id or domain the sale is attributed to
        website: String,
        /// URL the shopper followed
        #[arg(long)]
        source_url: String,
        /// External order id of the sale
        #[arg(long)]
        order_id: String,
        /// Sale amount (accepted, not used to scale the fixed payout)
        #[arg(long)]
        order_amount: Option<f64>,
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// Show stats for a registered website
    Stats {
        website_id: String,
    },
    /// List recorded conversions
    Conversions {
        #[arg(long)]
        website_id: Option<String>,
    },
    /// List escrowed payouts
    Payouts,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = config::load_config(cli.project_dir.as_deref())?;
    tracing_init::init_tracing(&format!("requity={}", config.engine.log_level), false);

    let state_path = cli
        .state_path
        .or_else(|| config.engine.state_path.clone())
        .or_else(config::default_state_path)
        .context("no state path configured and no default available")?;

    let verifier = HttpDomainVerifier::new(Duration::from_secs(config.verifier.fetch_timeout_secs))?;
    let ledger = PaymentsApiClient::new(
        &config.ledger.api_base_url,
        Duration::from_secs(config.ledger.request_timeout_secs),
    )?;
    let settings = EngineSettings {
        operator_address: config.engine.operator_address.clone(),
        payout_amount: config.engine.payout_amount_minor,
        auto_register_unknown_domains: config.engine.auto_register_unknown_domains,
    };
    let mut engine = AttributionEngine::open(state_path, settings, ledger, verifier);

    match cli.command {
        Command::Register { domain, owner } => {
            let outcome = engine.register(&domain, &owner)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if outcome.is_existing {
                println!("{domain} is already registered as {}", outcome.website_id);
                println!("\n{}", outcome.instructions);
            } else {
                println!("registered {domain} as {}", outcome.website_id);
                println!("\n{}", outcome.instructions);
            }
        }
        Command::Verify { website_id } => {
            let verified = engine.verify(&website_id).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "websiteId": website_id, "verified": verified }));
            } else if verified {
                println!("{website_id} verified; escrowed payouts drained");
            } else {
                println!("{website_id} failed the ownership check; publish the verification token and retry");
            }
            if !verified {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Track { website, source_url, order_id, order_amount, user_agent } => {
            let order = OrderInfo { order_id, order_amount, user_agent, additional_data: None };
            let conversion_id = engine.track_conversion(&website, &source_url, &order).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "conversionId": conversion_id }));
            } else {
                println!("conversion recorded: {conversion_id}");
            }
        }
        Command::Stats { website_id } => {
            let stats = engine.stats(&website_id)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(stats)?);
            } else {
                println!("domain:       {}", stats.domain);
                println!("owner:        {}", stats.owner);
                println!("verified:     {}", stats.is_verified);
                println!("conversions:  {}", stats.total_conversions);
                println!("earnings:     {} PYUSD", amount::to_token_string(stats.total_earnings));
            }
        }
        Command::Conversions { website_id } => {
            let conversions = engine.conversions(website_id.as_deref());
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&conversions)?);
            } else if conversions.is_empty() {
                println!("no conversions recorded");
            } else {
                for c in conversions {
                    println!(
                        "{}  {}  {} PYUSD  {} -> {}",
                        c.conversion_id,
                        c.website_id,
                        amount::to_token_string(c.amount),
                        c.source_url,
                        c.destination_url,
                    );
                }
            }
        }
        Command::Payouts => {
            let payouts = engine.pending_payouts();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(payouts)?);
            } else if payouts.is_empty() {
                println!("no escrowed payouts");
            } else {
                for p in payouts {
                    println!(
                        "{}  {}  {} PYUSD  {}",
                        p.conversion_id,
                        p.domain,
                        amount::to_token_string(p.amount),
                        p.status,
                    );
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
