//! Command-line front end for the mapping service.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! url-mapper migrate
//!
//! # Shorten a URL, optionally with a custom code and expiry
//! url-mapper create https://example.com/long/path --code promo --expires-in 86400
//!
//! # Resolve a code (counts a click)
//! url-mapper resolve promo
//!
//! # Drop the cached entry, or soft-delete the mapping
//! url-mapper purge promo
//! url-mapper deactivate promo --yes
//!
//! # Show the stored record
//! url-mapper --json info promo
//! ```
//!
//! Configuration comes from the environment (and `.env`), see
//! [`url_mapper::config`].

use url_mapper::AppError;
use url_mapper::application::dto::CreateMappingRequest;
use url_mapper::bootstrap::Runtime;
use url_mapper::config::{self, Config};
use url_mapper::domain::entities::UrlMapping;
use url_mapper::infrastructure::persistence::run_migrations;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Create, resolve and manage short codes.
#[derive(Parser)]
#[command(name = "url-mapper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print machine-readable JSON instead of colored text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a short code for a URL
    Create {
        /// The URL to shorten (http or https)
        url: String,

        /// Custom short code (3-20 characters of letters, digits, '-' or '_')
        #[arg(short, long)]
        code: Option<String>,

        /// Expire the mapping after this many seconds
        #[arg(
            long,
            conflicts_with = "expires_at",
            value_parser = clap::value_parser!(i64).range(1..)
        )]
        expires_in: Option<i64>,

        /// Expire the mapping at this RFC 3339 timestamp
        #[arg(long)]
        expires_at: Option<DateTime<Utc>>,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Resolve a short code to its URL, counting a click
    Resolve { code: String },

    /// Remove a short code from the cache (the stored mapping is kept)
    Purge { code: String },

    /// Soft-delete a mapping and purge it from the cache
    Deactivate {
        code: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show the stored record for a short code
    Info { code: String },

    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = config::load_from_env()?;
    init_tracing(&config);
    config.print_summary();

    let runtime = Runtime::start(&config).await?;
    let result = run(&cli, &runtime).await;
    runtime.shutdown().await;

    result
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: &Cli, runtime: &Runtime) -> Result<()> {
    let service = runtime.service();

    match &cli.command {
        Commands::Create {
            url,
            code,
            expires_in,
            expires_at,
            title,
            description,
        } => {
            let expires_at = match expires_in {
                Some(secs) => Some(expiry_after(Utc::now(), *secs)?),
                None => *expires_at,
            };
            let request = CreateMappingRequest {
                original_url: url.clone(),
                custom_code: code.clone(),
                expires_at,
                title: title.clone(),
                description: description.clone(),
            };

            let mapping = service.create(request).await.map_err(describe)?;
            if cli.json {
                print_json(&mapping)?;
            } else {
                println!("{}", "✅ Mapping created".green().bold());
                print_mapping(&mapping);
            }
        }

        Commands::Resolve { code } => {
            let url = service.resolve(code).await.map_err(describe)?;
            if cli.json {
                print_json(&json!({ "code": code, "url": url }))?;
            } else {
                println!("{}", url.bright_white());
            }
        }

        Commands::Purge { code } => {
            let removed = service.purge(code).await.map_err(describe)?;
            if cli.json {
                print_json(&json!({ "code": code, "purged": removed }))?;
            } else if removed {
                println!("{} {}", "✅ Purged from cache:".green().bold(), code.cyan());
            } else {
                println!("{} {}", "Nothing cached for".yellow(), code.cyan());
            }
        }

        Commands::Deactivate { code, yes } => {
            if !*yes && !cli.json {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Deactivate '{code}'?"))
                    .default(false)
                    .interact()?;

                if !confirmed {
                    println!("{}", "❌ Cancelled".red());
                    return Ok(());
                }
            }

            let deactivated = service.deactivate(code).await.map_err(describe)?;
            if cli.json {
                print_json(&json!({ "code": code, "deactivated": deactivated }))?;
            } else if deactivated {
                println!("{} {}", "✅ Deactivated:".green().bold(), code.cyan());
            } else {
                println!("{} {}", "No active mapping for".yellow(), code.cyan());
            }
        }

        Commands::Info { code } => {
            let mapping = service.get_mapping(code).await.map_err(describe)?;
            if cli.json {
                print_json(&mapping)?;
            } else {
                print_mapping(&mapping);
            }
        }

        Commands::Migrate => {
            let pool = runtime
                .pool()
                .context("Migrations need DATABASE_URL or DB_* variables")?;
            run_migrations(pool)
                .await
                .context("Failed to apply migrations")?;

            if cli.json {
                print_json(&json!({ "migrated": true }))?;
            } else {
                println!("{}", "✅ Migrations applied".green().bold());
            }
        }
    }

    Ok(())
}

fn expiry_after(now: DateTime<Utc>, secs: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_seconds(secs)
        .and_then(|delta| now.checked_add_signed(delta))
        .context("expiry out of range")
}

/// Attaches the error kind so scripts can tell conflicts from outages.
fn describe(e: AppError) -> anyhow::Error {
    let kind = e.code();
    let status = e.status_code();
    anyhow::Error::new(e).context(format!("{kind} ({status})"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_mapping(mapping: &UrlMapping) {
    let status = if !mapping.is_active {
        "INACTIVE".red()
    } else if mapping.is_expired() {
        "EXPIRED".yellow()
    } else {
        "ACTIVE".green()
    };

    println!();
    println!("  Code:     {}", mapping.short_code.bright_yellow().bold());
    println!("  URL:      {}", mapping.original_url.cyan());
    println!("  Status:   {}", status);
    println!(
        "  Clicks:   {}",
        mapping.click_count.to_string().bright_white().bold()
    );
    if let Some(expires_at) = mapping.expires_at {
        println!(
            "  Expires:  {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC").to_string().bright_black()
        );
    }
    if let Some(ref title) = mapping.title {
        println!("  Title:    {}", title);
    }
    if let Some(ref description) = mapping.description {
        println!("  Notes:    {}", description);
    }
    println!(
        "  Created:  {}",
        mapping
            .created_at
            .format("%Y-%m-%d %H:%M")
            .to_string()
            .bright_black()
    );
    println!();
}
