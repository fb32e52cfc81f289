mod browser;
mod config;
mod models;
mod scraper;
mod storage;
mod sync;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use crate::browser::Renderer;
use crate::config::AppConfig;
use crate::models::{ProductObservation, TrackedProduct};
use crate::scraper::{PageScraper, ProductSource};
use crate::storage::Catalog;
use crate::sync::SyncCycle;

#[derive(Parser)]
#[command(name = "shelfwatch", about = "Retailer listing price & stock tracker", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// One-off fetch of a product page (no catalog write)
    Fetch {
        /// Product page URL
        url: String,
    },

    /// Fetch a product page and start tracking it
    Add {
        /// Product page URL
        url: String,

        /// Unique business key for the record
        #[arg(long)]
        sku: String,

        /// Expected seller identity (defaults to the configured company)
        #[arg(long)]
        company: Option<String>,
    },

    /// Show one tracked product by sku
    Show {
        #[arg(long)]
        sku: String,
    },

    /// Run one sync cycle over the whole catalog (Ctrl-C stops between records)
    Sync,

    /// List tracked products, optionally filtered
    List {
        #[arg(value_enum, default_value = "all")]
        filter: ListFilter,
    },

    /// Stop tracking a product
    Remove {
        #[arg(long)]
        sku: String,
    },

    /// Show catalog statistics and the last cycle summary
    Stats,

    /// Apply schema migrations without touching any page
    Migrate,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListFilter {
    All,
    InStock,
    OutOfStock,
    BackInStock,
    PriceChanged,
    Updated,
    NotUpdated,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "shelfwatch=info,warn",
        1 => "shelfwatch=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Fetch { url } => {
            let url = parse_url(&url)?;
            let obs = fetch_once(&config, &url, &config.sync.default_company).await?;
            print_observation(&obs);
        }

        Command::Add { url, sku, company } => {
            let url = parse_url(&url)?;
            let company = company.unwrap_or_else(|| config.sync.default_company.clone());

            let obs = fetch_once(&config, &url, &company).await?;
            let product = TrackedProduct::from_observation(&obs, &sku, &company);

            let catalog = open_catalog(&config)?;
            catalog.insert(&product)?;
            println!("Tracking {} — {} [{}]", product.sku, product.title, product.new_stock);
        }

        Command::Show { sku } => {
            let catalog = open_catalog(&config)?;
            match catalog.find_by_sku(&sku)? {
                Some(product) => print_product(&product),
                None => println!("No product with sku {} in the catalog.", sku),
            }
        }

        Command::Sync => {
            let _t = utils::Timer::start("Sync cycle");

            let cancel = CancellationToken::new();
            let handle = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received — stopping after the current record");
                    handle.cancel();
                }
            });

            let report = SyncCycle::new(config, cancel).run().await?;
            println!(
                "Cycle finished: {} tracked, {} updated, {} failed",
                report.total, report.updated, report.failed
            );
        }

        Command::List { filter } => {
            let catalog = open_catalog(&config)?;
            let products = match filter {
                ListFilter::All => catalog.all()?,
                ListFilter::InStock => catalog.in_stock()?,
                ListFilter::OutOfStock => catalog.out_of_stock()?,
                ListFilter::BackInStock => catalog.back_in_stock()?,
                ListFilter::PriceChanged => catalog.price_changed()?,
                ListFilter::Updated => catalog.updated()?,
                ListFilter::NotUpdated => catalog.not_updated()?,
            };

            if products.is_empty() {
                println!("No matching products.");
            } else {
                println!("{} products:", products.len());
                for p in &products {
                    println!(
                        "  {:<12} {:<10} {:<13} {}",
                        p.sku, p.new_price, p.new_stock, p.title
                    );
                }
            }
        }

        Command::Remove { sku } => {
            let catalog = open_catalog(&config)?;
            catalog.delete(&sku)?;
            println!("Removed {} from the catalog.", sku);
        }

        Command::Stats => {
            let catalog = open_catalog(&config)?;
            let total = catalog.product_count()?;
            let in_stock = catalog.in_stock()?.len();
            let out_of_stock = catalog.out_of_stock()?.len();
            let pending = catalog.not_updated()?.len();

            println!("─────────────────────────────────");
            println!("  shelfwatch — Catalog Stats");
            println!("─────────────────────────────────");
            println!("  Tracked      : {}", utils::fmt_number(total));
            println!("  In stock     : {}", utils::fmt_number(in_stock as i64));
            println!("  Out of stock : {}", utils::fmt_number(out_of_stock as i64));
            println!("  Pending      : {}", utils::fmt_number(pending as i64));
            match catalog.last_cycle()? {
                Some(run) => println!(
                    "  Last cycle   : #{} {} ({}/{} updated, {} failed)",
                    run.id, run.status, run.updated, run.total, run.failed
                ),
                None => println!("  Last cycle   : —"),
            }
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            let catalog = Catalog::open(&config.storage.db_path)?;
            catalog.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| anyhow::anyhow!("invalid product URL {raw:?}: {e}"))
}

fn open_catalog(config: &AppConfig) -> Result<Catalog> {
    let catalog = Catalog::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        catalog.run_migrations()?;
    }
    Ok(catalog)
}

/// One-off fetch with its own short-lived browser session. The session drops
/// (and the Chrome process dies) on every exit path, errors included.
async fn fetch_once(
    config: &AppConfig,
    url: &Url,
    expected_seller: &str,
) -> Result<ProductObservation> {
    let session = Renderer::new(&config.browser).open()?;
    let scraper = PageScraper::new(session, &config.sync);
    let obs = scraper.fetch_product(url.as_str(), expected_seller).await?;
    Ok(obs)
}

fn print_observation(obs: &ProductObservation) {
    println!("  title : {}", obs.title);
    println!("  price : {}", utils::dollar_price(&obs.price));
    println!("  stock : {}", obs.stock);
    println!("  url   : {}", obs.url);
}

fn print_product(p: &TrackedProduct) {
    println!("  {} — {}", p.sku, p.title);
    println!("    url    : {}", p.url);
    println!("    seller : {}", p.company);
    println!("    price  : {} (was {})", p.new_price, p.old_price);
    println!("    stock  : {} (was {})", p.new_stock, p.old_stock);
    println!("    status : {}", p.update_status);
    if let Some(at) = p.last_synced_at {
        println!("    synced : {}", at);
    }
}
