//! resolve_demo: load a catalog, resolve a few monikers, print the results.
//!
//! Reads config from env vars (a `.env` file is honoured):
//!   MONIKER_CONFIG       service YAML (optional)
//!   MONIKER_CATALOG_PATH catalog file or directory (default: demos/catalog.yaml)
//!   MONIKER_TELEMETRY_*  telemetry overrides, see `moniker_svc::config`
//!
//! Monikers to resolve may be passed as arguments:
//!
//! ```text
//! cargo run --example resolve_demo -- market-data/prices/equity/AAPL@3M
//! ```

use std::path::Path;

use anyhow::Result;
use moniker_svc::{CallerIdentity, MonikerService, ServiceConfig};

const DEFAULT_MONIKERS: &[&str] = &[
    "market-data/prices/equity/AAPL",
    "market-data/prices/equity/MSFT@20260115",
    "moniker://market-data/rates/SOFR@1W",
    "holdings/positions/20260115/fund_alpha",
    "holdings/positions/archive/20251231/fund_beta",
    "reference/countries",
    "bonds/UST10Y",
];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,moniker_svc=debug".into()),
        )
        .init();

    let config = match std::env::var("MONIKER_CONFIG") {
        Ok(path) => ServiceConfig::load(Path::new(&path))?,
        Err(_) => {
            let config = ServiceConfig::default()
                .with_catalog_path("demos/catalog.yaml")
                .with_env_overrides()?;
            config.validate()?;
            config
        }
    };

    let service = MonikerService::from_config(&config)?;
    service.start().await?;
    tracing::info!(nodes = service.health().catalog_nodes, "Catalog loaded");

    let caller = CallerIdentity::from_headers([
        ("X-App-Id", "resolve-demo"),
        ("X-Team", "data-platform"),
    ]);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let monikers: Vec<&str> = if args.is_empty() {
        DEFAULT_MONIKERS.to_vec()
    } else {
        args.iter().map(String::as_str).collect()
    };

    for moniker in monikers {
        match service.resolve(moniker, &caller) {
            Ok(result) => {
                println!("{}", moniker);
                println!("  binding:  {} ({})", result.binding_path, result.source_type);
                if let Some(query) = &result.query {
                    println!("  query:    {}", query);
                }
                for (role, value) in [
                    ("owner", &result.ownership.accountable_owner),
                    ("specialist", &result.ownership.data_specialist),
                    ("support", &result.ownership.support_channel),
                ] {
                    if let Some(v) = value {
                        println!("  {:<10}{} (from {})", format!("{}:", role), v.value, v.defined_at);
                    }
                }
            }
            Err(e) => println!("{}\n  error {}: {}", moniker, e.http_status(), e),
        }
    }

    println!("\nlineage of holdings/positions/archive:");
    for entry in service.lineage("holdings/positions/archive")? {
        println!(
            "  {} [{}] owner={}",
            entry.path,
            entry.display_name,
            entry.ownership.accountable_owner.as_deref().unwrap_or("-")
        );
    }

    service.shutdown().await;
    println!("\n{}", serde_json::to_string_pretty(&service.health())?);
    Ok(())
}
