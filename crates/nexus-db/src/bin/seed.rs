//! # Seed Data Generator
//!
//! Populates a development database with stores, a laptop catalog and
//! per-store stock.
//!
//! ## Usage
//! ```bash
//! # Default: two stores, every catalog model, ./nexus_dev.db
//! cargo run -p nexus-db --bin seed
//!
//! # Specify database path
//! cargo run -p nexus-db --bin seed -- --db ./data/nexus.db
//! ```
//!
//! Staff accounts are not seeded: the first `POST /auth/register` on an
//! empty system creates the admin.

use anyhow::Context;
use chrono::Utc;
use nexus_core::product::generate_sku;
use nexus_core::{Product, DEFAULT_LOW_STOCK_THRESHOLD};
use nexus_db::{new_id, short_code, Database, DbConfig};
use std::env;
use tracing::{info, warn};

const STORES: &[(&str, &str)] = &[("BLR01", "Nexus Koramangala"), ("PUN01", "Nexus Baner")];

/// (brand, model, category, price in rupees)
const CATALOG: &[(&str, &str, &str, i64)] = &[
    ("Dell", "XPS 13", "ultrabook", 1_14_990),
    ("Dell", "Inspiron 15", "laptop", 54_990),
    ("Dell", "Latitude 5440", "business", 82_500),
    ("HP", "Pavilion 14", "laptop", 58_999),
    ("HP", "EliteBook 840", "business", 1_02_000),
    ("HP", "Victus 16", "gaming", 79_990),
    ("Lenovo", "ThinkPad T14", "business", 96_490),
    ("Lenovo", "IdeaPad Slim 5", "laptop", 61_990),
    ("Lenovo", "Legion 5", "gaming", 1_19_990),
    ("Asus", "Zenbook 14", "ultrabook", 89_990),
    ("Asus", "TUF A15", "gaming", 72_990),
    ("Acer", "Aspire 7", "laptop", 56_490),
    ("Apple", "MacBook Air M3", "ultrabook", 1_14_900),
    ("Logitech", "MX Master 3S", "accessory", 9_995),
    ("Targus", "15.6 Backpack", "accessory", 2_499),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./nexus_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Nexus CRM Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./nexus_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(path = %db_path, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("opening {}", db_path))?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products; skipping seed");
        return Ok(());
    }

    let mut stores = Vec::new();
    for (code, name) in STORES {
        let store = match db.stores().get_by_code(code).await? {
            Some(store) => store,
            None => db.stores().create(code, name, None, None).await?,
        };
        stores.push(store);
    }

    let start = std::time::Instant::now();
    let mut generated = 0;

    for (index, (brand, model, category, rupees)) in CATALOG.iter().enumerate() {
        let now = Utc::now();
        let price_cents = rupees * 100;
        let product = Product {
            id: new_id(),
            sku: generate_sku(Some(*brand), Some(*model), &short_code()[..4]),
            barcode: Some(format!("890{:010}", index + 1)),
            name: format!("{} {}", brand, model),
            brand: Some(brand.to_string()),
            model: Some(model.to_string()),
            category: Some(category.to_string()),
            description: None,
            price_cents,
            cost_cents: Some(price_cents * 85 / 100),
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let product = match db.products().insert(&product).await {
            Ok(p) => p,
            Err(e) => {
                warn!(sku = %product.sku, error = %e, "Failed to insert product");
                continue;
            }
        };

        for (store_index, store) in stores.iter().enumerate() {
            let stock = ((index * 7 + store_index * 3) % 15) as i64;
            db.inventory()
                .set_stock(&product.id, &store.id, stock, None)
                .await
                .with_context(|| format!("stocking {} at {}", product.sku, store.code))?;
        }

        generated += 1;
    }

    let low = db.inventory().low_stock(None).await?;
    info!(
        products = generated,
        stores = stores.len(),
        low_stock = low.len(),
        elapsed = ?start.elapsed(),
        "Seed complete"
    );

    Ok(())
}
