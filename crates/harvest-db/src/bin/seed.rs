//! # Seed Data Generator
//!
//! Populates a development database with synthetic crawler rows, then runs
//! a few representative list queries and prints the performance report.
//!
//! ## Usage
//! ```bash
//! # Generate 5,000 rows (default) using HARVEST_DB_* variables
//! cargo run -p harvest-db --bin seed
//!
//! # Generate custom amount, creating the tables first
//! cargo run -p harvest-db --bin seed -- --count 20000 --migrate
//!
//! # Read connection settings from a TOML file
//! cargo run -p harvest-db --bin seed -- --config ./harvest.toml
//! ```
//!
//! ## Generated Rows
//! Each row has:
//! - A title mixing Latin and CJK words so every search strategy has data
//! - A type from a small fixed set (`movie`, `tv`, `software`, ...)
//! - A magnet link and size
//! - A date counting back from now, about fifteen rows per day

use std::env;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use harvest_core::{QueryParams, Row, TableId};
use harvest_db::{EngineConfig, QueryEngine};

/// Title fragments for realistic test data
const TITLE_WORDS: &[&str] = &[
    "Ubuntu", "Debian", "Archive", "Collection", "Remastered", "Complete", "Season", "Edition",
    "Documentary", "Soundtrack", "电影", "纪录片", "合集", "高清", "中字", "动画",
];

const TYPES: &[&str] = &["movie", "tv", "software", "music", "anime", "book"];

const SIZE_UNITS: &[&str] = &["MB", "GB"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 5000;
    let mut config_path: Option<String> = None;
    let mut migrate = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(5000);
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--migrate" | "-m" => migrate = true,
            "--help" | "-h" => {
                println!("Harvest Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Number of rows to generate (default: 5000)");
                println!("      --config <PATH>  TOML configuration (default: HARVEST_* env vars)");
                println!("  -m, --migrate        Create the tables before seeding");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env()?,
    };
    config.pool.run_migrations = migrate;

    println!("🌱 Harvest Seed Data Generator");
    println!("==============================");
    println!("Database: {}@{}/{}", config.pool.user, config.pool.host, config.pool.database);
    println!("Rows:     {}", count);
    println!();

    let engine = QueryEngine::connect(config).await?;
    if !engine.health_check().await {
        eprintln!("✗ Database is not reachable");
        engine.close().await;
        return Ok(());
    }
    println!("✓ Connected to database");

    let records = engine.records(TableId::Crawler)?;

    println!();
    println!("Generating rows...");

    let start = Instant::now();
    let mut generated = 0;
    for seed in 0..count {
        let fields = generate_row(seed);
        if let Err(e) = records.create(&fields).await {
            eprintln!("Failed to insert row {}: {}", seed, e);
            continue;
        }

        generated += 1;
        if generated % 500 == 0 {
            println!("  Generated {} rows...", generated);
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} rows in {:?}", generated, elapsed);
    println!(
        "  Rate: {:.0} rows/second",
        generated as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    // Exercise each planner path once, then once more from cache
    println!();
    println!("Running sample queries...");
    let samples = [
        ("first page", QueryParams::new()),
        ("shallow page", QueryParams::new().page(20)),
        ("deep page", QueryParams::new().page(1200).page_size(10)),
        ("type filter", QueryParams::new().item_type("movie")),
        ("prefix", QueryParams::new().title("U")),
        ("natural full-text", QueryParams::new().title("Ubuntu Archive")),
        ("boolean full-text", QueryParams::new().title("纪录片")),
        ("wildcard", QueryParams::new().title("Deb*n")),
        ("date", QueryParams::new().date(Utc::now().format("%Y-%m-%d").to_string())),
    ];

    for _ in 0..2 {
        for (label, params) in &samples {
            let page = engine
                .query_with_pagination(TableId::Crawler, params, None)
                .await?;
            println!(
                "  {:<18} {:>3} rows of {} ({:?})",
                label,
                page.data.len(),
                page.pagination.total_records,
                page.pagination.count_accuracy
            );
        }
    }

    engine.print_performance_report();

    engine.close().await;
    println!();
    println!("✓ Seed complete!");
    info!("Seed finished");

    Ok(())
}

/// Log filter from `RUST_LOG`, defaulting to engine debug output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,harvest_db=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Generates a single crawler row with deterministic data.
fn generate_row(seed: usize) -> Row {
    let word = |n: usize| TITLE_WORDS[(seed * 7 + n * 13) % TITLE_WORDS.len()];
    let title = format!("{} {} {} {}", word(0), word(1), word(2), 2000 + seed % 25);

    let item_type = TYPES[seed % TYPES.len()];
    let size = format!(
        "{}.{} {}",
        1 + (seed * 31) % 900,
        seed % 10,
        SIZE_UNITS[seed % SIZE_UNITS.len()]
    );

    // Several rows per day, newest first
    let date = Utc::now() - Duration::minutes((seed as i64) * 97);
    let hash = format!("{:040x}", (seed as u128).wrapping_mul(0x9E37_79B9_7F4A_7C15));

    let mut row = Row::new();
    row.insert("title".into(), json!(title));
    row.insert("type".into(), json!(item_type));
    row.insert("url".into(), json!(format!("https://tracker.example/view/{}", seed)));
    row.insert("magnet".into(), json!(format!("magnet:?xt=urn:btih:{}", hash)));
    row.insert("size".into(), json!(size));
    row.insert("date".into(), json!(date.format("%Y-%m-%d %H:%M:%S").to_string()));
    row
}
