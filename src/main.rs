// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use polarity_timeline::{
    effective_score, insert_entities, layout_sorted, list_entities, load_seed_csv, open_database,
    submit_vote, verify_count, Config, StoreError, VoteScore,
};

/// Polarity Timeline - rank people between two poles and vote on them
#[derive(Parser, Debug)]
#[command(name = "polarity-timeline", version, about)]
struct Args {
    /// Config file (defaults to ./polarity.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the config and POLARITY_DB
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive terminal timeline (default)
    Ui,
    /// Seed entities from a CSV file (name,score,count,reason,image_url)
    Import { csv: PathBuf },
    /// Print entities in timeline order
    List,
    /// Submit one vote, 0 (saint) to 100 (sinner)
    Vote { id: String, percent: String },
    /// Print a config file with every default
    InitConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.database = db;
    }

    let command = args.command.unwrap_or(Command::Ui);

    // The UI sets up its own (file) logging
    if !matches!(command, Command::Ui) {
        init_logging();
    }

    match command {
        Command::Ui => run_ui_mode(&config),
        Command::Import { csv } => run_import(&config, &csv),
        Command::List => run_list(&config),
        Command::Vote { id, percent } => run_vote(&config, &id, &percent),
        Command::InitConfig => {
            print!("{}", Config::default_toml()?);
            Ok(())
        }
    }
}

/// Log to stderr, filtered by RUST_LOG (default: info)
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn run_import(config: &Config, csv_path: &Path) -> Result<()> {
    println!("🗄️  Seed Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let entities = load_seed_csv(csv_path)?;
    println!("✓ Loaded {} entries from {}", entities.len(), csv_path.display());

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = open_database(&config.database)?;
    println!("✓ Database ready at {}", config.database.display());

    // 3. Insert entities
    println!("\n💾 Inserting entries...");
    let inserted = insert_entities(&conn, &entities)?;

    // 4. Verify count
    let count = verify_count(&conn)?;
    println!("✓ Inserted: {}", inserted);
    println!("✓ Skipped duplicates: {}", entities.len() - inserted);
    println!("✓ Database contains {} entries", count);

    Ok(())
}

fn run_list(config: &Config) -> Result<()> {
    let conn = open_database(&config.database)?;
    let entities = list_entities(&conn)?;

    if entities.is_empty() {
        println!("No entries yet. Run: polarity-timeline import <csv>");
        return Ok(());
    }

    println!(
        "{:<38} {:<24} {:>6} {:>6} {:>8} {:>8}",
        "ID", "NAME", "SCORE", "VOTES", "OFFSET", "STAGGER"
    );
    for pin in layout_sorted(&entities, &config.layout) {
        println!(
            "{:<38} {:<24} {:>6.2} {:>6} {:>7.1}vh {:>6}px",
            pin.entity.id,
            pin.entity.name,
            effective_score(pin.entity.score),
            pin.entity.count,
            pin.offset_vh,
            pin.stagger_px,
        );
    }

    Ok(())
}

fn run_vote(config: &Config, id: &str, percent: &str) -> Result<()> {
    let vote = VoteScore::from_percent_input(percent)
        .with_context(|| format!("Invalid vote '{}'", percent))?;

    let conn = open_database(&config.database)?;
    match submit_vote(&conn, id, vote) {
        Ok(outcome) => {
            println!(
                "✅ Vote {:.0} recorded: score {:.3} over {} votes",
                vote.as_percent(),
                outcome.score,
                outcome.count
            );
            Ok(())
        }
        Err(StoreError::NotFound { id }) => {
            eprintln!("❌ No entry with id {}", id);
            eprintln!("   Run: polarity-timeline list");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    // The UI owns the terminal, so logs only go to a file
    if let Some(log_file) = &config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }

    println!("🖥️  Loading Polarity Timeline UI...\n");

    if !config.database.exists() {
        eprintln!("❌ Database not found at {}", config.database.display());
        eprintln!("   Run: polarity-timeline import <csv>");
        eprintln!("   to seed entries first.");
        std::process::exit(1);
    }

    let conn = open_database(&config.database)?;
    let mut app = ui::App::new(conn, config.terminal)?;
    println!("✓ Loaded {} entries\n", app.entities.len());

    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web UI: cargo run --bin polarity-server --features server");
    std::process::exit(1);
}
