// Polarity Timeline - Web Server
// REST API + timeline page with Axum

use anyhow::{Context, Result};
use polarity_timeline::api::{app, AppState};
use polarity_timeline::{open_database, verify_count, Config};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    println!("🌐 Polarity Timeline - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // First argument, if any, is the config file
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    if !config.database.exists() {
        eprintln!("❌ Database not found at {}", config.database.display());
        eprintln!("   Run: polarity-timeline import <csv>");
        eprintln!("   to seed entries first.");
        std::process::exit(1);
    }

    let conn = open_database(&config.database)?;
    let count = verify_count(&conn)?;
    info!(path = %config.database.display(), entries = count, "database opened");

    let state = AppState::new(conn, config.layout);
    let router = app(state, config.server.static_dir.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.addr))?;

    println!("\n🚀 Server running on http://{}", config.server.addr);
    println!("   API: http://{}/api/layout", config.server.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router)
        .await
        .context("Server error")?;

    Ok(())
}
