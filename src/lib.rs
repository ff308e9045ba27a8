// Polarity Timeline - Core Library
// Exposes the store, layout engine and input handling for the CLI, TUI and API server

pub mod config;
pub mod db;
pub mod hover;
pub mod layout;
pub mod vote;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::{Config, ServerConfig, TerminalConfig};
pub use db::{
    Entity, NewEntity, StoreError, VoteOutcome,
    open_database, setup_database, load_seed_csv, insert_entities, verify_count,
    list_entities, get_entity, submit_vote,
    DEFAULT_IMAGE_URL, DEFAULT_REASON,
};
pub use hover::{HoverConfig, HoverTracker};
pub use layout::{
    LayoutConfig, PositionedEntity, Viewport,
    effective_score, compute_position, resolve_collisions,
    layout_entities, layout_sorted, hit_test,
};
pub use vote::{InvalidVote, VoteDraft, VoteScore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
