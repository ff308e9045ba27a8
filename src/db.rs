use anyhow::{bail, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::vote::VoteScore;

/// Placeholder shown when an entity has no image of its own
pub const DEFAULT_IMAGE_URL: &str =
    "https://upload.wikimedia.org/wikipedia/commons/0/05/Robin_Williams_2011a_%282%29.jpg";

/// Caption shown when an entity has no reason text
pub const DEFAULT_REASON: &str = "Temporary reason";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// The id does not resolve to an entity. Retrying will not help.
    #[error("entity {id} not found")]
    NotFound { id: String },

    /// The database could not serve the request. Nothing was written.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
}

// ============================================================================
// ENTITY
// ============================================================================

/// A scored subject on the timeline
/// Identity and captions are immutable, only score/count move (via votes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Stable identity (UUID), assigned at import
    pub id: String,

    pub name: String,

    /// Running average as stored. None when the column is NULL or non-numeric;
    /// layout treats that as the midpoint.
    pub score: Option<f64>,

    /// Votes folded in so far, seed votes included
    pub count: i64,

    pub reason: String,

    #[serde(alias = "image_url")]
    pub image_url: String,
}

impl Entity {
    /// Image to display, falling back to the placeholder
    pub fn display_image(&self) -> &str {
        if self.image_url.trim().is_empty() {
            DEFAULT_IMAGE_URL
        } else {
            &self.image_url
        }
    }

    /// Caption to display, falling back to the placeholder text
    pub fn display_reason(&self) -> &str {
        if self.reason.trim().is_empty() {
            DEFAULT_REASON
        } else {
            &self.reason
        }
    }
}

/// Result of folding one vote into an entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoteOutcome {
    pub score: f64,
    pub count: i64,
}

// ============================================================================
// SEED RECORDS (CSV import)
// ============================================================================

/// One row of a seed CSV: name,score,count,reason,image_url
#[derive(Debug, Clone, Deserialize)]
pub struct NewEntity {
    pub name: String,

    #[serde(default)]
    pub score: Option<f64>,

    /// Seed votes baked into `score`. Blank means one.
    #[serde(default)]
    pub count: Option<i64>,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub image_url: String,
}

impl NewEntity {
    pub fn seed_count(&self) -> i64 {
        self.count.unwrap_or(1)
    }

    /// Seed key for duplicate detection on re-import
    /// NOTE: This is for DEDUPLICATION, not IDENTITY (that's the UUID)
    pub fn compute_seed_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.trim().to_lowercase());
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// SETUP
// ============================================================================

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode so readers never block the vote writer
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY NOT NULL,
            seed_key TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            score REAL,
            count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
            reason TEXT NOT NULL DEFAULT '',
            image_url TEXT NOT NULL DEFAULT '',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entities_seed_key ON entities(seed_key)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// IMPORT
// ============================================================================

pub fn load_seed_csv(csv_path: &Path) -> Result<Vec<NewEntity>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open seed CSV file")?;

    let mut entities = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let entity: NewEntity = result
            .with_context(|| format!("Failed to deserialize seed row {}", line + 2))?;
        entities.push(entity);
    }

    Ok(entities)
}

/// Insert seed entities. Rows whose seed key already exists are skipped,
/// so importing the same file twice is a no-op.
pub fn insert_entities(conn: &Connection, entities: &[NewEntity]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for entity in entities {
        if entity.name.trim().is_empty() {
            bail!("Seed entity with empty name");
        }
        let count = entity.seed_count();
        if count < 0 {
            bail!("Seed entity '{}' has negative count {}", entity.name, count);
        }
        if let Some(score) = entity.score {
            if !score.is_finite() {
                bail!("Seed entity '{}' has non-finite score {}", entity.name, score);
            }
            if !(0.0..=1.0).contains(&score) {
                warn!(name = %entity.name, score, "seed score outside 0-1, layout will clamp it");
            }
        }

        let result = conn.execute(
            "INSERT INTO entities (id, seed_key, name, score, count, reason, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid::Uuid::new_v4().to_string(),
                entity.compute_seed_key(),
                entity.name.trim(),
                entity.score,
                count,
                entity.reason,
                entity.image_url,
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(name = %entity.name, "skipping duplicate seed entity");
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(inserted, duplicates, "seed import finished");

    Ok(inserted)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// STORE BOUNDARY
// ============================================================================

/// Read a score column that may be NULL or hold a non-numeric value
fn score_from_value(value: Value) -> Option<f64> {
    match value {
        Value::Real(f) if f.is_finite() => Some(f),
        Value::Integer(i) => Some(i as f64),
        _ => None,
    }
}

fn entity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        name: row.get(1)?,
        score: score_from_value(row.get(2)?),
        count: row.get(3)?,
        reason: row.get(4)?,
        image_url: row.get(5)?,
    })
}

/// All entities, in insertion order. Callers must not rely on the order.
pub fn list_entities(conn: &Connection) -> Result<Vec<Entity>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, score, count, reason, image_url
         FROM entities
         ORDER BY rowid",
    )?;

    let entities = stmt
        .query_map([], entity_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entities)
}

pub fn get_entity(conn: &Connection, id: &str) -> Result<Entity, StoreError> {
    conn.query_row(
        "SELECT id, name, score, count, reason, image_url
         FROM entities
         WHERE id = ?1",
        [id],
        entity_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
}

/// Fold one vote into the running average.
///
/// The read-modify-write is a single UPDATE statement, which SQLite runs
/// atomically under its write lock: concurrent votes from any connection are
/// serialized and every one lands exactly once. A stored score that is NULL
/// non-numeric or infinite counts as 0.5, matching how rows are read back.
pub fn submit_vote(conn: &Connection, id: &str, vote: VoteScore) -> Result<VoteOutcome, StoreError> {
    let outcome = conn
        .query_row(
            "UPDATE entities
             SET score = (CASE WHEN typeof(score) IN ('real', 'integer')
                                    AND abs(score) <= 1.7976931348623157e308
                               THEN score ELSE 0.5 END
                          * count + ?1) / (count + 1),
                 count = count + 1
             WHERE id = ?2
             RETURNING score, count",
            params![vote.value(), id],
            |row| {
                Ok(VoteOutcome {
                    score: row.get(0)?,
                    count: row.get(1)?,
                })
            },
        )
        .optional()?;

    match outcome {
        Some(outcome) => {
            debug!(id, vote = vote.value(), score = outcome.score, count = outcome.count, "vote applied");
            Ok(outcome)
        }
        None => Err(StoreError::NotFound { id: id.to_string() }),
    }
}
