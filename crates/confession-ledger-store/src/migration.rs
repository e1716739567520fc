//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use confession_ledger_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated ledger schema");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Blocks: one row per sealed block
        CREATE TABLE blocks (
            number INTEGER PRIMARY KEY,       -- 1-based, contiguous
            prev_hash BLOB NOT NULL,          -- 32 bytes, genesis sentinel for block 1
            hash BLOB NOT NULL UNIQUE,        -- 32 bytes, Keccak-256 integrity hash
            merkle_root BLOB NOT NULL,        -- 32 bytes
            submission_count INTEGER NOT NULL,
            committed_at INTEGER NOT NULL,    -- Unix ms
            anchor_ref TEXT,                  -- external ledger reference, attached later
            anchor_timestamp INTEGER
        );

        -- Submissions: pending while block_ref IS NULL
        CREATE TABLE submissions (
            arrival INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
            submission_id BLOB NOT NULL UNIQUE,         -- 32 bytes, Blake3 content address
            author BLOB NOT NULL,                       -- 20 bytes, recovered address
            content TEXT NOT NULL,
            signature BLOB NOT NULL,                    -- 65 bytes, r || s || v
            category TEXT,
            created_at INTEGER NOT NULL,                -- Unix ms
            block_ref INTEGER REFERENCES blocks(number),
            block_position INTEGER                      -- index within the block
        );

        -- Indexes for common queries
        CREATE INDEX idx_submissions_pending ON submissions(arrival) WHERE block_ref IS NULL;
        CREATE INDEX idx_submissions_block ON submissions(block_ref, block_position);
        CREATE INDEX idx_submissions_author ON submissions(author);
        "#,
    )?;

    Ok(())
}
