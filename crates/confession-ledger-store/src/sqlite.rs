//! SQLite implementation of the Store trait.
//!
//! This is the durable storage backend for the confession ledger. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.
//! Each seal is one SQL transaction.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use confession_ledger_core::{
    AnchorRef, Block, ChainHead, Identity, KeccakHash, RecoverableSignature, Submission,
    SubmissionId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

const SUBMISSION_COLUMNS: &str =
    "submission_id, author, content, signature, category, created_at, block_ref";

const BLOCK_COLUMNS: &str = "number, prev_hash, hash, merkle_root, submission_count, \
     committed_at, anchor_ref, anchor_timestamp";

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path.as_ref())?;
        migration::migrate(&mut conn)?;
        tracing::debug!(path = %path.as_ref().display(), "opened ledger database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

fn fixed<const N: usize>(row: &Row<'_>, idx: usize, name: &str) -> rusqlite::Result<[u8; N]> {
    let bytes: Vec<u8> = row.get(idx)?;
    bytes
        .try_into()
        .map_err(|_| rusqlite::Error::InvalidColumnType(idx, name.into(), Type::Blob))
}

// Helper to convert a row (selected with SUBMISSION_COLUMNS) to a Submission
fn row_to_submission(row: &Row<'_>) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: SubmissionId::from_bytes(fixed(row, 0, "submission_id")?),
        author: Identity::from_bytes(fixed(row, 1, "author")?),
        content: row.get(2)?,
        signature: RecoverableSignature::from_bytes(fixed(row, 3, "signature")?),
        category: row.get(4)?,
        created_at: row.get(5)?,
        block_ref: row.get::<_, Option<i64>>(6)?.map(|n| n as u64),
    })
}

// Helper to convert a row (selected with BLOCK_COLUMNS) to a Block
fn row_to_block(row: &Row<'_>) -> rusqlite::Result<Block> {
    let anchor_ref: Option<String> = row.get(6)?;
    let anchor_timestamp: Option<i64> = row.get(7)?;

    Ok(Block {
        number: row.get::<_, i64>(0)? as u64,
        prev_hash: KeccakHash::from_bytes(fixed(row, 1, "prev_hash")?),
        hash: KeccakHash::from_bytes(fixed(row, 2, "hash")?),
        merkle_root: KeccakHash::from_bytes(fixed(row, 3, "merkle_root")?),
        submission_count: row.get::<_, i64>(4)? as u64,
        committed_at: row.get(5)?,
        anchor_ref: match (anchor_ref, anchor_timestamp) {
            (Some(reference), Some(timestamp)) => Some(AnchorRef {
                reference,
                timestamp,
            }),
            _ => None,
        },
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_submission(&self, submission: &Submission) -> Result<InsertResult> {
        let submission = submission.clone();

        self.call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO submissions (
                    submission_id, author, content, signature, category, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    submission.id.0.as_slice(),
                    submission.author.0.as_slice(),
                    submission.content,
                    submission.signature.0.as_slice(),
                    submission.category,
                    submission.created_at,
                ],
            )?;

            Ok(if inserted == 0 {
                InsertResult::AlreadyExists
            } else {
                InsertResult::Inserted
            })
        })
        .await
    }

    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>> {
        let id = *id;

        self.call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM submissions WHERE submission_id = ?1",
                    SUBMISSION_COLUMNS
                ),
                params![id.0.as_slice()],
                row_to_submission,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn has_submission(&self, id: &SubmissionId) -> Result<bool> {
        let id = *id;

        self.call(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM submissions WHERE submission_id = ?1)",
                params![id.0.as_slice()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn pending_submissions(&self, limit: Option<usize>) -> Result<Vec<Submission>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(|n| n as i64).unwrap_or(-1);

        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM submissions WHERE block_ref IS NULL
                 ORDER BY arrival LIMIT ?1",
                SUBMISSION_COLUMNS
            ))?;

            let submissions = stmt
                .query_map(params![limit], row_to_submission)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(submissions)
        })
        .await
    }

    async fn pending_count(&self) -> Result<u64> {
        self.call(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM submissions WHERE block_ref IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn chain_head(&self) -> Result<Option<ChainHead>> {
        self.call(|conn| {
            conn.query_row(
                "SELECT number, hash FROM blocks ORDER BY number DESC LIMIT 1",
                [],
                |row| {
                    Ok(ChainHead {
                        number: row.get::<_, i64>(0)? as u64,
                        hash: KeccakHash::from_bytes(fixed(row, 1, "hash")?),
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn commit_block(&self, block: &Block, submissions: &[SubmissionId]) -> Result<()> {
        let block = block.clone();
        let ids = submissions.to_vec();

        self.call(move |conn| {
            // Dropping `tx` on any early return rolls everything back.
            let tx = conn.transaction()?;

            let head: Option<(i64, Vec<u8>)> = tx
                .query_row(
                    "SELECT number, hash FROM blocks ORDER BY number DESC LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let extends_head = match &head {
                Some((number, hash)) => {
                    block.number == *number as u64 + 1
                        && hash.as_slice() == block.prev_hash.as_bytes()
                }
                None => block.number == 1,
            };
            if !extends_head {
                return Err(StoreError::Conflict(format!(
                    "block {} does not extend head {}",
                    block.number,
                    head.map(|(n, _)| n).unwrap_or(0)
                )));
            }

            if block.submission_count != ids.len() as u64 {
                return Err(StoreError::InvalidData(format!(
                    "block {} declares {} submissions, {} given",
                    block.number,
                    block.submission_count,
                    ids.len()
                )));
            }

            tx.execute(
                "INSERT INTO blocks (
                    number, prev_hash, hash, merkle_root, submission_count, committed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    block.number as i64,
                    block.prev_hash.0.as_slice(),
                    block.hash.0.as_slice(),
                    block.merkle_root.0.as_slice(),
                    block.submission_count as i64,
                    block.committed_at,
                ],
            )?;

            for (position, id) in ids.iter().enumerate() {
                let updated = tx.execute(
                    "UPDATE submissions SET block_ref = ?1, block_position = ?2
                     WHERE submission_id = ?3 AND block_ref IS NULL",
                    params![block.number as i64, position as i64, id.0.as_slice()],
                )?;

                if updated != 1 {
                    let exists: bool = tx.query_row(
                        "SELECT EXISTS(SELECT 1 FROM submissions WHERE submission_id = ?1)",
                        params![id.0.as_slice()],
                        |row| row.get(0),
                    )?;
                    return Err(if exists {
                        StoreError::Conflict(format!("submission {} already sealed", id.to_hex()))
                    } else {
                        StoreError::NotFound(format!("submission {}", id.to_hex()))
                    });
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        self.call(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM blocks WHERE number = ?1", BLOCK_COLUMNS),
                params![number as i64],
                row_to_block,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn block_submissions(&self, number: u64) -> Result<Vec<Submission>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM submissions WHERE block_ref = ?1
                 ORDER BY block_position",
                SUBMISSION_COLUMNS
            ))?;

            let submissions = stmt
                .query_map(params![number as i64], row_to_submission)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(submissions)
        })
        .await
    }

    async fn list_blocks(&self, from: u64, limit: usize) -> Result<Vec<Block>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM blocks WHERE number >= ?1 ORDER BY number LIMIT ?2",
                BLOCK_COLUMNS
            ))?;

            let blocks = stmt
                .query_map(params![from as i64, limit as i64], row_to_block)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(blocks)
        })
        .await
    }

    async fn attach_anchor(&self, number: u64, anchor: &AnchorRef) -> Result<()> {
        let anchor = anchor.clone();

        self.call(move |conn| {
            let updated = conn.execute(
                "UPDATE blocks SET anchor_ref = ?1, anchor_timestamp = ?2 WHERE number = ?3",
                params![anchor.reference, anchor.timestamp, number as i64],
            )?;

            if updated == 0 {
                return Err(StoreError::NotFound(format!("block {}", number)));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confession_ledger_core::{Keypair, ZERO_HASH};

    fn make_submission(keypair: &Keypair, n: u32, category: Option<&str>) -> Submission {
        let content = format!("confession #{}", n);
        let signature = keypair.sign(content.as_bytes()).unwrap();
        Submission::new(
            keypair.identity(),
            content,
            signature,
            category.map(str::to_string),
            1234567890000 + n as i64,
        )
    }

    async fn seed(store: &SqliteStore, n: u32) -> Vec<Submission> {
        let keypair = Keypair::from_secret(&[0x42; 32]).unwrap();
        let mut out = Vec::new();
        for i in 0..n {
            let category = if i % 2 == 0 { Some("secret") } else { None };
            let s = make_submission(&keypair, i, category);
            assert_eq!(store.insert_submission(&s).await.unwrap(), InsertResult::Inserted);
            out.push(s);
        }
        out
    }

    fn ids(subs: &[Submission]) -> Vec<SubmissionId> {
        subs.iter().map(|s| s.id).collect()
    }

    #[tokio::test]
    async fn test_insert_and_get_submission() {
        let store = SqliteStore::open_memory().unwrap();
        let subs = seed(&store, 2).await;

        let retrieved = store.get_submission(&subs[0].id).await.unwrap().unwrap();
        assert_eq!(retrieved, subs[0]);
        assert_eq!(retrieved.category.as_deref(), Some("secret"));

        let retrieved = store.get_submission(&subs[1].id).await.unwrap().unwrap();
        assert_eq!(retrieved.category, None);

        assert!(store.has_submission(&subs[1].id).await.unwrap());
        assert!(!store
            .has_submission(&SubmissionId::from_bytes([0xee; 32]))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_idempotent_insert() {
        let store = SqliteStore::open_memory().unwrap();
        let subs = seed(&store, 1).await;

        // Second insert - should be idempotent
        let r2 = store.insert_submission(&subs[0]).await.unwrap();
        assert_eq!(r2, InsertResult::AlreadyExists);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pending_order_and_limit() {
        let store = SqliteStore::open_memory().unwrap();
        let subs = seed(&store, 4).await;

        assert_eq!(ids(&store.pending_submissions(None).await.unwrap()), ids(&subs));
        assert_eq!(
            ids(&store.pending_submissions(Some(3)).await.unwrap()),
            ids(&subs[..3])
        );
    }

    #[tokio::test]
    async fn test_commit_and_read_back() {
        let store = SqliteStore::open_memory().unwrap();
        let subs = seed(&store, 3).await;
        assert_eq!(store.chain_head().await.unwrap(), None);

        let block = Block::seal(1, ZERO_HASH, &subs[..2], 5000);
        store.commit_block(&block, &ids(&subs[..2])).await.unwrap();

        assert_eq!(store.chain_head().await.unwrap(), Some(block.head()));
        assert_eq!(store.get_block(1).await.unwrap(), Some(block.clone()));
        assert_eq!(store.pending_count().await.unwrap(), 1);

        let sealed = store.block_submissions(1).await.unwrap();
        assert_eq!(ids(&sealed), ids(&subs[..2]));
        assert!(sealed.iter().all(|s| s.block_ref == Some(1)));

        let empty = Block::seal(2, block.hash, &[], 6000);
        store.commit_block(&empty, &[]).await.unwrap();
        let listed = store.list_blocks(1, 10).await.unwrap();
        assert_eq!(listed, vec![block, empty]);
    }

    #[tokio::test]
    async fn test_conflicting_commit_rolls_back() {
        let store = SqliteStore::open_memory().unwrap();
        let subs = seed(&store, 2).await;

        let first = Block::seal(1, ZERO_HASH, &subs[..1], 5000);
        store.commit_block(&first, &ids(&subs[..1])).await.unwrap();

        // subs[1] would be sealed before the loop reaches the already-sealed subs[0].
        let reordered = vec![subs[1].clone(), subs[0].clone()];
        let overlap = Block::seal(2, first.hash, &reordered, 6000);
        let err = store
            .commit_block(&overlap, &ids(&reordered))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert!(store.get_block(2).await.unwrap().is_none());
        let pending = store.get_submission(&subs[1].id).await.unwrap().unwrap();
        assert!(pending.is_pending());
        assert_eq!(store.chain_head().await.unwrap(), Some(first.head()));
    }

    #[tokio::test]
    async fn test_stale_parent_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        let first = Block::seal(1, ZERO_HASH, &[], 5000);
        store.commit_block(&first, &[]).await.unwrap();

        let racer = Block::seal(1, ZERO_HASH, &[], 5001);
        let err = store.commit_block(&racer, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_attach_anchor() {
        let store = SqliteStore::open_memory().unwrap();
        let block = Block::seal(1, ZERO_HASH, &[], 5000);
        store.commit_block(&block, &[]).await.unwrap();

        let anchor = AnchorRef {
            reference: "0xfeed".into(),
            timestamp: 7000,
        };
        store.attach_anchor(1, &anchor).await.unwrap();

        let stored = store.get_block(1).await.unwrap().unwrap();
        assert_eq!(stored.anchor_ref, Some(anchor.clone()));
        assert!(matches!(
            store.attach_anchor(9, &anchor).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let (subs, block) = {
            let store = SqliteStore::open(&path).unwrap();
            let subs = seed(&store, 2).await;
            let block = Block::seal(1, ZERO_HASH, &subs[..1], 5000);
            store.commit_block(&block, &ids(&subs[..1])).await.unwrap();
            (subs, block)
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.chain_head().await.unwrap(), Some(block.head()));
        assert_eq!(ids(&store.pending_submissions(None).await.unwrap()), ids(&subs[1..]));
        assert_eq!(ids(&store.block_submissions(1).await.unwrap()), ids(&subs[..1]));
    }
}
