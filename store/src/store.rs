use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use goban::quantize_komi;
use model::{AnalysisResult, Completeness, MoveCandidate, Source};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache storage unavailable: {0}")]
    Storage(#[from] sqlx::Error),
}

const CREATE_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS analysis_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lookup_key TEXT NOT NULL,
    board_size INTEGER NOT NULL,
    komi REAL NOT NULL,
    top_moves TEXT NOT NULL,
    engine_visits INTEGER NOT NULL,
    engine_label TEXT NOT NULL,
    complete INTEGER NOT NULL,
    compute_seconds REAL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

const CREATE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_lookup_key ON analysis_cache(lookup_key);";

const CREATE_UNIQUE_INDEX_SQL: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
     idx_lookup_key_visits_komi ON analysis_cache(lookup_key, engine_visits, komi);";

/// Overview of what the store holds, for the stats surface.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub total_entries: u64,
    pub by_board_size: HashMap<usize, u64>,
}

/// Durable store of every result the engine has produced for this
/// installation.
///
/// One row per `(lookup_key, engine_visits, komi)` triple; the journal runs
/// in WAL mode with full synchronous commits so an entry survives a crash
/// occurring right after `put` returns. A single writer at a time is
/// assumed; readers are unrestricted.
#[derive(Clone, Debug)]
pub struct AnalysisStore {
    pool: SqlitePool,
}

impl AnalysisStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// An in-process store for tests. A single connection keeps the shared
    /// `:memory:` database alive for the store's lifetime.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_UNIQUE_INDEX_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetches a stored result. With `required_visits` the lookup is an
    /// exact match on `(key, komi, visits)`; without it the entry with the
    /// most visits wins. A stored row that no longer deserializes is
    /// treated as a miss for that key, and left in place.
    pub async fn get(
        &self,
        lookup_key: &str,
        komi: f32,
        required_visits: Option<u32>,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        let komi = quantize_komi(komi) as f64;

        let rows = match required_visits {
            Some(visits) => {
                sqlx::query(
                    "SELECT lookup_key, board_size, komi, top_moves, engine_visits, \
                     engine_label, complete, compute_seconds \
                     FROM analysis_cache \
                     WHERE lookup_key = ? AND komi = ? AND engine_visits = ?",
                )
                .bind(lookup_key)
                .bind(komi)
                .bind(visits as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT lookup_key, board_size, komi, top_moves, engine_visits, \
                     engine_label, complete, compute_seconds \
                     FROM analysis_cache \
                     WHERE lookup_key = ? AND komi = ? \
                     ORDER BY engine_visits DESC",
                )
                .bind(lookup_key)
                .bind(komi)
                .fetch_all(&self.pool)
                .await?
            }
        };

        for row in rows {
            match row_to_result(&row) {
                Some(result) => return Ok(Some(result)),
                None => {
                    warn!(
                        "Ignoring corrupt cache row for key {} at {} visits",
                        lookup_key,
                        row.get::<i64, _>("engine_visits")
                    );
                }
            }
        }

        Ok(None)
    }

    /// Inserts or replaces the entry at the result's storage key, subject to
    /// the merge policy (first applicable rule wins):
    ///
    /// 1. a complete entry is never overwritten by a partial one;
    /// 2. with equal completeness and both compute durations known, the
    ///    entry that took materially longer (>10%) to compute stays;
    /// 3. otherwise the incoming result replaces the existing entry.
    pub async fn put(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        let komi = quantize_komi(result.komi) as f64;
        let visits = result.effort_visits as i64;

        let existing = sqlx::query(
            "SELECT complete, compute_seconds FROM analysis_cache \
             WHERE lookup_key = ? AND komi = ? AND engine_visits = ?",
        )
        .bind(&result.position_key)
        .bind(komi)
        .bind(visits)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            let existing_complete = row.get::<i64, _>("complete") != 0;
            let existing_seconds = row.get::<Option<f64>, _>("compute_seconds");
            let incoming_complete = result.completeness.is_complete();

            if existing_complete && !incoming_complete {
                debug!(
                    "Keeping complete cache entry over partial incoming at {}",
                    result.position_key
                );
                return Ok(());
            }

            if existing_complete == incoming_complete {
                if let (Some(existing_seconds), Some(incoming_seconds)) =
                    (existing_seconds, result.compute_seconds)
                {
                    if existing_seconds > incoming_seconds as f64 * 1.1 {
                        debug!(
                            "Keeping higher-effort cache entry ({:.1}s > {:.1}s) at {}",
                            existing_seconds, incoming_seconds, result.position_key
                        );
                        return Ok(());
                    }
                }
            }
        }

        let top_moves = serde_json::to_string(&result.top_moves)
            .expect("Move candidates always serialize");

        sqlx::query(
            "INSERT OR REPLACE INTO analysis_cache \
             (lookup_key, board_size, komi, top_moves, engine_visits, engine_label, \
              complete, compute_seconds, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        )
        .bind(&result.position_key)
        .bind(result.board_size as i64)
        .bind(komi)
        .bind(top_moves)
        .bind(visits)
        .bind(&result.engine_label)
        .bind(result.completeness.is_complete() as i64)
        .bind(result.compute_seconds.map(|s| s as f64))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes every entry for a position. Maintenance only; the lookup
    /// path never deletes.
    pub async fn delete(&self, lookup_key: &str) -> Result<bool, StoreError> {
        let affected = sqlx::query("DELETE FROM analysis_cache WHERE lookup_key = ?")
            .bind(lookup_key)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(affected > 0)
    }

    pub async fn clear(&self) -> Result<u64, StoreError> {
        let affected = sqlx::query("DELETE FROM analysis_cache")
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(affected)
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM analysis_cache")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>("cnt") as u64)
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let total_entries = self.count().await?;

        let rows = sqlx::query(
            "SELECT board_size, COUNT(*) AS cnt FROM analysis_cache GROUP BY board_size",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_board_size = rows
            .iter()
            .map(|row| {
                (
                    row.get::<i64, _>("board_size") as usize,
                    row.get::<i64, _>("cnt") as u64,
                )
            })
            .collect();

        Ok(StoreStats {
            total_entries,
            by_board_size,
        })
    }

    /// How many entries exist per visit count for one board size and komi,
    /// most common first.
    pub async fn visit_histogram(
        &self,
        board_size: usize,
        komi: f32,
    ) -> Result<Vec<(u32, u64)>, StoreError> {
        let rows = sqlx::query(
            "SELECT engine_visits, COUNT(*) AS cnt FROM analysis_cache \
             WHERE board_size = ? AND komi = ? \
             GROUP BY engine_visits ORDER BY cnt DESC",
        )
        .bind(board_size as i64)
        .bind(quantize_komi(komi) as f64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<i64, _>("engine_visits") as u32,
                    row.get::<i64, _>("cnt") as u64,
                )
            })
            .collect())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_result(row: &sqlx::sqlite::SqliteRow) -> Option<AnalysisResult> {
    let top_moves: Vec<MoveCandidate> =
        serde_json::from_str(row.get::<String, _>("top_moves").as_str()).ok()?;

    let completeness = if row.get::<i64, _>("complete") != 0 {
        Completeness::Complete
    } else {
        Completeness::Partial
    };

    Some(AnalysisResult {
        position_key: row.get::<String, _>("lookup_key"),
        board_size: row.get::<i64, _>("board_size") as usize,
        komi: row.get::<f64, _>("komi") as f32,
        top_moves,
        effort_visits: row.get::<i64, _>("engine_visits") as u32,
        source: Source::LocalCache,
        completeness,
        compute_seconds: row.get::<Option<f64>, _>("compute_seconds").map(|s| s as f32),
        engine_label: row.get::<String, _>("engine_label"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use goban::Vertex;

    fn candidate(text: &str, win_probability: f32) -> MoveCandidate {
        MoveCandidate::new(text.parse::<Vertex>().unwrap(), win_probability, 0.2, 50)
    }

    fn result(
        key: &str,
        visits: u32,
        completeness: Completeness,
        compute_seconds: Option<f32>,
    ) -> AnalysisResult {
        AnalysisResult {
            position_key: key.to_string(),
            board_size: 9,
            komi: 7.5,
            top_moves: vec![candidate("E5", 0.52), candidate("C3", 0.48)],
            effort_visits: visits,
            source: Source::LiveEngine,
            completeness,
            compute_seconds,
            engine_label: "test-engine".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = AnalysisStore::in_memory().await.unwrap();
        let stored = result("abc123", 500, Completeness::Complete, Some(2.0));

        store.put(&stored).await.unwrap();
        let fetched = store.get("abc123", 7.5, Some(500)).await.unwrap().unwrap();

        assert_eq!(fetched.position_key, "abc123");
        assert_eq!(fetched.effort_visits, 500);
        assert_eq!(fetched.top_moves, stored.top_moves);
        assert_eq!(fetched.source, Source::LocalCache);
        assert_eq!(fetched.completeness, Completeness::Complete);
        assert_eq!(fetched.engine_label, "test-engine");
    }

    #[tokio::test]
    async fn test_get_miss() {
        let store = AnalysisStore::in_memory().await.unwrap();
        assert!(store.get("missing", 7.5, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_exact_visits_mismatch() {
        let store = AnalysisStore::in_memory().await.unwrap();
        store
            .put(&result("abc", 500, Completeness::Complete, None))
            .await
            .unwrap();

        assert!(store.get("abc", 7.5, Some(100)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_highest_visits_wins() {
        let store = AnalysisStore::in_memory().await.unwrap();
        store
            .put(&result("abc", 100, Completeness::Complete, None))
            .await
            .unwrap();
        store
            .put(&result("abc", 900, Completeness::Complete, None))
            .await
            .unwrap();
        store
            .put(&result("abc", 500, Completeness::Complete, None))
            .await
            .unwrap();

        let fetched = store.get("abc", 7.5, None).await.unwrap().unwrap();
        assert_eq!(fetched.effort_visits, 900);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_komi_keys_are_distinct() {
        let store = AnalysisStore::in_memory().await.unwrap();
        let mut stored = result("abc", 500, Completeness::Complete, None);
        store.put(&stored).await.unwrap();

        stored.komi = 0.5;
        store.put(&stored).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.get("abc", 0.5, Some(500)).await.unwrap().is_some());
        assert!(store.get("abc", 6.5, Some(500)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = AnalysisStore::in_memory().await.unwrap();
        let stored = result("abc", 500, Completeness::Complete, Some(2.0));

        store.put(&stored).await.unwrap();
        store.put(&stored).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let fetched = store.get("abc", 7.5, Some(500)).await.unwrap().unwrap();
        assert_eq!(fetched.top_moves, stored.top_moves);
    }

    #[tokio::test]
    async fn test_complete_not_overwritten_by_partial() {
        let store = AnalysisStore::in_memory().await.unwrap();
        store
            .put(&result("abc", 500, Completeness::Complete, None))
            .await
            .unwrap();

        let mut partial = result("abc", 500, Completeness::Partial, None);
        partial.top_moves = vec![candidate("G7", 0.9)];
        store.put(&partial).await.unwrap();

        let fetched = store.get("abc", 7.5, Some(500)).await.unwrap().unwrap();
        assert_eq!(fetched.completeness, Completeness::Complete);
        assert_eq!(fetched.top_moves.len(), 2);
    }

    #[tokio::test]
    async fn test_partial_upgraded_by_complete() {
        let store = AnalysisStore::in_memory().await.unwrap();
        store
            .put(&result("abc", 500, Completeness::Partial, None))
            .await
            .unwrap();
        store
            .put(&result("abc", 500, Completeness::Complete, None))
            .await
            .unwrap();

        let fetched = store.get("abc", 7.5, Some(500)).await.unwrap().unwrap();
        assert_eq!(fetched.completeness, Completeness::Complete);
    }

    #[tokio::test]
    async fn test_materially_longer_compute_is_kept() {
        let store = AnalysisStore::in_memory().await.unwrap();
        store
            .put(&result("abc", 500, Completeness::Complete, Some(10.0)))
            .await
            .unwrap();

        let mut cheaper = result("abc", 500, Completeness::Complete, Some(5.0));
        cheaper.top_moves = vec![candidate("G7", 0.9)];
        store.put(&cheaper).await.unwrap();

        let fetched = store.get("abc", 7.5, Some(500)).await.unwrap().unwrap();
        assert_eq!(fetched.compute_seconds, Some(10.0));
        assert_eq!(fetched.top_moves.len(), 2);
    }

    #[tokio::test]
    async fn test_comparable_compute_favors_recency() {
        let store = AnalysisStore::in_memory().await.unwrap();
        store
            .put(&result("abc", 500, Completeness::Complete, Some(10.0)))
            .await
            .unwrap();

        // Within 10%: the newer result replaces the old one.
        let mut newer = result("abc", 500, Completeness::Complete, Some(9.5));
        newer.top_moves = vec![candidate("G7", 0.9)];
        store.put(&newer).await.unwrap();

        let fetched = store.get("abc", 7.5, Some(500)).await.unwrap().unwrap();
        assert_eq!(fetched.compute_seconds, Some(9.5));
        assert_eq!(fetched.top_moves.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_durations_favor_recency() {
        let store = AnalysisStore::in_memory().await.unwrap();
        store
            .put(&result("abc", 500, Completeness::Complete, Some(10.0)))
            .await
            .unwrap();

        let mut newer = result("abc", 500, Completeness::Complete, None);
        newer.top_moves = vec![candidate("G7", 0.9)];
        store.put(&newer).await.unwrap();

        let fetched = store.get("abc", 7.5, Some(500)).await.unwrap().unwrap();
        assert_eq!(fetched.compute_seconds, None);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_a_miss_and_not_deleted() {
        let store = AnalysisStore::in_memory().await.unwrap();

        sqlx::query(
            "INSERT INTO analysis_cache \
             (lookup_key, board_size, komi, top_moves, engine_visits, engine_label, complete) \
             VALUES ('bad', 9, 7.5, 'not json', 500, 'test', 1)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        assert!(store.get("bad", 7.5, Some(500)).await.unwrap().is_none());
        assert!(store.get("bad", 7.5, None).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_row_skipped_in_favor_of_next_best() {
        let store = AnalysisStore::in_memory().await.unwrap();

        sqlx::query(
            "INSERT INTO analysis_cache \
             (lookup_key, board_size, komi, top_moves, engine_visits, engine_label, complete) \
             VALUES ('abc', 9, 7.5, 'not json', 900, 'test', 1)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        store
            .put(&result("abc", 500, Completeness::Complete, None))
            .await
            .unwrap();

        // The corrupt 900-visit row is passed over for the readable one.
        let fetched = store.get("abc", 7.5, None).await.unwrap().unwrap();
        assert_eq!(fetched.effort_visits, 500);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = AnalysisStore::in_memory().await.unwrap();
        store
            .put(&result("abc", 100, Completeness::Complete, None))
            .await
            .unwrap();
        store
            .put(&result("abc", 200, Completeness::Complete, None))
            .await
            .unwrap();
        store
            .put(&result("def", 100, Completeness::Complete, None))
            .await
            .unwrap();

        assert!(store.delete("abc").await.unwrap());
        assert!(!store.delete("abc").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);

        assert_eq!(store.clear().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stats_by_board_size() {
        let store = AnalysisStore::in_memory().await.unwrap();

        let mut nineteen = result("abc", 100, Completeness::Complete, None);
        nineteen.board_size = 19;
        store.put(&nineteen).await.unwrap();
        store
            .put(&result("def", 100, Completeness::Complete, None))
            .await
            .unwrap();
        store
            .put(&result("ghi", 100, Completeness::Complete, None))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.by_board_size.get(&9), Some(&2));
        assert_eq!(stats.by_board_size.get(&19), Some(&1));
    }

    #[tokio::test]
    async fn test_visit_histogram() {
        let store = AnalysisStore::in_memory().await.unwrap();
        store
            .put(&result("a", 100, Completeness::Complete, None))
            .await
            .unwrap();
        store
            .put(&result("b", 100, Completeness::Complete, None))
            .await
            .unwrap();
        store
            .put(&result("c", 500, Completeness::Complete, None))
            .await
            .unwrap();

        let histogram = store.visit_histogram(9, 7.5).await.unwrap();
        assert_eq!(histogram[0], (100, 2));
        assert_eq!(histogram[1], (500, 1));
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("analysis.db");

        let store = AnalysisStore::open(&path).await.unwrap();
        store
            .put(&result("abc", 100, Completeness::Complete, None))
            .await
            .unwrap();

        assert!(path.exists());
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
