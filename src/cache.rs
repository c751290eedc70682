//! Persistent answer cache
//!
//! Maps a question fingerprint to the letter that was resolved for it.
//! Entries live in a small SQLite database so answers survive restarts.
//! A `put` for an existing fingerprint overwrites the row; nothing is
//! ever evicted.
//!
//! A single connection sits behind a mutex, so every `get`/`put` is
//! atomic with respect to every other one.

use crate::error::CacheError;
use crate::question::OptionLetter;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Stable identifier for a question's normalized text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-256 over the trimmed, lowercased question text
    pub fn of(text: &str) -> Self {
        let normalized = normalize(text);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full digest is noisy in logs
        let short: String = self.0.chars().take(12).collect();
        f.write_str(&short)
    }
}

/// Case-fold and trim question text before hashing
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A previously resolved answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAnswer {
    pub fingerprint: Fingerprint,
    pub letter: OptionLetter,
    pub resolved_at: DateTime<Utc>,
}

/// Summary numbers for `mcqtap cache stats`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// SQLite-backed answer cache
pub struct AnswerCache {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl AnswerCache {
    /// Open or create the cache database at `path`
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let cache = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        cache.init_schema()?;

        tracing::debug!("Answer cache opened at {:?}", path);
        Ok(cache)
    }

    /// Non-persistent cache, gone when dropped
    pub fn in_memory() -> Result<Self, CacheError> {
        let cache = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Location on disk, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Every statement is its own transaction, so a poisoned lock still
        // guards a consistent table.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS answers (
                fingerprint TEXT PRIMARY KEY,
                letter TEXT NOT NULL,
                resolved_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Look up a cached answer
    pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CachedAnswer>, CacheError> {
        let row = self
            .lock()
            .query_row(
                "SELECT letter, resolved_at FROM answers WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let Some((letter, resolved_at)) = row else {
            return Ok(None);
        };

        let letter = letter
            .parse::<OptionLetter>()
            .map_err(|bad| CacheError::Corrupt {
                fingerprint: fingerprint.as_str().to_string(),
                detail: format!("letter {:?}", bad),
            })?;

        Ok(Some(CachedAnswer {
            fingerprint: fingerprint.clone(),
            letter,
            resolved_at: timestamp_to_datetime(resolved_at),
        }))
    }

    /// Insert or replace the answer for `fingerprint`, stamped with now
    pub fn put(&self, fingerprint: &Fingerprint, letter: OptionLetter) -> Result<(), CacheError> {
        self.lock().execute(
            r#"
            INSERT INTO answers (fingerprint, letter, resolved_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(fingerprint) DO UPDATE SET
                letter = excluded.letter,
                resolved_at = excluded.resolved_at
            "#,
            params![fingerprint.as_str(), letter.as_str(), Utc::now().timestamp_millis()],
        )?;
        tracing::trace!("Cached {} -> {}", fingerprint, letter);
        Ok(())
    }

    /// Number of cached answers
    pub fn len(&self) -> Result<u64, CacheError> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM answers", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let (entries, oldest, newest) = self.lock().query_row(
            "SELECT COUNT(*), MIN(resolved_at), MAX(resolved_at) FROM answers",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            },
        )?;

        Ok(CacheStats {
            entries: entries.max(0) as u64,
            oldest: oldest.map(timestamp_to_datetime),
            newest: newest.map(timestamp_to_datetime),
        })
    }
}

fn timestamp_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_ignores_case_and_whitespace() {
        let a = Fingerprint::of("What is the capital of France?");
        let b = Fingerprint::of("  what is THE capital of france?\n");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_text() {
        assert_ne!(Fingerprint::of("2 + 2 = ?"), Fingerprint::of("2 + 3 = ?"));
    }

    #[test]
    fn test_get_missing() {
        let cache = AnswerCache::in_memory().unwrap();
        assert!(cache.get(&Fingerprint::of("nothing")).unwrap().is_none());
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_put_then_get() {
        let cache = AnswerCache::in_memory().unwrap();
        let fp = Fingerprint::of("Q");
        cache.put(&fp, OptionLetter::C).unwrap();

        let hit = cache.get(&fp).unwrap().unwrap();
        assert_eq!(hit.letter, OptionLetter::C);
        assert_eq!(hit.fingerprint, fp);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = AnswerCache::in_memory().unwrap();
        let fp = Fingerprint::of("Q");
        cache.put(&fp, OptionLetter::A).unwrap();
        cache.put(&fp, OptionLetter::D).unwrap();

        assert_eq!(cache.get(&fp).unwrap().unwrap().letter, OptionLetter::D);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("answers.db");
        let fp = Fingerprint::of("Which planet is largest?");

        {
            let cache = AnswerCache::open(&path).unwrap();
            cache.put(&fp, OptionLetter::B).unwrap();
        }

        let cache = AnswerCache::open(&path).unwrap();
        assert_eq!(cache.get(&fp).unwrap().unwrap().letter, OptionLetter::B);
        assert_eq!(cache.path(), Some(path.as_path()));
    }

    #[test]
    fn test_stats() {
        let cache = AnswerCache::in_memory().unwrap();
        let empty = cache.stats().unwrap();
        assert_eq!(empty.entries, 0);
        assert!(empty.oldest.is_none());

        cache.put(&Fingerprint::of("one"), OptionLetter::A).unwrap();
        cache.put(&Fingerprint::of("two"), OptionLetter::B).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.oldest.is_some());
        assert!(stats.oldest <= stats.newest);
    }

    #[test]
    fn test_concurrent_writers_never_observe_partial_rows() {
        let cache = Arc::new(AnswerCache::in_memory().unwrap());
        let fp = Fingerprint::of("shared");

        let handles: Vec<_> = OptionLetter::ALL
            .iter()
            .map(|&letter| {
                let cache = Arc::clone(&cache);
                let fp = fp.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cache.put(&fp, letter).unwrap();
                        let seen = cache.get(&fp).unwrap().unwrap();
                        assert!(OptionLetter::ALL.contains(&seen.letter));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len().unwrap(), 1);
    }
}
