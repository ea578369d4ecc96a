use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::error::{TranscribeError, TranscribeResult};
use crate::store::{TranscriptionRecord, TranscriptionStatus};
use crate::transcript::Sentence;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transcriptions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    episode_id TEXT NOT NULL,
    audio_url TEXT NOT NULL,
    rss_url TEXT,
    status TEXT NOT NULL,
    result_text TEXT NOT NULL DEFAULT '',
    sentences_json TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, episode_id)
);
CREATE INDEX IF NOT EXISTS idx_transcriptions_user ON transcriptions (user_id);
";

/// SQLite-backed transcription store.
///
/// Holds only the database path; each call opens its own connection and
/// runs on the blocking pool, so the handle clones cheaply into tasks.
#[derive(Debug, Clone)]
pub struct TranscriptionStore {
    db_path: PathBuf,
}

impl TranscriptionStore {
    /// Open the database at `path`, creating the file and schema if needed.
    pub async fn open(path: impl AsRef<Path>) -> TranscribeResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    TranscribeError::Persistence(format!("Creating {}: {}", parent.display(), e))
                })?;
            }
        }
        let store = Self { db_path };
        store
            .run_blocking(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        info!("Transcription store ready at {}", store.db_path.display());
        Ok(store)
    }

    /// Fetch the transcription for `(user_id, episode_id)`, if any.
    pub async fn find(
        &self,
        user_id: &str,
        episode_id: &str,
    ) -> TranscribeResult<Option<TranscriptionRecord>> {
        let user_id = user_id.to_string();
        let episode_id = episode_id.to_string();
        self.run_blocking(move |conn| {
            let raw = conn
                .query_row(
                    "SELECT id, user_id, episode_id, audio_url, rss_url, status,
                            result_text, sentences_json, created_at, updated_at
                     FROM transcriptions WHERE user_id = ?1 AND episode_id = ?2",
                    params![user_id, episode_id],
                    RawRecord::from_row,
                )
                .optional()?;
            raw.map(RawRecord::into_record).transpose()
        })
        .await
    }

    /// Create or reset the row for a new attempt and mark it processing.
    /// Any result from a previous attempt is cleared.
    pub async fn mark_processing(
        &self,
        user_id: &str,
        episode_id: &str,
        audio_url: &str,
        rss_url: Option<&str>,
    ) -> TranscribeResult<()> {
        let user_id = user_id.to_string();
        let episode_id = episode_id.to_string();
        let audio_url = audio_url.to_string();
        let rss_url = rss_url.map(str::to_string);
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO transcriptions
                     (id, user_id, episode_id, audio_url, rss_url, status,
                      result_text, sentences_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, '', '[]', ?7, ?7)
                 ON CONFLICT (user_id, episode_id) DO UPDATE SET
                     audio_url = excluded.audio_url,
                     rss_url = excluded.rss_url,
                     status = excluded.status,
                     result_text = '',
                     sentences_json = '[]',
                     updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    episode_id,
                    audio_url,
                    rss_url,
                    TranscriptionStatus::Processing.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Append one finished sentence to the in-progress row.
    pub async fn append_sentence(
        &self,
        user_id: &str,
        episode_id: &str,
        sentence: &Sentence,
    ) -> TranscribeResult<()> {
        let user_id = user_id.to_string();
        let episode_id = episode_id.to_string();
        let sentence = sentence.clone();
        self.run_blocking(move |conn| {
            let stored: Option<String> = conn
                .query_row(
                    "SELECT sentences_json FROM transcriptions
                     WHERE user_id = ?1 AND episode_id = ?2",
                    params![user_id, episode_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(stored) = stored else {
                return Err(TranscribeError::Persistence(format!(
                    "No transcription row for {}/{}",
                    user_id, episode_id
                )));
            };
            let mut sentences: Vec<Sentence> = serde_json::from_str(&stored)?;
            sentences.push(sentence);
            conn.execute(
                "UPDATE transcriptions
                 SET sentences_json = ?3, updated_at = ?4
                 WHERE user_id = ?1 AND episode_id = ?2",
                params![
                    user_id,
                    episode_id,
                    serde_json::to_string(&sentences)?,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Store the finished transcript and flip the row to done.
    pub async fn mark_done(
        &self,
        user_id: &str,
        episode_id: &str,
        sentences: &[Sentence],
        result_text: &str,
    ) -> TranscribeResult<()> {
        let user_id = user_id.to_string();
        let episode_id = episode_id.to_string();
        let sentences_json = serde_json::to_string(sentences)?;
        let result_text = result_text.to_string();
        self.run_blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE transcriptions
                 SET status = ?3, result_text = ?4, sentences_json = ?5, updated_at = ?6
                 WHERE user_id = ?1 AND episode_id = ?2",
                params![
                    user_id,
                    episode_id,
                    TranscriptionStatus::Done.as_str(),
                    result_text,
                    sentences_json,
                    Utc::now().to_rfc3339()
                ],
            )?;
            if changed == 0 {
                return Err(TranscribeError::Persistence(format!(
                    "No transcription row for {}/{}",
                    user_id, episode_id
                )));
            }
            Ok(())
        })
        .await
    }

    /// Record a failed attempt. Sentences and text from the attempt are
    /// dropped so a later retry starts clean.
    pub async fn mark_error(&self, user_id: &str, episode_id: &str) -> TranscribeResult<()> {
        let user_id = user_id.to_string();
        let episode_id = episode_id.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE transcriptions
                 SET status = ?3, result_text = '', sentences_json = '[]', updated_at = ?4
                 WHERE user_id = ?1 AND episode_id = ?2",
                params![
                    user_id,
                    episode_id,
                    TranscriptionStatus::Error.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn run_blocking<T, F>(&self, task: F) -> TranscribeResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> TranscribeResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&db_path)?;
            conn.busy_timeout(Duration::from_secs(5))?;
            task(&mut conn)
        })
        .await
        .map_err(|e| TranscribeError::Persistence(format!("Store task failed: {}", e)))?
    }
}

struct RawRecord {
    id: String,
    user_id: String,
    episode_id: String,
    audio_url: String,
    rss_url: Option<String>,
    status: String,
    result_text: String,
    sentences_json: String,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            episode_id: row.get(2)?,
            audio_url: row.get(3)?,
            rss_url: row.get(4)?,
            status: row.get(5)?,
            result_text: row.get(6)?,
            sentences_json: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_record(self) -> TranscribeResult<TranscriptionRecord> {
        let status = TranscriptionStatus::parse(&self.status).ok_or_else(|| {
            TranscribeError::Persistence(format!("Unknown status {:?}", self.status))
        })?;
        let sentences: Vec<Sentence> = serde_json::from_str(&self.sentences_json)?;
        Ok(TranscriptionRecord {
            id: self.id,
            user_id: self.user_id,
            episode_id: self.episode_id,
            audio_url: self.audio_url,
            rss_url: self.rss_url,
            status,
            result_text: self.result_text,
            sentences,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> TranscribeResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TranscribeError::Persistence(format!("Bad timestamp {:?}: {}", value, e)))
}
