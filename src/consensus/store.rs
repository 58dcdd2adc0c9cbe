//! Persistence of completed rounds.
//!
//! The engine hands every evaluated round to a [`RoundStore`] before it
//! decides what happens next, so a crashed or cancelled session can be resumed
//! from its last persisted round with
//! [`ConsensusEngine::resume_session`](crate::ConsensusEngine::resume_session).
//!
//! [`JsonlRoundStore`] writes one JSON line per round into a file per phase:
//!
//! ```text
//! rounds/
//!   analyze-3f1c9a0b27d4e6f5.jsonl
//!   analyze-3f1c9a0b27d4e6f5.20261016T091502123.jsonl
//!   plan-92ab44c1e0f7d3a8.jsonl
//! ```
//!
//! The unsuffixed file always holds the current session of a phase. A fresh
//! session moves the previous log aside under a timestamp suffix.

use crate::consensus::evaluator::RoundResult;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Destination for evaluated rounds.
///
/// A failed `persist_round` ends the session with
/// [`ConsensusError::Persistence`](crate::ConsensusError::Persistence).
#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Called once before a session's first round runs. `first_round` is 1
    /// for a fresh session and later for a resumed one.
    async fn begin_session(
        &self,
        _phase_id: &str,
        _session_id: &str,
        _first_round: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    async fn persist_round(
        &self,
        phase_id: &str,
        result: &RoundResult,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Discards every round. The engine's default store.
#[derive(Debug, Default, Clone)]
pub struct NoopRoundStore;

#[async_trait]
impl RoundStore for NoopRoundStore {
    async fn persist_round(
        &self,
        _phase_id: &str,
        _result: &RoundResult,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Keeps rounds in memory, grouped by phase.
#[derive(Debug, Default)]
pub struct InMemoryRoundStore {
    rounds: Mutex<HashMap<String, Vec<RoundResult>>>,
}

impl InMemoryRoundStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rounds persisted so far for `phase_id`, in order.
    pub async fn rounds(&self, phase_id: &str) -> Vec<RoundResult> {
        self.rounds
            .lock()
            .await
            .get(phase_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RoundStore for InMemoryRoundStore {
    async fn begin_session(
        &self,
        phase_id: &str,
        _session_id: &str,
        first_round: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if first_round == 1 {
            self.rounds.lock().await.remove(phase_id);
        }
        Ok(())
    }

    async fn persist_round(
        &self,
        phase_id: &str,
        result: &RoundResult,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.rounds
            .lock()
            .await
            .entry(phase_id.to_string())
            .or_default()
            .push(result.clone());
        Ok(())
    }
}

/// Appends rounds as JSON lines, one file per phase.
///
/// # Example
///
/// ```rust,no_run
/// use consensus_engine::JsonlRoundStore;
/// # fn main() -> std::io::Result<()> {
/// let store = JsonlRoundStore::open("/tmp/consensus-rounds")?;
/// let history = store.load_rounds("analyze")?;
/// println!("{} rounds already persisted", history.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JsonlRoundStore {
    dir: PathBuf,
}

impl JsonlRoundStore {
    /// Use `dir` as the log directory, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the log file for `phase_id`.
    pub fn log_path(&self, phase_id: &str) -> PathBuf {
        self.dir.join(round_log_filename(phase_id))
    }

    /// Read back every round persisted for `phase_id`. A missing file is an
    /// empty history.
    pub fn load_rounds(&self, phase_id: &str) -> io::Result<Vec<RoundResult>> {
        let path = self.log_path(phase_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut rounds = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let result: RoundResult = serde_json::from_str(&line).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to parse round in {}: {}", path.display(), e),
                )
            })?;
            rounds.push(result);
        }
        Ok(rounds)
    }

    /// Archived logs of earlier sessions for `phase_id`, sorted by name.
    pub fn archived_logs(&self, phase_id: &str) -> io::Result<Vec<PathBuf>> {
        let current = round_log_filename(phase_id);
        let prefix = format!("{}.", current.trim_end_matches(".jsonl"));
        let mut archived = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_archive = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| {
                    name != current && name.starts_with(&prefix) && name.ends_with(".jsonl")
                });
            if is_archive {
                archived.push(path);
            }
        }
        archived.sort();
        Ok(archived)
    }

    /// Move the current log aside so a fresh session starts from an empty file.
    fn rotate(&self, phase_id: &str) -> io::Result<()> {
        let path = self.log_path(phase_id);
        if !path.exists() {
            return Ok(());
        }
        let current = round_log_filename(phase_id);
        let stem = current.trim_end_matches(".jsonl");
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f").to_string();
        let mut archive = self.dir.join(format!("{}.{}.jsonl", stem, stamp));
        let mut suffix = 1;
        while archive.exists() {
            archive = self.dir.join(format!("{}.{}-{}.jsonl", stem, stamp, suffix));
            suffix += 1;
        }
        log::debug!("Archiving round log {} as {}", path.display(), archive.display());
        fs::rename(&path, &archive)
    }

    fn append(&self, phase_id: &str, result: &RoundResult) -> io::Result<()> {
        let json = serde_json::to_string(result)
            .map_err(|e| io::Error::other(format!("Failed to serialize round: {}", e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(phase_id))?;
        writeln!(file, "{}", json)?;
        file.flush()
    }
}

#[async_trait]
impl RoundStore for JsonlRoundStore {
    async fn begin_session(
        &self,
        phase_id: &str,
        _session_id: &str,
        first_round: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if first_round > 1 {
            return Ok(());
        }
        let store = self.clone();
        let phase_id = phase_id.to_string();
        tokio::task::spawn_blocking(move || store.rotate(&phase_id)).await??;
        Ok(())
    }

    async fn persist_round(
        &self,
        phase_id: &str,
        result: &RoundResult,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let store = self.clone();
        let phase_id = phase_id.to_string();
        let result = result.clone();
        tokio::task::spawn_blocking(move || store.append(&phase_id, &result)).await??;
        Ok(())
    }
}

/// Filename of the round log for `phase_id`.
///
/// Format: `{safe_id}-{sha256(phase_id)[..16]}.jsonl`. Characters other than
/// alphanumerics, `-` and `_` are replaced with `_`; the fingerprint keeps
/// phases that sanitize to the same prefix apart.
///
/// ```
/// use consensus_engine::round_log_filename;
///
/// let a = round_log_filename("phase/1");
/// let b = round_log_filename("phase?1");
/// assert!(a.starts_with("phase_1-"));
/// assert!(a.ends_with(".jsonl"));
/// assert_ne!(a, b);
/// ```
pub fn round_log_filename(phase_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(phase_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let safe_id: String = phase_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{}-{}.jsonl", safe_id, &digest[..16])
}
