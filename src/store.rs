//! Durable delivery bookkeeping.
//!
//! Two JSON files: the progress record (who has been messaged, counters,
//! timestamps) and the failure log (usernames whose attempt failed, in order).
//! Both are rewritten after every attempt so a crashed run repeats at most one.

use crate::errors::{DispatchError, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub success: u64,
    pub failed: u64,
    /// Subset of `success` whose send could not be verified.
    #[serde(default)]
    pub unconfirmed: u64,
}

impl DeliveryStats {
    pub fn attempts(&self) -> u64 {
        self.success + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    #[serde(default)]
    pub messaged_usernames: BTreeSet<String>,
    #[serde(default)]
    pub stats: DeliveryStats,
    #[serde(default = "Utc::now", deserialize_with = "lenient_time::required")]
    pub started_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_time::optional")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            messaged_usernames: BTreeSet::new(),
            stats: DeliveryStats::default(),
            started_at: Utc::now(),
            last_updated: None,
        }
    }
}

impl ProgressState {
    pub fn is_messaged(&self, username: &str) -> bool {
        self.messaged_usernames.contains(username)
    }

    /// Record a delivered message. Adding an already-messaged username is a no-op
    /// on the set; the counters still move because an attempt was made.
    pub fn record_success(&mut self, username: &str, confirmed: bool) {
        self.messaged_usernames.insert(username.to_string());
        self.stats.success += 1;
        if !confirmed {
            self.stats.unconfirmed += 1;
        }
    }

    pub fn record_failure(&mut self, failures: &mut FailureLog, username: &str) {
        self.stats.failed += 1;
        failures.push(username);
    }
}

/// Timestamps written by older tools carry no offset; those are read as UTC.
mod lenient_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    pub fn required<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn optional<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw))),
            None => Ok(None),
        }
    }
}

/// Usernames whose delivery failed, oldest first. Not deduplicated across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureLog(Vec<String>);

impl FailureLog {
    pub fn push(&mut self, username: &str) {
        self.0.push(username.to_string());
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.0.iter().any(|u| u == username)
    }
}

pub struct ProgressStore {
    progress_path: PathBuf,
    failure_path: PathBuf,
}

impl ProgressStore {
    pub fn new(progress_path: impl Into<PathBuf>, failure_path: impl Into<PathBuf>) -> Self {
        Self {
            progress_path: progress_path.into(),
            failure_path: failure_path.into(),
        }
    }

    /// Missing files yield fresh defaults; unreadable or malformed files are fatal.
    pub fn load(&self) -> Result<(ProgressState, FailureLog)> {
        let progress: ProgressState = read_json(&self.progress_path)?.unwrap_or_default();
        if self.progress_path.exists() {
            tracing::info!(
                path = %self.progress_path.display(),
                messaged = progress.messaged_usernames.len(),
                "loaded progress"
            );
        }
        let failures: FailureLog = read_json(&self.failure_path)?.unwrap_or_default();
        if !failures.is_empty() {
            tracing::info!(
                path = %self.failure_path.display(),
                failed = failures.len(),
                "loaded previous failures"
            );
        }
        Ok((progress, failures))
    }

    /// Stamp `last_updated` and atomically replace both files.
    pub fn save(&self, progress: &mut ProgressState, failures: &FailureLog) -> Result<()> {
        progress.last_updated = Some(Utc::now());
        write_json_atomic(&self.progress_path, progress)?;
        write_json_atomic(&self.failure_path, failures)?;
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DispatchError::io(path, e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| DispatchError::CorruptState {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| DispatchError::CorruptState {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(&tmp_path, bytes).map_err(|e| DispatchError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| DispatchError::io(path, e))?;
    Ok(())
}
