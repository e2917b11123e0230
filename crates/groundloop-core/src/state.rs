//! Durable state — the small fact base that survives iterations and restarts.
//!
//! The record lives in a JSON file next to the workspace. Every mutation goes
//! through [`StateStore::mutate`], which holds the store lock across
//! read-modify-persist and only commits the in-memory copy once the file has
//! been replaced, so the two never diverge.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DurableState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_url: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub last_action_timestamp: Option<DateTime<Utc>>,

    /// Deployment-specific status fields, kept sorted for stable output.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A malformed timestamp drops only itself, not the rest of the record.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<DateTime<Utc>>(value.clone()) {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!("ignoring unreadable last-action-timestamp {}: {}", value, e);
                None
            }
        },
    })
}

impl DurableState {
    pub fn is_registered(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }

    pub fn touch(&mut self) {
        self.last_action_timestamp = Some(Utc::now());
    }

    pub fn set_status(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    /// Stable, human-readable rendering used both on disk and in prompts.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

pub struct StateStore {
    path: PathBuf,
    state: Mutex<DurableState>,
}

impl StateStore {
    /// Load the record at `path`. A missing or corrupt file is not fatal: the
    /// store starts empty and the next mutation rewrites the file.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<DurableState>(&content) {
                Ok(state) => {
                    info!("Loaded durable state from {}", path.display());
                    state
                }
                Err(e) => {
                    warn!(
                        "Failed to parse durable state {}: {} — starting empty",
                        path.display(),
                        e
                    );
                    DurableState::default()
                }
            },
            Err(e) => {
                warn!(
                    "No durable state at {} ({}) — starting empty",
                    path.display(),
                    e
                );
                DurableState::default()
            }
        };
        Self::with_state(path, state)
    }

    /// Wrap an in-memory state without touching disk until the first mutation.
    pub fn with_state(path: impl Into<PathBuf>, state: DurableState) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> DurableState {
        self.state.lock().await.clone()
    }

    /// Apply `f` to a copy of the state, flush it, then commit it.
    ///
    /// If the flush fails the in-memory state is left as it was and the error
    /// is returned, so callers never acknowledge an unpersisted change.
    pub async fn mutate<T>(&self, f: impl FnOnce(&mut DurableState) -> T) -> Result<T> {
        let mut current = self.state.lock().await;
        let mut next = current.clone();
        let out = f(&mut next);
        write_record(&self.path, &next).await?;
        *current = next;
        debug!("durable state flushed to {}", self.path.display());
        Ok(out)
    }
}

async fn write_record(path: &Path, state: &DurableState) -> Result<()> {
    let mut json = serde_json::to_string_pretty(state)?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::state_flush(path, e))?;
    }

    let tmp = tmp_path(path);
    fs::write(&tmp, json)
        .await
        .map_err(|e| Error::state_flush(path, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::state_flush(path, e))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/var/run/state.json")),
            PathBuf::from("/var/run/state.json.tmp")
        );
    }

    #[tokio::test]
    async fn failed_flush_keeps_memory_unchanged() {
        let tmp = tempfile::TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = tmp.path().join("state.json");
        std::fs::create_dir_all(path.join("blocker")).unwrap();

        let store = StateStore::with_state(&path, DurableState::default());
        let result = store
            .mutate(|s| s.credential = Some("lost".into()))
            .await;

        assert!(result.is_err());
        assert_eq!(store.snapshot().await.credential, None);
    }
}
