//! Durable conversation memory.
//!
//! Interactions append to a JSON log on disk; the reasoning loop reads a
//! bounded window of recent ones so follow-up questions can resolve
//! references like "the second one". Every write goes through a temp file
//! and rename in the log's directory, so the log on disk is always either
//! the old state or the new state.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::error::MemoryError;
use crate::models::Interaction;

pub struct MemoryStore {
    path: PathBuf,
    interactions: Vec<Interaction>,
}

impl MemoryStore {
    /// Open the log at `path`. A missing file starts an empty log; a
    /// corrupt one is treated as empty rather than blocking startup.
    pub fn open(path: &Path) -> Self {
        let interactions = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(interactions) => interactions,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "interaction log is corrupt, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            path: path.to_path_buf(),
            interactions,
        }
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    pub fn all(&self) -> &[Interaction] {
        &self.interactions
    }

    /// The most recent `n` interactions, oldest first.
    pub fn window(&self, n: usize) -> &[Interaction] {
        let start = self.interactions.len().saturating_sub(n);
        &self.interactions[start..]
    }

    /// Append an interaction and persist. On a write failure the
    /// interaction stays in memory and the error reports the log path.
    pub fn append(&mut self, interaction: Interaction) -> Result<(), MemoryError> {
        self.interactions.push(interaction);
        self.persist()
    }

    /// Attach a feedback tag to interaction `id` (1-based, in log order).
    pub fn add_feedback(&mut self, id: usize, tag: &str) -> Result<(), MemoryError> {
        let interaction = id
            .checked_sub(1)
            .and_then(|i| self.interactions.get_mut(i))
            .ok_or(MemoryError::UnknownInteraction(id))?;

        interaction.feedback = Some(tag.to_string());
        interaction.feedback_at = Some(Utc::now());
        self.persist()
    }

    /// Drop all interactions, in memory and on disk.
    pub fn clear(&mut self) -> Result<(), MemoryError> {
        self.interactions.clear();
        self.persist()
    }

    /// Write the full log to an arbitrary path, pretty-printed.
    pub fn export(&self, path: &Path) -> Result<(), MemoryError> {
        let json = serde_json::to_string_pretty(&self.interactions)
            .map_err(|e| MemoryError::PersistenceWriteError(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| MemoryError::PersistenceWriteError(format!("{}: {}", path.display(), e)))
    }

    fn persist(&self) -> Result<(), MemoryError> {
        let json = serde_json::to_string_pretty(&self.interactions)
            .map_err(|e| MemoryError::PersistenceWriteError(e.to_string()))?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .map_err(|e| MemoryError::PersistenceWriteError(format!("{}: {}", parent.display(), e)))?;

        // Temp file in the same directory so the rename stays on one filesystem.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| MemoryError::PersistenceWriteError(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            MemoryError::PersistenceWriteError(format!("{}: {}", self.path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReasoningStep;
    use tempfile::TempDir;

    fn interaction(query: &str, answer: &str) -> Interaction {
        Interaction {
            timestamp: Utc::now(),
            query: query.to_string(),
            answer: answer.to_string(),
            steps: vec![ReasoningStep::FinalAnswer {
                text: answer.to_string(),
            }],
            tools_used: vec!["document_search".to_string()],
            feedback: None,
            feedback_at: None,
        }
    }

    #[test]
    fn append_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");

        let mut store = MemoryStore::open(&path);
        store
            .append(interaction("What databases are mentioned?", "Postgres and Redis."))
            .unwrap();
        store
            .append(interaction("Tell me about the second one", "Redis caches hot keys."))
            .unwrap();

        let reloaded = MemoryStore::open(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.all()[1].query, "Tell me about the second one");
    }

    #[test]
    fn window_returns_most_recent_oldest_first() {
        let tmp = TempDir::new().unwrap();
        let mut store = MemoryStore::open(&tmp.path().join("memory.json"));
        for i in 0..15 {
            store.append(interaction(&format!("q{}", i), "a")).unwrap();
        }

        let window = store.window(10);
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].query, "q5");
        assert_eq!(window[9].query, "q14");

        assert_eq!(store.window(100).len(), 15);
    }

    #[test]
    fn feedback_attaches_by_one_based_id() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        let mut store = MemoryStore::open(&path);
        store.append(interaction("q1", "a1")).unwrap();
        store.append(interaction("q2", "a2")).unwrap();

        store.add_feedback(2, "helpful").unwrap();
        assert!(store.all()[0].feedback.is_none());
        assert_eq!(store.all()[1].feedback.as_deref(), Some("helpful"));
        assert!(store.all()[1].feedback_at.is_some());

        let reloaded = MemoryStore::open(&path);
        assert_eq!(reloaded.all()[1].feedback.as_deref(), Some("helpful"));
    }

    #[test]
    fn feedback_on_unknown_id_errors() {
        let tmp = TempDir::new().unwrap();
        let mut store = MemoryStore::open(&tmp.path().join("memory.json"));
        store.append(interaction("q1", "a1")).unwrap();

        assert!(matches!(
            store.add_feedback(0, "helpful"),
            Err(MemoryError::UnknownInteraction(0))
        ));
        assert!(matches!(
            store.add_feedback(5, "helpful"),
            Err(MemoryError::UnknownInteraction(5))
        ));
    }

    #[test]
    fn clear_empties_log_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        let mut store = MemoryStore::open(&path);
        store.append(interaction("q1", "a1")).unwrap();
        store.clear().unwrap();

        assert!(store.is_empty());
        let reloaded = MemoryStore::open(&path);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn corrupt_log_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = MemoryStore::open(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn export_writes_full_log() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        let mut store = MemoryStore::open(&path);
        store.append(interaction("q1", "a1")).unwrap();

        let out = tmp.path().join("export.json");
        store.export(&out).unwrap();
        let exported: Vec<Interaction> =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].query, "q1");
    }
}
