//! Persistence of conversations between CLI invocations.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::Config;

use super::state::{Step, WorkflowState};

/// Short description of a stored conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub conversation_id: String,
    pub client_name: String,
    pub current_step: Step,
    pub turns: usize,
}

/// Stores one JSON file per conversation.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Store under `<data_dir>/sessions`.
    pub fn new() -> anyhow::Result<Self> {
        let data_dir =
            Config::data_dir().ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(Self::with_dir(data_dir.join("sessions")))
    }

    /// Create a store with a custom directory (for testing).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a conversation, replacing any earlier snapshot.
    pub fn save(&self, state: &WorkflowState) -> anyhow::Result<PathBuf> {
        let path = self.path_for(state.conversation_id())?;
        let content = serde_json::to_string_pretty(state)?;

        fs::create_dir_all(&self.dir)?;
        fs::write(&path, content)?;

        tracing::debug!(path = %path.display(), "Saved session");
        Ok(path)
    }

    /// Load a conversation by id.
    pub fn load(&self, conversation_id: &str) -> anyhow::Result<WorkflowState> {
        let path = self.path_for(conversation_id)?;
        if !path.exists() {
            anyhow::bail!("No session with id '{conversation_id}'");
        }

        let content = fs::read_to_string(&path)?;
        let state: WorkflowState = serde_json::from_str(&content)?;
        Ok(state)
    }

    /// All readable sessions, sorted by client name.
    pub fn list(&self) -> anyhow::Result<Vec<SessionSummary>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|c| serde_json::from_str::<WorkflowState>(&c).map_err(Into::into))
            {
                Ok(state) => sessions.push(SessionSummary {
                    conversation_id: state.conversation_id().to_string(),
                    client_name: state.client_name().to_string(),
                    current_step: state.current_step(),
                    turns: state.conversation_log().len(),
                }),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session"),
            }
        }

        sessions.sort_by(|a, b| {
            a.client_name.cmp(&b.client_name).then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        Ok(sessions)
    }

    fn path_for(&self, conversation_id: &str) -> anyhow::Result<PathBuf> {
        let valid = !conversation_id.is_empty()
            && conversation_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            anyhow::bail!("Invalid session id '{conversation_id}'");
        }
        Ok(self.dir.join(format!("{conversation_id}.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::Turn;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_dir(dir.path().join("sessions"));

        let mut state = WorkflowState::initialize("We need IdM", "Client X").unwrap();
        state.push_turn(Turn::user("hello"));

        let path = store.save(&state).unwrap();
        assert!(path.exists());

        let loaded = store.load(state.conversation_id()).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_list_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_dir(dir.path());

        store.save(&WorkflowState::initialize("a", "Zeta").unwrap()).unwrap();
        store.save(&WorkflowState::initialize("b", "Alpha").unwrap()).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let sessions = store.list().unwrap();
        let names: Vec<_> = sessions.iter().map(|s| s.client_name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Zeta"]);
        assert_eq!(sessions[0].current_step, Step::AnalyzeRequest);
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let store = SessionStore::with_dir("/nonexistent/bidmaster/sessions");
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_dir(dir.path());

        assert!(store.load("../etc/passwd").is_err());
        assert!(store.load("").is_err());
        assert!(store.load("does-not-exist").is_err());
    }
}
