//! Configuration management for BidMaster.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workflow ceilings and intent settings
    pub workflow: WorkflowConfig,

    /// AI settings
    pub ai: AiConfig,

    /// Similarity search settings
    pub search: SearchConfig,

    /// Output settings
    pub output: OutputConfig,
}

/// Workflow controller settings.
///
/// The ceilings are tunable; the defaults keep a conversation recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Information-gathering visits after which a user reply always advances
    pub gather_ceiling: u32,

    /// Visits of any single step after which the conversation is ended
    pub global_visit_ceiling: u32,

    /// Internal transitions allowed within one `run` call
    pub max_transitions_per_run: u32,

    /// Gathering visit count from which questions carry a "generate now" hint
    pub hint_after: u32,

    /// Extra document build attempts after a failed one
    pub document_build_retries: u32,

    /// Per-step time limit in seconds (0 disables the limit)
    pub step_timeout_secs: u64,

    /// Similar documents retrieved for request analysis
    pub analysis_context_k: usize,

    /// Similar documents retrieved for drafting
    pub draft_context_k: usize,

    /// Literal command that always advances to drafting
    pub command_token: String,

    /// Phrases meaning "proceed" (matched accent- and case-insensitively)
    pub advance_phrases: Vec<String>,
}

impl WorkflowConfig {
    /// Per-step time limit, if any.
    pub fn step_timeout(&self) -> Option<Duration> {
        (self.step_timeout_secs > 0).then(|| Duration::from_secs(self.step_timeout_secs))
    }
}

/// AI integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// AI provider (auto, claude, openai, ollama)
    pub provider: String,

    /// Model override for hosted providers
    pub model: Option<String>,

    /// Ollama-specific settings
    pub ollama: OllamaConfig,
}

/// Ollama configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Ollama server URL
    pub base_url: String,

    /// Model to use
    pub model: String,
}

/// Similarity search settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Directory of past proposals (.md / .txt) used as context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_dir: Option<PathBuf>,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory generated proposal documents are written to
    pub documents_dir: PathBuf,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.bidmaster.toml` in current directory
    /// 2. `~/.config/bidmaster/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".bidmaster.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("bidmaster"))
    }

    /// Get the data directory path (for saved sessions).
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("bidmaster"))
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            gather_ceiling: 5,
            global_visit_ceiling: 20,
            max_transitions_per_run: 10,
            hint_after: 3,
            document_build_retries: 1,
            step_timeout_secs: 120,
            analysis_context_k: 3,
            draft_context_k: 5,
            command_token: "/generate".to_string(),
            advance_phrases: default_advance_phrases(),
        }
    }
}

fn default_advance_phrases() -> Vec<String> {
    [
        // Czech
        "vytvoř nabídku",
        "generuj nabídku",
        "vygeneruj nabídku",
        "udělej nabídku",
        "připrav nabídku",
        "pokračuj",
        "další krok",
        "další",
        "hotovo",
        "dokončit",
        "ano",
        "souhlasím",
        "ok",
        "dobře",
        "v pořádku",
        // English
        "proceed",
        "continue",
        "go ahead",
        "next step",
        "generate now",
        "create the proposal",
        "generate the proposal",
        "that's all",
        "i'm satisfied",
        "looks good",
        "done",
        "yes",
    ]
    .iter()
    .map(|p| (*p).to_string())
    .collect()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self { provider: "auto".to_string(), model: None, ollama: OllamaConfig::default() }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:11434".to_string(), model: "llama3.2".to_string() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { documents_dir: PathBuf::from("data/generated") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.workflow.gather_ceiling, 5);
        assert_eq!(config.workflow.global_visit_ceiling, 20);
        assert_eq!(config.workflow.max_transitions_per_run, 10);
        assert_eq!(config.workflow.command_token, "/generate");
        assert_eq!(config.ai.provider, "auto");
        assert!(config.search.corpus_dir.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[workflow]"));
        assert!(toml_str.contains("[ai]"));
        assert!(toml_str.contains("[output]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [workflow]
            gather_ceiling = 3
            step_timeout_secs = 0

            [ai]
            provider = "ollama"

            [search]
            corpus_dir = "proposals"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.workflow.gather_ceiling, 3);
        assert_eq!(config.workflow.global_visit_ceiling, 20);
        assert!(config.workflow.step_timeout().is_none());
        assert_eq!(config.ai.provider, "ollama");
        assert_eq!(config.search.corpus_dir, Some(PathBuf::from("proposals")));
        assert!(!config.workflow.advance_phrases.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[output]\ndocuments_dir = \"out\"\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.output.documents_dir, PathBuf::from("out"));
        assert_eq!(config.workflow.step_timeout(), Some(Duration::from_secs(120)));
    }
}
