//! Collaborator interfaces consumed by the workflow.
//!
//! The controller only ever talks to these traits. Concrete implementations
//! live in [`crate::ai`], [`crate::search`] and [`crate::document`].

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::state::{Turn, WorkflowState};

/// Section name to text, as handed to the document builder.
pub type Sections = BTreeMap<String, String>;

/// Produces analysis, questions and proposal content.
#[async_trait]
pub trait DraftingService: Send + Sync {
    /// Requirements gap analysis of the client request.
    async fn analyze(
        &self,
        request: &str,
        client_name: &str,
        context: &[String],
    ) -> anyhow::Result<String>;

    /// Structured fields found in a user reply.
    async fn extract(&self, user_text: &str) -> anyhow::Result<BTreeMap<String, String>>;

    /// The next clarifying question for the conversation so far.
    async fn next_question(&self, state: &WorkflowState) -> anyhow::Result<String>;

    /// Raw structured (JSON) proposal content.
    ///
    /// The response is parsed by the workflow, which tolerates malformed output.
    async fn draft(
        &self,
        request: &str,
        client_name: &str,
        fields: &BTreeMap<String, String>,
        recent_turns: &[Turn],
        context: &[String],
    ) -> anyhow::Result<String>;
}

/// Retrieves texts similar to a query.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<String>>;
}

/// Persists proposal sections as a document.
///
/// Implementations must tolerate being called again for the same sections.
#[async_trait]
pub trait DocumentBuilder: Send + Sync {
    async fn build(&self, sections: &Sections) -> anyhow::Result<DocumentRef>;

    /// Whether a reported document can actually be retrieved.
    async fn exists(&self, reference: &DocumentRef) -> bool;
}

/// Opaque handle to a persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
