//! Keyword similarity search over past proposals.
//!
//! Small in-memory index: a document's score is the number of distinct query
//! terms it contains. Good enough to hand the drafting service a few related
//! proposals as context.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::workflow::{normalize, SimilaritySearch};

/// Terms shorter than this are ignored.
const MIN_TERM_LEN: usize = 3;

const EXTENSIONS: [&str; 3] = ["md", "txt", "markdown"];

struct IndexedDocument {
    text: String,
    terms: HashSet<String>,
}

/// In-memory keyword index.
#[derive(Default)]
pub struct KeywordIndex {
    documents: Vec<IndexedDocument>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every `.md` / `.txt` file below `root`.
    pub fn load_dir(root: &Path) -> anyhow::Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Corpus directory not found: {}", root.display());
        }

        let mut index = Self::new();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let is_text = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_lowercase().as_str()));
            if !is_text {
                continue;
            }

            match std::fs::read_to_string(entry.path()) {
                Ok(text) => index.add(text),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable document");
                }
            }
        }

        tracing::info!(documents = index.len(), root = %root.display(), "Indexed proposal corpus");
        Ok(index)
    }

    /// Add a document.
    pub fn add(&mut self, text: impl Into<String>) {
        let text = text.into();
        let terms = terms(&text);
        self.documents.push(IndexedDocument { text, terms });
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Top `k` documents sharing at least one term with the query.
    pub fn query(&self, query: &str, k: usize) -> Vec<String> {
        let query_terms = terms(query);
        if query_terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, doc)| (i, query_terms.intersection(&doc.terms).count()))
            .filter(|(_, score)| *score > 0)
            .collect();

        // Highest score first; earlier documents win ties.
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        scored.into_iter().take(k).map(|(i, _)| self.documents[i].text.clone()).collect()
    }
}

fn terms(text: &str) -> HashSet<String> {
    normalize(text)
        .split(' ')
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SimilaritySearch for KeywordIndex {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<String>> {
        Ok(self.query(query, k))
    }
}
