//! Markdown rendering of proposal documents.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::workflow::{DocumentBuilder, DocumentRef, Sections};

/// Document sections in order, with their headings.
const SECTION_TITLES: [(&str, &str); 6] = [
    ("introduction", "Introduction"),
    ("solution_description", "Proposed Solution"),
    ("scope_of_work", "Scope of Work"),
    ("timeline", "Timeline"),
    ("pricing", "Pricing"),
    ("contact_info", "Contact Information"),
];

const DOCUMENT_VERSION: &str = "1.0";

/// Writes proposals as Markdown files into a directory.
#[derive(Debug, Clone)]
pub struct MarkdownDocumentBuilder {
    output_dir: PathBuf,
}

impl MarkdownDocumentBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn file_name(client_name: &str, now: &DateTime<Local>) -> String {
        let client: String = client_name
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let client = if client.is_empty() { "client".to_string() } else { client };

        format!("proposal_{client}_{}.md", now.format("%Y%m%d_%H%M%S"))
    }
}

/// Render sections as a Markdown document.
pub fn render(sections: &Sections, now: &DateTime<Local>) -> String {
    let client = sections.get("client_name").map(String::as_str).unwrap_or("Client");

    let mut out = format!(
        "# Business Proposal: {client}\n\n\
         **Date:** {}  \n\
         **Version:** {DOCUMENT_VERSION}\n",
        now.format("%Y-%m-%d")
    );

    let known = SECTION_TITLES.iter().map(|(key, title)| (*key, (*title).to_string()));
    let extra = sections
        .keys()
        .filter(|k| {
            k.as_str() != "client_name" && !SECTION_TITLES.iter().any(|(key, _)| *key == k.as_str())
        })
        .map(|k| (k.as_str(), title_case(k)));

    for (number, (key, title)) in known.chain(extra).enumerate() {
        let body = sections.get(key).map(|s| s.trim()).unwrap_or_default();
        out.push_str(&format!("\n## {}. {title}\n\n{body}\n", number + 1));
    }

    out
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map(|c| c.to_uppercase().chain(chars).collect::<String>()).unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl DocumentBuilder for MarkdownDocumentBuilder {
    async fn build(&self, sections: &Sections) -> anyhow::Result<DocumentRef> {
        let now = Local::now();
        let client = sections.get("client_name").map(String::as_str).unwrap_or_default();
        let path = self.output_dir.join(Self::file_name(client, &now));

        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&path, render(sections, &now)).await?;

        tracing::debug!(path = %path.display(), "Wrote proposal document");
        Ok(DocumentRef::new(path.to_string_lossy()))
    }

    async fn exists(&self, reference: &DocumentRef) -> bool {
        tokio::fs::try_exists(reference.as_str()).await.unwrap_or(false)
    }
}
