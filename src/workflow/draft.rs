//! Parsing of drafted proposal content.
//!
//! Drafting output is model text that is *supposed* to be a JSON object.
//! [`ProposalDraft::parse`] never fails: whatever cannot be recovered is
//! replaced by an explicit placeholder so the workflow can keep going.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::services::Sections;
use super::state::DraftContent;

/// Sections every proposal is expected to contain, in document order.
pub const SECTION_NAMES: [&str; 7] = [
    "client_name",
    "introduction",
    "solution_description",
    "scope_of_work",
    "timeline",
    "pricing",
    "contact_info",
];

static JSON_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{.*\}").unwrap_or_else(|e| panic!("invalid JSON block pattern: {e}"))
});

/// Marker written into a section that could not be drafted.
pub fn placeholder(section: &str) -> String {
    format!("[missing: {section}]")
}

/// A parsed draft plus what had to be patched up.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalDraft {
    content: DraftContent,
    missing: Vec<&'static str>,
    parsed: bool,
}

impl ProposalDraft {
    /// Parse a drafting response.
    ///
    /// The outermost `{...}` block is taken as the payload. Missing sections
    /// get a placeholder, except `client_name` which falls back to the
    /// conversation's client. If no JSON object can be found at all, the raw
    /// text becomes the solution description.
    pub fn parse(raw: &str, client_name: &str) -> Self {
        match extract_object(raw) {
            Some(object) => Self::complete(object, client_name, true),
            None => {
                tracing::warn!("Draft response was not a JSON object; keeping raw text");

                let mut content = DraftContent::new();
                let raw = raw.trim();
                if !raw.is_empty() {
                    content.insert("solution_description".to_string(), Value::String(raw.to_string()));
                }
                Self::complete(content, client_name, false)
            }
        }
    }

    fn complete(mut content: DraftContent, client_name: &str, parsed: bool) -> Self {
        let mut missing = Vec::new();

        for section in SECTION_NAMES {
            if content.get(section).is_some_and(|v| !is_blank(v)) {
                continue;
            }

            let fill = if section == "client_name" {
                client_name.to_string()
            } else {
                missing.push(section);
                placeholder(section)
            };
            content.insert(section.to_string(), Value::String(fill));
        }

        Self { content, missing, parsed }
    }

    /// Whether any section had to be replaced by a placeholder.
    pub fn is_degraded(&self) -> bool {
        !self.parsed || !self.missing.is_empty()
    }

    /// Sections filled with a placeholder.
    pub fn missing_sections(&self) -> &[&'static str] {
        &self.missing
    }

    /// Whether the response contained a usable JSON object.
    pub fn was_parsed(&self) -> bool {
        self.parsed
    }

    pub fn content(&self) -> &DraftContent {
        &self.content
    }

    pub fn into_content(self) -> DraftContent {
        self.content
    }
}

/// The outermost `{...}` block of model output, if it parses as a JSON object.
pub fn json_object(raw: &str) -> Option<Map<String, Value>> {
    let block = JSON_BLOCK.find(raw)?;
    match serde_json::from_str::<Value>(block.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "JSON block in model output did not parse");
            None
        }
    }
}

fn extract_object(raw: &str) -> Option<DraftContent> {
    json_object(raw).map(|map| map.into_iter().collect())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Coerce structured draft content to plain text sections.
pub fn to_sections(content: &DraftContent) -> Sections {
    content.iter().map(|(name, value)| (name.clone(), value_to_text(value))).collect()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| format!("- {}", value_to_text(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", value_to_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_complete_json() {
        let raw = json!({
            "client_name": "ACME",
            "introduction": "Hello",
            "solution_description": "IdM rollout",
            "scope_of_work": ["Install", "Configure"],
            "timeline": "Q3",
            "pricing": 120000,
            "contact_info": "sales@example.com"
        })
        .to_string();

        let draft = ProposalDraft::parse(&raw, "Client X");
        assert!(!draft.is_degraded());
        assert_eq!(draft.content()["client_name"], json!("ACME"));
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        let raw = "Sure! Here is the proposal:\n```json\n{\"introduction\": \"Hi\"}\n```\nRegards";

        let draft = ProposalDraft::parse(raw, "Client X");
        assert!(draft.was_parsed());
        assert_eq!(draft.content()["introduction"], json!("Hi"));
        assert_eq!(draft.content()["client_name"], json!("Client X"));
        assert!(draft.missing_sections().contains(&"pricing"));
        assert!(!draft.missing_sections().contains(&"client_name"));
    }

    #[test]
    fn test_missing_sections_get_placeholder() {
        let draft = ProposalDraft::parse(r#"{"introduction": "Hi", "pricing": null}"#, "Client X");
        assert_eq!(draft.content()["pricing"], json!("[missing: pricing]"));
        assert_eq!(draft.content()["timeline"], json!("[missing: timeline]"));
        assert!(draft.is_degraded());
    }

    #[test]
    fn test_unparseable_response_keeps_raw_text() {
        let draft = ProposalDraft::parse("We propose a phased rollout.", "Client X");

        assert!(!draft.was_parsed());
        assert!(draft.is_degraded());
        assert_eq!(draft.content()["client_name"], json!("Client X"));
        assert_eq!(draft.content()["solution_description"], json!("We propose a phased rollout."));
        assert_eq!(draft.content()["introduction"], json!("[missing: introduction]"));
        assert_eq!(draft.content().len(), SECTION_NAMES.len());
    }

    #[test]
    fn test_broken_json_is_treated_as_text() {
        let draft = ProposalDraft::parse("{\"introduction\": \"Hi\",", "Client X");
        assert!(!draft.was_parsed());
        assert_eq!(draft.content()["solution_description"], json!("{\"introduction\": \"Hi\","));
    }

    #[test]
    fn test_empty_response_is_all_placeholders() {
        let draft = ProposalDraft::parse("", "Client X");
        assert_eq!(draft.missing_sections().len(), SECTION_NAMES.len() - 1);
    }

    #[test]
    fn test_json_object_takes_outermost_block() {
        let object = json_object("Sure:\n{\"a\": {\"b\": 1}}\nDone.").unwrap();
        assert_eq!(object["a"]["b"], 1);

        assert!(json_object("[1, 2]").is_none());
        assert!(json_object("{not json}").is_none());
    }

    #[test]
    fn test_to_sections_coerces_values() {
        let content: DraftContent = [
            ("scope_of_work".to_string(), json!(["Install", "Train"])),
            ("pricing".to_string(), json!({"license": 100, "services": 200})),
            ("timeline".to_string(), json!(12)),
            ("contact_info".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        let sections = to_sections(&content);
        assert_eq!(sections["scope_of_work"], "- Install\n- Train");
        assert_eq!(sections["pricing"], "license: 100\nservices: 200");
        assert_eq!(sections["timeline"], "12");
        assert_eq!(sections["contact_info"], "");
    }
}
