//! Drafting service backed by an [`AIProvider`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use super::AIProvider;
use crate::workflow::{json_object, DraftingService, Step, Turn, WorkflowState, SECTION_NAMES};

/// Conversation turns shown when asking for the next question.
const QUESTION_HISTORY_TURNS: usize = 5;

/// Keys requested from field extraction.
const FIELD_KEYS: [&str; 5] = ["scope", "timeline", "integrations", "specific_requirements", "budget"];

const NO_CONTEXT: &str = "No relevant past proposals were found.";

/// Prompts an LLM for every drafting operation.
pub struct LlmDrafter<P> {
    provider: P,
}

impl<P: AIProvider> LlmDrafter<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

fn context_block(context: &[String]) -> String {
    if context.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        context.join("\n\n---\n\n")
    }
}

fn history_block(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let role = if t.is_user() { "user" } else { "assistant" };
            format!("{role}: {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fields_block(fields: &BTreeMap<String, String>) -> String {
    serde_json::to_string_pretty(fields).unwrap_or_else(|_| "{}".to_string())
}

fn analysis_prompt(request: &str, client_name: &str, context: &[String]) -> (String, String) {
    let system = "You are a pre-sales consultant preparing a business proposal. \
        Analyse the client request and identify the information that is still missing \
        for a high-quality proposal. Answer in the language of the client request."
        .to_string();

    let prompt = format!(
        "Client: {client_name}\n\n\
         Client request:\n{request}\n\n\
         Similar past proposals:\n{}\n\n\
         Respond in three parts:\n\
         1. Summary of the request\n\
         2. Missing information, covering scope, timeline, integrations, specific requirements and budget\n\
         3. Questions for the client",
        context_block(context)
    );

    (system, prompt)
}

fn extraction_prompt(user_text: &str) -> (String, String) {
    let system = format!(
        "You extract structured data from text. Return only a JSON object using these keys \
         when the information is present: {}. Omit keys that are not mentioned.",
        FIELD_KEYS.join(", ")
    );

    (system, format!("User reply:\n{user_text}"))
}

fn question_prompt(state: &WorkflowState) -> (String, String) {
    let system = "You gather information for a business proposal. Acknowledge what the user \
        just told you, then ask the single most important question that is still open. \
        If enough is known, tell the user they can ask you to create the proposal now. \
        Answer in the language of the conversation."
        .to_string();

    let log = state.conversation_log();
    let recent = &log[log.len().saturating_sub(QUESTION_HISTORY_TURNS)..];

    let prompt = format!(
        "Conversation so far:\n{}\n\n\
         Collected information:\n{}\n\n\
         Questions asked so far: {}",
        history_block(recent),
        fields_block(state.collected_fields()),
        state.visits(Step::GatherInformation)
    );

    (system, prompt)
}

fn draft_prompt(
    request: &str,
    client_name: &str,
    fields: &BTreeMap<String, String>,
    recent_turns: &[Turn],
    context: &[String],
) -> (String, String) {
    let system = format!(
        "You write business proposals. Return only a JSON object with exactly these keys: {}. \
         Every value is text written for the client, in the language of the client request.",
        SECTION_NAMES.join(", ")
    );

    let prompt = format!(
        "Client: {client_name}\n\n\
         Client request:\n{request}\n\n\
         Collected information:\n{}\n\n\
         Recent conversation:\n{}\n\n\
         Similar past proposals:\n{}",
        fields_block(fields),
        history_block(recent_turns),
        context_block(context)
    );

    (system, prompt)
}

/// Parse a field extraction response; anything unusable yields no fields.
fn parse_fields(response: &str) -> BTreeMap<String, String> {
    let Some(object) = json_object(response) else {
        tracing::debug!("Field extraction returned no JSON object");
        return BTreeMap::new();
    };

    object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

#[async_trait]
impl<P: AIProvider> DraftingService for LlmDrafter<P> {
    async fn analyze(
        &self,
        request: &str,
        client_name: &str,
        context: &[String],
    ) -> anyhow::Result<String> {
        let (system, prompt) = analysis_prompt(request, client_name, context);
        self.provider.complete(&system, &prompt).await
    }

    async fn extract(&self, user_text: &str) -> anyhow::Result<BTreeMap<String, String>> {
        let (system, prompt) = extraction_prompt(user_text);
        let response = self.provider.complete(&system, &prompt).await?;
        Ok(parse_fields(&response))
    }

    async fn next_question(&self, state: &WorkflowState) -> anyhow::Result<String> {
        let (system, prompt) = question_prompt(state);
        self.provider.complete(&system, &prompt).await
    }

    async fn draft(
        &self,
        request: &str,
        client_name: &str,
        fields: &BTreeMap<String, String>,
        recent_turns: &[Turn],
        context: &[String],
    ) -> anyhow::Result<String> {
        let (system, prompt) = draft_prompt(request, client_name, fields, recent_turns, context);
        tracing::debug!(provider = self.provider.name(), "Requesting proposal draft");
        self.provider.complete(&system, &prompt).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recorder {
        answer: String,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl Recorder {
        fn answering(answer: &str) -> Self {
            Self { answer: answer.to_string(), prompts: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl AIProvider for Recorder {
        async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push((system.to_string(), prompt.to_string()));
            Ok(self.answer.clone())
        }

        fn name(&self) -> &str {
            "recorder"
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_extract_parses_json_with_surrounding_text() {
        let drafter = LlmDrafter::new(Recorder::answering(
            "Here you go:\n{\"budget\": \"50k EUR\", \"timeline\": null, \"integrations\": [\"SAP\"]}",
        ));

        let fields = drafter.extract("Budget is 50k EUR, we use SAP").await.unwrap();
        assert_eq!(fields["budget"], "50k EUR");
        assert_eq!(fields["integrations"], "[\"SAP\"]");
        assert!(!fields.contains_key("timeline"));
    }

    #[tokio::test]
    async fn test_extract_tolerates_prose() {
        let drafter = LlmDrafter::new(Recorder::answering("I could not find anything."));
        assert!(drafter.extract("hello").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analysis_prompt_includes_context() {
        let drafter = LlmDrafter::new(Recorder::answering("analysis"));
        drafter
            .analyze("Need IdM for 3000 users", "ACME", &["Past proposal A".to_string()])
            .await
            .unwrap();

        let prompts = drafter.provider().prompts.lock().unwrap();
        let (_, prompt) = &prompts[0];
        assert!(prompt.contains("ACME"));
        assert!(prompt.contains("Past proposal A"));
    }

    #[tokio::test]
    async fn test_draft_prompt_lists_sections() {
        let drafter = LlmDrafter::new(Recorder::answering("{}"));
        drafter.draft("req", "ACME", &BTreeMap::new(), &[Turn::user("hi")], &[]).await.unwrap();

        let prompts = drafter.provider().prompts.lock().unwrap();
        let (system, prompt) = &prompts[0];
        assert!(system.contains("solution_description"));
        assert!(prompt.contains("user: hi"));
        assert!(prompt.contains(NO_CONTEXT));
    }

    #[tokio::test]
    async fn test_question_prompt_uses_recent_turns() {
        let mut state = WorkflowState::initialize("req", "ACME").unwrap();
        for i in 0..8 {
            state.push_turn(Turn::user(format!("message {i}")));
        }

        let drafter = LlmDrafter::new(Recorder::answering("What is the budget?"));
        drafter.next_question(&state).await.unwrap();

        let prompts = drafter.provider().prompts.lock().unwrap();
        let (_, prompt) = &prompts[0];
        assert!(prompt.contains("message 7"));
        assert!(!prompt.contains("message 2"));
    }
}
