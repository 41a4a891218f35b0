//! Conversation state owned by the workflow controller.
//!
//! A [`WorkflowState`] is a plain value: the caller passes it into
//! [`WorkflowController::run`](super::WorkflowController::run), receives a
//! new one back, and is responsible for keeping it between calls.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::WorkflowError;
use super::services::DocumentRef;

/// A step of the proposal workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Step {
    /// Gap analysis of the original client request.
    AnalyzeRequest,
    /// Clarifying questions until the user asks to proceed.
    GatherInformation,
    /// Drafting of the structured proposal content.
    GenerateProposal,
    /// Persisting the draft as a document.
    CreateDocument,
    /// Quiescent point awaiting new user input.
    HumanFeedback,
    /// Terminal state.
    End,
    /// A persisted step name this build does not know.
    Unrecognized,
}

impl Step {
    /// The step a fresh conversation starts in.
    pub const INITIAL: Self = Self::AnalyzeRequest;

    /// Stable identifier used in persisted state and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzeRequest => "analyze_request",
            Self::GatherInformation => "gather_information",
            Self::GenerateProposal => "generate_proposal",
            Self::CreateDocument => "create_document",
            Self::HumanFeedback => "human_feedback",
            Self::End => "end",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Whether this is the terminal step.
    pub fn is_terminal(self) -> bool {
        self == Self::End
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Step {
    fn from(value: String) -> Self {
        match value.as_str() {
            "analyze_request" => Self::AnalyzeRequest,
            "gather_information" => Self::GatherInformation,
            "generate_proposal" => Self::GenerateProposal,
            "create_document" => Self::CreateDocument,
            "human_feedback" => Self::HumanFeedback,
            "end" => Self::End,
            _ => Self::Unrecognized,
        }
    }
}

impl From<Step> for String {
    fn from(step: Step) -> Self {
        step.as_str().to_string()
    }
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
}

/// One logged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Structured proposal payload as produced by drafting, keyed by section name.
pub type DraftContent = BTreeMap<String, serde_json::Value>;

/// Full state of one proposal conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    conversation_id: String,
    client_request: String,
    client_name: String,
    current_step: Step,
    conversation_log: Vec<Turn>,
    collected_fields: BTreeMap<String, String>,
    step_visit_counts: BTreeMap<Step, u32>,
    draft_content: Option<DraftContent>,
    document_reference: Option<DocumentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resume_step: Option<Step>,
}

impl WorkflowState {
    /// Start a new conversation for a client request.
    ///
    /// Both inputs are required; a blank value is the one hard failure the
    /// workflow reports to its caller.
    pub fn initialize(
        client_request: impl Into<String>,
        client_name: impl Into<String>,
    ) -> Result<Self, WorkflowError> {
        let client_request = client_request.into();
        let client_name = client_name.into();

        if client_request.trim().is_empty() {
            return Err(WorkflowError::MissingInput { field: "client request" });
        }
        if client_name.trim().is_empty() {
            return Err(WorkflowError::MissingInput { field: "client name" });
        }

        Ok(Self {
            conversation_id: uuid::Uuid::new_v4().to_string(),
            client_request: client_request.trim().to_string(),
            client_name: client_name.trim().to_string(),
            current_step: Step::INITIAL,
            conversation_log: Vec::new(),
            collected_fields: BTreeMap::new(),
            step_visit_counts: BTreeMap::new(),
            draft_content: None,
            document_reference: None,
            resume_step: None,
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn client_request(&self) -> &str {
        &self.client_request
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    pub fn conversation_log(&self) -> &[Turn] {
        &self.conversation_log
    }

    /// The most recent turn, if any.
    pub fn last_turn(&self) -> Option<&Turn> {
        self.conversation_log.last()
    }

    pub fn collected_fields(&self) -> &BTreeMap<String, String> {
        &self.collected_fields
    }

    pub fn step_visit_counts(&self) -> &BTreeMap<Step, u32> {
        &self.step_visit_counts
    }

    /// How many times the handler for `step` has executed.
    pub fn visits(&self, step: Step) -> u32 {
        self.step_visit_counts.get(&step).copied().unwrap_or(0)
    }

    pub fn draft_content(&self) -> Option<&DraftContent> {
        self.draft_content.as_ref()
    }

    pub fn document_reference(&self) -> Option<&DocumentRef> {
        self.document_reference.as_ref()
    }

    /// Step interrupted by a failure, waiting to be resumed.
    pub fn resume_step(&self) -> Option<Step> {
        self.resume_step
    }

    /// Whether the conversation has reached the terminal step.
    pub fn is_finished(&self) -> bool {
        self.current_step.is_terminal()
    }

    /// Turns appended after the first `since` turns.
    pub fn turns_since(&self, since: usize) -> &[Turn] {
        self.conversation_log.get(since..).unwrap_or_default()
    }

    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.conversation_log.push(turn);
    }

    pub(crate) fn push_system(&mut self, content: impl Into<String>) {
        self.push_turn(Turn::system(content));
    }

    pub(crate) fn set_step(&mut self, step: Step) {
        self.current_step = step;
    }

    pub(crate) fn record_visit(&mut self, step: Step) -> u32 {
        let count = self.step_visit_counts.entry(step).or_insert(0);
        *count += 1;
        *count
    }

    /// Merge extracted fields; later writes for a key replace earlier ones.
    pub(crate) fn merge_fields(&mut self, fields: BTreeMap<String, String>) {
        self.collected_fields.extend(fields);
    }

    pub(crate) fn set_draft(&mut self, draft: DraftContent) {
        self.draft_content = Some(draft);
    }

    pub(crate) fn set_document_reference(&mut self, reference: DocumentRef) {
        self.document_reference = Some(reference);
    }

    pub(crate) fn set_resume_step(&mut self, step: Option<Step>) {
        self.resume_step = step;
    }

    /// Overwrite the visit counter directly. Test fixtures only.
    #[cfg(test)]
    pub(crate) fn set_visits(&mut self, step: Step, count: u32) {
        self.step_visit_counts.insert(step, count);
    }
}
