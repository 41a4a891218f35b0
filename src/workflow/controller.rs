//! The workflow controller: execution loop, guards and failure recovery.

use std::sync::Arc;

use crate::core::WorkflowConfig;

use super::error::WorkflowError;
use super::handlers::{self, StepContext};
use super::intent::IntentClassifier;
use super::services::{DocumentBuilder, DraftingService, SimilaritySearch};
use super::state::{Step, Turn, WorkflowState};
use super::transition;

/// Message recorded when one `run` call performs too many transitions.
pub const MAX_STEPS_MESSAGE: &str =
    "Maximum steps reached, please provide more input. Say \"continue\" to pick up where we stopped.";

/// Input passed to [`WorkflowController::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// A user message, appended to the log before any handler runs.
    Message(String),
    /// Request to close the conversation.
    Finish,
}

impl From<&str> for UserInput {
    fn from(text: &str) -> Self {
        Self::Message(text.to_string())
    }
}

impl From<String> for UserInput {
    fn from(text: String) -> Self {
        Self::Message(text)
    }
}

/// Drives a [`WorkflowState`] through the proposal workflow.
///
/// The controller holds no per-conversation data; every call receives the
/// state and returns its successor. Callers must not run the same
/// conversation concurrently.
pub struct WorkflowController {
    drafting: Arc<dyn DraftingService>,
    search: Arc<dyn SimilaritySearch>,
    builder: Arc<dyn DocumentBuilder>,
    classifier: Arc<dyn IntentClassifier>,
    config: WorkflowConfig,
}

impl WorkflowController {
    /// Create a controller with default workflow settings.
    pub fn new(
        drafting: Arc<dyn DraftingService>,
        search: Arc<dyn SimilaritySearch>,
        builder: Arc<dyn DocumentBuilder>,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Self {
        Self { drafting, search, builder, classifier, config: WorkflowConfig::default() }
    }

    /// Replace the workflow settings.
    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Start a new conversation.
    pub fn initialize(
        &self,
        client_request: impl Into<String>,
        client_name: impl Into<String>,
    ) -> Result<WorkflowState, WorkflowError> {
        let state = WorkflowState::initialize(client_request, client_name)?;
        tracing::info!(conversation = %state.conversation_id(), "Conversation started");
        Ok(state)
    }

    /// Advance the conversation as far as it can go without new input.
    ///
    /// Never fails: collaborator errors and guard trips are recorded in the
    /// log and leave the state in [`Step::HumanFeedback`] or [`Step::End`].
    pub async fn run(&self, state: WorkflowState, input: Option<UserInput>) -> WorkflowState {
        let mut state = state;

        if state.is_finished() {
            tracing::debug!(conversation = %state.conversation_id(), "Conversation already ended");
            return state;
        }

        match input {
            Some(UserInput::Finish) => {
                state.push_system("Thank you, the conversation is closed.");
                state.set_step(Step::End);
                tracing::info!(conversation = %state.conversation_id(), "Conversation finished by user");
                return state;
            }
            Some(UserInput::Message(text)) => state.push_turn(Turn::user(text)),
            None => {}
        }

        let ctx = StepContext {
            drafting: self.drafting.as_ref(),
            search: self.search.as_ref(),
            builder: self.builder.as_ref(),
            classifier: self.classifier.as_ref(),
            config: &self.config,
        };

        let mut transitions = 0;
        loop {
            let step = state.current_step();
            if step.is_terminal() {
                return state;
            }

            let input_turn = state.last_turn().cloned();
            let mut working = state.clone();
            if step != Step::Unrecognized {
                let count = working.record_visit(step);
                tracing::debug!(step = %step, count, "Executing step");
            }

            state = match self.execute(&ctx, step, &working).await {
                Ok(next) => next,
                Err(err) => return recover(working, step, &err),
            };

            let next = transition::next_step(&state, input_turn.as_ref(), ctx.classifier, &self.config);

            if next == step {
                tracing::debug!(step = %step, "Waiting for input");
                return state;
            }

            if next == Step::End {
                return self.force_end(state);
            }

            // Moving into HumanFeedback pauses the run anyway.
            transitions += 1;
            if transitions > self.config.max_transitions_per_run && next != Step::HumanFeedback {
                tracing::warn!(step = %step, transitions, pending = %next, "Transition ceiling reached");
                state.push_system(MAX_STEPS_MESSAGE);
                state.set_resume_step(Some(next));
                state.set_step(Step::HumanFeedback);
                return state;
            }

            if state.resume_step() == Some(next) {
                tracing::info!(step = %next, "Resuming interrupted step");
                state.set_resume_step(None);
            }

            tracing::debug!(from = %step, to = %next, "Transition");
            state.set_step(next);
        }
    }

    async fn execute(
        &self,
        ctx: &StepContext<'_>,
        step: Step,
        state: &WorkflowState,
    ) -> Result<WorkflowState, WorkflowError> {
        let Some(limit) = self.config.step_timeout() else {
            return handlers::execute(ctx, step, state).await;
        };

        match tokio::time::timeout(limit, handlers::execute(ctx, step, state)).await {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::StepTimedOut { step, after: limit }),
        }
    }

    fn force_end(&self, mut state: WorkflowState) -> WorkflowState {
        let (step, count) = transition::exceeded_global_ceiling(&state, &self.config)
            .unwrap_or((state.current_step(), self.config.global_visit_ceiling));

        tracing::warn!(step = %step, count, "Visit ceiling exceeded, ending conversation");
        state.push_system(format!(
            "The {step} step ran {count} times without reaching a result, so I am closing \
             this conversation. Please start a new one with the information collected so far."
        ));
        state.set_step(Step::End);
        state
    }
}

/// Record a handler failure and pause for the user.
fn recover(mut state: WorkflowState, step: Step, err: &WorkflowError) -> WorkflowState {
    tracing::warn!(step = %step, error = %err, "Step failed, waiting for user");

    state.push_system(err.user_message());
    state.set_resume_step((step != Step::Unrecognized).then_some(step));
    state.set_step(Step::HumanFeedback);
    state
}
