//! Workflow error types.

use std::time::Duration;

use super::state::Step;

/// Errors raised inside the workflow.
///
/// Only [`WorkflowError::MissingInput`] ever reaches the caller; every other
/// variant is caught at the handler boundary and turned into a system turn.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("missing required input: {field}")]
    MissingInput { field: &'static str },

    #[error("{service} failed during {step}: {source:#}")]
    Service {
        step: Step,
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("step {step} did not finish within {after:?}")]
    StepTimedOut { step: Step, after: Duration },

    #[error("state names an unrecognized step")]
    UnrecognizedStep,
}

impl WorkflowError {
    /// Wrap a collaborator failure.
    pub fn service(step: Step, service: &'static str, source: anyhow::Error) -> Self {
        Self::Service { step, service, source }
    }

    /// Explanation written into the conversation log.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingInput { field } => format!("The {field} is required to start."),
            Self::Service { step, service, source } => format!(
                "The {service} failed while processing the {} step ({source}). \
                 Say \"continue\" to try again.",
                step_label(*step)
            ),
            Self::StepTimedOut { step, after } => format!(
                "The {} step was cancelled after {}s without an answer. \
                 Say \"continue\" to try again.",
                step_label(*step),
                after.as_secs()
            ),
            Self::UnrecognizedStep => "The conversation was in an unknown step and cannot \
                 continue. Please start a new conversation."
                .to_string(),
        }
    }
}

fn step_label(step: Step) -> &'static str {
    match step {
        Step::AnalyzeRequest => "request analysis",
        Step::GatherInformation => "information gathering",
        Step::GenerateProposal => "proposal drafting",
        Step::CreateDocument => "document creation",
        Step::HumanFeedback => "feedback",
        Step::End => "closing",
        Step::Unrecognized => "unknown",
    }
}
