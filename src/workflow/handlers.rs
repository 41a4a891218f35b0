//! One handler per workflow step.
//!
//! A handler reads the state it is given and returns a complete replacement.
//! Collaborator failures come back as [`WorkflowError`]; the controller turns
//! them into a recoverable pause.

use crate::core::{retry_async, RetryConfig, WorkflowConfig};

use super::draft::{self, ProposalDraft};
use super::error::WorkflowError;
use super::intent::{normalize, IntentClassifier};
use super::services::{DocumentBuilder, DraftingService, SimilaritySearch};
use super::state::{Step, WorkflowState};
use super::transition;

/// Turns of history handed to the drafting service.
const DRAFT_HISTORY_TURNS: usize = 10;

/// Collaborators and settings available to every handler.
pub(crate) struct StepContext<'a> {
    pub drafting: &'a dyn DraftingService,
    pub search: &'a dyn SimilaritySearch,
    pub builder: &'a dyn DocumentBuilder,
    pub classifier: &'a dyn IntentClassifier,
    pub config: &'a WorkflowConfig,
}

/// Run the handler for `step`.
pub(crate) async fn execute(
    ctx: &StepContext<'_>,
    step: Step,
    state: &WorkflowState,
) -> Result<WorkflowState, WorkflowError> {
    match step {
        Step::AnalyzeRequest => analyze_request(ctx, state).await,
        Step::GatherInformation => gather_information(ctx, state).await,
        Step::GenerateProposal => generate_proposal(ctx, state).await,
        Step::CreateDocument => create_document(ctx, state).await,
        Step::HumanFeedback | Step::End => Ok(state.clone()),
        Step::Unrecognized => Err(WorkflowError::UnrecognizedStep),
    }
}

async fn analyze_request(
    ctx: &StepContext<'_>,
    state: &WorkflowState,
) -> Result<WorkflowState, WorkflowError> {
    let step = Step::AnalyzeRequest;

    let context = ctx
        .search
        .search(state.client_request(), ctx.config.analysis_context_k)
        .await
        .map_err(|e| WorkflowError::service(step, "similarity search", e))?;
    tracing::debug!(documents = context.len(), "Retrieved analysis context");

    let analysis = ctx
        .drafting
        .analyze(state.client_request(), state.client_name(), &context)
        .await
        .map_err(|e| WorkflowError::service(step, "drafting service", e))?;

    let mut next = state.clone();
    next.push_system(analysis);
    Ok(next)
}

async fn gather_information(
    ctx: &StepContext<'_>,
    state: &WorkflowState,
) -> Result<WorkflowState, WorkflowError> {
    let step = Step::GatherInformation;

    let Some(reply) = state.last_turn().filter(|t| t.is_user()).map(|t| t.content.clone()) else {
        // Nothing new from the user; wait.
        return Ok(state.clone());
    };

    let classification = ctx.classifier.classify(&reply);
    let mut next = state.clone();
    next.merge_fields(classification.extracted_fields);

    // An explicit request to proceed carries no answers worth extracting.
    if !classification.advance {
        let extracted = ctx
            .drafting
            .extract(&reply)
            .await
            .map_err(|e| WorkflowError::service(step, "drafting service", e))?;
        tracing::debug!(fields = extracted.len(), "Extracted fields from reply");
        next.merge_fields(extracted);
    }

    if transition::gather_advances(state, state.last_turn(), ctx.classifier, ctx.config) {
        next.push_system(format!(
            "Thank you, I have enough information to draft the proposal for {}. \
             Moving on to drafting.",
            state.client_name()
        ));
        return Ok(next);
    }

    let mut question = ctx
        .drafting
        .next_question(&next)
        .await
        .map_err(|e| WorkflowError::service(step, "drafting service", e))?;

    if next.visits(step) >= ctx.config.hint_after && !mentions_advance(&question, ctx.config) {
        question.push_str(&format!(
            "\n\nIf you have shared everything, say \"pokračuj\" (continue) or send {} \
             and I will draft the proposal from what we have.",
            ctx.config.command_token
        ));
    }

    next.push_system(question);
    Ok(next)
}

fn mentions_advance(question: &str, config: &WorkflowConfig) -> bool {
    let normalized = normalize(question);
    normalized.split(' ').any(|w| w == "pokracuj" || w == "continue")
        || question.to_lowercase().contains(&config.command_token.to_lowercase())
}

async fn generate_proposal(
    ctx: &StepContext<'_>,
    state: &WorkflowState,
) -> Result<WorkflowState, WorkflowError> {
    let step = Step::GenerateProposal;

    let context = ctx
        .search
        .search(state.client_request(), ctx.config.draft_context_k)
        .await
        .map_err(|e| WorkflowError::service(step, "similarity search", e))?;

    let log = state.conversation_log();
    let recent = &log[log.len().saturating_sub(DRAFT_HISTORY_TURNS)..];

    let raw = ctx
        .drafting
        .draft(state.client_request(), state.client_name(), state.collected_fields(), recent, &context)
        .await
        .map_err(|e| WorkflowError::service(step, "drafting service", e))?;

    let draft = ProposalDraft::parse(&raw, state.client_name());

    let mut next = state.clone();
    if draft.is_degraded() {
        tracing::warn!(missing = ?draft.missing_sections(), "Proposal draft is incomplete");
        next.push_system(format!(
            "I drafted the proposal for {}, but some sections could not be generated \
             and are marked as missing: {}.",
            state.client_name(),
            draft.missing_sections().join(", ")
        ));
    } else {
        next.push_system(format!(
            "The proposal draft for {} is ready. Creating the document now.",
            state.client_name()
        ));
    }
    next.set_draft(draft.into_content());
    Ok(next)
}

async fn create_document(
    ctx: &StepContext<'_>,
    state: &WorkflowState,
) -> Result<WorkflowState, WorkflowError> {
    let mut next = state.clone();

    let Some(content) = state.draft_content() else {
        tracing::warn!("No draft available; drafting first");
        next.push_system("There is no proposal draft yet, so I will draft it first.");
        return Ok(next);
    };

    let sections = draft::to_sections(content);
    let retry = RetryConfig { max_retries: ctx.config.document_build_retries, ..Default::default() };

    let outcome = retry_async(&retry, |attempt| {
        let sections = &sections;
        async move {
            tracing::debug!(attempt, "Building proposal document");
            let reference = ctx.builder.build(sections).await?;
            if ctx.builder.exists(&reference).await {
                Ok(reference)
            } else {
                Err(anyhow::anyhow!("document {reference} was reported as built but cannot be found"))
            }
        }
    })
    .await;

    let attempts = outcome.attempts;
    let elapsed_ms = outcome.total_time.as_millis();
    match outcome.into_result() {
        Ok(reference) => {
            tracing::info!(document = %reference, attempts, elapsed_ms, "Proposal document created");
            next.push_system(format!(
                "The proposal document has been created: {reference}\n\
                 Let me know if you would like any changes."
            ));
            next.set_document_reference(reference);
        }
        Err(e) => {
            tracing::error!(error = %e, attempts, elapsed_ms, "Proposal document could not be created");
            next.push_system(format!(
                "I could not create the proposal document after {attempts} attempt(s): {e:#}. \
                 Say \"continue\" to try again."
            ));
            next.set_resume_step(Some(Step::CreateDocument));
        }
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::workflow::intent::PhraseClassifier;
    use crate::workflow::services::{DocumentRef, Sections};
    use crate::workflow::state::Turn;

    struct Drafter {
        draft: String,
    }

    #[async_trait]
    impl DraftingService for Drafter {
        async fn analyze(&self, _: &str, _: &str, context: &[String]) -> anyhow::Result<String> {
            Ok(format!("analysis with {} documents", context.len()))
        }

        async fn extract(&self, text: &str) -> anyhow::Result<BTreeMap<String, String>> {
            Ok(BTreeMap::from([("last_reply".to_string(), text.to_string())]))
        }

        async fn next_question(&self, _: &WorkflowState) -> anyhow::Result<String> {
            Ok("What is the budget?".to_string())
        }

        async fn draft(
            &self,
            _: &str,
            _: &str,
            _: &BTreeMap<String, String>,
            _: &[Turn],
            _: &[String],
        ) -> anyhow::Result<String> {
            Ok(self.draft.clone())
        }
    }

    struct Corpus;

    #[async_trait]
    impl SimilaritySearch for Corpus {
        async fn search(&self, _: &str, k: usize) -> anyhow::Result<Vec<String>> {
            Ok((0..k).map(|i| format!("doc {i}")).collect())
        }
    }

    struct Builder {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl DocumentBuilder for Builder {
        async fn build(&self, _: &Sections) -> anyhow::Result<DocumentRef> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("disk full");
            }
            Ok(DocumentRef::new("proposal.md"))
        }

        async fn exists(&self, _: &DocumentRef) -> bool {
            true
        }
    }

    struct Fixture {
        drafter: Drafter,
        builder: Builder,
        classifier: PhraseClassifier,
        config: WorkflowConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                drafter: Drafter { draft: r#"{"introduction": "Hello"}"#.to_string() },
                builder: Builder { calls: AtomicU32::new(0), fail: false },
                classifier: PhraseClassifier::default(),
                config: WorkflowConfig::default(),
            }
        }

        fn ctx(&self) -> StepContext<'_> {
            StepContext {
                drafting: &self.drafter,
                search: &Corpus,
                builder: &self.builder,
                classifier: &self.classifier,
                config: &self.config,
            }
        }
    }

    fn state() -> WorkflowState {
        WorkflowState::initialize("We need IdM", "Client X").unwrap()
    }

    #[tokio::test]
    async fn test_analyze_appends_one_system_turn() {
        let fx = Fixture::new();
        let next = execute(&fx.ctx(), Step::AnalyzeRequest, &state()).await.unwrap();

        assert_eq!(next.conversation_log().len(), 1);
        assert_eq!(next.conversation_log()[0].content, "analysis with 3 documents");
    }

    #[tokio::test]
    async fn test_gather_without_user_turn_is_a_no_op() {
        let fx = Fixture::new();
        let mut input = state();
        input.push_system("analysis");

        let next = execute(&fx.ctx(), Step::GatherInformation, &input).await.unwrap();
        assert_eq!(next, input);
    }

    #[tokio::test]
    async fn test_gather_extracts_and_asks() {
        let fx = Fixture::new();
        let mut input = state();
        input.push_turn(Turn::user("Budget: 10k"));

        let next = execute(&fx.ctx(), Step::GatherInformation, &input).await.unwrap();
        assert_eq!(next.collected_fields()["budget"], "10k");
        assert_eq!(next.collected_fields()["last_reply"], "Budget: 10k");
        assert_eq!(next.last_turn().unwrap().content, "What is the budget?");
    }

    #[tokio::test]
    async fn test_gather_adds_hint_after_threshold() {
        let fx = Fixture::new();
        let mut input = state();
        input.set_visits(Step::GatherInformation, 3);
        input.push_turn(Turn::user("We use SAP."));

        let next = execute(&fx.ctx(), Step::GatherInformation, &input).await.unwrap();
        let question = &next.last_turn().unwrap().content;
        assert!(question.starts_with("What is the budget?"));
        assert!(question.contains("/generate"));
    }

    #[tokio::test]
    async fn test_gather_acknowledges_advance() {
        let fx = Fixture::new();
        let mut input = state();
        input.push_turn(Turn::user("vytvoř nabídku"));

        let next = execute(&fx.ctx(), Step::GatherInformation, &input).await.unwrap();
        assert!(next.last_turn().unwrap().content.contains("enough information"));
        assert!(!next.collected_fields().contains_key("last_reply"));
    }

    #[tokio::test]
    async fn test_gather_ceiling_keeps_final_answer() {
        let fx = Fixture::new();
        let mut input = state();
        input.set_visits(Step::GatherInformation, fx.config.gather_ceiling);
        input.push_turn(Turn::user("budget is 50k"));

        let next = execute(&fx.ctx(), Step::GatherInformation, &input).await.unwrap();
        assert_eq!(next.collected_fields()["last_reply"], "budget is 50k");
        assert!(next.last_turn().unwrap().content.contains("enough information"));
    }

    #[tokio::test]
    async fn test_generate_sets_draft_and_reports_missing_sections() {
        let fx = Fixture::new();
        let next = execute(&fx.ctx(), Step::GenerateProposal, &state()).await.unwrap();

        let draft = next.draft_content().unwrap();
        assert_eq!(draft["introduction"], "Hello");
        assert_eq!(draft["client_name"], "Client X");
        assert!(next.last_turn().unwrap().content.contains("pricing"));
    }

    #[tokio::test]
    async fn test_create_without_draft_leaves_draft_unset() {
        let fx = Fixture::new();
        let next = execute(&fx.ctx(), Step::CreateDocument, &state()).await.unwrap();

        assert!(next.draft_content().is_none());
        assert_eq!(fx.builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_records_reference() {
        let fx = Fixture::new();
        let mut input = state();
        input.set_draft(ProposalDraft::parse("{}", "Client X").into_content());

        let next = execute(&fx.ctx(), Step::CreateDocument, &input).await.unwrap();
        assert_eq!(next.document_reference().map(DocumentRef::as_str), Some("proposal.md"));
    }

    #[tokio::test]
    async fn test_create_failure_is_recorded_not_raised() {
        let mut fx = Fixture::new();
        fx.builder.fail = true;
        fx.config.document_build_retries = 1;
        let mut input = state();
        input.set_draft(ProposalDraft::parse("{}", "Client X").into_content());

        let next = execute(&fx.ctx(), Step::CreateDocument, &input).await.unwrap();
        assert!(next.document_reference().is_none());
        assert!(next.last_turn().unwrap().content.contains("disk full"));
        assert_eq!(next.resume_step(), Some(Step::CreateDocument));
        assert_eq!(fx.builder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unrecognized_step_is_an_error() {
        let fx = Fixture::new();
        let err = execute(&fx.ctx(), Step::Unrecognized, &state()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UnrecognizedStep));
    }
}
