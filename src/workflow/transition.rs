//! The transition function of the proposal state machine.

use crate::core::WorkflowConfig;

use super::intent::IntentClassifier;
use super::state::{Step, Turn, WorkflowState};

/// Decide the step that follows the handler that just ran.
///
/// `state` is the state the handler returned. `input_turn` is the last log
/// turn as it was *before* the handler ran, i.e. the turn the step consumed.
pub fn next_step(
    state: &WorkflowState,
    input_turn: Option<&Turn>,
    classifier: &dyn IntentClassifier,
    config: &WorkflowConfig,
) -> Step {
    if exceeded_global_ceiling(state, config).is_some() {
        return Step::End;
    }

    match state.current_step() {
        Step::AnalyzeRequest => Step::GatherInformation,
        Step::GatherInformation => {
            if gather_advances(state, input_turn, classifier, config) {
                Step::GenerateProposal
            } else {
                Step::GatherInformation
            }
        }
        Step::GenerateProposal => Step::CreateDocument,
        Step::CreateDocument => {
            if state.draft_content().is_none() {
                Step::GenerateProposal
            } else {
                Step::HumanFeedback
            }
        }
        Step::HumanFeedback => match (state.resume_step(), user_text(input_turn)) {
            (Some(resume), Some(text)) if classifier.classify(text).advance => resume,
            _ => Step::HumanFeedback,
        },
        Step::End => Step::End,
        Step::Unrecognized => Step::HumanFeedback,
    }
}

/// Whether information gathering should hand over to drafting.
///
/// Requires a fresh user turn; then either the classifier signals advance or
/// the step has been visited `gather_ceiling` times.
pub(crate) fn gather_advances(
    state: &WorkflowState,
    input_turn: Option<&Turn>,
    classifier: &dyn IntentClassifier,
    config: &WorkflowConfig,
) -> bool {
    let Some(text) = user_text(input_turn) else {
        return false;
    };

    state.visits(Step::GatherInformation) >= config.gather_ceiling
        || classifier.classify(text).advance
}

/// The first step whose visit count is above the global ceiling, if any.
pub(crate) fn exceeded_global_ceiling(
    state: &WorkflowState,
    config: &WorkflowConfig,
) -> Option<(Step, u32)> {
    state
        .step_visit_counts()
        .iter()
        .find(|(_, count)| **count > config.global_visit_ceiling)
        .map(|(step, count)| (*step, *count))
}

fn user_text(turn: Option<&Turn>) -> Option<&str> {
    turn.filter(|t| t.is_user()).map(|t| t.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::intent::{Classification, PhraseClassifier};

    struct Never;

    impl IntentClassifier for Never {
        fn classify(&self, _text: &str) -> Classification {
            Classification::default()
        }
    }

    fn state_at(step: Step) -> WorkflowState {
        let mut state = WorkflowState::initialize("We need IdM", "Client X").unwrap();
        state.set_step(step);
        state
    }

    fn config() -> WorkflowConfig {
        WorkflowConfig::default()
    }

    #[test]
    fn test_analyze_always_moves_to_gather() {
        let state = state_at(Step::AnalyzeRequest);
        assert_eq!(next_step(&state, None, &Never, &config()), Step::GatherInformation);
    }

    #[test]
    fn test_gather_waits_without_user_turn() {
        let mut state = state_at(Step::GatherInformation);
        state.set_visits(Step::GatherInformation, 10);
        let turn = Turn::system("What is your budget?");

        let next = next_step(&state, Some(&turn), &PhraseClassifier::default(), &config());
        assert_eq!(next, Step::GatherInformation);
        assert_eq!(next_step(&state, None, &PhraseClassifier::default(), &config()), next);
    }

    #[test]
    fn test_gather_advances_on_canonical_phrase() {
        let mut state = state_at(Step::GatherInformation);
        state.set_visits(Step::GatherInformation, 1);
        let turn = Turn::user("pokračuj");

        let next = next_step(&state, Some(&turn), &PhraseClassifier::default(), &config());
        assert_eq!(next, Step::GenerateProposal);
    }

    #[test]
    fn test_gather_stays_on_plain_answer() {
        let mut state = state_at(Step::GatherInformation);
        state.set_visits(Step::GatherInformation, 2);
        let turn = Turn::user("About 3000 employees.");

        let next = next_step(&state, Some(&turn), &PhraseClassifier::default(), &config());
        assert_eq!(next, Step::GatherInformation);
    }

    #[test]
    fn test_gather_ceiling_forces_progress_regardless_of_classifier() {
        let mut state = state_at(Step::GatherInformation);
        state.set_visits(Step::GatherInformation, config().gather_ceiling);
        let turn = Turn::user("one more detail");

        assert_eq!(next_step(&state, Some(&turn), &Never, &config()), Step::GenerateProposal);
    }

    #[test]
    fn test_generate_moves_to_create() {
        let state = state_at(Step::GenerateProposal);
        assert_eq!(next_step(&state, None, &Never, &config()), Step::CreateDocument);
    }

    #[test]
    fn test_create_without_draft_goes_back_to_generate() {
        let state = state_at(Step::CreateDocument);
        assert_eq!(next_step(&state, None, &Never, &config()), Step::GenerateProposal);
    }

    #[test]
    fn test_create_with_draft_goes_to_feedback() {
        let mut state = state_at(Step::CreateDocument);
        state.set_draft(Default::default());
        assert_eq!(next_step(&state, None, &Never, &config()), Step::HumanFeedback);
    }

    #[test]
    fn test_create_loop_is_cut_by_global_ceiling() {
        let mut state = state_at(Step::CreateDocument);
        state.set_visits(Step::CreateDocument, config().global_visit_ceiling + 1);
        assert_eq!(next_step(&state, None, &Never, &config()), Step::End);
    }

    #[test]
    fn test_global_ceiling_overrides_every_rule() {
        let mut state = state_at(Step::GatherInformation);
        state.set_visits(Step::HumanFeedback, 21);
        let turn = Turn::user("pokračuj");

        let next = next_step(&state, Some(&turn), &PhraseClassifier::default(), &config());
        assert_eq!(next, Step::End);
        assert_eq!(exceeded_global_ceiling(&state, &config()), Some((Step::HumanFeedback, 21)));
    }

    #[test]
    fn test_global_ceiling_is_exclusive() {
        let mut state = state_at(Step::HumanFeedback);
        state.set_visits(Step::HumanFeedback, 20);
        assert_eq!(next_step(&state, None, &Never, &config()), Step::HumanFeedback);
    }

    #[test]
    fn test_feedback_is_quiescent_without_pending_resume() {
        let state = state_at(Step::HumanFeedback);
        let turn = Turn::user("pokračuj");

        let next = next_step(&state, Some(&turn), &PhraseClassifier::default(), &config());
        assert_eq!(next, Step::HumanFeedback);
    }

    #[test]
    fn test_feedback_resumes_failed_step_on_advance() {
        let mut state = state_at(Step::HumanFeedback);
        state.set_resume_step(Some(Step::GenerateProposal));
        let classifier = PhraseClassifier::default();

        let next = next_step(&state, Some(&Turn::user("continue")), &classifier, &config());
        assert_eq!(next, Step::GenerateProposal);

        let next = next_step(&state, Some(&Turn::user("the budget is 50k")), &classifier, &config());
        assert_eq!(next, Step::HumanFeedback);
    }

    #[test]
    fn test_unrecognized_step_falls_back_to_feedback() {
        let state = state_at(Step::Unrecognized);
        assert_eq!(next_step(&state, None, &Never, &config()), Step::HumanFeedback);
    }

    #[test]
    fn test_end_is_absorbing() {
        let state = state_at(Step::End);
        assert_eq!(next_step(&state, None, &Never, &config()), Step::End);
    }
}
