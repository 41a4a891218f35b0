//! Proposal workflow controller.
//!
//! A conversation moves through a small state machine:
//!
//! - `analyze_request` - gap analysis of the client request
//! - `gather_information` - clarifying questions until the user asks to proceed
//! - `generate_proposal` - structured draft of the proposal sections
//! - `create_document` - persisting the draft
//! - `human_feedback` - pause awaiting the user
//! - `end` - terminal
//!
//! [`WorkflowController::run`] executes handlers and transitions until the
//! conversation needs new input. Visit and transition ceilings guarantee that
//! every call returns and every conversation eventually ends.

mod controller;
mod draft;
mod error;
mod handlers;
mod intent;
mod services;
mod session;
mod state;
mod transition;

pub use controller::{UserInput, WorkflowController, MAX_STEPS_MESSAGE};
pub use draft::{json_object, placeholder, to_sections, ProposalDraft, SECTION_NAMES};
pub use error::WorkflowError;
pub use intent::{
    extract_field_lines, normalize, Classification, IntentClassifier, IntentTrigger,
    PhraseClassifier,
};
pub use services::{DocumentBuilder, DocumentRef, DraftingService, Sections, SimilaritySearch};
pub use session::{SessionStore, SessionSummary};
pub use state::{DraftContent, Role, Step, Turn, WorkflowState};
pub use transition::next_step;
