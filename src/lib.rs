//! # BidMaster
//!
//! Guided conversational workflow that turns a client request into a
//! structured business proposal.
//!
//! A conversation moves through request analysis, clarifying questions,
//! drafting and document creation. The [`workflow::WorkflowController`]
//! decides what happens next from the user's free-form replies, and its
//! ceilings make sure every conversation terminates.
//!
//! ## Features
//!
//! - **Intent detection**: accent-insensitive phrase matching plus a strict command token
//! - **Loop guards**: per-step visit ceilings and a per-call transition ceiling
//! - **Failure recovery**: collaborator failures pause the conversation instead of aborting it
//! - **AI drafting**: Claude, OpenAI or a local Ollama model (optional)
//! - **Context retrieval**: keyword search over past proposals
//!
//! ## Quick Start
//!
//! ```bash
//! # Start a conversation from a request file
//! bidmaster new --request request.txt --client "ACME s.r.o."
//!
//! # Continue it later
//! bidmaster resume <id>
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::format_push_string)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::significant_drop_tightening)]

pub mod core;
pub mod document;
pub mod search;
pub mod workflow;

#[cfg(feature = "ai")]
pub mod ai;

#[cfg(feature = "ai")]
pub use ai::{AIProvider, LlmDrafter, ProviderChain};

// Re-export commonly used types
pub use crate::core::{Config, WorkflowConfig};
pub use document::MarkdownDocumentBuilder;
pub use search::KeywordIndex;
pub use workflow::{
    PhraseClassifier, SessionStore, Step, UserInput, WorkflowController, WorkflowError,
    WorkflowState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "bidmaster";
