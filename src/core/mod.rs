//! Core infrastructure shared by the workflow and its adapters.
//!
//! Configuration loading and bounded retry.

mod config;
mod retry;

pub use config::{AiConfig, Config, OllamaConfig, OutputConfig, SearchConfig, WorkflowConfig};
pub use retry::{retry_async, RetryConfig, RetryResult};
