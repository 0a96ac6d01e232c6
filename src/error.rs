//! Error types for the scenario harness.

use thiserror::Error;

/// Errors that end a scenario.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Fixture not found: {0}")]
    UnknownFixture(String),

    #[error("No intercept rule declares the alias '@{0}'")]
    UnknownAlias(String),

    #[error("Timed out after {timeout_ms} ms waiting for '@{alias}'. No request ever occurred")]
    WaitTimeout { alias: String, timeout_ms: u64 },

    #[error("Timed out after {timeout_ms} ms retrying: expected to find element '{selector}', but never found it")]
    ElementNotFound { selector: String, timeout_ms: u64 },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("No page loaded. Call visit() before interacting with the page")]
    NotNavigated,

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
