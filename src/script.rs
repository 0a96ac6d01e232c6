//! Declarative scenario scripts.
//!
//! A script is a named list of steps read from YAML, either inline under
//! `scripts:` in the harness config or from standalone files:
//!
//! ```yaml
//! name: loads the next page
//! intercepts:
//!   - alias: getStories
//!     request:
//!       method: [GET]
//!       pathname: { type: glob, pattern: "**/search" }
//!       query:
//!         page: { type: exact, value: "0" }
//! steps:
//!   - action: visit
//!   - action: wait
//!     alias: "@getStories"
//!   - action: assert
//!     selector: .item
//!     count: 20
//! ```

use crate::config::InterceptDefinition;
use crate::dom::Selector;
use crate::error::{HarnessError, HarnessResult};
use crate::session::{Query, Session};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// A named, self-contained scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioScript {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Rules registered before the first step, in order
    #[serde(default)]
    pub intercepts: Vec<InterceptDefinition>,

    pub steps: Vec<Step>,
}

/// A single scripted step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Register an intercept rule mid-scenario
    Intercept { rule: InterceptDefinition },

    Visit {
        #[serde(default = "default_path")]
        path: String,
    },

    /// Wait for the next exchange of an alias and optionally check it
    Wait {
        alias: String,
        /// Query parameters the request must carry
        #[serde(default)]
        query: HashMap<String, String>,
        /// Expected response status; `0` expects a network error
        #[serde(default)]
        status: Option<u16>,
    },

    Clear { selector: String },

    Type { selector: String, text: String },

    Click {
        selector: String,
        #[serde(default)]
        first: bool,
    },

    /// Click the first element whose own text contains `text`
    ClickText { text: String },

    Assert {
        selector: String,
        #[serde(default)]
        first: bool,
        #[serde(default)]
        count: Option<usize>,
        /// Only `true` is accepted; the page never renders hidden elements
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        contains: Option<String>,
        #[serde(default)]
        in_order: Vec<String>,
        #[serde(default)]
        exists: Option<bool>,
    },
}

fn default_path() -> String {
    "/".to_string()
}

impl Step {
    pub fn label(&self) -> String {
        match self {
            Step::Intercept { rule } => format!(
                "intercept {}",
                rule.alias.as_deref().unwrap_or("(unnamed)")
            ),
            Step::Visit { path } => format!("visit {}", path),
            Step::Wait { alias, .. } => format!("wait {}", alias),
            Step::Clear { selector } => format!("clear {}", selector),
            Step::Type { selector, text } => format!("type '{}' into {}", text, selector),
            Step::Click { selector, .. } => format!("click {}", selector),
            Step::ClickText { text } => format!("click '{}'", text),
            Step::Assert { selector, .. } => format!("assert {}", selector),
        }
    }

    fn selector(&self) -> Option<&str> {
        match self {
            Step::Clear { selector }
            | Step::Type { selector, .. }
            | Step::Click { selector, .. }
            | Step::Assert { selector, .. } => Some(selector),
            _ => None,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(selector) = self.selector() {
            Selector::parse(selector)?;
        }
        match self {
            Step::Intercept { rule } => rule.validate()?,
            Step::Wait { alias, .. } if alias.trim_start_matches('@').is_empty() => {
                anyhow::bail!("wait needs an alias")
            }
            Step::ClickText { text } if text.is_empty() => {
                anyhow::bail!("click_text needs non-empty text")
            }
            Step::Assert {
                count,
                visible,
                contains,
                in_order,
                exists,
                ..
            } => {
                if count.is_none()
                    && visible.is_none()
                    && contains.is_none()
                    && in_order.is_empty()
                    && exists.is_none()
                {
                    anyhow::bail!("assert needs at least one expectation");
                }
                if *visible == Some(false) {
                    anyhow::bail!("visible: false is not supported, use exists: false");
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn run(&self, session: &mut Session) -> HarnessResult<()> {
        match self {
            Step::Intercept { rule } => session.intercept(rule.clone()),
            Step::Visit { path } => session.visit(path).await,
            Step::Wait {
                alias,
                query,
                status,
            } => {
                let exchange = session.wait(alias).await?;
                let params = exchange.request.query_params();
                for (name, expected) in query {
                    let actual = params.get(name);
                    if actual != Some(expected) {
                        return Err(HarnessError::AssertionFailed(format!(
                            "expected {} request to carry {}={} but got {:?}",
                            alias, name, expected, actual
                        )));
                    }
                }
                if let Some(expected) = status {
                    let actual = exchange.outcome.status().unwrap_or(0);
                    if actual != *expected {
                        return Err(HarnessError::AssertionFailed(format!(
                            "expected {} to complete with status {} but got {}",
                            alias, expected, actual
                        )));
                    }
                }
                Ok(())
            }
            Step::Clear { selector } => session.get(selector)?.clear().await,
            Step::Type { selector, text } => session.get(selector)?.type_text(text).await,
            Step::Click { selector, first } => {
                let query = session.get(selector)?;
                let query = if *first { query.first() } else { query };
                query.click().await
            }
            Step::ClickText { text } => session.contains(text).click().await,
            Step::Assert {
                selector,
                first,
                count,
                visible,
                contains,
                in_order,
                exists,
            } => {
                let query = session.get(selector)?;
                let query = if *first { query.first() } else { query };
                assert_query(&query, *count, *visible, contains.as_deref(), in_order, *exists)
                    .await
            }
        }
    }
}

async fn assert_query(
    query: &Query<'_>,
    count: Option<usize>,
    visible: Option<bool>,
    contains: Option<&str>,
    in_order: &[String],
    exists: Option<bool>,
) -> HarnessResult<()> {
    match exists {
        Some(false) => query.should_not_exist().await?,
        Some(true) => {
            query.texts().await?;
        }
        None => {}
    }
    if let Some(expected) = count {
        query.should_have_length(expected).await?;
    }
    if visible == Some(true) {
        query.should_be_visible().await?;
    }
    if let Some(text) = contains {
        query.should_contain(text).await?;
    }
    if !in_order.is_empty() {
        let texts: Vec<&str> = in_order.iter().map(String::as_str).collect();
        query.should_contain_in_order(&texts).await?;
    }
    Ok(())
}

impl ScenarioScript {
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let script: Self = serde_yaml::from_str(content)?;
        script.validate()?;
        Ok(script)
    }

    /// Load a file holding a single script or a list of scripts.
    pub fn from_file(path: &Path) -> anyhow::Result<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        let document: serde_yaml::Value = serde_yaml::from_str(&content)?;
        let scripts: Vec<Self> = if document.is_sequence() {
            serde_yaml::from_value(document)?
        } else {
            vec![serde_yaml::from_value(document)?]
        };
        for script in &scripts {
            script
                .validate()
                .map_err(|e| anyhow::anyhow!("{}: script '{}': {}", path.display(), script.name, e))?;
        }
        Ok(scripts)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Script name must not be empty");
        }
        if self.steps.is_empty() {
            anyhow::bail!("Script has no steps");
        }
        for (i, intercept) in self.intercepts.iter().enumerate() {
            intercept
                .validate()
                .map_err(|e| anyhow::anyhow!("Intercept {}: {}", i, e))?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            step.validate()
                .map_err(|e| anyhow::anyhow!("Step {} ({}): {}", i + 1, step.label(), e))?;
        }
        Ok(())
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn run(&self, session: &mut Session) -> HarnessResult<()> {
        for rule in &self.intercepts {
            session.intercept(rule.clone())?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            debug!(script = %self.name, step = i + 1, "{}", step.label());
            step.run(session)
                .await
                .map_err(|e| HarnessError::StepFailed {
                    step: format!("{} ({})", i + 1, step.label()),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}
