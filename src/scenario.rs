//! Scenario definitions and the serialized runner.

use crate::backend::{Backend, SyntheticBackend};
use crate::config::HarnessConfig;
use crate::error::HarnessResult;
use crate::fixtures::Fixtures;
use crate::script::ScenarioScript;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

pub type ScenarioFuture<'a> = Pin<Box<dyn Future<Output = HarnessResult<()>> + Send + 'a>>;

/// A scenario step function: setup hook or scenario body.
pub type ScenarioFn = for<'a> fn(&'a mut Session) -> ScenarioFuture<'a>;

/// What a scenario executes after its hooks.
#[derive(Clone)]
pub enum ScenarioBody {
    Native(ScenarioFn),
    Script(ScenarioScript),
}

/// One independent scenario with its inherited setup hooks.
#[derive(Clone)]
pub struct Scenario {
    /// Enclosing group names, outermost first
    pub path: Vec<String>,
    pub name: String,
    /// Setup hooks, outermost first
    pub hooks: Vec<ScenarioFn>,
    pub body: ScenarioBody,
}

impl Scenario {
    pub fn from_script(script: ScenarioScript) -> Self {
        Self {
            path: vec!["Scripts".to_string()],
            name: script.name.clone(),
            hooks: Vec::new(),
            body: ScenarioBody::Script(script),
        }
    }

    pub fn full_name(&self) -> String {
        let mut parts = self.path.clone();
        parts.push(self.name.clone());
        parts.join(" > ")
    }
}

enum Item {
    Scenario(String, ScenarioFn),
    Group(Group),
}

/// A named group of scenarios sharing setup hooks.
///
/// Hooks apply to every scenario in the group, nested groups included,
/// regardless of declaration order.
pub struct Group {
    name: String,
    hooks: Vec<ScenarioFn>,
    items: Vec<Item>,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hooks: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn before_each(mut self, hook: ScenarioFn) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn scenario(mut self, name: &str, body: ScenarioFn) -> Self {
        self.items.push(Item::Scenario(name.to_string(), body));
        self
    }

    pub fn group(mut self, name: &str, build: impl FnOnce(Group) -> Group) -> Self {
        self.items.push(Item::Group(build(Group::new(name))));
        self
    }

    /// Flatten into scenarios with their full hook chains.
    pub fn build(self) -> Vec<Scenario> {
        let mut out = Vec::new();
        self.flatten(&[], &[], &mut out);
        out
    }

    fn flatten(self, path: &[String], hooks: &[ScenarioFn], out: &mut Vec<Scenario>) {
        let mut path = path.to_vec();
        if !self.name.is_empty() {
            path.push(self.name);
        }
        let mut hooks = hooks.to_vec();
        hooks.extend(self.hooks);

        for item in self.items {
            match item {
                Item::Scenario(name, body) => out.push(Scenario {
                    path: path.clone(),
                    name,
                    hooks: hooks.clone(),
                    body: ScenarioBody::Native(body),
                }),
                Item::Group(group) => group.flatten(&path, &hooks, out),
            }
        }
    }
}

/// Result of running a single scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    /// Requests the page sent during the scenario
    pub requests: usize,
    pub error: Option<String>,
}

/// Result of running a list of scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Runs scenarios one at a time, each in a fresh [`Session`].
pub struct ScenarioRunner {
    config: Arc<HarnessConfig>,
    backend: Arc<dyn Backend>,
    fixtures: Arc<Fixtures>,
}

impl ScenarioRunner {
    /// Runner backed by the synthetic backend and the configured fixtures.
    pub fn new(config: HarnessConfig) -> HarnessResult<Self> {
        let fixtures = Fixtures::load(config.fixtures_dir.as_deref())?;
        let backend = Arc::new(SyntheticBackend::new(config.backend.clone()));
        Ok(Self {
            config: Arc::new(config),
            backend,
            fixtures: Arc::new(fixtures),
        })
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// A fresh session sharing only configuration, backend and fixtures.
    pub fn session(&self) -> HarnessResult<Session> {
        Session::new(
            self.config.clone(),
            self.backend.clone(),
            self.fixtures.clone(),
        )
    }

    async fn execute(&self, scenario: &Scenario, session: &mut Session) -> HarnessResult<()> {
        for hook in &scenario.hooks {
            hook(session).await?;
        }
        match &scenario.body {
            ScenarioBody::Native(body) => body(session).await,
            ScenarioBody::Script(script) => script.run(session).await,
        }
    }

    /// Run a single scenario.
    pub async fn run(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        let name = scenario.full_name();
        debug!(scenario = %name, "Running scenario");

        let (outcome, requests) = match self.session() {
            Ok(mut session) => {
                let outcome = self.execute(scenario, &mut session).await;
                (outcome, session.network().total_requests() as usize)
            }
            Err(e) => (Err(e), 0),
        };

        ScenarioResult {
            name,
            success: outcome.is_ok(),
            duration_ms: start.elapsed().as_millis() as u64,
            requests,
            error: outcome.err().map(|e| e.to_string()),
        }
    }

    /// Run scenarios in order; a failure never stops the rest.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteReport {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run(scenario).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scenario results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        SuiteReport {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }
}
