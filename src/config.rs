//! Configuration for the scenario harness.
//!
//! Defines the page and API locations, timeouts, the synthetic backend,
//! intercept rules, and declarative scenario scripts.

use crate::script::ScenarioScript;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration for the harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Where the page under test is served
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base of the search API the page calls (`<api_base>/search`)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Behavior of the page model
    #[serde(default)]
    pub app: AppSettings,

    /// Wait and retry timeouts
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Synthetic backend used for passthrough requests
    #[serde(default)]
    pub backend: BackendSettings,

    /// Directory of additional `*.json` fixtures
    #[serde(default)]
    pub fixtures_dir: Option<PathBuf>,

    /// Intercept rules installed in every session before scenario setup
    #[serde(default)]
    pub intercepts: Vec<InterceptDefinition>,

    /// Declarative scenarios
    #[serde(default)]
    pub scripts: Vec<ScenarioScript>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_base: default_api_base(),
            app: AppSettings::default(),
            timeouts: TimeoutSettings::default(),
            backend: BackendSettings::default(),
            fixtures_dir: None,
            intercepts: Vec::new(),
            scripts: Vec::new(),
            settings: GlobalSettings::default(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_api_base() -> String {
    "https://hn.algolia.com/api/v1".to_string()
}

impl HarnessConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!("base_url must be an http(s) URL: {}", self.base_url);
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            anyhow::bail!("api_base must be an http(s) URL: {}", self.api_base);
        }
        if self.backend.hits_per_page == 0 {
            anyhow::bail!("backend.hits_per_page must be at least 1");
        }
        if self.app.max_last_searches == 0 {
            anyhow::bail!("app.max_last_searches must be at least 1");
        }
        for (i, intercept) in self.intercepts.iter().enumerate() {
            intercept
                .validate()
                .map_err(|e| anyhow::anyhow!("Intercept {}: {}", i, e))?;
        }
        for script in &self.scripts {
            script
                .validate()
                .map_err(|e| anyhow::anyhow!("Script '{}': {}", script.name, e))?;
        }
        Ok(())
    }

    /// URL of the search endpoint the page calls.
    pub fn search_endpoint(&self) -> String {
        format!("{}/search", self.api_base.trim_end_matches('/'))
    }
}

/// Page model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppSettings {
    /// Term searched on first load
    #[serde(default = "default_initial_term")]
    pub initial_term: String,

    /// Number of recent-search shortcut buttons kept
    #[serde(default = "default_max_last_searches")]
    pub max_last_searches: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            initial_term: default_initial_term(),
            max_last_searches: default_max_last_searches(),
        }
    }
}

fn default_initial_term() -> String {
    "React".to_string()
}

fn default_max_last_searches() -> usize {
    5
}

/// Timeouts, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSettings {
    /// How long `wait` blocks for an aliased exchange
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// How long queries and assertions retry
    #[serde(default = "default_assertion_timeout")]
    pub assertion_timeout_ms: u64,

    /// Delay between assertion retries
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            assertion_timeout_ms: default_assertion_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_assertion_timeout() -> u64 {
    4000
}

fn default_poll_interval() -> u64 {
    10
}

/// Synthetic backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSettings {
    /// Stories per page
    #[serde(default = "default_hits_per_page")]
    pub hits_per_page: usize,

    /// Pages available per query
    #[serde(default = "default_total_pages")]
    pub total_pages: u32,

    /// Handlebars template for story titles
    #[serde(default = "default_title_template")]
    pub title_template: String,

    /// Seed mixed into generated data
    #[serde(default)]
    pub seed: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            hits_per_page: default_hits_per_page(),
            total_pages: default_total_pages(),
            title_template: default_title_template(),
            seed: 0,
        }
    }
}

fn default_hits_per_page() -> usize {
    20
}

fn default_total_pages() -> u32 {
    50
}

fn default_title_template() -> String {
    "{{query}} {{topic}} #{{rank}}".to_string()
}

/// A single intercept rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterceptDefinition {
    /// Alias used by `wait`
    #[serde(default)]
    pub alias: Option<String>,

    /// Request matcher
    pub request: RequestMatcher,

    /// What to answer with
    #[serde(default)]
    pub reply: ReplyDefinition,

    /// Maximum number of times this rule can be matched (0 = unlimited)
    #[serde(default)]
    pub max_matches: u32,

    /// Latency simulation
    #[serde(default)]
    pub delay: Option<DelayConfig>,

    /// Failure simulation, overrides `reply`
    #[serde(default)]
    pub fault: Option<FaultConfig>,
}

impl InterceptDefinition {
    /// Intercept `GET` requests whose pathname matches a glob such as `**/search`.
    pub fn get(pathname: &str) -> Self {
        Self::new(
            "GET",
            RequestMatcher {
                pathname: Some(PathMatcher::Glob {
                    pattern: pathname.to_string(),
                }),
                ..RequestMatcher::default()
            },
        )
    }

    /// Intercept requests whose full URL (query included) matches a glob.
    pub fn url(method: &str, url: &str) -> Self {
        Self::new(
            method,
            RequestMatcher {
                url: Some(url.to_string()),
                ..RequestMatcher::default()
            },
        )
    }

    fn new(method: &str, mut request: RequestMatcher) -> Self {
        request.method = vec![method.to_string()];
        Self {
            alias: None,
            request,
            reply: ReplyDefinition::Passthrough,
            max_matches: 0,
            delay: None,
            fault: None,
        }
    }

    /// Require a query parameter. Values containing `*` are matched as globs.
    pub fn query(self, name: &str, value: &str) -> Self {
        let matcher = if value.contains('*') {
            QueryMatcher::Glob {
                pattern: value.to_string(),
            }
        } else {
            QueryMatcher::Exact {
                value: value.to_string(),
            }
        };
        self.query_matcher(name, matcher)
    }

    pub fn query_matcher(mut self, name: &str, matcher: QueryMatcher) -> Self {
        self.request.query.insert(name.to_string(), matcher);
        self
    }

    pub fn named(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn fixture(mut self, name: &str) -> Self {
        self.reply = ReplyDefinition::Fixture {
            name: name.to_string(),
            status: default_status(),
            template: false,
        };
        self
    }

    /// Answer with a bare HTTP status.
    pub fn status(mut self, status: u16) -> Self {
        self.fault = Some(FaultConfig::Error {
            status,
            message: None,
        });
        self
    }

    /// Fail at the transport level: no response reaches the page.
    pub fn network_error(mut self) -> Self {
        self.fault = Some(FaultConfig::NetworkError);
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(DelayConfig {
            fixed_ms: ms,
            min_ms: 0,
            max_ms: 0,
        });
        self
    }

    pub fn times(mut self, max_matches: u32) -> Self {
        self.max_matches = max_matches;
        self
    }

    /// Validate the intercept definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(alias) = &self.alias {
            if alias.is_empty() || alias.starts_with('@') {
                anyhow::bail!("Alias must be non-empty and given without '@': '{}'", alias);
            }
        }
        self.request.validate()?;
        self.reply.validate()?;
        if let Some(FaultConfig::Error { status, .. }) = &self.fault {
            validate_status(*status)?;
        }
        Ok(())
    }
}

/// Request matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RequestMatcher {
    /// HTTP method(s) to match (empty = any)
    #[serde(default)]
    pub method: Vec<String>,

    /// Pathname matching
    #[serde(default)]
    pub pathname: Option<PathMatcher>,

    /// Glob over the full URL, query string included
    #[serde(default)]
    pub url: Option<String>,

    /// Query parameter matching
    #[serde(default)]
    pub query: HashMap<String, QueryMatcher>,
}

impl RequestMatcher {
    /// Validate the request matcher.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.pathname {
            path.validate()?;
        }
        if let Some(url) = &self.url {
            crate::matcher::glob_to_regex(url)
                .map_err(|e| anyhow::anyhow!("Invalid url glob: {}", e))?;
        }
        for (name, matcher) in &self.query {
            matcher
                .validate()
                .map_err(|e| anyhow::anyhow!("Query '{}': {}", name, e))?;
        }
        Ok(())
    }
}

/// Pathname matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathMatcher {
    /// Exact path match
    Exact { value: String },
    /// Path prefix match
    Prefix { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Glob pattern match
    Glob { pattern: String },
}

impl PathMatcher {
    /// Validate the path matcher.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            PathMatcher::Regex { pattern } => {
                regex::Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?;
            }
            PathMatcher::Glob { pattern } => {
                globset::Glob::new(pattern).map_err(|e| anyhow::anyhow!("Invalid glob: {}", e))?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Query parameter matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryMatcher {
    /// Exact value match
    Exact { value: String },
    /// Glob match (`**` matches any value)
    Glob { pattern: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Parameter must be present (any value)
    Present,
    /// Parameter must be absent
    Absent,
}

impl QueryMatcher {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            QueryMatcher::Regex { pattern } => {
                regex::Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?;
            }
            QueryMatcher::Glob { pattern } => {
                crate::matcher::glob_to_regex(pattern)
                    .map_err(|e| anyhow::anyhow!("Invalid glob: {}", e))?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Reply for a matched request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyDefinition {
    /// Forward to the backend untouched
    #[default]
    Passthrough,
    /// Answer with a named fixture
    Fixture {
        name: String,
        #[serde(default = "default_status")]
        status: u16,
        /// Render string fields as templates
        #[serde(default)]
        template: bool,
    },
    /// Answer with an inline response
    Static(ResponseDefinition),
}

impl ReplyDefinition {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            ReplyDefinition::Passthrough => Ok(()),
            ReplyDefinition::Fixture { name, status, .. } => {
                if name.is_empty() {
                    anyhow::bail!("Fixture name cannot be empty");
                }
                validate_status(*status)
            }
            ReplyDefinition::Static(response) => response.validate(),
        }
    }
}

/// Inline response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Whether this is a template response
    #[serde(default)]
    pub template: bool,
}

fn default_status() -> u16 {
    200
}

fn validate_status(status: u16) -> anyhow::Result<()> {
    if !(100..=599).contains(&status) {
        anyhow::bail!("Invalid status code: {}", status);
    }
    Ok(())
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_status(self.status)
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Load from file
    File { path: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => Ok(serde_json::to_string(content)?.into_bytes()),
            ResponseBody::File { path } => std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("Failed to read file {}: {}", path, e)),
        }
    }

    /// Get content type for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseBody::Text { .. } => "text/plain",
            ResponseBody::Json { .. } => "application/json",
            ResponseBody::File { .. } => "application/octet-stream",
        }
    }
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayConfig {
    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> u64 {
        if self.fixed_ms > 0 {
            return self.fixed_ms;
        }
        if self.max_ms > self.min_ms {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            return rng.gen_range(self.min_ms..=self.max_ms);
        }
        self.min_ms
    }
}

/// Fault injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultConfig {
    /// Return an error response
    Error {
        /// HTTP status code
        status: u16,
        /// Error body
        #[serde(default)]
        message: Option<String>,
    },
    /// Drop the connection: no response at all
    NetworkError,
    /// Hold the request, then drop the connection
    Timeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log all matched rules
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Pass unmatched requests through to the backend
    #[serde(default = "default_true")]
    pub passthrough_unmatched: bool,

    /// Default content type for responses
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

fn default_true() -> bool {
    true
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            passthrough_unmatched: true,
            default_content_type: default_content_type(),
        }
    }
}

fn default_content_type() -> String {
    "application/json".to_string()
}
