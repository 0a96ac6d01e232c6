//! Intercepted network layer.
//!
//! Every outbound request of the page goes through [`Network::dispatch`]. The
//! first registered rule that matches answers it (stub, fault or passthrough
//! to the backend), and the completed exchange is logged so scenarios can
//! `wait` on its alias.

use crate::backend::Backend;
use crate::config::{
    FaultConfig, HarnessConfig, InterceptDefinition, ReplyDefinition, ResponseDefinition,
};
use crate::error::{HarnessError, HarnessResult};
use crate::fixtures::Fixtures;
use crate::matcher::{MatchContext, RouteMatcher};
use crate::template::{TemplateContext, TemplateEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

/// An outbound request as seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDescriptor {
    method: String,
    url: Url,
}

impl RequestDescriptor {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_uppercase(),
            url,
        }
    }

    /// Parse an absolute URL.
    pub fn parse(method: &str, url: &str) -> HarnessResult<Self> {
        let url = Url::parse(url).map_err(|e| HarnessError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(method, url))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Path without scheme, host and query, e.g. `/api/v1/search`.
    pub fn pathname(&self) -> &str {
        self.url.path()
    }

    pub fn query_string(&self) -> &str {
        self.url.query().unwrap_or("")
    }

    /// Decoded query parameters; a repeated name keeps its last value.
    pub fn query_params(&self) -> HashMap<String, String> {
        self.url.query_pairs().into_owned().collect()
    }
}

/// A response delivered to the page.
#[derive(Debug, Clone, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(status, "application/json", body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level failure: no response reached the page.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransportError {
    #[error("connection closed before a response was received")]
    ConnectionClosed,

    #[error("request timed out after {0} ms")]
    TimedOut(u64),
}

/// How an exchange ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExchangeOutcome {
    Response { response: HttpResponse },
    NetworkError { error: TransportError },
}

impl ExchangeOutcome {
    pub fn status(&self) -> Option<u16> {
        match self {
            ExchangeOutcome::Response { response } => Some(response.status),
            ExchangeOutcome::NetworkError { .. } => None,
        }
    }
}

/// A completed request/response cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    /// Position in issue order, starting at 1
    pub sequence: u64,
    pub alias: Option<String>,
    pub request: RequestDescriptor,
    pub outcome: ExchangeOutcome,
    pub completed_at: DateTime<Utc>,
}

/// A request that has been matched and numbered but not answered yet.
#[derive(Debug)]
pub struct PendingRequest {
    sequence: u64,
    request: RequestDescriptor,
    matched: Option<(InterceptDefinition, MatchContext)>,
}

impl PendingRequest {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

struct CompiledRule {
    definition: InterceptDefinition,
    matcher: RouteMatcher,
    match_count: AtomicU32,
}

impl CompiledRule {
    fn is_exhausted(&self) -> bool {
        self.definition.max_matches != 0
            && self.match_count.load(Ordering::Relaxed) >= self.definition.max_matches
    }
}

#[derive(Default)]
struct ExchangeLog {
    /// Alias of every request, in issue order; the index is `sequence - 1`
    issued: Vec<Option<String>>,
    /// Completed exchanges, in completion order
    entries: Vec<Exchange>,
    /// Exchanges already handed out by `wait`, per alias
    consumed: HashMap<String, usize>,
}

impl ExchangeLog {
    fn issue(&mut self, alias: Option<String>) -> u64 {
        self.issued.push(alias);
        self.issued.len() as u64
    }

    /// The earliest-issued unconsumed exchange for `alias`, once it completed.
    ///
    /// A later exchange that completed first stays queued behind it.
    fn take_next(&mut self, alias: &str) -> Option<Exchange> {
        let consumed = self.consumed.get(alias).copied().unwrap_or(0);
        let index = self
            .issued
            .iter()
            .enumerate()
            .filter(|(_, a)| a.as_deref() == Some(alias))
            .nth(consumed)
            .map(|(i, _)| i)?;
        let sequence = index as u64 + 1;
        let next = self
            .entries
            .iter()
            .find(|e| e.sequence == sequence)
            .cloned()?;
        self.consumed.insert(alias.to_string(), consumed + 1);
        Some(next)
    }
}

/// The intercept table of one session plus its exchange log.
pub struct Network {
    config: Arc<HarnessConfig>,
    rules: RwLock<Vec<CompiledRule>>,
    backend: Arc<dyn Backend>,
    fixtures: Arc<Fixtures>,
    template_engine: TemplateEngine,
    log: Mutex<ExchangeLog>,
    recorded: watch::Sender<u64>,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_unmatched: AtomicU64,
}

impl Network {
    /// Create a network layer seeded with the configured intercepts.
    pub fn new(
        config: Arc<HarnessConfig>,
        backend: Arc<dyn Backend>,
        fixtures: Arc<Fixtures>,
    ) -> HarnessResult<Self> {
        let (recorded, _) = watch::channel(0);
        let network = Self {
            config: config.clone(),
            rules: RwLock::new(Vec::new()),
            backend,
            fixtures,
            template_engine: TemplateEngine::new(),
            log: Mutex::new(ExchangeLog::default()),
            recorded,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        };
        for intercept in &config.intercepts {
            network.intercept(intercept.clone())?;
        }
        Ok(network)
    }

    /// Register a rule after every existing one.
    pub fn intercept(&self, definition: InterceptDefinition) -> HarnessResult<()> {
        definition
            .validate()
            .map_err(|e| HarnessError::Config(e.to_string()))?;
        if let ReplyDefinition::Fixture { name, .. } = &definition.reply {
            if !self.fixtures.contains(name) {
                return Err(HarnessError::UnknownFixture(name.clone()));
            }
        }
        let matcher = RouteMatcher::compile(&definition.request)?;

        debug!(alias = ?definition.alias, "Registered intercept rule");
        self.rules_mut().push(CompiledRule {
            definition,
            matcher,
            match_count: AtomicU32::new(0),
        });
        Ok(())
    }

    fn rules(&self) -> std::sync::RwLockReadGuard<'_, Vec<CompiledRule>> {
        self.rules.read().unwrap_or_else(|e| e.into_inner())
    }

    fn rules_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<CompiledRule>> {
        self.rules.write().unwrap_or_else(|e| e.into_inner())
    }

    fn exchange_log(&self) -> std::sync::MutexGuard<'_, ExchangeLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether any registered rule carries this alias.
    pub fn declares_alias(&self, alias: &str) -> bool {
        self.rules()
            .iter()
            .any(|r| r.definition.alias.as_deref() == Some(alias))
    }

    /// A copy of a loaded fixture.
    pub fn fixture(&self, name: &str) -> HarnessResult<serde_json::Value> {
        self.fixtures.get(name).cloned()
    }

    pub fn rule_count(&self) -> usize {
        self.rules().len()
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    /// Every completed exchange, in completion order.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchange_log().entries.clone()
    }

    /// Match a request and give it its place in issue order.
    ///
    /// The first non-exhausted rule answers and its match is counted.
    /// Exchanges of one alias are handed to `wait` in the order of this call,
    /// whatever order they complete in.
    pub fn issue(&self, request: RequestDescriptor) -> PendingRequest {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let (sequence, matched) = {
            let rules = self.rules();
            let matched = rules
                .iter()
                .filter(|rule| !rule.is_exhausted())
                .find_map(|rule| rule.matcher.matches(&request).map(|ctx| (rule, ctx)))
                .map(|(rule, ctx)| {
                    rule.match_count.fetch_add(1, Ordering::Relaxed);
                    (rule.definition.clone(), ctx)
                });
            let alias = matched.as_ref().and_then(|(rule, _)| rule.alias.clone());
            (self.exchange_log().issue(alias), matched)
        };

        let settings = &self.config.settings;
        match &matched {
            Some((rule, _)) => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                if settings.log_matches {
                    info!(
                        sequence,
                        alias = rule.alias.as_deref().unwrap_or("-"),
                        method = %request.method(),
                        url = %request.url(),
                        "Request matched intercept"
                    );
                }
            }
            None => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                if settings.log_unmatched {
                    warn!(
                        sequence,
                        method = %request.method(),
                        url = %request.url(),
                        "No intercept matched"
                    );
                }
            }
        }

        PendingRequest {
            sequence,
            request,
            matched,
        }
    }

    /// Answer an issued request and record the exchange.
    pub async fn complete(&self, pending: PendingRequest) -> Result<HttpResponse, TransportError> {
        let PendingRequest {
            sequence,
            request,
            matched,
        } = pending;

        let (alias, result) = match matched {
            Some((rule, context)) => {
                let result = self.respond(&rule, &request, &context).await;
                (rule.alias, result)
            }
            None => {
                let result = if self.config.settings.passthrough_unmatched {
                    self.backend.handle(&request).await
                } else {
                    Ok(self.default_response())
                };
                (None, result)
            }
        };

        let outcome = match &result {
            Ok(response) => ExchangeOutcome::Response {
                response: response.clone(),
            },
            Err(error) => ExchangeOutcome::NetworkError {
                error: error.clone(),
            },
        };
        self.record(sequence, alias, request, outcome);
        result
    }

    /// Send a request through the intercept table.
    pub async fn dispatch(
        &self,
        request: RequestDescriptor,
    ) -> Result<HttpResponse, TransportError> {
        let pending = self.issue(request);
        self.complete(pending).await
    }

    fn record(
        &self,
        sequence: u64,
        alias: Option<String>,
        request: RequestDescriptor,
        outcome: ExchangeOutcome,
    ) {
        {
            let mut log = self.exchange_log();
            debug!(sequence, alias = ?alias, status = ?outcome.status(), "Exchange completed");
            log.entries.push(Exchange {
                sequence,
                alias,
                request,
                outcome,
                completed_at: Utc::now(),
            });
        }
        self.recorded.send_replace(sequence);
    }

    async fn respond(
        &self,
        rule: &InterceptDefinition,
        request: &RequestDescriptor,
        context: &MatchContext,
    ) -> Result<HttpResponse, TransportError> {
        if let Some(delay) = &rule.delay {
            let delay_ms = delay.calculate();
            if delay_ms > 0 {
                debug!(alias = ?rule.alias, delay_ms, "Applying delay");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        if let Some(fault) = &rule.fault {
            return self.apply_fault(fault).await;
        }

        match &rule.reply {
            ReplyDefinition::Passthrough => self.backend.handle(request).await,
            ReplyDefinition::Fixture {
                name,
                status,
                template,
            } => Ok(self.fixture_response(name, *status, *template, request, context)),
            ReplyDefinition::Static(response) => {
                Ok(self.static_response(response, request, context))
            }
        }
    }

    async fn apply_fault(&self, fault: &FaultConfig) -> Result<HttpResponse, TransportError> {
        match fault {
            FaultConfig::Error { status, message } => Ok(HttpResponse::new(
                *status,
                "text/plain",
                message.clone().unwrap_or_default().into_bytes(),
            )),
            FaultConfig::NetworkError => Err(TransportError::ConnectionClosed),
            FaultConfig::Timeout { duration_ms } => {
                debug!(duration_ms, "Simulating timeout");
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                Err(TransportError::TimedOut(*duration_ms))
            }
        }
    }

    fn fixture_response(
        &self,
        name: &str,
        status: u16,
        template: bool,
        request: &RequestDescriptor,
        context: &MatchContext,
    ) -> HttpResponse {
        let rendered = self.fixtures.get(name).and_then(|value| {
            if template {
                let ctx = TemplateContext::new(request, context);
                Ok(self.template_engine.render_json(value, &ctx)?)
            } else {
                Ok(value.clone())
            }
        });

        match rendered {
            Ok(value) => HttpResponse::json(status, &value),
            Err(e) => {
                warn!(fixture = name, error = %e, "Fixture could not be served");
                HttpResponse::json(500, &serde_json::json!({ "error": e.to_string() }))
            }
        }
    }

    fn static_response(
        &self,
        response: &ResponseDefinition,
        request: &RequestDescriptor,
        context: &MatchContext,
    ) -> HttpResponse {
        let body = match &response.body {
            Some(crate::config::ResponseBody::Json { content }) if response.template => {
                let ctx = TemplateContext::new(request, context);
                self.template_engine
                    .render_json(content, &ctx)
                    .ok()
                    .and_then(|v| serde_json::to_vec(&v).ok())
            }
            Some(crate::config::ResponseBody::Text { content }) if response.template => {
                let ctx = TemplateContext::new(request, context);
                self.template_engine
                    .render(content, &ctx)
                    .ok()
                    .map(String::into_bytes)
            }
            Some(body) => body.to_bytes().ok(),
            None => None,
        };

        let content_type = response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| {
                response
                    .body
                    .as_ref()
                    .map(|b| b.content_type().to_string())
                    .unwrap_or_else(|| self.config.settings.default_content_type.clone())
            });

        let mut http = HttpResponse::new(response.status, &content_type, body.unwrap_or_default());
        for (name, value) in &response.headers {
            if !name.eq_ignore_ascii_case("content-type") {
                http.headers.insert(name.clone(), value.clone());
            }
        }
        http
    }

    fn default_response(&self) -> HttpResponse {
        HttpResponse::new(
            404,
            "application/json",
            br#"{"error": "not_found", "message": "No matching intercept found"}"#.to_vec(),
        )
    }

    /// Block until the next unconsumed exchange for `alias` completes.
    ///
    /// Exchanges for one alias are handed out in issue order.
    pub async fn wait(&self, alias: &str, timeout: Duration) -> HarnessResult<Exchange> {
        if !self.declares_alias(alias) {
            return Err(HarnessError::UnknownAlias(alias.to_string()));
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut recorded = self.recorded.subscribe();

        loop {
            if let Some(exchange) = self.exchange_log().take_next(alias) {
                debug!(alias, sequence = exchange.sequence, "Wait satisfied");
                return Ok(exchange);
            }
            match tokio::time::timeout_at(deadline, recorded.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => {
                    return Err(HarnessError::WaitTimeout {
                        alias: alias.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SyntheticBackend;
    use crate::stories::SearchResponse;

    fn network_with(config: HarnessConfig) -> Arc<Network> {
        let config = Arc::new(config);
        let backend = Arc::new(SyntheticBackend::new(config.backend.clone()));
        let fixtures = Arc::new(Fixtures::bundled().unwrap());
        Arc::new(Network::new(config, backend, fixtures).unwrap())
    }

    fn network() -> Arc<Network> {
        network_with(HarnessConfig::default())
    }

    fn search(query: &str, page: u32) -> RequestDescriptor {
        RequestDescriptor::parse(
            "GET",
            &format!("https://hn.algolia.com/api/v1/search?query={}&page={}", query, page),
        )
        .unwrap()
    }

    #[test]
    fn test_request_descriptor_parts() {
        let request = search("React", 0);
        assert_eq!(request.pathname(), "/api/v1/search");
        assert_eq!(request.query_string(), "query=React&page=0");
        assert_eq!(request.query_params().get("page"), Some(&"0".to_string()));

        let bare = RequestDescriptor::parse("get", "http://localhost:3000").unwrap();
        assert_eq!(bare.method(), "GET");
        assert_eq!(bare.pathname(), "/");
        assert_eq!(bare.query_string(), "");

        let encoded = RequestDescriptor::parse(
            "GET",
            "https://hn.algolia.com/api/v1/search?query=hacker+news%21&page=0",
        )
        .unwrap();
        assert_eq!(encoded.query_params()["query"], "hacker news!");

        let err = RequestDescriptor::parse("GET", "/search?query=x").unwrap_err();
        assert!(matches!(err, HarnessError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_unmatched_passes_through() {
        let network = network();
        let response = network.dispatch(search("React", 0)).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(SearchResponse::from_slice(&response.body).unwrap().hits.len(), 20);
        assert_eq!(network.total_unmatched(), 1);
        assert_eq!(network.exchanges().len(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_without_passthrough_gets_404() {
        let mut config = HarnessConfig::default();
        config.settings.passthrough_unmatched = false;
        let network = network_with(config);
        let response = network.dispatch(search("React", 0)).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_fixture_reply() {
        let network = network();
        network
            .intercept(
                InterceptDefinition::url("GET", "**/search?query=React&page=0")
                    .fixture("stories")
                    .named("getStories"),
            )
            .unwrap();

        let response = network.dispatch(search("React", 0)).await.unwrap();
        let body = SearchResponse::from_slice(&response.body).unwrap();
        assert_eq!(body.hits.len(), 2);
        assert_eq!(network.total_matched(), 1);

        let exchange = network
            .wait("getStories", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(exchange.outcome.status(), Some(200));
    }

    #[tokio::test]
    async fn test_first_registered_rule_wins() {
        let network = network();
        network
            .intercept(InterceptDefinition::get("**/search").status(500).named("first"))
            .unwrap();
        network
            .intercept(InterceptDefinition::get("**/search").fixture("stories").named("second"))
            .unwrap();

        let response = network.dispatch(search("React", 0)).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(network.exchanges()[0].alias.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_exhausted_rule_falls_through() {
        let network = network();
        network
            .intercept(InterceptDefinition::get("**/search").status(503).times(1))
            .unwrap();

        assert_eq!(network.dispatch(search("a", 0)).await.unwrap().status, 503);
        assert_eq!(network.dispatch(search("a", 0)).await.unwrap().status, 200);
    }

    #[tokio::test]
    async fn test_network_error_is_recorded() {
        let network = network();
        network
            .intercept(
                InterceptDefinition::url("GET", "**/search**")
                    .network_error()
                    .named("getNetworkFailure"),
            )
            .unwrap();

        let result = network.dispatch(search("React", 0)).await;
        assert_eq!(result.unwrap_err(), TransportError::ConnectionClosed);

        let exchange = network
            .wait("getNetworkFailure", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(matches!(exchange.outcome, ExchangeOutcome::NetworkError { .. }));
    }

    #[tokio::test]
    async fn test_templated_fixture() {
        let mut fixtures = Fixtures::bundled().unwrap();
        fixtures.insert(
            "echo",
            serde_json::json!({ "hits": [{ "objectID": "1", "title": "{{query.query}}!", "author": "x" }] }),
        );
        let network = Network::new(
            Arc::new(HarnessConfig::default()),
            Arc::new(SyntheticBackend::new(Default::default())),
            Arc::new(fixtures),
        )
        .unwrap();

        let mut rule = InterceptDefinition::get("**/search");
        rule.reply = ReplyDefinition::Fixture {
            name: "echo".to_string(),
            status: 200,
            template: true,
        };
        network.intercept(rule).unwrap();

        let response = network.dispatch(search("Rust", 0)).await.unwrap();
        let body = SearchResponse::from_slice(&response.body).unwrap();
        assert_eq!(body.hits[0].title, "Rust!");
    }

    #[tokio::test]
    async fn test_unknown_fixture_rejected_at_registration() {
        let network = network();
        let err = network
            .intercept(InterceptDefinition::get("**/search").fixture("missing"))
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnknownFixture(_)));
        assert_eq!(network.rule_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_consumes_in_order() {
        let network = network();
        network
            .intercept(InterceptDefinition::get("**/search").named("getAny"))
            .unwrap();

        network.dispatch(search("one", 0)).await.unwrap();
        network.dispatch(search("two", 0)).await.unwrap();

        let timeout = Duration::from_millis(50);
        let first = network.wait("getAny", timeout).await.unwrap();
        let second = network.wait("getAny", timeout).await.unwrap();
        assert_eq!(first.request.query_params()["query"], "one");
        assert_eq!(second.request.query_params()["query"], "two");
        assert!(first.sequence < second.sequence);
    }

    #[tokio::test]
    async fn test_wait_follows_issue_order() {
        let network = network();
        network
            .intercept(
                InterceptDefinition::get("**/search")
                    .named("getAny")
                    .delay_ms(100)
                    .times(1),
            )
            .unwrap();
        network
            .intercept(InterceptDefinition::get("**/search").named("getAny"))
            .unwrap();

        let sender = network.clone();
        tokio::spawn(async move {
            let _ = sender.dispatch(search("first", 0)).await;
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let sender = network.clone();
        tokio::spawn(async move {
            let _ = sender.dispatch(search("second", 0)).await;
        });

        let timeout = Duration::from_secs(2);
        let first = network.wait("getAny", timeout).await.unwrap();
        let second = network.wait("getAny", timeout).await.unwrap();
        assert_eq!(first.request.query_params()["query"], "first");
        assert_eq!(second.request.query_params()["query"], "second");
        assert!(first.sequence < second.sequence);
        // completion order is still visible in the log
        assert_eq!(network.exchanges()[0].request.query_params()["query"], "second");
    }

    #[tokio::test]
    async fn test_issue_assigns_sequence_before_completion() {
        let network = network();
        network
            .intercept(InterceptDefinition::get("**/search").named("getAny"))
            .unwrap();

        let one = network.issue(search("one", 0));
        let two = network.issue(search("two", 0));
        assert_eq!(one.sequence(), 1);
        assert_eq!(two.sequence(), 2);

        network.complete(two).await.unwrap();
        let err = network
            .wait("getAny", Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::WaitTimeout { .. }));

        network.complete(one).await.unwrap();
        let timeout = Duration::from_millis(50);
        assert_eq!(network.wait("getAny", timeout).await.unwrap().sequence, 1);
        assert_eq!(network.wait("getAny", timeout).await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_request_arrives() {
        let network = network();
        network
            .intercept(InterceptDefinition::get("**/search").named("getLater").delay_ms(20))
            .unwrap();

        let sender = network.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = sender.dispatch(search("later", 0)).await;
        });

        let exchange = network
            .wait("getLater", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(exchange.request.query_params()["query"], "later");
    }

    #[tokio::test]
    async fn test_wait_times_out_without_request() {
        let network = network();
        network
            .intercept(InterceptDefinition::get("**/search").named("never"))
            .unwrap();

        let err = network
            .wait("never", Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::WaitTimeout { timeout_ms: 30, .. }));
    }

    #[tokio::test]
    async fn test_wait_on_undeclared_alias() {
        let network = network();
        let err = network
            .wait("ghost", Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnknownAlias(alias) if alias == "ghost"));
    }

    #[test]
    fn test_configured_intercepts_installed() {
        let mut config = HarnessConfig::default();
        config
            .intercepts
            .push(InterceptDefinition::get("**/search").named("fromConfig"));
        let network = network_with(config);
        assert!(network.declares_alias("fromConfig"));
        assert_eq!(network.rule_count(), 1);
    }

    #[test]
    fn test_dispatch_with_block_on() {
        let network = network();
        let response = tokio_test::block_on(network.dispatch(search("sync", 3))).unwrap();
        assert!(response.is_success());
        assert!(response.text().contains("\"page\":3"));
    }
}
