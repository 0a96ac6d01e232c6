//! Scenario session.
//!
//! A [`Session`] owns everything one scenario touches: its intercept table,
//! its exchange log and the loaded page. Nothing is shared between sessions
//! except the configuration.

use crate::backend::Backend;
use crate::config::{HarnessConfig, InterceptDefinition};
use crate::dom::{Element, Found, Selector};
use crate::error::{HarnessError, HarnessResult};
use crate::fixtures::Fixtures;
use crate::network::{Exchange, Network};
use crate::page::StoriesPage;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Explicit browser-session stand-in handed to each scenario.
pub struct Session {
    config: Arc<HarnessConfig>,
    network: Arc<Network>,
    page: Option<StoriesPage>,
}

impl Session {
    pub fn new(
        config: Arc<HarnessConfig>,
        backend: Arc<dyn Backend>,
        fixtures: Arc<Fixtures>,
    ) -> HarnessResult<Self> {
        let network = Arc::new(Network::new(config.clone(), backend, fixtures)?);
        Ok(Self {
            config,
            network,
            page: None,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Add an intercept rule; earlier rules take precedence.
    pub fn intercept(&self, rule: InterceptDefinition) -> HarnessResult<()> {
        self.network.intercept(rule)
    }

    /// Load the page at `path` relative to the base URL.
    pub async fn visit(&mut self, path: &str) -> HarnessResult<()> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        info!(url = %url, "Visiting page");
        self.page = Some(StoriesPage::open(&url, &self.config, self.network.clone())?);
        Ok(())
    }

    pub fn page(&self) -> HarnessResult<&StoriesPage> {
        self.page.as_ref().ok_or(HarnessError::NotNavigated)
    }

    /// Wait for the next exchange of `alias` (a leading `@` is accepted).
    pub async fn wait(&self, alias: &str) -> HarnessResult<Exchange> {
        let alias = alias.trim_start_matches('@');
        let timeout = Duration::from_millis(self.config.timeouts.request_timeout_ms);
        let exchange = self.network.wait(alias, timeout).await?;
        info!(
            alias,
            url = %exchange.request.url(),
            status = ?exchange.outcome.status(),
            "Wait resolved"
        );
        Ok(exchange)
    }

    /// Fixture contents as reply bodies would see them.
    pub fn fixture<T: DeserializeOwned>(&self, name: &str) -> HarnessResult<T> {
        Ok(serde_json::from_value(self.network.fixture(name)?)?)
    }

    /// Every request the page has sent so far.
    pub fn requests(&self) -> Vec<Exchange> {
        self.network.exchanges()
    }

    /// Query elements by selector.
    pub fn get(&self, selector: &str) -> HarnessResult<Query<'_>> {
        Ok(Query {
            session: self,
            target: Target::Selector(Selector::parse(selector)?),
            position: Position::All,
        })
    }

    /// Query the first element whose own text contains `text`.
    pub fn contains(&self, text: &str) -> Query<'_> {
        Query {
            session: self,
            target: Target::Text(text.to_string()),
            position: Position::First,
        }
    }
}

enum Target {
    Selector(Selector),
    Text(String),
}

#[derive(Clone, Copy)]
enum Position {
    All,
    First,
    Last,
    Nth(usize),
}

enum Failure {
    NotFound,
    Assertion(String),
}

/// A retrying element query.
///
/// Every assertion and action re-renders the page and retries until it
/// passes or the assertion timeout elapses.
pub struct Query<'s> {
    session: &'s Session,
    target: Target,
    position: Position,
}

impl<'s> Query<'s> {
    pub fn first(mut self) -> Self {
        self.position = Position::First;
        self
    }

    pub fn last(mut self) -> Self {
        self.position = Position::Last;
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.position = Position::Nth(index);
        self
    }

    fn describe(&self) -> String {
        let base = match &self.target {
            Target::Selector(selector) => selector.to_string(),
            Target::Text(text) => format!("contains({})", text),
        };
        match self.position {
            Position::All => base,
            Position::First => format!("{} (first)", base),
            Position::Last => format!("{} (last)", base),
            Position::Nth(i) => format!("{} (index {})", base, i),
        }
    }

    fn resolve<'a>(&self, root: &'a Element) -> Vec<Found<'a>> {
        let all = match &self.target {
            Target::Selector(selector) => root.select(selector),
            Target::Text(text) => root.find_by_text(text),
        };
        match self.position {
            Position::All => all,
            Position::First => all.into_iter().take(1).collect(),
            Position::Last => all.last().copied().into_iter().collect(),
            Position::Nth(i) => all.get(i).copied().into_iter().collect(),
        }
    }

    async fn retry<T, F>(&self, mut check: F) -> HarnessResult<T>
    where
        F: FnMut(&[Found<'_>]) -> Result<T, Failure>,
    {
        let timeouts = &self.session.config.timeouts;
        let timeout_ms = timeouts.assertion_timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let poll = Duration::from_millis(timeouts.poll_interval_ms.max(1));

        loop {
            let failure = {
                let root = self.session.page()?.render();
                let found = self.resolve(&root);
                match check(&found) {
                    Ok(value) => return Ok(value),
                    Err(failure) => failure,
                }
            };

            if Instant::now() >= deadline {
                return Err(match failure {
                    Failure::NotFound => HarnessError::ElementNotFound {
                        selector: self.describe(),
                        timeout_ms,
                    },
                    Failure::Assertion(message) => HarnessError::AssertionFailed(message),
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Number of matched elements equals `expected`.
    pub async fn should_have_length(&self, expected: usize) -> HarnessResult<()> {
        self.retry(|found| {
            if found.len() == expected {
                Ok(())
            } else {
                Err(Failure::Assertion(format!(
                    "expected '{}' to have length {} but got {}",
                    self.describe(),
                    expected,
                    found.len()
                )))
            }
        })
        .await
    }

    /// At least one element matched and all matches are visible.
    ///
    /// The page drops hidden states from the tree instead of hiding them, so
    /// absence is asserted with [`Query::should_not_exist`].
    pub async fn should_be_visible(&self) -> HarnessResult<()> {
        self.retry(|found| {
            if found.is_empty() {
                return Err(Failure::NotFound);
            }
            if found.iter().all(|f| f.visible) {
                Ok(())
            } else {
                Err(Failure::Assertion(format!(
                    "expected '{}' to be visible",
                    self.describe()
                )))
            }
        })
        .await
    }

    pub async fn should_not_exist(&self) -> HarnessResult<()> {
        self.retry(|found| {
            if found.is_empty() {
                Ok(())
            } else {
                Err(Failure::Assertion(format!(
                    "expected '{}' not to exist but found {}",
                    self.describe(),
                    found.len()
                )))
            }
        })
        .await
    }

    /// The combined text of the matched elements contains `text`.
    pub async fn should_contain(&self, text: &str) -> HarnessResult<()> {
        self.retry(|found| {
            if found.is_empty() {
                return Err(Failure::NotFound);
            }
            let content: Vec<String> = found.iter().map(|f| f.element.text_content()).collect();
            let content = content.join(" ");
            if content.contains(text) {
                Ok(())
            } else {
                Err(Failure::Assertion(format!(
                    "expected '{}' to contain '{}' but the text was '{}'",
                    self.describe(),
                    text,
                    content
                )))
            }
        })
        .await
    }

    /// The i-th matched element contains `texts[i]`, with no extra elements.
    pub async fn should_contain_in_order(&self, texts: &[&str]) -> HarnessResult<()> {
        self.retry(|found| {
            let content: Vec<String> = found.iter().map(|f| f.element.text_content()).collect();
            let in_order = content.len() == texts.len()
                && content.iter().zip(texts).all(|(c, t)| c.contains(t));
            if in_order {
                Ok(())
            } else {
                Err(Failure::Assertion(format!(
                    "expected '{}' to contain {:?} in order but got {:?}",
                    self.describe(),
                    texts,
                    content
                )))
            }
        })
        .await
    }

    /// Every matched element carries attribute `name` equal to `value`.
    pub async fn should_have_attr(&self, name: &str, value: &str) -> HarnessResult<()> {
        self.retry(|found| {
            if found.is_empty() {
                return Err(Failure::NotFound);
            }
            match found
                .iter()
                .find(|f| f.element.attrs.get(name).map(String::as_str) != Some(value))
            {
                None => Ok(()),
                Some(other) => Err(Failure::Assertion(format!(
                    "expected '{}' to have {}=\"{}\" but got {:?}",
                    self.describe(),
                    name,
                    value,
                    other.element.attrs.get(name)
                ))),
            }
        })
        .await
    }

    /// Text content of each matched element, once at least one exists.
    pub async fn texts(&self) -> HarnessResult<Vec<String>> {
        self.retry(|found| {
            if found.is_empty() {
                Err(Failure::NotFound)
            } else {
                Ok(found.iter().map(|f| f.element.text_content()).collect())
            }
        })
        .await
    }

    /// Resolve to exactly one visible element and hand out a copy of it.
    async fn single(&self, verb: &str) -> HarnessResult<Element> {
        self.retry(|found| match found {
            [] => Err(Failure::NotFound),
            [one] if !one.visible => Err(Failure::Assertion(format!(
                "cannot {} '{}': element is not visible",
                verb,
                self.describe()
            ))),
            [one] if one.element.disabled => Err(Failure::Assertion(format!(
                "cannot {} '{}': element is disabled",
                verb,
                self.describe()
            ))),
            [one] => Ok(one.element.clone()),
            many => Err(Failure::Assertion(format!(
                "can only {} a single element, but '{}' matched {}",
                verb,
                self.describe(),
                many.len()
            ))),
        })
        .await
    }

    pub async fn click(&self) -> HarnessResult<()> {
        let element = self.single("click").await?;
        debug!(query = %self.describe(), "Click");
        if let Some(action) = &element.action {
            self.session.page()?.perform(action);
        }
        Ok(())
    }

    async fn single_input(&self, verb: &str) -> HarnessResult<Element> {
        let element = self.single(verb).await?;
        if element.tag != "input" {
            return Err(HarnessError::AssertionFailed(format!(
                "cannot {} '{}': <{}> is not a text input",
                verb,
                self.describe(),
                element.tag
            )));
        }
        Ok(element)
    }

    pub async fn clear(&self) -> HarnessResult<()> {
        self.single_input("clear").await?;
        self.session.page()?.set_input("");
        Ok(())
    }

    /// Type into a text input. `{enter}` submits the surrounding form unless
    /// the input is empty.
    pub async fn type_text(&self, text: &str) -> HarnessResult<()> {
        self.single_input("type into").await?;
        let page = self.session.page()?;
        debug!(query = %self.describe(), text, "Type");

        let mut parts = text.split("{enter}").peekable();
        while let Some(part) = parts.next() {
            page.append_input(part);
            if parts.peek().is_some() {
                page.submit();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SyntheticBackend;

    fn session_with(config: HarnessConfig) -> Session {
        let config = Arc::new(config);
        Session::new(
            config.clone(),
            Arc::new(SyntheticBackend::new(config.backend.clone())),
            Arc::new(Fixtures::bundled().unwrap()),
        )
        .unwrap()
    }

    fn quick_config() -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.timeouts.request_timeout_ms = 200;
        config.timeouts.assertion_timeout_ms = 200;
        config
    }

    #[tokio::test]
    async fn test_queries_before_visit_fail() {
        let session = session_with(quick_config());
        let err = session.get(".item").unwrap().should_have_length(0).await.unwrap_err();
        assert!(matches!(err, HarnessError::NotNavigated));
    }

    #[tokio::test]
    async fn test_visit_wait_and_count() {
        let mut session = session_with(quick_config());
        session
            .intercept(
                InterceptDefinition::get("**/search")
                    .query("query", "React")
                    .query("page", "0")
                    .named("getStories"),
            )
            .unwrap();
        session.visit("/").await.unwrap();
        assert_eq!(session.page().unwrap().url(), "http://localhost:3000/");

        let exchange = session.wait("@getStories").await.unwrap();
        assert_eq!(exchange.outcome.status(), Some(200));
        session.get(".item").unwrap().should_have_length(20).await.unwrap();
        session.contains("More").should_be_visible().await.unwrap();
    }

    #[tokio::test]
    async fn test_type_enter_submits() {
        let mut session = session_with(quick_config());
        session
            .intercept(
                InterceptDefinition::get("**/search")
                    .query("query", "Rust")
                    .query("page", "0")
                    .named("getRust"),
            )
            .unwrap();
        session.visit("/").await.unwrap();

        let search = session.get("#search").unwrap();
        search.clear().await.unwrap();
        search.type_text("Rust{enter}").await.unwrap();
        session.wait("getRust").await.unwrap();

        session.get(".item").unwrap().first().should_contain("Rust").await.unwrap();
        session
            .get(".last-searches button")
            .unwrap()
            .should_contain_in_order(&["React"])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_enter_on_empty_input_sends_nothing() {
        let mut session = session_with(quick_config());
        session.visit("/").await.unwrap();
        session.get(".item").unwrap().should_have_length(20).await.unwrap();

        let search = session.get("#search").unwrap();
        search.clear().await.unwrap();
        search.type_text("{enter}").await.unwrap();

        assert_eq!(session.network().total_requests(), 1);
        session.get(".item").unwrap().should_have_length(20).await.unwrap();
        session.get(".last-searches button").unwrap().should_not_exist().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_assertion_reports_after_timeout() {
        let mut session = session_with(quick_config());
        session.visit("/").await.unwrap();

        let err = session.get(".item").unwrap().should_have_length(3).await.unwrap_err();
        assert!(matches!(err, HarnessError::AssertionFailed(msg) if msg.contains("length 3")));

        let err = session.get(".nothing").unwrap().should_be_visible().await.unwrap_err();
        assert!(matches!(err, HarnessError::ElementNotFound { timeout_ms: 200, .. }));
    }

    #[tokio::test]
    async fn test_click_requires_single_element() {
        let mut session = session_with(quick_config());
        session.visit("/").await.unwrap();
        session.get(".item").unwrap().should_have_length(20).await.unwrap();

        let err = session.get(".button-small").unwrap().click().await.unwrap_err();
        assert!(matches!(err, HarnessError::AssertionFailed(msg) if msg.contains("matched 20")));

        session.get(".button-small").unwrap().first().click().await.unwrap();
        session.get(".item").unwrap().should_have_length(19).await.unwrap();
    }

    #[tokio::test]
    async fn test_type_into_non_input_fails() {
        let mut session = session_with(quick_config());
        session.visit("/").await.unwrap();
        let err = session.get("footer").unwrap().type_text("x").await.unwrap_err();
        assert!(matches!(err, HarnessError::AssertionFailed(msg) if msg.contains("not a text input")));
    }

    #[tokio::test]
    async fn test_submit_disabled_when_input_empty() {
        let mut session = session_with(quick_config());
        session.visit("/").await.unwrap();
        session.get("#search").unwrap().clear().await.unwrap();

        let err = session.contains("Submit").click().await.unwrap_err();
        assert!(matches!(err, HarnessError::AssertionFailed(msg) if msg.contains("disabled")));
    }
}
