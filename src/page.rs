//! Page model of the Hacker Stories search UI.
//!
//! Holds the state the real front-end keeps (search input, committed
//! searches, fetched stories, sort order) and renders it to an [`Element`]
//! tree. Fetches go through the session's [`Network`] on spawned tasks, so
//! responses land asynchronously, as they do in a browser.

use crate::config::{AppSettings, HarnessConfig};
use crate::dom::Element;
use crate::error::{HarnessError, HarnessResult};
use crate::network::{Network, RequestDescriptor};
use crate::stories::{SearchResponse, Story};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use url::Url;

pub const ERROR_MESSAGE: &str = "Something went wrong ...";
pub const LOADING_MESSAGE: &str = "Loading ...";
pub const FOOTER_TEXT: &str = "Icons made by Freepik from www.flaticon.com";

/// What clicking an element does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Submit,
    More,
    Dismiss(String),
    LastSearch(String),
    Sort(SortKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    None,
    Title,
    Author,
    Comments,
    Points,
}

impl SortKey {
    pub fn label(self) -> &'static str {
        match self {
            SortKey::None => "",
            SortKey::Title => "Title",
            SortKey::Author => "Author",
            SortKey::Comments => "Comments",
            SortKey::Points => "Points",
        }
    }

    fn sort(self, stories: &mut [Story]) {
        match self {
            SortKey::None => {}
            SortKey::Title => stories.sort_by(|a, b| a.title.cmp(&b.title)),
            SortKey::Author => stories.sort_by(|a, b| a.author.cmp(&b.author)),
            SortKey::Comments => stories.sort_by(|a, b| b.num_comments.cmp(&a.num_comments)),
            SortKey::Points => stories.sort_by(|a, b| b.points.cmp(&a.points)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchUrl {
    term: String,
    page: u32,
}

#[derive(Debug, Default)]
struct StoriesState {
    data: Vec<Story>,
    page: u32,
    is_loading: bool,
    is_error: bool,
}

#[derive(Debug, Default)]
struct PageState {
    input: String,
    urls: Vec<SearchUrl>,
    stories: StoriesState,
    sort: SortKey,
    sort_reversed: bool,
    /// Bumped per fetch; responses of older fetches are dropped
    generation: u64,
}

/// The application under test.
pub struct StoriesPage {
    url: String,
    endpoint: Url,
    app: AppSettings,
    network: Arc<Network>,
    state: Arc<Mutex<PageState>>,
}

fn lock(state: &Mutex<PageState>) -> MutexGuard<'_, PageState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl StoriesPage {
    /// Load the page; this fires the initial search.
    pub fn open(url: &str, config: &HarnessConfig, network: Arc<Network>) -> HarnessResult<Self> {
        let endpoint = config.search_endpoint();
        let endpoint = Url::parse(&endpoint).map_err(|e| HarnessError::InvalidUrl {
            url: endpoint.clone(),
            reason: e.to_string(),
        })?;
        let page = Self {
            url: url.to_string(),
            endpoint,
            app: config.app.clone(),
            network,
            state: Arc::new(Mutex::new(PageState {
                input: config.app.initial_term.clone(),
                ..PageState::default()
            })),
        };
        page.search(config.app.initial_term.clone(), 0);
        Ok(page)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn input_value(&self) -> String {
        lock(&self.state).input.clone()
    }

    pub fn set_input(&self, value: &str) {
        lock(&self.state).input = value.to_string();
    }

    pub fn append_input(&self, text: &str) {
        lock(&self.state).input.push_str(text);
    }

    /// Form submission, via the submit button or the enter key.
    ///
    /// An empty input submits nothing, as the disabled button would.
    pub fn submit(&self) {
        let term = self.input_value();
        if term.is_empty() {
            debug!("Ignoring submit with an empty search input");
            return;
        }
        self.search(term, 0);
    }

    pub fn perform(&self, action: &Action) {
        debug!(action = ?action, "Page action");
        match action {
            Action::Submit => self.submit(),
            Action::More => {
                let next = {
                    let state = lock(&self.state);
                    state
                        .urls
                        .last()
                        .map(|u| (u.term.clone(), state.stories.page + 1))
                };
                if let Some((term, page)) = next {
                    self.search(term, page);
                }
            }
            Action::Dismiss(object_id) => {
                lock(&self.state)
                    .stories
                    .data
                    .retain(|s| &s.object_id != object_id);
            }
            Action::LastSearch(term) => {
                self.set_input(term);
                self.search(term.clone(), 0);
            }
            Action::Sort(key) => {
                let mut state = lock(&self.state);
                state.sort_reversed = state.sort == *key && !state.sort_reversed;
                state.sort = *key;
            }
        }
    }

    /// Most recent distinct terms other than the active one, oldest first.
    pub fn last_searches(&self) -> Vec<String> {
        let state = lock(&self.state);
        let Some(current) = state.urls.last().map(|u| u.term.as_str()) else {
            return Vec::new();
        };

        let mut terms: Vec<String> = Vec::new();
        for url in state.urls.iter().rev() {
            if url.term == current || terms.contains(&url.term) {
                continue;
            }
            terms.push(url.term.clone());
            if terms.len() == self.app.max_last_searches {
                break;
            }
        }
        terms.reverse();
        terms
    }

    fn search(&self, term: String, page: u32) {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("query", &term)
            .append_pair("page", &page.to_string());
        let request = RequestDescriptor::new("GET", url);

        let generation = {
            let mut state = lock(&self.state);
            state.urls.push(SearchUrl { term, page });
            state.generation += 1;
            state.stories.is_loading = true;
            state.stories.is_error = false;
            state.generation
        };

        // numbered now so that exchanges keep the order the page sent them in
        let pending = self.network.issue(request);
        let network = self.network.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let result = network.complete(pending).await;

            let mut state = lock(&state);
            if state.generation != generation {
                debug!(generation, "Dropping stale response");
                return;
            }
            state.stories.is_loading = false;

            let body = match result {
                Ok(response) if response.is_success() => SearchResponse::from_slice(&response.body)
                    .map_err(|e| format!("invalid body: {}", e)),
                Ok(response) => Err(format!("status {}", response.status)),
                Err(e) => Err(e.to_string()),
            };

            match body {
                Ok(body) => {
                    if page == 0 {
                        state.stories.data = body.hits;
                    } else {
                        state.stories.data.extend(body.hits);
                    }
                    state.stories.page = page;
                    state.stories.is_error = false;
                }
                Err(reason) => {
                    warn!(reason = %reason, "Stories fetch failed");
                    state.stories.is_error = true;
                }
            }
        });
    }

    /// Render the current state.
    pub fn render(&self) -> Element {
        let last_searches = self.last_searches();
        let state = lock(&self.state);

        let search_form = Element::new("form")
            .class("search-form")
            .child(Element::new("label").attr("for", "search").text("Search:"))
            .child(
                Element::new("input")
                    .id("search")
                    .attr("type", "text")
                    .attr("value", &state.input),
            )
            .child(
                Element::new("button")
                    .class("button button_large")
                    .attr("type", "submit")
                    .text("Submit")
                    .disabled(state.input.is_empty())
                    .on_click(Action::Submit),
            );

        let last_searches = Element::new("div").class("last-searches").children(
            last_searches.into_iter().map(|term| {
                Element::new("button")
                    .class("button")
                    .attr("type", "button")
                    .text(term.clone())
                    .on_click(Action::LastSearch(term))
            }),
        );

        let mut root = Element::new("div")
            .class("container")
            .child(Element::new("h1").class("headline-primary").text("My Hacker Stories"))
            .child(search_form)
            .child(last_searches);

        if state.stories.is_error {
            root = root.child(Element::new("p").text(ERROR_MESSAGE));
        }

        if state.stories.is_loading {
            root = root.child(Element::new("p").text(LOADING_MESSAGE));
        } else if !state.stories.is_error {
            let mut stories = state.stories.data.clone();
            state.sort.sort(&mut stories);
            if state.sort_reversed {
                stories.reverse();
            }
            root = root
                .child(self.render_list_header(state.sort))
                .children(stories.iter().map(render_item))
                .child(
                    Element::new("button")
                        .class("button")
                        .attr("type", "button")
                        .text("More")
                        .on_click(Action::More),
                );
        }

        root.child(Element::new("footer").child(Element::new("p").text(FOOTER_TEXT)))
    }

    fn render_list_header(&self, active: SortKey) -> Element {
        let keys = [SortKey::Title, SortKey::Author, SortKey::Comments, SortKey::Points];
        Element::new("div").class("list-header").children(keys.into_iter().map(|key| {
            let class = if key == active {
                "button button-active"
            } else {
                "button"
            };
            Element::new("span").child(
                Element::new("button")
                    .class(class)
                    .attr("type", "button")
                    .text(key.label())
                    .on_click(Action::Sort(key)),
            )
        }))
    }
}

fn render_item(story: &Story) -> Element {
    let mut link = Element::new("a").text(story.title.clone());
    if let Some(url) = &story.url {
        link = link.attr("href", url);
    }
    Element::new("div")
        .class("item")
        .attr("data-object-id", &story.object_id)
        .child(Element::new("span").child(link))
        .child(Element::new("span").class("author").text(story.author.clone()))
        .child(Element::new("span").class("comments").text(story.num_comments.to_string()))
        .child(Element::new("span").class("points").text(story.points.to_string()))
        .child(
            Element::new("span").child(
                Element::new("button")
                    .class("button button_small button-small")
                    .attr("type", "button")
                    .text("Dismiss")
                    .on_click(Action::Dismiss(story.object_id.clone())),
            ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SyntheticBackend;
    use crate::config::InterceptDefinition;
    use crate::dom::Selector;
    use crate::fixtures::Fixtures;
    use std::time::Duration;

    fn setup() -> (HarnessConfig, Arc<Network>) {
        let config = HarnessConfig::default();
        let network = Network::new(
            Arc::new(config.clone()),
            Arc::new(SyntheticBackend::new(config.backend.clone())),
            Arc::new(Fixtures::bundled().unwrap()),
        )
        .unwrap();
        (config, Arc::new(network))
    }

    fn count(page: &StoriesPage, selector: &str) -> usize {
        page.render().select(&Selector::parse(selector).unwrap()).len()
    }

    async fn settle(network: &Network, alias: &str) {
        network.wait(alias, Duration::from_secs(1)).await.unwrap();
        settle_tasks().await;
    }

    // lets the fetch task apply its response
    async fn settle_tasks() {
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_initial_load_renders_first_page() {
        let (config, network) = setup();
        network
            .intercept(InterceptDefinition::get("**/search").named("getStories"))
            .unwrap();
        let page = StoriesPage::open("http://localhost:3000/", &config, network.clone()).unwrap();
        assert_eq!(count(&page, "p:contains(Loading ...)"), 1);

        settle(&network, "getStories").await;
        assert_eq!(count(&page, ".item"), 20);
        assert_eq!(page.input_value(), "React");
        assert!(page.last_searches().is_empty());
    }

    #[tokio::test]
    async fn test_more_appends_next_page() {
        let (config, network) = setup();
        network
            .intercept(InterceptDefinition::get("**/search").named("getStories"))
            .unwrap();
        let page = StoriesPage::open("http://localhost:3000/", &config, network.clone()).unwrap();
        settle(&network, "getStories").await;

        page.perform(&Action::More);
        let exchange = network.wait("getStories", Duration::from_secs(1)).await.unwrap();
        settle_tasks().await;

        assert_eq!(exchange.request.query_params()["page"], "1");
        assert_eq!(exchange.request.query_params()["query"], "React");
        assert_eq!(count(&page, ".item"), 40);
        assert!(page.last_searches().is_empty());
    }

    #[tokio::test]
    async fn test_history_window() {
        let (config, network) = setup();
        network
            .intercept(InterceptDefinition::get("**/search").named("getStories"))
            .unwrap();
        let page = StoriesPage::open("http://localhost:3000/", &config, network.clone()).unwrap();
        settle(&network, "getStories").await;

        for term in ["a", "b", "c", "b", "d", "e", "f"] {
            page.set_input(term);
            page.submit();
            settle(&network, "getStories").await;
        }

        // active term "f" is excluded, the repeated "b" counts once, "React" is evicted
        assert_eq!(page.last_searches(), vec!["a", "c", "b", "d", "e"]);
        assert_eq!(count(&page, ".last-searches button"), 5);
    }

    #[tokio::test]
    async fn test_dismiss_and_sort() {
        let (config, network) = setup();
        network
            .intercept(
                InterceptDefinition::get("**/search")
                    .fixture("stories")
                    .named("getStories"),
            )
            .unwrap();
        let page = StoriesPage::open("http://localhost:3000/", &config, network.clone()).unwrap();
        settle(&network, "getStories").await;

        let first_item = |page: &StoriesPage| {
            let root = page.render();
            let items = root.select(&Selector::parse(".item").unwrap());
            items[0].element.text_content()
        };

        page.perform(&Action::Sort(SortKey::Points));
        assert!(first_item(&page).starts_with("Redux"));
        page.perform(&Action::Sort(SortKey::Points));
        assert!(first_item(&page).starts_with("React"));
        page.perform(&Action::Sort(SortKey::Author));
        assert!(first_item(&page).starts_with("Redux"));

        page.perform(&Action::Dismiss("1".to_string()));
        assert_eq!(count(&page, ".item"), 1);
        assert!(first_item(&page).starts_with("React"));
    }

    #[tokio::test]
    async fn test_failure_renders_error() {
        let (config, network) = setup();
        network
            .intercept(InterceptDefinition::url("GET", "**/search**").status(500).named("fail"))
            .unwrap();
        let page = StoriesPage::open("http://localhost:3000/", &config, network.clone()).unwrap();
        settle(&network, "fail").await;

        assert_eq!(count(&page, &format!("p:contains({})", ERROR_MESSAGE)), 1);
        assert_eq!(count(&page, ".item"), 0);
        assert!(page.render().find_by_text("More").is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_submits_nothing() {
        let (config, network) = setup();
        network
            .intercept(InterceptDefinition::get("**/search").named("getStories"))
            .unwrap();
        let page = StoriesPage::open("http://localhost:3000/", &config, network.clone()).unwrap();
        settle(&network, "getStories").await;

        page.set_input("");
        page.submit();
        settle_tasks().await;

        assert_eq!(network.total_requests(), 1);
        assert!(page.last_searches().is_empty());
        assert_eq!(count(&page, ".item"), 20);
    }

    #[tokio::test]
    async fn test_new_search_clears_error() {
        let (config, network) = setup();
        network
            .intercept(
                InterceptDefinition::get("**/search")
                    .status(500)
                    .times(1)
                    .named("fail"),
            )
            .unwrap();
        network
            .intercept(
                InterceptDefinition::get("**/search")
                    .delay_ms(200)
                    .named("slow"),
            )
            .unwrap();
        let page = StoriesPage::open("http://localhost:3000/", &config, network.clone()).unwrap();
        settle(&network, "fail").await;
        assert_eq!(count(&page, &format!("p:contains({})", ERROR_MESSAGE)), 1);

        page.set_input("Redux");
        page.submit();

        assert_eq!(count(&page, &format!("p:contains({})", LOADING_MESSAGE)), 1);
        assert_eq!(count(&page, &format!("p:contains({})", ERROR_MESSAGE)), 0);
        settle(&network, "slow").await;
        assert_eq!(count(&page, ".item"), 20);
    }
}
