//! The Hacker Stories scenario catalogue.
//!
//! Two families: scenarios that let searches through to the backend, and
//! scenarios that answer them from the bundled `stories` fixture. Error
//! scenarios force a server error and a transport failure.

use crate::config::InterceptDefinition;
use crate::error::{HarnessError, HarnessResult};
use crate::page::{ERROR_MESSAGE, FOOTER_TEXT};
use crate::scenario::{Group, Scenario, ScenarioFuture};
use crate::session::Session;
use crate::stories::SearchResponse;
use rand::seq::SliceRandom;

const INITIAL_TERM: &str = "React";
const NEW_TERM: &str = "Cypress";

/// Search terms for the last-searches scenario. Never the initial or new term.
const WORDS: &[&str] = &[
    "rust", "tokio", "compiler", "kernel", "database", "network", "parser", "cache", "protocol",
    "terminal", "graphics", "storage", "linux", "wasm", "browser", "editor", "async", "memory",
];

/// All built-in scenarios in declaration order.
pub fn hacker_stories() -> Vec<Scenario> {
    let mut scenarios = Group::new("Hacker Stories")
        .group("Hitting the real API", |g| {
            g.before_each(real_api_setup)
                .scenario(
                    "shows 20 stories, then the next 20 after clicking \"More\"",
                    shows_next_page,
                )
                .scenario("searches via the last searched term", searches_via_last_term)
        })
        .group("Mocking the API", |g| {
            g.before_each(mocked_setup)
                .scenario("shows the footer", shows_footer)
                .group("List of stories", |g| {
                    g.scenario("shows the right data for all rendered stories", shows_story_data)
                        .scenario(
                            "shows one less story after dismissing the first one",
                            dismisses_first_story,
                        )
                        .group("Order by", |g| {
                            g.scenario("orders by title", orders_by_title)
                                .scenario("orders by author", orders_by_author)
                                .scenario("orders by comments", orders_by_comments)
                                .scenario("orders by points", orders_by_points)
                        })
                })
                .group("Search", |g| {
                    g.before_each(search_setup)
                        .scenario("types and hits ENTER", types_and_hits_enter)
                        .scenario("types and clicks the submit button", types_and_clicks_submit)
                        .group("Last searches", |g| {
                            g.scenario(
                                "shows a max of 5 buttons for the last searched terms",
                                shows_max_five_last_searches,
                            )
                        })
                })
        })
        .build();

    scenarios.extend(
        Group::new("Errors")
            .scenario(
                "shows \"Something went wrong ...\" in case of a server error",
                server_error,
            )
            .scenario(
                "shows \"Something went wrong ...\" in case of a network error",
                network_error,
            )
            .build(),
    );
    scenarios
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> HarnessResult<()> {
    if condition {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed(message()))
    }
}

fn search(term: &str, page: u32) -> InterceptDefinition {
    InterceptDefinition::get("**/search")
        .query("query", term)
        .query("page", &page.to_string())
}

fn real_api_setup(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.intercept(search(INITIAL_TERM, 0).named("getStories"))?;
        s.visit("/").await?;
        s.wait("@getStories").await?;
        s.contains("More").should_be_visible().await
    })
}

fn shows_next_page(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.intercept(search(INITIAL_TERM, 1).named("getNextStories"))?;
        s.get(".item")?.should_have_length(20).await?;

        s.contains("More").click().await?;
        let exchange = s.wait("@getNextStories").await?;
        let params = exchange.request.query_params();
        ensure(
            params.get("query").map(String::as_str) == Some(INITIAL_TERM)
                && params.get("page").map(String::as_str) == Some("1"),
            || format!("unexpected next-page request {}", exchange.request.url()),
        )?;

        s.get(".item")?.should_have_length(40).await
    })
}

fn searches_via_last_term(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.intercept(search(NEW_TERM, 0).named("getNewStories"))?;

        let input = s.get("#search")?;
        input.clear().await?;
        input.type_text(&format!("{}{{enter}}", NEW_TERM)).await?;
        s.wait("@getNewStories").await?;

        let shortcut = s.get(&format!(".last-searches button:contains({})", INITIAL_TERM))?;
        shortcut.should_be_visible().await?;
        shortcut.click().await?;
        s.wait("@getStories").await?;

        s.get(".item")?.should_have_length(20).await?;
        s.get(".item")?.first().should_contain(INITIAL_TERM).await?;
        s.get(&format!(".last-searches button:contains({})", NEW_TERM))?
            .should_be_visible()
            .await
    })
}

fn mocked_setup(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.intercept(
            InterceptDefinition::url("GET", &format!("**/search?query={}&page=0", INITIAL_TERM))
                .fixture("stories")
                .named("getStories"),
        )?;
        s.visit("/").await?;
        s.wait("@getStories").await?;
        Ok(())
    })
}

fn shows_footer(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        let footer = s.get("footer")?;
        footer.should_be_visible().await?;
        footer.should_contain(FOOTER_TEXT).await
    })
}

fn shows_story_data(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        let stories: SearchResponse = s.fixture("stories")?;
        s.get(".item")?.should_have_length(stories.hits.len()).await?;

        for (i, story) in stories.hits.iter().enumerate() {
            let item = s.get(".item")?.nth(i);
            item.should_contain(&story.title).await?;
            item.should_contain(&story.author).await?;
            item.should_contain(&story.num_comments.to_string()).await?;
            item.should_contain(&story.points.to_string()).await?;
            if let Some(url) = &story.url {
                s.get(".item a")?.nth(i).should_have_attr("href", url).await?;
            }
        }
        Ok(())
    })
}

fn dismisses_first_story(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.get(".item")?.should_have_length(2).await?;
        s.get(".button-small")?.first().click().await?;
        s.get(".item")?.should_have_length(1).await
    })
}

/// Click a list-header button and check the order, then click again and
/// check the reverse.
async fn check_order(s: &Session, label: &str, order: [&str; 2]) -> HarnessResult<()> {
    let header = s.get(&format!(".list-header button:contains({})", label))?;

    header.click().await?;
    s.get(".item")?.should_contain_in_order(&order).await?;

    header.click().await?;
    s.get(".item")?
        .should_contain_in_order(&[order[1], order[0]])
        .await
}

fn orders_by_title(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move { check_order(s, "Title", ["React", "Redux"]).await })
}

fn orders_by_author(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move { check_order(s, "Author", ["Dan Abramov", "Jordan Walke"]).await })
}

fn orders_by_comments(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move { check_order(s, "Comments", ["React", "Redux"]).await })
}

fn orders_by_points(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move { check_order(s, "Points", ["Redux", "React"]).await })
}

fn search_setup(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.intercept(search(NEW_TERM, 0).named("getNewStories"))?;
        s.get("#search")?.clear().await
    })
}

async fn expect_new_term_results(s: &Session) -> HarnessResult<()> {
    s.wait("@getNewStories").await?;
    s.get(".item")?.should_have_length(20).await?;
    s.get(".item")?.first().should_contain(NEW_TERM).await?;
    s.get(&format!(".last-searches button:contains({})", INITIAL_TERM))?
        .should_be_visible()
        .await
}

fn types_and_hits_enter(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.get("#search")?
            .type_text(&format!("{}{{enter}}", NEW_TERM))
            .await?;
        expect_new_term_results(s).await
    })
}

fn types_and_clicks_submit(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.get("#search")?.type_text(NEW_TERM).await?;
        s.contains("Submit").click().await?;
        expect_new_term_results(s).await
    })
}

fn shows_max_five_last_searches(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.intercept(search("**", 0).named("getRandomStories"))?;

        let terms: Vec<&str> = {
            let mut rng = rand::thread_rng();
            WORDS.choose_multiple(&mut rng, 6).copied().collect()
        };
        let input = s.get("#search")?;
        for term in &terms {
            input.clear().await?;
            input.type_text(&format!("{}{{enter}}", term)).await?;
            s.wait("@getRandomStories").await?;
        }

        s.get(".last-searches button")?.should_have_length(5).await
    })
}

fn shows_error_message(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.visit("/").await?;
        s.wait("@getFailure").await?;
        s.get(&format!("p:contains({})", ERROR_MESSAGE))?
            .should_be_visible()
            .await?;
        s.get(".item")?.should_not_exist().await
    })
}

fn server_error(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.intercept(
            InterceptDefinition::url("GET", "**/search**")
                .status(500)
                .named("getFailure"),
        )?;
        shows_error_message(s).await
    })
}

fn network_error(s: &mut Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        s.intercept(
            InterceptDefinition::url("GET", "**/search**")
                .network_error()
                .named("getFailure"),
        )?;
        shows_error_message(s).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::scenario::ScenarioRunner;

    #[test]
    fn test_catalogue_names() {
        let names: Vec<String> = hacker_stories().iter().map(|s| s.full_name()).collect();
        assert_eq!(names.len(), 14);
        assert_eq!(
            names[0],
            "Hacker Stories > Hitting the real API > shows 20 stories, then the next 20 after clicking \"More\""
        );
        assert!(names.contains(
            &"Hacker Stories > Mocking the API > List of stories > Order by > orders by points".to_string()
        ));
        assert_eq!(names.iter().filter(|n| n.starts_with("Errors > ")).count(), 2);
    }

    #[test]
    fn test_words_exclude_fixed_terms() {
        assert!(WORDS.len() >= 6);
        assert!(!WORDS.iter().any(|w| w.eq_ignore_ascii_case(INITIAL_TERM)));
        assert!(!WORDS.iter().any(|w| w.eq_ignore_ascii_case(NEW_TERM)));
    }

    #[test]
    fn test_search_hooks_inherit_mocked_setup() {
        let scenarios = hacker_stories();
        let enter = scenarios
            .iter()
            .find(|s| s.name == "types and hits ENTER")
            .unwrap();
        assert_eq!(enter.hooks.len(), 2);
    }

    #[tokio::test]
    async fn test_full_catalogue_passes() {
        let runner = ScenarioRunner::new(HarnessConfig::default()).unwrap();
        let report = runner.run_all(&hacker_stories()).await;
        let failures: Vec<_> = report
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| format!("{}: {:?}", r.name, r.error))
            .collect();
        assert!(failures.is_empty(), "{:#?}", failures);
        assert_eq!(report.passed, 14);
    }
}
