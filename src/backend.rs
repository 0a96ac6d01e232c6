//! Backends that answer passthrough requests.
//!
//! The harness never reaches a live API: passthrough traffic is served by a
//! [`Backend`], normally the deterministic [`SyntheticBackend`].

use crate::config::BackendSettings;
use crate::error::HarnessResult;
use crate::network::{HttpResponse, RequestDescriptor, TransportError};
use crate::stories::{SearchResponse, Story};
use crate::template::TemplateEngine;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, warn};

/// Answers requests that no intercept rule stubs out.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn handle(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError>;
}

const TOPICS: &[&str] = &[
    "hooks",
    "compiler",
    "performance",
    "testing",
    "release notes",
    "internals",
    "patterns",
    "tooling",
    "state management",
    "accessibility",
];

const AUTHORS: &[&str] = &[
    "pg", "dang", "tptacek", "patio11", "jacquesm", "ingve", "kentcdodds", "gaearon",
    "rauchg", "sama", "zdw", "todsacerdoti",
];

#[derive(Serialize)]
struct TitleContext<'a> {
    query: &'a str,
    topic: &'a str,
    rank: usize,
    page: u32,
}

/// Generates a stable, query-dependent result set for every page.
pub struct SyntheticBackend {
    settings: BackendSettings,
    templates: TemplateEngine,
}

impl SyntheticBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            settings,
            templates: TemplateEngine::new(),
        }
    }

    fn rng_for(&self, query: &str, page: u32) -> StdRng {
        StdRng::seed_from_u64(page_seed(query, page, self.settings.seed))
    }

    /// Build one page of results for `query`.
    pub fn page(&self, query: &str, page: u32) -> HarnessResult<SearchResponse> {
        let per_page = self.settings.hits_per_page;
        let mut hits = Vec::new();

        if page < self.settings.total_pages {
            let mut rng = self.rng_for(query, page);
            let slug: String = query
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
                .collect();

            hits.reserve(per_page);
            for i in 0..per_page {
                let rank = page as usize * per_page + i + 1;
                let topic = TOPICS[rng.gen_range(0..TOPICS.len())];
                let title = self.templates.render(
                    &self.settings.title_template,
                    &TitleContext {
                        query,
                        topic,
                        rank,
                        page,
                    },
                )?;
                let object_id = format!("{}-{}", slug, rank);
                hits.push(Story {
                    url: Some(format!("https://news.example.com/item/{}", object_id)),
                    object_id,
                    title,
                    author: AUTHORS[rng.gen_range(0..AUTHORS.len())].to_string(),
                    num_comments: rng.gen_range(0..500),
                    points: rng.gen_range(1..1000),
                });
            }
        }

        Ok(SearchResponse {
            hits,
            page,
            nb_pages: self.settings.total_pages,
        })
    }
}

#[async_trait]
impl Backend for SyntheticBackend {
    async fn handle(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
        if !request.pathname().ends_with("/search") {
            debug!(url = %request.url(), "Synthetic backend has no such route");
            return Ok(HttpResponse::json(
                404,
                &serde_json::json!({ "message": "Not Found", "status": 404 }),
            ));
        }

        let params = request.query_params();
        let query = params.get("query").map(String::as_str).unwrap_or("");
        let page = match params.get("page").map(|p| p.parse::<u32>()) {
            None => 0,
            Some(Ok(page)) => page,
            Some(Err(_)) => {
                return Ok(HttpResponse::json(
                    400,
                    &serde_json::json!({ "message": "invalid page", "status": 400 }),
                ))
            }
        };

        match self.page(query, page) {
            Ok(body) => Ok(HttpResponse::json(200, &body)),
            Err(e) => {
                warn!(error = %e, "Synthetic backend failed to render page");
                Ok(HttpResponse::json(
                    500,
                    &serde_json::json!({ "message": e.to_string(), "status": 500 }),
                ))
            }
        }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a, fixed so that generated pages stay identical across builds.
fn fnv1a(hash: u64, bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(hash, |h, b| (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

fn page_seed(query: &str, page: u32, seed: u64) -> u64 {
    let hash = fnv1a(FNV_OFFSET, query.as_bytes());
    let hash = fnv1a(hash, &page.to_le_bytes());
    fnv1a(hash, &seed.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SyntheticBackend {
        SyntheticBackend::new(BackendSettings::default())
    }

    #[test]
    fn test_page_has_twenty_hits_containing_term() {
        let response = backend().page("React", 0).unwrap();
        assert_eq!(response.hits.len(), 20);
        assert!(response.hits.iter().all(|s| s.title.contains("React")));
        assert_eq!(response.hits[0].object_id, "react-1");
        assert_eq!(response.nb_pages, 50);
    }

    #[test]
    fn test_pages_are_deterministic_and_distinct() {
        let backend = backend();
        let first = backend.page("Cypress", 1).unwrap();
        let again = backend.page("Cypress", 1).unwrap();
        assert_eq!(first.hits, again.hits);
        assert_eq!(first.hits[0].object_id, "cypress-21");

        let other = backend.page("Cypress", 0).unwrap();
        assert_ne!(first.hits[0].object_id, other.hits[0].object_id);
    }

    #[test]
    fn test_page_seed_is_fixed() {
        assert_eq!(fnv1a(FNV_OFFSET, b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(FNV_OFFSET, b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(page_seed("React", 0, 7), page_seed("React", 0, 7));
        assert_ne!(page_seed("React", 0, 7), page_seed("React", 1, 7));
        assert_ne!(page_seed("React", 0, 7), page_seed("React", 0, 8));
    }

    #[test]
    fn test_past_last_page_is_empty() {
        let backend = SyntheticBackend::new(BackendSettings {
            total_pages: 2,
            ..BackendSettings::default()
        });
        assert!(backend.page("React", 2).unwrap().hits.is_empty());
    }

    #[tokio::test]
    async fn test_handle_search_request() {
        let request = RequestDescriptor::parse(
            "GET",
            "https://hn.algolia.com/api/v1/search?query=Rust%20lang&page=2",
        )
        .unwrap();
        let response = backend().handle(&request).await.unwrap();
        assert_eq!(response.status, 200);

        let body = SearchResponse::from_slice(&response.body).unwrap();
        assert_eq!(body.page, 2);
        assert!(body.hits[0].title.starts_with("Rust lang"));
        assert_eq!(body.hits[0].object_id, "rust-lang-41");
    }

    #[tokio::test]
    async fn test_handle_unknown_route_and_bad_page() {
        let backend = backend();
        let request = RequestDescriptor::parse("GET", "https://hn.algolia.com/api/v1/items/1").unwrap();
        assert_eq!(backend.handle(&request).await.unwrap().status, 404);

        let request = RequestDescriptor::parse("GET", "https://hn.algolia.com/api/v1/search?page=x").unwrap();
        assert_eq!(backend.handle(&request).await.unwrap().status, 400);
    }
}
