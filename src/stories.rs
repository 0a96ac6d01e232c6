//! Wire types of the search API.

use serde::{Deserialize, Serialize};

/// One story as returned by `GET /search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    pub author: String,
    #[serde(default)]
    pub num_comments: u32,
    #[serde(default)]
    pub points: u32,
}

/// Body of a search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<Story>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub nb_pages: u32,
}

impl SearchResponse {
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_algolia_shape() {
        let body = br#"{
            "hits": [
                {"objectID": "1", "title": "Hello", "url": "https://a.example", "author": "ann",
                 "num_comments": 3, "points": 10, "created_at": "2020-01-01"}
            ],
            "page": 0,
            "nbPages": 50,
            "hitsPerPage": 20
        }"#;
        let response = SearchResponse::from_slice(body).unwrap();
        assert_eq!(response.nb_pages, 50);
        assert_eq!(response.hits[0].object_id, "1");
        assert_eq!(response.hits[0].num_comments, 3);
    }

    #[test]
    fn test_missing_optional_fields() {
        let body = br#"{"hits": [{"objectID": "9", "title": "Ask HN", "url": null, "author": "bob"}]}"#;
        let response = SearchResponse::from_slice(body).unwrap();
        assert_eq!(response.hits[0].url, None);
        assert_eq!(response.hits[0].points, 0);
        assert_eq!(response.page, 0);
    }
}
