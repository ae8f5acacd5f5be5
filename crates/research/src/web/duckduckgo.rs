//! DuckDuckGo Instant Answer API adapter.
//!
//! The Instant Answer API has no API key and returns an abstract plus a
//! tree of related topics rather than a classic result list. Both are
//! flattened into `WebResult`s, abstract first.

use super::{transport_error, truncate_chars, WebSearchProvider};
use crate::types::WebResult;
use async_trait::async_trait;
use delve_core::{AppError, AppResult, RetrievalError};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

const DEFAULT_BASE_URL: &str = "https://api.duckduckgo.com";
const MAX_SNIPPET_CHARS: usize = 5000;

#[derive(Debug, Clone)]
pub struct DuckDuckGoProvider {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a topic or a named group of topics.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

impl DuckDuckGoProvider {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("delve/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl WebSearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    #[instrument(skip(self), fields(provider = "duckduckgo"))]
    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| transport_error("duckduckgo", self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::SearchUnavailable(format!(
                "duckduckgo returned HTTP {}",
                status
            ))
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error("duckduckgo", self.timeout, e))?;

        parse_response(&body, max_results)
    }
}

/// Flatten an Instant Answer payload into ranked results.
pub(crate) fn parse_response(body: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
    let answer: InstantAnswer = serde_json::from_str(body).map_err(|e| {
        RetrievalError::SearchUnavailable(format!("invalid duckduckgo response: {}", e))
    })?;

    let mut results = Vec::new();

    if !answer.abstract_text.trim().is_empty() && !answer.abstract_url.trim().is_empty() {
        results.push(WebResult {
            title: if answer.heading.trim().is_empty() {
                answer.abstract_url.clone()
            } else {
                answer.heading.trim().to_string()
            },
            url: answer.abstract_url.clone(),
            snippet: truncate_chars(answer.abstract_text.trim(), MAX_SNIPPET_CHARS),
            published_at: None,
        });
    }

    flatten_topics(&answer.related_topics, &mut results);
    results.truncate(max_results);

    Ok(results)
}

fn flatten_topics(topics: &[RelatedTopic], out: &mut Vec<WebResult>) {
    for topic in topics {
        match topic {
            RelatedTopic::Topic { text, first_url } => {
                if text.trim().is_empty() || first_url.trim().is_empty() {
                    continue;
                }
                // Topic text reads "Title - description"
                let title = text
                    .split(" - ")
                    .next()
                    .unwrap_or(text)
                    .trim()
                    .to_string();
                out.push(WebResult {
                    title,
                    url: first_url.clone(),
                    snippet: truncate_chars(text.trim(), MAX_SNIPPET_CHARS),
                    published_at: None,
                });
            }
            RelatedTopic::Group { topics } => flatten_topics(topics, out),
        }
    }
}
