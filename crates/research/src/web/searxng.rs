//! SearxNG JSON API adapter.

use super::{transport_error, truncate_chars, WebSearchProvider};
use crate::types::WebResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use delve_core::{AppError, AppResult, RetrievalError};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

const MAX_SNIPPET_CHARS: usize = 5000;

/// Client for a SearxNG instance with the JSON output format enabled.
#[derive(Debug, Clone)]
pub struct SearxngProvider {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    #[serde(default)]
    title: String,
    url: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
}

impl SearxngProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl WebSearchProvider for SearxngProvider {
    fn name(&self) -> &str {
        "searxng"
    }

    #[instrument(skip(self), fields(provider = "searxng"))]
    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
        let url = format!("{}/search", self.endpoint);

        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| transport_error("searxng", self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::SearchUnavailable(format!(
                "searxng returned HTTP {}",
                status
            ))
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error("searxng", self.timeout, e))?;

        parse_response(&body, max_results)
    }
}

/// Normalize a SearxNG JSON payload.
pub(crate) fn parse_response(body: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
    let parsed: SearxngResponse = serde_json::from_str(body).map_err(|e| {
        RetrievalError::SearchUnavailable(format!("invalid searxng response: {}", e))
    })?;

    Ok(parsed
        .results
        .into_iter()
        .filter_map(|r| {
            let url = r.url.filter(|u| !u.trim().is_empty())?;
            Some(WebResult {
                title: if r.title.trim().is_empty() {
                    url.clone()
                } else {
                    r.title.trim().to_string()
                },
                snippet: truncate_chars(r.content.trim(), MAX_SNIPPET_CHARS),
                published_at: r.published_date.as_deref().and_then(parse_date),
                url,
            })
        })
        .take(max_results)
        .collect())
}

/// Parse the date formats SearxNG engines emit.
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
