//! Web search connector.
//!
//! Providers adapt a concrete search API to [`WebSearchProvider`]; the
//! [`WebSearchConnector`] adds the per-call timeout and bounded retry that
//! every external call carries.

pub mod duckduckgo;
pub mod searxng;

pub use duckduckgo::DuckDuckGoProvider;
pub use searxng::SearxngProvider;

use crate::types::WebResult;
use async_trait::async_trait;
use delve_core::config::WebSettings;
use delve_core::{retry_with_backoff, AppError, AppResult, RetrievalError, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A search backend returning ranked results.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// Provider name (e.g., "searxng")
    fn name(&self) -> &str;

    /// Run a query. An empty result list is a valid outcome.
    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>>;
}

/// Create the configured provider; `None` when web search is disabled.
pub fn create_provider(
    settings: &WebSettings,
    timeout: Duration,
) -> AppResult<Option<Arc<dyn WebSearchProvider>>> {
    match settings.provider.as_str() {
        "none" => Ok(None),
        "duckduckgo" => {
            let mut provider = DuckDuckGoProvider::new(timeout)?;
            if let Some(endpoint) = &settings.endpoint {
                provider = provider.with_base_url(endpoint.clone());
            }
            Ok(Some(Arc::new(provider)))
        }
        "searxng" => {
            let endpoint = settings.endpoint.clone().ok_or_else(|| {
                AppError::Config("Web provider 'searxng' requires web.endpoint".to_string())
            })?;
            Ok(Some(Arc::new(SearxngProvider::new(endpoint, timeout)?)))
        }
        other => Err(AppError::Config(format!(
            "Unknown web provider: '{}'. Supported providers: searxng, duckduckgo, none",
            other
        ))),
    }
}

/// Provider plus timeout and retry policy.
#[derive(Clone)]
pub struct WebSearchConnector {
    provider: Arc<dyn WebSearchProvider>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl WebSearchConnector {
    pub fn new(provider: Arc<dyn WebSearchProvider>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            provider,
            timeout,
            retry,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Search with timeout and retry.
    ///
    /// An attempt that runs past the timeout fails with
    /// `RetrievalError::Timeout`.
    pub async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
        let label = format!("{} search", self.provider.name());

        let mut results = retry_with_backoff(self.retry, &label, move || async move {
            match tokio::time::timeout(self.timeout, self.provider.search(query, max_results)).await
            {
                Ok(result) => result,
                Err(_) => Err(RetrievalError::Timeout {
                    operation: "web_search".to_string(),
                    millis: self.timeout.as_millis() as u64,
                }
                .into()),
            }
        })
        .await?;

        results.truncate(max_results);
        tracing::debug!(
            "{} returned {} results for '{}'",
            self.provider.name(),
            results.len(),
            query
        );
        Ok(results)
    }
}

/// Normalize a URL for deduplication.
///
/// Lowercases scheme and host, drops a leading `www.`, the fragment, any
/// `utm_*` query parameter and a trailing slash. Unparseable input is
/// trimmed and lowercased.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.trim().trim_end_matches('/').to_lowercase();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.to_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    // Url already lowercases scheme and host
    let host = url
        .host_str()
        .map(|h| h.strip_prefix("www.").unwrap_or(h).to_string())
        .unwrap_or_default();
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    let query = url.query().map(|q| format!("?{}", q)).unwrap_or_default();

    format!("{}://{}{}{}{}", url.scheme(), host, port, path, query)
}

/// Host of a URL without a leading `www.`.
pub fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Cut `text` to at most `max_chars` characters.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Map a reqwest failure to the retrieval taxonomy.
pub(crate) fn transport_error(provider: &str, timeout: Duration, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        RetrievalError::Timeout {
            operation: "web_search".to_string(),
            millis: timeout.as_millis() as u64,
        }
        .into()
    } else {
        RetrievalError::SearchUnavailable(format!("{}: {}", provider, e)).into()
    }
}
