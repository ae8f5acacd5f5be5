//! Source quality assessment from metadata only.
//!
//! Scores are in `[0, 1]`. Nothing here looks at the question; relevance of
//! local chunks comes in through their similarity score.

use crate::types::WebResult;
use crate::web::host_of;
use chrono::{DateTime, Utc};
use delve_core::config::ResearchSettings;

const WEB_BASE: f32 = 0.35;
const TRUSTED_DOMAIN_BONUS: f32 = 0.3;
const HTTPS_BONUS: f32 = 0.1;
const STRUCTURED_BONUS_CAP: f32 = 0.2;
const RECENT_BONUS: f32 = 0.1;
const STALE_PENALTY: f32 = 0.1;

const SUBSTANTIAL_SNIPPET_CHARS: usize = 200;
const CITATION_MARKERS: &[&str] = &["doi", "et al.", "study", "journal", "peer-reviewed"];

#[derive(Debug, Clone)]
pub struct QualityAssessor {
    trusted_domains: Vec<String>,
    threshold: f32,
}

impl QualityAssessor {
    pub fn new(trusted_domains: Vec<String>, threshold: f32) -> Self {
        Self {
            trusted_domains: trusted_domains
                .into_iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            threshold,
        }
    }

    pub fn from_settings(settings: &ResearchSettings) -> Self {
        Self::new(settings.trusted_domains.clone(), settings.quality_threshold)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether a score is good enough for synthesis.
    pub fn passes(&self, score: f32) -> bool {
        score >= self.threshold
    }

    /// Score a local chunk from its normalized similarity and 0-based rank.
    pub fn score_local(&self, similarity: f32, rank: usize) -> f32 {
        let relevance = (2.0 * similarity - 1.0).max(0.0);
        (relevance * 0.8 + 0.2 / (1.0 + rank as f32)).clamp(0.0, 1.0)
    }

    /// Score a web result.
    pub fn score_web(&self, result: &WebResult, now: DateTime<Utc>) -> f32 {
        let mut score = WEB_BASE;

        if let Some(host) = host_of(&result.url) {
            if self.is_trusted(&host) {
                score += TRUSTED_DOMAIN_BONUS;
            }
        }

        if result.url.trim().to_lowercase().starts_with("https://") {
            score += HTTPS_BONUS;
        }

        score += structured_content_bonus(&result.snippet);

        if let Some(published) = result.published_at {
            let age_days = (now - published).num_days();
            if age_days <= 365 {
                score += RECENT_BONUS;
            } else if age_days > 5 * 365 {
                score -= STALE_PENALTY;
            }
        }

        score.clamp(0.0, 1.0)
    }

    /// Suffix match of a host against the trusted list.
    ///
    /// `wikipedia.org` matches `en.wikipedia.org` but not `notwikipedia.org`;
    /// entries starting with a dot (`.gov`) match any host with that suffix.
    pub fn is_trusted(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.trusted_domains.iter().any(|domain| {
            if domain.starts_with('.') {
                host.ends_with(domain.as_str())
            } else {
                host == *domain || host.ends_with(&format!(".{}", domain))
            }
        })
    }
}

fn structured_content_bonus(snippet: &str) -> f32 {
    let lower = snippet.to_lowercase();
    let mut bonus = 0.0;

    if snippet.chars().count() >= SUBSTANTIAL_SNIPPET_CHARS {
        bonus += 0.1;
    }
    if snippet.chars().any(|c| c.is_ascii_digit()) {
        bonus += 0.05;
    }
    if CITATION_MARKERS.iter().any(|marker| lower.contains(marker)) {
        bonus += 0.1;
    }

    f32::min(bonus, STRUCTURED_BONUS_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn assessor() -> QualityAssessor {
        QualityAssessor::from_settings(&ResearchSettings::default())
    }

    fn result(url: &str, snippet: &str) -> WebResult {
        WebResult {
            title: "title".to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
            published_at: None,
        }
    }

    #[test]
    fn test_local_score() {
        let assessor = assessor();
        assert!((assessor.score_local(1.0, 0) - 1.0).abs() < 1e-6);
        assert!((assessor.score_local(0.5, 0) - 0.2).abs() < 1e-6);
        assert!((assessor.score_local(0.2, 3) - 0.05).abs() < 1e-6);
        assert!(assessor.score_local(0.9, 0) > assessor.score_local(0.9, 1));
    }

    #[test]
    fn test_trusted_domain_matching() {
        let assessor = assessor();
        assert!(assessor.is_trusted("en.wikipedia.org"));
        assert!(assessor.is_trusted("wikipedia.org"));
        assert!(assessor.is_trusted("www.nasa.gov"));
        assert!(assessor.is_trusted("cs.stanford.edu"));
        assert!(!assessor.is_trusted("notwikipedia.org"));
        assert!(!assessor.is_trusted("example.com"));
    }

    #[test]
    fn test_web_score_components() {
        let assessor = assessor();
        let now = Utc::now();

        let plain = assessor.score_web(&result("http://example.com/a", "short"), now);
        assert!((plain - WEB_BASE).abs() < 1e-6);
        assert!(!assessor.passes(plain));

        let https = assessor.score_web(&result("https://example.com/a", "short"), now);
        assert!(assessor.passes(https));

        let trusted = assessor.score_web(
            &result(
                "https://en.wikipedia.org/wiki/Rust",
                "A 2019 study by Smith et al. measured it.",
            ),
            now,
        );
        assert!(trusted > https);
        assert!(trusted <= 1.0);
    }

    #[test]
    fn test_recency_adjustment() {
        let assessor = assessor();
        let now = Utc::now();
        let mut recent = result("https://example.com/a", "short");
        recent.published_at = Some(now - Duration::days(30));
        let mut stale = recent.clone();
        stale.published_at = Some(now - Duration::days(10 * 365));
        let undated = result("https://example.com/a", "short");

        let recent_score = assessor.score_web(&recent, now);
        let stale_score = assessor.score_web(&stale, now);
        let undated_score = assessor.score_web(&undated, now);

        assert!(recent_score > undated_score);
        assert!(stale_score < undated_score);
    }

    #[test]
    fn test_structured_bonus_is_capped() {
        let snippet = format!("doi:10.1000/182 study {}", "x".repeat(300));
        assert!((structured_content_bonus(&snippet) - STRUCTURED_BONUS_CAP).abs() < 1e-6);
    }
}
