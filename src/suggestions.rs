//! Slug suggestions for a URL.
//!
//! Asks Gemini for candidates and falls back to deterministic domain/date
//! based slugs whenever the model is unavailable or says nothing usable.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::models::SlugSuggestion;
use crate::slug::{date_slug, extract_domain, slugify, timestamp_suffix};

pub const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("suggestion API not configured")]
    NotConfigured,

    #[error("suggestion API returned {0}")]
    Status(reqwest::StatusCode),

    #[error("suggestion API request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Result of a suggestion request; `success` is false when fallbacks were used.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionOutcome {
    pub success: bool,
    pub suggestions: Vec<SlugSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuggestionOutcome {
    fn fallback(link: &str, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            suggestions: fallback_suggestions(link, Utc::now()),
            error: Some(reason.into()),
        }
    }
}

fn prompt(link: &str) -> String {
    format!(
        "Analyze this link and suggest 5 short, descriptive, friendly slugs (30 characters max each):\n\n\
         Link: {link}\n\n\
         Return only the slugs, one per line, with no numbering or extra explanation.\n\
         Example of the desired format:\n\
         react-tutorial\n\
         javascript-guide\n\
         web-development\n\
         frontend-tips\n\
         coding-basics"
    )
}

fn leading_numbering() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[.)\-\s]*").expect("valid regex"))
}

/// Turns model output into at most [`MAX_SUGGESTIONS`] slugs.
pub fn parse_slugs(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| slugify(leading_numbering().replace(line, "").trim()))
        .filter(|slug| !slug.is_empty())
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Deterministic suggestions derived from the URL and `now`.
pub fn fallback_suggestions(link: &str, now: DateTime<Utc>) -> Vec<SlugSuggestion> {
    let ts = timestamp_suffix(now);
    let domain = extract_domain(link)
        .map(|d| slugify(&d))
        .filter(|d| !d.is_empty());

    let Some(domain) = domain else {
        return vec![
            SlugSuggestion::new(format!("link-{ts}"), "Automatic slug"),
            SlugSuggestion::new(format!("atalho-{ts}"), "Alternative slug"),
        ];
    };

    let first_segment = Url::parse(link).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()).map(slugify))
            .filter(|s| !s.is_empty())
    });

    let mut suggestions = Vec::with_capacity(4);
    if let Some(segment) = first_segment {
        suggestions.push(SlugSuggestion::new(
            slugify(&format!("{domain}-{segment}")),
            "Based on domain and path",
        ));
    }
    suggestions.push(SlugSuggestion::new(
        slugify(&format!("{domain}-{ts}")),
        "Based on domain",
    ));
    suggestions.push(SlugSuggestion::new(format!("link-{ts}"), "Generic slug"));
    suggestions.push(SlugSuggestion::new(
        slugify(&format!("{domain}-{}", date_slug(now))),
        "Based on domain and date",
    ));
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

/// Gemini-backed slug suggester.
#[derive(Clone)]
pub struct SuggestionService {
    client: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
    model: String,
}

impl SuggestionService {
    pub fn new(api_key: Option<String>, api_base: String, model: String) -> Result<Self, SuggestionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SuggestionError> {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_api_base.clone(),
            config.gemini_model.clone(),
        )
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Raw model call; returns the parsed slugs, possibly empty.
    pub async fn generate(&self, link: &str) -> Result<Vec<String>, SuggestionError> {
        let api_key = self.api_key.as_deref().ok_or(SuggestionError::NotConfigured)?;
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt(link) }] }],
            "generationConfig": { "temperature": 0.7, "maxOutputTokens": 200 },
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.api_base, self.model
            ))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "suggestion API responded");
        if !status.is_success() {
            return Err(SuggestionError::Status(status));
        }

        let data: GenerateContentResponse = response.json().await?;
        let text = data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();
        Ok(parse_slugs(&text))
    }

    /// Always returns at least one slug-safe suggestion.
    pub async fn suggest(&self, link: &str) -> SuggestionOutcome {
        match self.generate(link).await {
            Ok(slugs) if !slugs.is_empty() => SuggestionOutcome {
                success: true,
                suggestions: slugs
                    .into_iter()
                    .map(|slug| SlugSuggestion::new(slug, "Suggested from the link content"))
                    .collect(),
                error: None,
            },
            Ok(_) => {
                tracing::info!(%link, "no usable slugs from model, using fallback");
                SuggestionOutcome::fallback(link, "Could not generate suggestions, using basic suggestions")
            }
            Err(SuggestionError::NotConfigured) => {
                tracing::info!("no Gemini API key, using fallback suggestions");
                SuggestionOutcome::fallback(link, "Suggestion API not configured, using basic suggestions")
            }
            Err(e) => {
                tracing::warn!(error = %e, %link, "suggestion API failed, using fallback");
                SuggestionOutcome::fallback(link, "Suggestion API error, using basic suggestions")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slug::is_slug_safe;
    use chrono::TimeZone;

    fn service(api_key: Option<&str>, base: &str) -> SuggestionService {
        SuggestionService::new(api_key.map(String::from), base.to_string(), "test-model".into()).unwrap()
    }

    #[test]
    fn numbering_is_stripped() {
        let slugs = parse_slugs("1. React Tutorial\n2) javascript-guide\n\n3 - Web Dev\n   \n!!!\n");
        assert_eq!(slugs, vec!["react-tutorial", "javascript-guide", "web-dev"]);
    }

    #[test]
    fn at_most_five_slugs() {
        let text = (1..=8).map(|i| format!("slug{i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_slugs(&text).len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn fallback_uses_domain_path_and_date() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        let slugs: Vec<_> = fallback_suggestions("https://www.example.com/a/b", now)
            .into_iter()
            .map(|s| s.slug)
            .collect();
        let ts = timestamp_suffix(now);
        assert_eq!(
            slugs,
            vec![
                "examplecom-a".to_string(),
                format!("examplecom-{ts}"),
                format!("link-{ts}"),
                "examplecom-07032024".to_string(),
            ]
        );
    }

    #[test]
    fn fallback_stays_slug_safe_for_long_hosts() {
        let host = format!("{}.example.com", "very-long-subdomain-name".repeat(4));
        let link = format!("https://www.{host}/{}", "segment".repeat(10));
        let suggestions = fallback_suggestions(&link, Utc::now());
        assert_eq!(suggestions.len(), 4);
        for s in &suggestions {
            assert!(is_slug_safe(&s.slug), "unsafe slug {:?}", s.slug);
            assert!(s.slug.len() <= crate::slug::MAX_SLUG_LEN);
        }
    }

    #[test]
    fn fallback_for_garbage_input() {
        let slugs = fallback_suggestions("not a url", Utc::now());
        assert_eq!(slugs.len(), 2);
        assert!(slugs[0].slug.starts_with("link-"));
        assert!(slugs[1].slug.starts_with("atalho-"));
    }

    #[tokio::test]
    async fn unreachable_api_still_yields_safe_suggestions() {
        // nothing listens on port 9
        let outcome = service(Some("key"), "http://127.0.0.1:9").suggest("https://example.com/a").await;
        assert!(!outcome.success);
        assert!(!outcome.suggestions.is_empty());
        assert!(outcome.suggestions.iter().all(|s| is_slug_safe(&s.slug)));
    }

    #[tokio::test]
    async fn missing_key_falls_back_without_calling_out() {
        let outcome = service(None, "http://127.0.0.1:9").suggest("https://example.com").await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not configured"));
        assert!(outcome.suggestions.iter().all(|s| is_slug_safe(&s.slug)));
    }

    #[tokio::test]
    async fn model_output_becomes_suggestions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/test-model:generateContent")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "k".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates":[{"content":{"parts":[{"text":"1. Example A\n2. example-docs\n"}]}}]}"#,
            )
            .create_async()
            .await;

        let outcome = service(Some("k"), &server.url()).suggest("https://example.com/a").await;
        mock.assert_async().await;
        assert!(outcome.success);
        let slugs: Vec<_> = outcome.suggestions.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, vec!["example-a", "example-docs"]);
    }

    #[tokio::test]
    async fn empty_model_output_falls_back() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let outcome = service(Some("k"), &server.url()).suggest("https://example.com/a").await;
        assert!(!outcome.success);
        assert_eq!(outcome.suggestions[0].slug, "examplecom-a");
    }

    #[tokio::test]
    async fn error_status_falls_back() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let outcome = service(Some("k"), &server.url()).suggest("https://example.com").await;
        assert!(!outcome.success);
        assert!(!outcome.suggestions.is_empty());
    }
}
