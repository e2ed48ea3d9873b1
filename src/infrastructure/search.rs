//! Web search provider.
//!
//! Thin JSON API client; only constructed when an API key is configured,
//! so the tool layer can surface the unconfigured case as a structured
//! error instead of a network failure.

use crate::config::SearchEnvConfig;
use crate::domain::ports::SearchProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub struct HttpSearchProvider {
    client: ClientWithMiddleware,
    api_key: String,
    base_url: String,
}

impl HttpSearchProvider {
    /// Returns `None` when no API key is configured.
    pub fn from_config(config: &SearchEnvConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            client: search_http_client(),
            api_key,
            base_url: config.base_url.clone(),
        })
    }
}

/// Search queries are read-only and latency-tolerant: a generous timeout
/// (providers that synthesize an answer routinely take 10s+) and three
/// retries, since repeating a query has no side effects.
fn search_http_client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(&self, query: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct SearchHit {
            title: String,
            url: String,
            #[serde(default)]
            content: String,
        }

        #[derive(Deserialize)]
        struct SearchResponse {
            #[serde(default)]
            answer: Option<String>,
            #[serde(default)]
            results: Vec<SearchHit>,
        }

        let response = self
            .client
            .post(&self.base_url)
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": 5,
            }))
            .send()
            .await
            .context("Search request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Search provider returned {}", response.status());
        }

        let payload: SearchResponse = response
            .json()
            .await
            .context("Invalid search response payload")?;

        let mut formatted = String::new();
        if let Some(answer) = payload.answer {
            formatted.push_str(&answer);
            formatted.push_str("\n\n");
        }
        for hit in payload.results {
            formatted.push_str(&format!("- {} ({})\n  {}\n", hit.title, hit.url, hit.content));
        }
        if formatted.is_empty() {
            formatted.push_str("No results found.");
        }
        Ok(formatted)
    }
}
