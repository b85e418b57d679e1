//! Tenor v2 API client.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};

const TENOR_API_URL: &str = "https://tenor.googleapis.com/v2";

/// Tenor caps result counts at 50 per request.
const MAX_RESULTS: usize = 50;

/// Animated-image lookup capability.
///
/// Provider failures surface as empty result lists, never as errors, so
/// callers only ever deal with the "no results" case.
#[async_trait]
pub trait GifProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize, safe_mode: bool) -> Vec<String>;
    async fn trending(&self, limit: usize) -> Vec<String>;
}

pub struct TenorClient {
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize, Debug)]
struct TenorResponse {
    #[serde(default)]
    results: Vec<TenorResult>,
}

#[derive(Deserialize, Debug)]
struct TenorResult {
    #[serde(default)]
    media_formats: HashMap<String, MediaFormat>,
}

#[derive(Deserialize, Debug)]
struct MediaFormat {
    url: String,
}

/// Pull GIF URLs out of a Tenor response, preferring the full-size format
/// and falling back to `tinygif`. Results with neither are skipped.
fn extract_gif_urls(response: TenorResponse) -> Vec<String> {
    response
        .results
        .into_iter()
        .filter_map(|item| {
            item.media_formats
                .get("gif")
                .or_else(|| item.media_formats.get("tinygif"))
                .map(|format| format.url.clone())
        })
        .collect()
}

impl TenorClient {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self { api_key, client }
    }

    async fn request(&self, endpoint: &str, params: &str) -> Result<Vec<String>, String> {
        let url = format!(
            "{TENOR_API_URL}/{endpoint}?key={}&media_filter=gif&{params}",
            self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("API error {status}"));
        }

        let parsed: TenorResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {e}"))?;

        Ok(extract_gif_urls(parsed))
    }
}

#[async_trait]
impl GifProvider for TenorClient {
    async fn search(&self, query: &str, limit: usize, safe_mode: bool) -> Vec<String> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        let contentfilter = if safe_mode { "high" } else { "off" };
        let params = format!(
            "q={}&limit={}&contentfilter={contentfilter}",
            urlencoding::encode(query),
            limit.min(MAX_RESULTS)
        );

        match self.request("search", &params).await {
            Ok(urls) => {
                info!("🔍 Found {} GIF(s) for \"{query}\"", urls.len());
                urls
            }
            Err(e) => {
                warn!("Tenor search failed: {e}");
                Vec::new()
            }
        }
    }

    async fn trending(&self, limit: usize) -> Vec<String> {
        let params = format!("limit={}", limit.min(MAX_RESULTS));

        match self.request("featured", &params).await {
            Ok(urls) => {
                info!("🔥 Found {} trending GIF(s)", urls.len());
                urls
            }
            Err(e) => {
                warn!("Tenor trending failed: {e}");
                Vec::new()
            }
        }
    }
}
