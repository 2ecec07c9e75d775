use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a code-intelligence server. Responses are returned as the raw
/// body text: the dialogue engine feeds them to the model verbatim.
pub struct CodeServerClient {
    client: Client,
    base_url: String,
}

impl CodeServerClient {
    pub fn new(addr: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: ensure_scheme(addr),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_symbol(&self, symbol: &str) -> Result<String> {
        self.call("/api/get_symbol", symbol).await
    }

    pub async fn find_refs(&self, symbol: &str) -> Result<String> {
        self.call("/api/find_refs", symbol).await
    }

    async fn call(&self, path: &str, symbol: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&json!({ "symbol": symbol }))
            .send()
            .await
            .with_context(|| format!("posting to {}{path}", self.base_url))?;
        response.text().await.context("reading code server response")
    }
}

/// Configured endpoints are plain `host:port`; default to http.
pub fn ensure_scheme(addr: &str) -> String {
    let trimmed = addr.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_prepended_when_missing() {
        assert_eq!(ensure_scheme("127.0.0.1:9000"), "http://127.0.0.1:9000");
        assert_eq!(ensure_scheme("http://h:1/"), "http://h:1");
        assert_eq!(ensure_scheme("https://h:1"), "https://h:1");
    }
}
