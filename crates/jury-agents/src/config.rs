use serde::Deserialize;
use std::time::Duration;

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
}

/// Top-level runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Juror dialogue model
    pub endpoint: Endpoint,
    /// Per-turn request timeout.
    pub request_timeout: Duration,
    /// Sampling temperature for juror turns.
    pub temperature: f32,
    /// Max tokens per juror turn.
    pub max_tokens: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint {
                url: std::env::var("JURY_LLM_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
                model: std::env::var("JURY_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
                api_key: std::env::var("JURY_LLM_API_KEY").ok(),
            },
            request_timeout: Duration::from_secs(
                std::env::var("JURY_LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            temperature: 0.7,
            max_tokens: 400,
        }
    }
}

impl RunnerConfig {
    /// Full chat completions URL for the configured endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.url.trim_end_matches('/'))
    }
}

/// Check if an inference endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_trims_slash() {
        let mut config = RunnerConfig::default();
        config.endpoint.url = "http://host:9000/v1/".into();
        assert_eq!(config.completions_url(), "http://host:9000/v1/chat/completions");
    }
}
