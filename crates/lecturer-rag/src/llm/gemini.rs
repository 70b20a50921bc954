//! Google Gemini `generateContent` backend.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::TextGenerator;
use crate::config::GenerationConfig;
use crate::rag::strategy::GenerationProfile;

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String, model: &str, endpoint: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;
        let endpoint =
            endpoint.unwrap_or_else(|| format!("{}/{}:generateContent", DEFAULT_BASE, model));

        tracing::info!(model = %model, endpoint = %endpoint, "Creating Gemini generator");
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// Build from config, reading the key from the configured environment variable.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} is not set", config.api_key_env))?;
        if api_key.trim().is_empty() {
            return Err(anyhow!("{} is empty", config.api_key_env));
        }
        Self::new(api_key, &config.model, config.endpoint.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(prompt: &str, profile: &GenerationProfile) -> serde_json::Value {
        json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "temperature": profile.temperature,
                "maxOutputTokens": profile.max_output_tokens,
            }
        })
    }

    fn extract_text(body: &str) -> Result<String> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!("Gemini returned HTML instead of JSON: {}", preview));
        }
        let parsed: GeminiResponse =
            serde_json::from_str(body).context("Failed to parse Gemini response")?;
        parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("No response from Google Gemini"))
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str, profile: &GenerationProfile) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(prompt, profile))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("Google API error ({}): {}", status, body));
        }
        Self::extract_text(&body)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
