use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::prompts;
use super::AnalysisProvider;
use crate::domain::error::{AnalysisError, AppError};
use crate::domain::settings::AppSettings;
use crate::domain::types::{GrammarAnalysis, RewriteOutput, RewriteStyle};
use crate::infra::storage::CredentialStore;

/// Gemini API を使用した解析プロバイダ
pub struct GeminiProvider {
    client: reqwest::Client,
    credentials: CredentialStore,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiProvider {
    pub fn new(credentials: CredentialStore, settings: &AppSettings) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("HTTP クライアント作成に失敗: {e}")))?;

        Ok(Self {
            client,
            credentials,
            model: settings.model.clone(),
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate<T: DeserializeOwned>(
        &self,
        prompt: String,
        schema: Value,
    ) -> Result<T, AnalysisError> {
        // 資格情報が無ければ通信しない
        let api_key = self
            .credentials
            .resolve()
            .ok_or(AnalysisError::MissingCredential)?;

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: Some(prompt) }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: schema,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::NetworkFailure("request timed out".to_string())
                } else {
                    AnalysisError::NetworkFailure(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let data: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::MalformedResponse(format!("Response parse error: {e}")))?;

        let text = extract_text(data)?;
        log::debug!("{} 応答: {} bytes", self.model, text.len());

        serde_json::from_str(&text)
            .map_err(|e| AnalysisError::MalformedResponse(format!("Invalid JSON from model: {e}")))
    }
}

/// 非 2xx 応答の分類
fn status_error(status: u16, body: &str) -> AnalysisError {
    let payload = format!("Gemini API error: {status} - {body}");
    match status {
        429 => AnalysisError::RateLimited(payload),
        503 => AnalysisError::ServiceOverloaded(payload),
        _ => AnalysisError::classify(&payload),
    }
}

/// 先頭候補のテキストパートを連結する
fn extract_text(data: GenerateResponse) -> Result<String, AnalysisError> {
    let text: String = data
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .unwrap_or_default()
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if text.is_empty() {
        return Err(AnalysisError::MalformedResponse(
            "No response text from Gemini".to_string(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl AnalysisProvider for GeminiProvider {
    async fn analyze_grammar(&self, text: &str) -> Result<GrammarAnalysis, AnalysisError> {
        self.generate(
            prompts::grammar_prompt(text),
            prompts::grammar_response_schema(),
        )
        .await
    }

    async fn rewrite(
        &self,
        text: &str,
        style: RewriteStyle,
    ) -> Result<RewriteOutput, AnalysisError> {
        self.generate(
            prompts::rewrite_prompt(text, style),
            prompts::rewrite_response_schema(),
        )
        .await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::infra::storage::MemoryStore;

    fn provider_without_key() -> GeminiProvider {
        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
        GeminiProvider::new(credentials, &AppSettings::default()).unwrap()
    }

    #[test]
    fn test_gemini_provider_name() {
        assert_eq!(provider_without_key().name(), "gemini");
    }

    #[test]
    fn test_endpoint() {
        let provider = provider_without_key();
        assert_eq!(
            provider.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let provider = provider_without_key();
        let err = provider.analyze_grammar("text").await.unwrap_err();
        assert_eq!(err, AnalysisError::MissingCredential);
        let err = provider
            .rewrite("text", RewriteStyle::Formal)
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::MissingCredential);
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(
            status_error(429, "Too Many Requests"),
            AnalysisError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(503, ""),
            AnalysisError::ServiceOverloaded(_)
        ));
        assert!(matches!(
            status_error(400, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#),
            AnalysisError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(400, "API key not valid"),
            AnalysisError::NetworkFailure(_)
        ));
    }

    #[test]
    fn test_extract_text() {
        let data: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(data).unwrap(), "{\"a\":1}");

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(
            extract_text(empty),
            Err(AnalysisError::MalformedResponse(_))
        ));
    }
}
