use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::providers::http::{
    build_http_client, classify_reqwest_error, classify_status, deterministic_backoff_ms,
    truncate_for_error, HttpConfig, ProviderError, ProviderErrorKind,
};
use crate::providers::ModelProvider;
use crate::types::{GenerateRequest, ModelClass};

/// Local model backend via the Ollama HTTP API. Carries a general model and
/// a code-specialized model; the request's `model_class` picks between them.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    general_model: String,
    code_model: String,
    http: HttpConfig,
}

impl OllamaProvider {
    pub fn new(
        base_url: String,
        general_model: String,
        code_model: String,
        http: HttpConfig,
    ) -> anyhow::Result<Self> {
        let client = build_http_client(http, "failed to build Ollama HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            general_model,
            code_model,
            http,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

fn to_request<'a>(model: &'a str, req: &'a GenerateRequest) -> OllamaRequest<'a> {
    OllamaRequest {
        model,
        prompt: &req.prompt,
        system: req.system.as_deref(),
        stream: false,
        // Ollama supports schema-constrained output; ask for it when the
        // caller wants a structured response.
        format: req.json_format.then_some("json"),
        options: OllamaOptions {
            temperature: req.temperature,
            num_predict: req.max_tokens,
        },
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model_id(&self, class: ModelClass) -> &str {
        match class {
            ModelClass::General => &self.general_model,
            ModelClass::Code => &self.code_model,
        }
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let model = self.model_id(req.model_class).to_string();
        let payload = serde_json::to_value(to_request(&model, req))
            .context("failed to serialize Ollama request")?;
        let max_attempts = self.http.http_max_retries + 1;
        for attempt in 1..=max_attempts {
            let sent = self.client.post(&url).json(&payload).send().await;
            let response = match sent {
                Ok(r) => r,
                Err(e) => {
                    let cls = classify_reqwest_error(&e);
                    if cls.retryable && attempt < max_attempts {
                        let backoff = deterministic_backoff_ms(self.http, attempt - 1);
                        tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                        continue;
                    }
                    return Err(anyhow!(ProviderError {
                        kind: cls.kind,
                        http_status: cls.status,
                        retryable: cls.retryable,
                        attempt,
                        max_attempts,
                        message: format!("failed to call Ollama endpoint: {e}"),
                    }));
                }
            };
            let status = response.status();
            if !status.is_success() {
                let cls = classify_status(status.as_u16());
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if cls.retryable && attempt < max_attempts {
                    let backoff = deterministic_backoff_ms(self.http, attempt - 1);
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                    continue;
                }
                return Err(anyhow!(ProviderError {
                    kind: cls.kind,
                    http_status: Some(status.as_u16()),
                    retryable: cls.retryable,
                    attempt,
                    max_attempts,
                    message: format!(
                        "Ollama endpoint returned HTTP {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 200)
                    ),
                }));
            }
            let bytes = response
                .bytes()
                .await
                .context("failed to read Ollama response body")?;
            if bytes.len() > self.http.max_response_bytes {
                return Err(anyhow!(ProviderError {
                    kind: ProviderErrorKind::PayloadTooLarge,
                    http_status: Some(status.as_u16()),
                    retryable: false,
                    attempt,
                    max_attempts,
                    message: format!(
                        "response exceeded max bytes: {} > {}",
                        bytes.len(),
                        self.http.max_response_bytes
                    ),
                }));
            }
            let resp: OllamaResponse =
                serde_json::from_slice(&bytes).context("failed to parse Ollama JSON response")?;
            return Ok(resp.response);
        }
        Err(anyhow!("unexpected retry loop termination"))
    }
}

#[cfg(test)]
mod tests {
    use super::{to_request, OllamaResponse};
    use crate::types::{GenerateRequest, ModelClass};

    #[test]
    fn request_serializes_json_format_only_when_asked() {
        let mut req = GenerateRequest::new("hello").with_system("sys");
        req.temperature = 0.3;
        req.max_tokens = 256;
        let v = serde_json::to_value(to_request("llama3.2:3b", &req)).expect("serialize");
        assert_eq!(v.get("model").and_then(|m| m.as_str()), Some("llama3.2:3b"));
        assert_eq!(v.get("system").and_then(|s| s.as_str()), Some("sys"));
        assert!(v.get("format").is_none());
        assert_eq!(v["options"]["num_predict"], 256);

        req.json_format = true;
        let v = serde_json::to_value(to_request("llama3.2:3b", &req)).expect("serialize");
        assert_eq!(v.get("format").and_then(|f| f.as_str()), Some("json"));
    }

    #[test]
    fn response_parses_with_missing_field() {
        let resp: OllamaResponse = serde_json::from_str(r#"{"done":true}"#).expect("parse");
        assert_eq!(resp.response, "");
        let resp: OllamaResponse =
            serde_json::from_str(r#"{"response":"hi","done":true}"#).expect("parse");
        assert_eq!(resp.response, "hi");
    }

    #[test]
    fn code_class_selects_code_model() {
        let provider = super::OllamaProvider::new(
            "http://localhost:11434/".to_string(),
            "general".to_string(),
            "coder".to_string(),
            super::HttpConfig::default(),
        )
        .expect("provider");
        use crate::providers::ModelProvider;
        assert_eq!(provider.model_id(ModelClass::General), "general");
        assert_eq!(provider.model_id(ModelClass::Code), "coder");
        assert_eq!(provider.name(), "local");
    }
}
