use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::providers::http::{
    build_http_client, classify_reqwest_error, classify_status, deterministic_backoff_ms,
    truncate_for_error, HttpConfig, ProviderError,
};
use crate::providers::ModelProvider;
use crate::types::{GenerateRequest, ModelClass};

/// Remote model backend speaking the OpenAI chat-completions dialect
/// (Groq, Gemini's OpenAI endpoint, and most hosted providers).
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    http: HttpConfig,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: String,
        base_url: String,
        api_key: Option<String>,
        model: String,
        http: HttpConfig,
    ) -> anyhow::Result<Self> {
        let client = build_http_client(http, "failed to build remote provider HTTP client")?;
        Ok(Self {
            name,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            http,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: ChatChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn to_request(model: &str, req: &GenerateRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &req.system {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &req.prompt,
    });
    let mut payload = json!({
        "model": model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "temperature": req.temperature,
    });
    if req.json_format {
        payload["response_format"] = json!({"type": "json_object"});
    }
    payload
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_id(&self, _class: ModelClass) -> &str {
        &self.model
    }

    /// Remote availability means "configured", not "reachable": the router
    /// already owns the connectivity probe, and a liveness round-trip per
    /// request would double the latency budget.
    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = to_request(&self.model, req);
        let max_attempts = self.http.http_max_retries + 1;
        for attempt in 1..=max_attempts {
            let mut request = self.client.post(&url).json(&payload);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            let sent = request.send().await;
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
                        message: format!("failed to call {} endpoint: {e}", self.name),
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
                        "{} endpoint returned HTTP {}: {}",
                        self.name,
                        status.as_u16(),
                        truncate_for_error(&body, 200)
                    ),
                }));
            }
            let resp: ChatResponse = response
                .json()
                .await
                .with_context(|| format!("failed to parse {} JSON response", self.name))?;
            let text = resp
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| anyhow!("{} response contained no choices", self.name))?;
            return Ok(text);
        }
        Err(anyhow!("unexpected retry loop termination"))
    }
}

#[cfg(test)]
mod tests {
    use super::{to_request, ChatResponse, OpenAiCompatProvider};
    use crate::providers::http::HttpConfig;
    use crate::providers::ModelProvider;
    use crate::types::GenerateRequest;

    fn provider(api_key: Option<&str>) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "groq".to_string(),
            "https://api.groq.com/openai/v1/".to_string(),
            api_key.map(ToString::to_string),
            "llama-3.3-70b-versatile".to_string(),
            HttpConfig::default(),
        )
        .expect("provider")
    }

    #[test]
    fn request_shape_matches_chat_completions() {
        let req = GenerateRequest::new("hi").with_system("be terse");
        let v = to_request("m1", &req);
        assert_eq!(v["model"], "m1");
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["messages"][1]["content"], "hi");
        assert!(v.get("response_format").is_none());
    }

    #[test]
    fn json_format_requests_json_object_response() {
        let mut req = GenerateRequest::new("classify this");
        req.json_format = true;
        let v = to_request("m1", &req);
        assert_eq!(v["response_format"]["type"], "json_object");
    }

    #[test]
    fn response_extracts_first_choice_content() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"answer"}},{"message":{"content":"other"}}]}"#,
        )
        .expect("parse");
        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .expect("content");
        assert_eq!(text, "answer");
    }

    #[tokio::test]
    async fn availability_tracks_api_key_presence() {
        assert!(provider(Some("k")).is_available().await);
        assert!(!provider(None).is_available().await);
    }
}
