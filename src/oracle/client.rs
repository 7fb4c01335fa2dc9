//! Chat-completion transport.
//!
//! [`ChatCompletion`] is the seam between the pipeline and the model
//! provider. [`OpenRouterClient`] is the production implementation over any
//! OpenAI-compatible endpoint; tests swap in [`MockOracle`].

use std::path::Path;
use std::time::Duration;

use base64::Engine;

use super::OracleError;
use crate::config::OracleConfig;

/// One image inlined into a chat request as a data URL.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime: String,
    pub base64: String,
}

impl InlineImage {
    pub fn from_file(path: &Path, mime: &str) -> Result<Self, OracleError> {
        let bytes = std::fs::read(path)
            .map_err(|e| OracleError::ImageRead(format!("{}: {e}", path.display())))?;
        Ok(Self {
            mime: mime.to_string(),
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

/// A single-turn chat request, optionally multimodal.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user_text: String,
    pub images: Vec<InlineImage>,
}

/// Transport seam for the mapping oracle.
pub trait ChatCompletion {
    /// Send one request and return the assistant message content.
    fn complete(&self, request: &ChatRequest) -> Result<String, OracleError>;
}

impl<T: ChatCompletion + ?Sized> ChatCompletion for &T {
    fn complete(&self, request: &ChatRequest) -> Result<String, OracleError> {
        (**self).complete(request)
    }
}

/// Blocking client for an OpenAI-compatible chat completions endpoint.
pub struct OpenRouterClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let user_content = if request.images.is_empty() {
            serde_json::Value::String(request.user_text.clone())
        } else {
            let mut parts = vec![serde_json::json!({
                "type": "text",
                "text": request.user_text,
            })];
            for image in &request.images {
                parts.push(serde_json::json!({
                    "type": "image_url",
                    "image_url": { "url": image.data_url() },
                }));
            }
            serde_json::Value::Array(parts)
        };

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": user_content }));

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.1,
        })
    }
}

impl ChatCompletion for OpenRouterClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(%url, model = %self.model, images = request.images.len(), "calling oracle");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "formfill")
            .header("X-Title", "formfill")
            .json(&self.request_body(request))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout
                } else if e.is_connect() {
                    OracleError::Connection(e.to_string())
                } else {
                    OracleError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::Api { status: status.as_u16(), body });
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or(OracleError::MalformedResponse)?;
        Ok(content.to_string())
    }
}

/// Scripted oracle for tests: replays canned responses in order and records
/// every request it receives.
#[cfg(test)]
pub struct MockOracle {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, OracleError>>>,
    pub requests: std::sync::Mutex<Vec<ChatRequest>>,
}

#[cfg(test)]
impl MockOracle {
    pub fn returning(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    pub fn failing(error: OracleError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    pub fn sequence(responses: &[&str]) -> Self {
        Self::scripted(responses.iter().map(|r| Ok(r.to_string())).collect())
    }

    fn scripted(responses: Vec<Result<String, OracleError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[cfg(test)]
impl ChatCompletion for MockOracle {
    fn complete(&self, request: &ChatRequest) -> Result<String, OracleError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock oracle ran out of scripted responses")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_plain_string_without_images() {
        let config = OracleConfig {
            base_url: "https://openrouter.ai/api/v1".into(),
            api_key: "k".into(),
            model: "m".into(),
            timeout_secs: 60,
        };
        let client = OpenRouterClient::new(&config).unwrap();
        let body = client.request_body(&ChatRequest {
            system: None,
            user_text: "hello".into(),
            images: Vec::new(),
        });
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["temperature"], 0.1);
    }

    #[test]
    fn request_body_inlines_images_as_data_urls() {
        let config = OracleConfig {
            base_url: "https://openrouter.ai/api/v1/".into(),
            api_key: "k".into(),
            model: "m".into(),
            timeout_secs: 60,
        };
        let client = OpenRouterClient::new(&config).unwrap();
        let body = client.request_body(&ChatRequest {
            system: Some("sys".into()),
            user_text: "describe".into(),
            images: vec![InlineImage { mime: "image/png".into(), base64: "QUJD".into() }],
        });
        assert_eq!(body["messages"][0]["role"], "system");
        let content = &body["messages"][1]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(
            content[1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
    }
}
