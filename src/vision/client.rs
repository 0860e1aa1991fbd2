//! Vision-capable LLM clients used to describe rendered slides.
//!
//! Two wire styles are supported: Ollama's native `/api/generate` with an `images` array and
//! OpenAI-compatible `/chat/completions` with an `image_url` data URL part. The style is resolved
//! once from [`VisionConfig`]; requests carry a fixed timeout and are never retried.

use crate::config::{VisionApiStyle, VisionConfig};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while requesting a slide analysis.
#[derive(Debug, Error)]
pub enum VisionError {
    /// HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
    /// Endpoint unreachable or timed out.
    #[error("Vision provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Endpoint answered with a non-success status.
    #[error("Vision request failed: {0}")]
    RequestFailed(String),
    /// Response body could not be interpreted.
    #[error("Malformed vision response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by vision providers.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Describe a base64-encoded PNG according to `prompt`.
    async fn analyze_image(&self, image_base64: &str, prompt: &str)
    -> Result<String, VisionError>;

    /// Short provider label for logs.
    fn provider(&self) -> &'static str;
}

/// Build the client matching the configured API style.
pub fn build_vision_client(config: &VisionConfig) -> Result<Arc<dyn VisionClient>, VisionError> {
    let http = build_http_client(config.timeout)?;
    let style = config.resolved_style();
    tracing::debug!(
        style = ?style,
        base_url = %config.base_url,
        model = %config.model,
        "Resolved vision client"
    );
    Ok(match style {
        VisionApiStyle::OpenAI => Arc::new(OpenAiVisionClient {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }),
        VisionApiStyle::Ollama | VisionApiStyle::Request => Arc::new(OllamaVisionClient {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        }),
    })
}

fn build_http_client(timeout: Duration) -> Result<Client, VisionError> {
    Client::builder()
        .user_agent("rusty-rag/vision")
        .timeout(timeout)
        .build()
        .map_err(|error| VisionError::ClientBuild(error.to_string()))
}

/// Structured analysis prompt for one slide, with neighbouring titles as context.
pub fn build_slide_prompt(
    slide_number: usize,
    total_slides: usize,
    previous_title: Option<&str>,
    next_title: Option<&str>,
) -> String {
    let mut prompt = format!(
        "당신은 프레젠테이션 슬라이드를 분석하는 전문가입니다.\n\
         이 이미지는 전체 {total_slides}장 중 {slide_number}번째 슬라이드입니다.\n"
    );
    if let Some(title) = previous_title.filter(|title| !title.trim().is_empty()) {
        prompt.push_str(&format!("이전 슬라이드 제목: {title}\n"));
    }
    if let Some(title) = next_title.filter(|title| !title.trim().is_empty()) {
        prompt.push_str(&format!("다음 슬라이드 제목: {title}\n"));
    }
    prompt.push_str(
        "\n다음 형식으로 답변하세요.\n\
         1. 주제: 슬라이드의 핵심 주제\n\
         2. 데이터 유형: 표, 차트, 다이어그램 등 시각 자료의 종류와 설명\n\
         3. 주요 수치: 슬라이드에 나타난 숫자와 그 의미\n\
         4. 추세 및 비교: 증감, 순위, 기간별 비교 등\n\
         이미지에 없는 내용은 추측하지 마세요.",
    );
    prompt
}

/// Ollama native multimodal client.
pub struct OllamaVisionClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaVisionClient {
    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default = "default_done")]
    done: bool,
}

fn default_done() -> bool {
    true
}

#[async_trait]
impl VisionClient for OllamaVisionClient {
    async fn analyze_image(
        &self,
        image_base64: &str,
        prompt: &str,
    ) -> Result<String, VisionError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "images": [image_base64],
            "stream": false,
            "options": {
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                VisionError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(VisionError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::RequestFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            VisionError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(VisionError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        let analysis = body.response.trim();
        if analysis.is_empty() {
            return Err(VisionError::InvalidResponse("empty analysis".into()));
        }
        Ok(analysis.to_string())
    }

    fn provider(&self) -> &'static str {
        "ollama"
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiVisionClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiVisionClient {
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl VisionClient for OpenAiVisionClient {
    async fn analyze_image(
        &self,
        image_base64: &str,
        prompt: &str,
    ) -> Result<String, VisionError> {
        let payload = json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{image_base64}") }
                    }
                ]
            }]
        });

        let mut request = self.http.post(self.endpoint()).json(&payload);
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|error| {
            VisionError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::RequestFailed(format!(
                "chat completions returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            VisionError::InvalidResponse(format!("failed to decode chat response: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| VisionError::InvalidResponse("response carried no content".into()))
    }

    fn provider(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn test_http() -> Client {
        build_http_client(Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn ollama_client_sends_image_and_returns_analysis() {
        let server = MockServer::start_async().await;
        let client = OllamaVisionClient {
            http: test_http(),
            base_url: server.base_url(),
            model: "llava".into(),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"model":"llava","images":["aGVsbG8="],"stream":false}"#);
                then.status(200).json_body(json!({
                    "response": "  1. 주제: 매출  ",
                    "done": true
                }));
            })
            .await;

        let analysis = client
            .analyze_image("aGVsbG8=", "describe")
            .await
            .expect("analysis");

        mock.assert();
        assert_eq!(analysis, "1. 주제: 매출");
    }

    #[tokio::test]
    async fn ollama_client_maps_server_errors() {
        let server = MockServer::start_async().await;
        let client = OllamaVisionClient {
            http: test_http(),
            base_url: server.base_url(),
            model: "llava".into(),
        };
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("model not loaded");
            })
            .await;

        let error = client
            .analyze_image("aGVsbG8=", "describe")
            .await
            .expect_err("server error");
        assert!(matches!(error, VisionError::RequestFailed(message) if message.contains("model not loaded")));
    }

    #[tokio::test]
    async fn openai_client_posts_data_url_with_bearer_token() {
        let server = MockServer::start_async().await;
        let client = OpenAiVisionClient {
            http: test_http(),
            base_url: format!("{}/v1", server.base_url()),
            model: "gpt-4o-mini".into(),
            api_key: Some("secret".into()),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer secret")
                    .body_contains("data:image/png;base64,aGVsbG8=");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "Revenue chart" } }]
                }));
            })
            .await;

        let analysis = client
            .analyze_image("aGVsbG8=", "describe")
            .await
            .expect("analysis");
        mock.assert();
        assert_eq!(analysis, "Revenue chart");
    }

    #[tokio::test]
    async fn openai_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        let client = OpenAiVisionClient {
            http: test_http(),
            base_url: server.base_url(),
            model: "m".into(),
            api_key: None,
        };
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client.analyze_image("x", "p").await.expect_err("no content");
        assert!(matches!(error, VisionError::InvalidResponse(_)));
    }

    #[test]
    fn factory_defaults_to_ollama_for_ambiguous_urls() {
        let config = VisionConfig {
            enabled: true,
            base_url: "http://gpu-box:8080".into(),
            ..VisionConfig::default()
        };
        assert_eq!(build_vision_client(&config).expect("client").provider(), "ollama");

        let config = VisionConfig {
            enabled: true,
            api_style: Some(VisionApiStyle::OpenAI),
            ..VisionConfig::default()
        };
        assert_eq!(build_vision_client(&config).expect("client").provider(), "openai");
    }

    #[test]
    fn prompt_mentions_neighbouring_titles() {
        let prompt = build_slide_prompt(2, 5, Some("Agenda"), None);
        assert!(prompt.contains("전체 5장 중 2번째"));
        assert!(prompt.contains("이전 슬라이드 제목: Agenda"));
        assert!(!prompt.contains("다음 슬라이드 제목"));
    }
}
