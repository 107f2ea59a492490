//! LLM client: natural language in, validated intent out
//!
//! The provider is a single-method capability trait so tests can inject
//! canned text without network access. The parse protocol performs exactly
//! one corrective repair attempt on content-shape failures; transport
//! failures (auth, rate limit, timeout, API) surface immediately and never
//! consume the repair budget.

use crate::core::error::{ClipError, Result};
use crate::core::secrets::sanitize_message;
use crate::llm::schema::Intent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Fixed system instruction enumerating the schema and default policy.
const SYSTEM_PROMPT: &str = "You are an expert assistant that translates natural language into \
media-processing intents. Respond ONLY with JSON matching the Intent schema. Fields: action, \
inputs, output, video_codec, audio_codec, filters, start, end, duration, scale, bitrate, crf, \
overlay_path, overlay_xy, fps, glob, extra_flags. Actions: convert, trim, extract_audio, \
overlay, thumbnail, compress, batch. Use defaults: convert uses libx264+aac; 720p means \
scale=1280x720, 1080p means 1920x1080; compression uses libx265 with crf=28. Times are seconds \
or HH:MM:SS. If the request is unsupported, reply with \
{\"error\": \"unsupported_action\", \"message\": \"...\"}.";

/// Corrective prefix for the single repair attempt.
const REPAIR_PROMPT: &str = "The previous output was invalid. Generate ONLY valid JSON matching \
the Intent schema. Do not include any explanations or markdown formatting.";

/// Transport-level failure from a completion provider.
///
/// Variants are distinguishable so the client can produce actionable
/// messages; none of them triggers the repair attempt.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("authentication failed")]
    Auth,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("API error: {0}")]
    Api(String),
}

/// One-method completion capability.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError>;
}

/// OpenAI chat-completions provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_url: "https://api.openai.com/v1/chat/completions".into(),
            model,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object".into(),
            },
            messages: vec![
                Message {
                    role: "system".into(),
                    content: system.into(),
                },
                Message {
                    role: "user".into(),
                    content: user.into(),
                },
            ],
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(timeout.as_secs())
                } else {
                    ProviderError::Api(sanitize_message(&e.to_string()))
                }
            })?;

        match response.status().as_u16() {
            401 | 403 => return Err(ProviderError::Auth),
            429 => return Err(ProviderError::RateLimited),
            status if status >= 400 => {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Api(sanitize_message(&format!(
                    "status {status}: {body}"
                ))));
            }
            _ => {}
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Api(sanitize_message(&e.to_string())))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Api("empty response".into()))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Structured refusal the system prompt asks for on unsupported requests.
#[derive(Deserialize)]
struct RefusalReply {
    error: String,
    #[serde(default)]
    message: Option<String>,
}

/// Content-shape failure: distinguishes bad JSON from schema mismatch so
/// the final error message can name the right remedy.
enum ShapeError {
    BadJson(String),
    SchemaMismatch(String),
}

/// Stateless client wrapping a completion provider.
pub struct LlmClient {
    provider: Box<dyn CompletionProvider>,
}

impl LlmClient {
    pub fn new(provider: Box<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// Parse a natural-language prompt into a validated [`Intent`].
    ///
    /// `context` is an opaque JSON mapping from the context provider,
    /// forwarded verbatim to the model alongside the prompt.
    pub async fn parse(
        &self,
        nl_prompt: &str,
        context: &serde_json::Value,
        timeout: Duration,
    ) -> Result<Intent> {
        let prompt = nl_prompt.trim();
        if prompt.is_empty() {
            return Err(ClipError::Parse(
                "empty prompt. Describe what you want to do, e.g. \
                 \"convert in.mov to mp4\""
                    .into(),
            ));
        }

        let payload = serde_json::json!({ "prompt": prompt, "context": context }).to_string();

        // Two-attempt loop: the repair budget is structurally enforced.
        let mut last_shape_err: Option<ShapeError> = None;
        for attempt in 0..2 {
            let user = if attempt == 0 {
                payload.clone()
            } else {
                tracing::debug!("reply was malformed, issuing one repair attempt");
                format!("{REPAIR_PROMPT}\n{payload}")
            };

            let raw = self
                .provider
                .complete(SYSTEM_PROMPT, &user, timeout)
                .await
                .map_err(transport_error)?;

            match interpret_reply(&raw) {
                Ok(intent) => {
                    tracing::debug!(action = ?intent.action, attempt, "intent parsed");
                    return Ok(intent);
                }
                Err(shape) => last_shape_err = Some(shape),
            }
        }

        Err(match last_shape_err {
            Some(ShapeError::BadJson(detail)) => ClipError::Parse(format!(
                "model returned invalid JSON after a repair attempt: {detail}. \
                 Try again in a moment or simplify the request"
            )),
            Some(ShapeError::SchemaMismatch(detail)) => ClipError::Parse(format!(
                "model reply did not match the intent schema: {detail}. \
                 Be more specific about the operation and the files involved"
            )),
            // Both attempts returned; one of them must have set the error.
            None => ClipError::Parse("model returned no usable reply".into()),
        })
    }
}

/// Decode a model reply into a validated intent, or classify the failure.
fn interpret_reply(raw: &str) -> std::result::Result<Intent, ShapeError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ShapeError::BadJson(e.to_string()))?;

    // A structured refusal follows the schema-mismatch path so the final
    // error carries the model's own explanation.
    if let Ok(refusal) = serde_json::from_value::<RefusalReply>(value.clone()) {
        let detail = refusal.message.unwrap_or(refusal.error);
        return Err(ShapeError::SchemaMismatch(format!(
            "the model declined the request: {detail}"
        )));
    }

    let intent: Intent = serde_json::from_value(value)
        .map_err(|e| ShapeError::SchemaMismatch(e.to_string()))?;
    intent
        .validate()
        .map_err(|e| ShapeError::SchemaMismatch(e.to_string()))?;
    Ok(intent)
}

/// Translate a transport failure into an actionable parse error.
fn transport_error(err: ProviderError) -> ClipError {
    let message = match err {
        ProviderError::Auth => {
            "authentication failed. Verify OPENAI_API_KEY is correct and active".into()
        }
        ProviderError::RateLimited => {
            "provider rate limit exceeded. Wait a moment and try again".into()
        }
        ProviderError::Timeout(secs) => format!(
            "request timed out after {secs}s. Increase --timeout or check your connection"
        ),
        ProviderError::Api(detail) => format!(
            "provider API error: {detail}. This may be temporary, try again"
        ),
    };
    ClipError::Parse(sanitize_message(&message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Provider double that replays canned replies. The reply list doubles
    /// as the call budget: an extra provider call panics the test.
    struct CannedProvider {
        replies: Mutex<Vec<std::result::Result<String, ProviderError>>>,
    }

    impl CannedProvider {
        fn new(mut replies: Vec<std::result::Result<String, ProviderError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for CannedProvider {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _timeout: Duration,
        ) -> std::result::Result<String, ProviderError> {
            self.replies.lock().unwrap().pop().expect("unexpected extra call")
        }
    }

    const VALID_REPLY: &str = r#"{"action": "convert", "inputs": ["in.mov"], "output": "out.mp4"}"#;

    fn client_with(replies: Vec<std::result::Result<String, ProviderError>>) -> LlmClient {
        LlmClient::new(Box::new(CannedProvider::new(replies)))
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_before_network() {
        let provider = CannedProvider::new(vec![]);
        let client = LlmClient::new(Box::new(provider));
        let err = client
            .parse("   ", &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipError::Parse(_)));
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let client = client_with(vec![Ok(VALID_REPLY.into())]);
        let intent = client
            .parse("convert it", &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(intent.inputs, vec!["in.mov".to_string()]);
    }

    #[tokio::test]
    async fn test_repair_after_malformed_json() {
        let client = client_with(vec![Ok("not json at all".into()), Ok(VALID_REPLY.into())]);
        let intent = client
            .parse("convert it", &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(intent.output.as_deref(), Some("out.mp4"));
    }

    #[tokio::test]
    async fn test_two_schema_failures_fail() {
        let bad = r#"{"action": "convert", "inputs": []}"#;
        let client = client_with(vec![Ok(bad.into()), Ok(bad.into())]);
        let err = client
            .parse("convert it", &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("schema"), "unexpected message: {msg}");
    }

    #[tokio::test]
    async fn test_transport_error_consumes_no_repair() {
        // A single canned error: a second provider call would panic.
        let client = client_with(vec![Err(ProviderError::Auth)]);
        let err = client
            .parse("convert it", &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("authentication"));
    }

    #[tokio::test]
    async fn test_structured_refusal_surfaces_message() {
        let refusal = r#"{"error": "unsupported_action", "message": "cannot edit subtitles"}"#;
        let client = client_with(vec![Ok(refusal.into()), Ok(refusal.into())]);
        let err = client
            .parse("edit subtitles", &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot edit subtitles"));
    }
}
