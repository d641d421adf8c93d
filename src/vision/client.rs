use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;

use super::error::InferenceError;
use super::types::{
    ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl, MessageContent,
};
use super::{Extraction, InferenceClient};
use crate::clean::clean_output;

pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

const SYSTEM_PROMPT: &str = "You are an OCR-style vision assistant. Read ONLY the item tooltip text \
    in the image and return it exactly as it appears, preserving line breaks, with no commentary. \
    Leave out control hints such as 'Shift + Left Click to Unequip' and, for set items, the list of \
    other set pieces at the bottom. After the item text add one line \
    [CATEGORY: X] where X is one of WEAPON, ARMOR, CHARM, RING, AMULET, JEWEL, GEM, RUNE, MISC.";
const USER_PROMPT: &str =
    "Extract the exact text content from this item tooltip. Only output the text, no explanations.";

const MAX_TOKENS: u32 = 1024;

/// OpenAI-compatible chat-completions client that sends one screenshot per call.
pub struct VisionClient {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

impl VisionClient {
    /// `timeout` bounds the whole request; the batch scheduler applies its own ceiling on top.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: endpoint.into(),
            client,
        })
    }

    fn build_request(&self, data_uri: String) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: MessageContent::Text(SYSTEM_PROMPT.into()),
                },
                ChatMessage {
                    role: "user".into(),
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: USER_PROMPT.into(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: data_uri },
                        },
                    ]),
                },
            ],
            temperature: 0.0,
            max_tokens: MAX_TOKENS,
        }
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, InferenceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(InferenceError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(InferenceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response.text().await?;
        parse_completion(&raw)
    }
}

#[async_trait]
impl InferenceClient for VisionClient {
    async fn extract(&self, source: &Path) -> Result<Extraction, InferenceError> {
        let data_uri = encode_data_uri(source).await?;
        let req = self.build_request(data_uri);
        let body = self.send(&req).await?;

        let raw_text = body.choices.first().map_or("", |c| c.message.text());
        let cleaned = clean_output(raw_text);

        Ok(Extraction {
            text: cleaned.tagged(),
            category: Some(cleaned.category),
            usage: body.usage,
        })
    }
}

/// Parses a 2xx body, keeping the raw payload on failure so it can be logged.
fn parse_completion(raw: &str) -> Result<ChatResponse, InferenceError> {
    let parsed: ChatResponse =
        serde_json::from_str(raw).map_err(|e| InferenceError::MalformedResponse {
            reason: e.to_string(),
            raw: raw.to_string(),
        })?;
    let reason = match parsed.choices.first() {
        None => "response has no choices",
        Some(choice) if !choice.message.has_content() => "response has no content",
        Some(_) => return Ok(parsed),
    };
    Err(InferenceError::MalformedResponse {
        reason: reason.into(),
        raw: raw.to_string(),
    })
}

/// Reads the file as-is and wraps it in a base64 `data:` URI. No decoding or re-encoding.
async fn encode_data_uri(path: &Path) -> Result<String, InferenceError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| InferenceError::InputUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if bytes.is_empty() {
        return Err(InferenceError::InputUnreadable {
            path: path.to_path_buf(),
            reason: "file is empty".into(),
        });
    }
    Ok(format!("data:{};base64,{}", mime_for(path), STANDARD.encode(bytes)))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}
