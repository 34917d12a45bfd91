//! Vision-language model client. Sends one chat-completions request with the
//! fixed meal-estimation instruction plus the tray photo URL and returns the
//! model's text reply verbatim; the caller extracts the fenced JSON from it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Instruction sent with every tray photo. The reply format it demands is
/// what [`crate::pipeline::extract`] parses.
const MEAL_PROMPT: &str = "Analyze the meal tray photo and describe its contents as JSON, \
wrapped in a ```json code fence, using exactly this shape:\n\
{\n\
  \"meals\": [\n\
    {\n\
      \"name\": \"estimated dish name [String]\",\n\
      \"nutrients\": \"estimated nutrients, comma separated [String]\",\n\
      \"weight\": \"estimated weight in grams, number only [Int64]\",\n\
      \"label\": \"staple or side [String]\",\n\
      \"remaining\": \"fraction of a full serving left uneaten, 0 if almost empty, range 0.0-1.0 [Float]\"\n\
    }\n\
  ]\n\
}";

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision request failed")]
    Network(#[source] reqwest::Error),
    /// The request exceeded the configured deadline. Kept distinct from
    /// malformed content so a hung upstream is visible to callers.
    #[error("vision request timed out")]
    Timeout,
    #[error("vision model returned {status}: {body}")]
    Model { status: u16, body: String },
}

#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Returns the raw textual completion for the image at `image_url`.
    /// No guarantee the reply contains valid JSON.
    async fn analyze(&self, image_url: &str) -> Result<String, VisionError>;
}

pub struct OpenAiVision {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrlRef<'a> },
}

#[derive(Serialize)]
struct ImageUrlRef<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OpenAiVision {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens,
        })
    }
}

fn request_error(err: reqwest::Error) -> VisionError {
    if err.is_timeout() {
        VisionError::Timeout
    } else {
        VisionError::Network(err)
    }
}

#[async_trait]
impl VisionClient for OpenAiVision {
    async fn analyze(&self, image_url: &str) -> Result<String, VisionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: MEAL_PROMPT },
                    ContentPart::ImageUrl {
                        image_url: ImageUrlRef { url: image_url },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, "sending tray photo to vision model");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VisionError::Model {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await.map_err(request_error)?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}
