use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::{GenerationParams, ReferenceImage, RequestPart, ThumbnailParams};
use crate::prompt;
use crate::state::Submission;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("API error: status={status} body={body}")] Api { status: u16, body: String },
    #[error("parse error: {0}")] Parse(String),
    #[error("no image data found in response")] NoImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Generate,
    Edit,
    Thumbnail,
}

impl Operation {
    fn failure_message(self) -> &'static str {
        match self {
            Operation::Generate => "Failed to generate image. Please check your prompt and API key.",
            Operation::Edit => "Failed to edit image. The model may not have been able to apply the change.",
            Operation::Thumbnail => "Failed to generate thumbnail. Please check your prompt and API key.",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Operation::Generate => "image generation",
            Operation::Edit => "image edit",
            Operation::Thumbnail => "thumbnail generation",
        }
    }
}

/// Failure surfaced to users. `Display` is the generic message only; the
/// underlying cause stays reachable through `cause()` for logs and tests.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DispatchError {
    operation: Operation,
    message: &'static str,
    #[source]
    cause: GeminiError,
}

impl DispatchError {
    fn new(operation: Operation, cause: GeminiError) -> Self {
        Self { operation, message: operation.failure_message(), cause }
    }

    pub fn operation(&self) -> Operation { self.operation }
    pub fn cause(&self) -> &GeminiError { &self.cause }
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => arr.iter_mut().for_each(truncate_base64_in_json),
        _ => {}
    }
}

fn loggable(value: &serde_json::Value) -> String {
    let mut copy = value.clone();
    truncate_base64_in_json(&mut copy);
    copy.to_string()
}

// --- Response Parsing ---

#[derive(Debug, Deserialize, Default)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate { #[serde(default)] pub content: Content }

#[derive(Debug, Deserialize, Default)]
pub struct Content { #[serde(default)] pub parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Inline {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
    Text { text: String },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
pub struct InlineData {
    pub data: String,
    #[serde(rename = "mimeType", alias = "mime_type")]
    pub mime_type: String,
}

/// First inline image of the first candidate, as a data URI.
pub fn extract_first_image(resp: &GenerateContentResponse) -> Option<String> {
    let candidate = resp.candidates.first()?;
    candidate.content.parts.iter().find_map(|part| match part {
        Part::Inline { inline_data } => {
            debug!("🎯 Found image data with mime type: {}", inline_data.mime_type);
            Some(ReferenceImage::new(inline_data.data.as_str(), inline_data.mime_type.as_str()).to_data_uri())
        }
        Part::Text { text } => {
            debug!("💬 Model text part: {}", text);
            None
        }
        Part::Other(value) => {
            debug!("Skipping unrecognised part: {}", value);
            None
        }
    })
}

fn part_json(part: &RequestPart) -> serde_json::Value {
    match part {
        RequestPart::Text(text) => json!({ "text": text }),
        RequestPart::InlineImage(image) => json!({
            "inlineData": { "mimeType": image.mime_type, "data": image.data }
        }),
    }
}

pub fn request_body(parts: &[RequestPart]) -> serde_json::Value {
    json!({
        "contents": [{
            "parts": parts.iter().map(part_json).collect::<Vec<_>>()
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE"]
        }
    })
}

/// The external image model: one call per request, no retries.
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate_content(&self, parts: &[RequestPart]) -> Result<GenerateContentResponse, GeminiError>;
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GeminiError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.api_base.clone(),
            model: config.image_model.clone(),
        })
    }
}

#[async_trait]
impl ImageModel for GeminiClient {
    async fn generate_content(&self, parts: &[RequestPart]) -> Result<GenerateContentResponse, GeminiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        let body = request_body(parts);
        debug!("📤 Request body: {}", loggable(&body));

        let response = self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.without_url().to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api { status: status.as_u16(), body });
        }

        let response_text = response.text().await
            .map_err(|e| GeminiError::Http(e.without_url().to_string()))?;

        let value: serde_json::Value = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Parse(e.to_string()))?;
        debug!("📥 Raw Gemini API response: {}", loggable(&value));

        serde_json::from_value(value).map_err(|e| GeminiError::Parse(e.to_string()))
    }
}

/// Sends one request per call and turns the reply into a data URI.
#[derive(Clone)]
pub struct Dispatcher {
    model: Arc<dyn ImageModel>,
}

impl Dispatcher {
    pub fn new(model: Arc<dyn ImageModel>) -> Self {
        Self { model }
    }

    pub async fn generate(&self, params: &GenerationParams) -> Result<String, DispatchError> {
        self.run(Operation::Generate, prompt::generation_parts(params)).await
    }

    pub async fn edit(&self, source: &ReferenceImage, instruction: &str) -> Result<String, DispatchError> {
        self.run(Operation::Edit, prompt::edit_parts(source, instruction)).await
    }

    pub async fn generate_thumbnail(&self, params: &ThumbnailParams) -> Result<String, DispatchError> {
        self.run(Operation::Thumbnail, prompt::thumbnail_parts(params)).await
    }

    pub async fn dispatch(&self, submission: &Submission) -> Result<String, DispatchError> {
        match submission {
            Submission::Generate(params) => self.generate(params).await,
            Submission::Edit { source, instruction } => self.edit(source, instruction).await,
            Submission::Thumbnail(params) => self.generate_thumbnail(params).await,
        }
    }

    async fn run(&self, operation: Operation, parts: Vec<RequestPart>) -> Result<String, DispatchError> {
        info!("🎯 Starting {} with {} part(s)", operation.label(), parts.len());
        let result = match self.model.generate_content(&parts).await {
            Ok(response) => extract_first_image(&response).ok_or(GeminiError::NoImage),
            Err(e) => Err(e),
        };
        match result {
            Ok(uri) => {
                info!("✅ {} succeeded ({} chars)", operation.label(), uri.len());
                Ok(uri)
            }
            Err(GeminiError::NoImage) => {
                warn!("⚠️ No image data found in {} response", operation.label());
                Err(DispatchError::new(operation, GeminiError::NoImage))
            }
            Err(e) => {
                error!("❌ {} failed: {}", operation.label(), e);
                Err(DispatchError::new(operation, e))
            }
        }
    }
}
