// upscaler/src/remote/gemini.rs
//! `generateContent` client for Gemini image models.

use super::{EnhancementRequest, EnhancementService};
use crate::core::job::{EnhancedImage, ImageMime};
use crate::core::{Result, UpscaleError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const API_KEY_VAR: &str = "API_KEY";
pub const MODEL_VAR: &str = "GEMINI_MODEL";
pub const ENDPOINT_VAR: &str = "GEMINI_ENDPOINT";

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Reads `API_KEY` (required), `GEMINI_MODEL` and `GEMINI_ENDPOINT`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                UpscaleError::Config(format!("{} environment variable not set.", API_KEY_VAR))
            })?;

        let mut config = Self::new(api_key);
        if let Some(model) = lookup(MODEL_VAR).filter(|m| !m.is_empty()) {
            config = config.with_model(model);
        }
        if let Some(endpoint) = lookup(ENDPOINT_VAR).filter(|e| !e.is_empty()) {
            config = config.with_endpoint(endpoint);
        }
        Ok(config)
    }

    fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpscaleError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn send(&self, body: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let response = self
            .client
            .post(self.config.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(UpscaleError::service)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(UpscaleError::service(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(UpscaleError::service)
    }
}

#[async_trait]
impl EnhancementService for GeminiClient {
    async fn enhance(&self, request: &EnhancementRequest) -> Result<EnhancedImage> {
        let body = build_request(request);
        log::info!(
            "Requesting {}x enhancement from {} ({} bytes, {})",
            request.factor,
            self.config.model,
            request.image.len(),
            request.mime
        );

        let result = self.send(&body).await.and_then(|response| extract_image(&response));
        if let Err(e) = &result {
            match e {
                UpscaleError::ServiceUnavailable { detail } => {
                    log::error!("Error in Gemini API call: {}", detail)
                }
                other => log::warn!("Gemini returned no usable image: {}", other),
            }
        }
        result
    }
}

fn build_request(request: &EnhancementRequest) -> GenerateContentRequest {
    let image = Part {
        inline_data: Some(InlineData {
            mime_type: request.mime.as_str().to_string(),
            data: BASE64.encode(&request.image),
        }),
        ..Default::default()
    };
    let text = Part {
        text: Some(request.instruction()),
        ..Default::default()
    };

    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![image, text],
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["IMAGE", "TEXT"],
        },
    }
}

/// Pulls the first inline image out of a response.
pub fn extract_image(response: &GenerateContentResponse) -> Result<EnhancedImage> {
    let inline = response
        .candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .find_map(|part| part.inline_data.as_ref());

    let Some(inline) = inline else {
        if let Some(reason) = response.candidates.first().and_then(|c| c.finish_reason.as_deref()) {
            log::debug!("No image in response, finish reason {}", reason);
        }
        return Err(UpscaleError::NoImageReturned);
    };

    let data = BASE64
        .decode(inline.data.as_bytes())
        .map_err(|e| UpscaleError::service(format!("invalid base64 image data: {}", e)))?;

    let mime = ImageMime::parse(&inline.mime_type)
        .or_else(|| ImageMime::sniff(&data))
        .ok_or_else(|| {
            UpscaleError::service(format!("unsupported output type {}", inline.mime_type))
        })?;

    let (width, height) = image::ImageReader::with_format(Cursor::new(&data), mime.format())
        .into_dimensions()
        .map_err(|e| UpscaleError::service(format!("unreadable output image: {}", e)))?;

    Ok(EnhancedImage::new(data, mime, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Goal, QualityTier, UpscaleFactor};
    use std::collections::HashMap;

    fn png_base64(width: u32, height: u32) -> String {
        let image = image::DynamicImage::new_rgb8(width, height);
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        BASE64.encode(buffer.into_inner())
    }

    fn response(json: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn request_carries_image_and_instruction() {
        let request = EnhancementRequest {
            image: vec![1u8, 2, 3].into(),
            mime: ImageMime::Jpeg,
            factor: UpscaleFactor::X4,
            goal: Goal::Details,
            tier: QualityTier::Pro,
        };
        let json = serde_json::to_value(build_request(&request)).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert!(parts[0].get("text").is_none());
        assert_eq!(parts[1]["text"], request.instruction());
        assert_eq!(
            json["generationConfig"]["responseModalities"],
            serde_json::json!(["IMAGE", "TEXT"])
        );
    }

    #[test]
    fn extracts_first_inline_image() {
        let response = response(serde_json::json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is your image" },
                    { "inlineData": { "mimeType": "image/png", "data": png_base64(6, 4) } }
                ]},
                "finishReason": "STOP"
            }]
        }));
        let image = extract_image(&response).unwrap();
        assert_eq!(image.mime, ImageMime::Png);
        assert_eq!((image.width, image.height), (6, 4));
    }

    #[test]
    fn text_only_response_is_no_image() {
        let response = response(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't help with that." }] } }]
        }));
        assert!(matches!(extract_image(&response), Err(UpscaleError::NoImageReturned)));
        assert!(matches!(
            extract_image(&GenerateContentResponse::default()),
            Err(UpscaleError::NoImageReturned)
        ));
    }

    #[test]
    fn corrupt_payload_is_a_service_error() {
        let response = response(serde_json::json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "!!!" } }
            ]}}]
        }));
        assert!(matches!(
            extract_image(&response),
            Err(UpscaleError::ServiceUnavailable { .. })
        ));
    }

    #[test]
    fn config_requires_an_api_key() {
        let empty: HashMap<&str, &str> = HashMap::new();
        let err = GeminiConfig::from_lookup(|k| empty.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, UpscaleError::Config(_)));

        let vars = HashMap::from([
            (API_KEY_VAR, "secret"),
            (ENDPOINT_VAR, "http://localhost:9000/"),
        ]);
        let config = GeminiConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(
            config.url(),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash-image-preview:generateContent"
        );
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_service_error() {
        let config = GeminiConfig::new("key").with_endpoint("http://127.0.0.1:9");
        let client = GeminiClient::new(config).unwrap();
        let request = EnhancementRequest {
            image: vec![0u8; 4].into(),
            mime: ImageMime::Png,
            factor: UpscaleFactor::X2,
            goal: Goal::Balanced,
            tier: QualityTier::Standard,
        };
        let err = client.enhance(&request).await.unwrap_err();
        assert!(matches!(err, UpscaleError::ServiceUnavailable { .. }));
    }
}
