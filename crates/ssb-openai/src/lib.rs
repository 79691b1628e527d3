//! OpenAI adapter (image edits).
//!
//! Uses the OpenAI `images/edits` endpoint to restyle the inbound selfie.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use ssb_core::{
    errors::Error,
    generation::{GenerationClient, Transformed},
    Result,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-image-1";

#[derive(Clone, Debug)]
pub struct OpenAiImageClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
    revised_prompt: Option<String>,
}

impl OpenAiImageClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        // The overall deadline is enforced by the relay; this only bounds stuck sockets.
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http,
        }
    }

    /// Point at an OpenAI-compatible service.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request_edit(&self, image: Vec<u8>, style: &str) -> Result<ImagesResponse> {
        let prompt = build_prompt(style);

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("prompt", prompt)
            .text("n", "1")
            .part(
                "image",
                reqwest::multipart::Part::bytes(image)
                    .file_name("selfie.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|e| Error::Generation(format!("openai multipart error: {e}")))?,
            );

        tracing::info!(model = %self.model, style = %style, "openai image edit request");

        let resp = self
            .http
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("openai request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "openai image edit failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        resp.json::<ImagesResponse>()
            .await
            .map_err(|e| Error::Generation(format!("openai json error: {e}")))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Generation(format!("image download failed: {e}")))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Generation(format!("image download failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl GenerationClient for OpenAiImageClient {
    async fn transform(&self, image: Vec<u8>, style: &str) -> Result<Transformed> {
        let resp = self.request_edit(image, style).await?;
        let first = resp
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::Generation("openai returned no images".to_string()))?;

        let bytes = match (first.b64_json.as_deref(), first.url.as_deref()) {
            (Some(b64), _) => decode_b64(b64)?,
            (None, Some(url)) => self.download(url).await?,
            (None, None) => {
                return Err(Error::Generation(
                    "openai image has neither b64_json nor url".to_string(),
                ))
            }
        };

        if let Some(revised) = first.revised_prompt.as_deref() {
            tracing::debug!(revised_prompt = %revised, "openai revised the prompt");
        }

        Ok(Transformed {
            image: bytes,
            style: style.to_string(),
        })
    }
}

pub fn build_prompt(style: &str) -> String {
    format!(
        "Transform this selfie {style}. Keep the person recognizable but apply the style dramatically and humorously."
    )
}

fn decode_b64(b64: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| Error::Generation(format!("openai returned invalid base64: {e}")))
}
