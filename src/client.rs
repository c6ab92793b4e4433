use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::dialect::{
    extract_error_message, scan_generate_response, Dialect, GenerateContentResponse,
};
use crate::error::{Result, StudioError};
use crate::models::{AspectRatio, GenerationResult, InlineImage, ProfileKind, ServiceProfile};
use crate::poller::{poll_until_done, Operation, PollBudget};
use crate::utils::trim_base_url;

pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const VIDEO_MODEL: &str = "veo-2.0-generate-001";

/// Request adapter bound to one profile snapshot. The snapshot is taken at
/// construction, so credential edits made while a request is in flight
/// never leak into it.
#[derive(Debug)]
pub struct GenerationClient {
    http: Client,
    profile: ServiceProfile,
    dialect: Dialect,
}

impl GenerationClient {
    pub fn new(profile: ServiceProfile) -> Self {
        let dialect = Dialect::for_kind(profile.kind);
        Self {
            http: Client::new(),
            profile,
            dialect,
        }
    }

    pub fn profile(&self) -> &ServiceProfile {
        &self.profile
    }

    /// Edit an image with a text instruction. Optional mask scopes the
    /// instruction to the masked region; optional secondary image is
    /// blended in by the model.
    pub async fn edit_image(
        &self,
        primary: &InlineImage,
        prompt: &str,
        mask: Option<&str>,
        secondary: Option<&InlineImage>,
    ) -> Result<GenerationResult> {
        self.require_credential()?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StudioError::Validation("prompt must not be empty".to_string()));
        }

        let mut parts = vec![self.dialect.image_part(primary)];
        let effective_prompt = match mask {
            Some(mask) => {
                parts.push(
                    self.dialect
                        .image_part(&InlineImage::new(mask, "image/png")),
                );
                masked_prompt(prompt)
            }
            None => prompt.to_string(),
        };
        if let Some(secondary) = secondary {
            parts.push(self.dialect.image_part(secondary));
        }
        parts.push(self.dialect.text_part(&effective_prompt));

        let url = self.model_url(IMAGE_MODEL, "generateContent");
        log::info!("dispatching image edit via {:?} dialect", self.dialect);
        let body = self.dialect.generate_content_body(parts);
        let text = self.send_post(&url, &body).await?;

        let response: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|err| StudioError::MalformedResponse(format!("generateContent: {err}")))?;
        let scanned = scan_generate_response(response);

        if let Some((mime, data)) = scanned.image {
            return Ok(GenerationResult {
                image_url: Some(format!("data:{mime};base64,{data}")),
                text: scanned.text,
                video_url: None,
            });
        }
        if let Some(text) = scanned.text {
            return Err(StudioError::ModelRefused(text));
        }
        if scanned.safety_blocked() {
            return Err(StudioError::SafetyBlocked);
        }
        Err(StudioError::NoImageReturned)
    }

    /// Submit a video job and poll it to completion. Returns the download
    /// URL, authorized with the key for the official dialect.
    pub async fn generate_video(
        &self,
        prompt: &str,
        image: Option<&InlineImage>,
        aspect_ratio: AspectRatio,
        budget: &PollBudget,
        on_progress: &mut dyn FnMut(&str),
    ) -> Result<String> {
        self.require_credential()?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StudioError::Validation("prompt must not be empty".to_string()));
        }

        on_progress("Initializing video generation...");
        let url = self.model_url(VIDEO_MODEL, "generateVideos");
        let body = self.dialect.generate_videos_body(prompt, image, aspect_ratio);
        let text = self.send_post(&url, &body).await?;

        let operation: Operation = serde_json::from_str(&text)
            .map_err(|err| StudioError::MalformedResponse(format!("generateVideos: {err}")))?;
        if !operation.done && operation.name.trim().is_empty() {
            return Err(StudioError::MalformedResponse(
                "operation handle missing from submit response".to_string(),
            ));
        }

        on_progress("Polling for results, this may take a few minutes...");
        let operation = poll_until_done(
            &self.http,
            self.dialect,
            &self.profile.base_url,
            &self.profile.api_key,
            operation,
            budget,
        )
        .await?;

        let uri = operation.video_uri().ok_or(StudioError::NoResultReturned)?;
        Ok(self.authorize_video_url(uri))
    }

    fn require_credential(&self) -> Result<()> {
        if self.profile.kind == ProfileKind::Official && !self.profile.has_key() {
            return Err(StudioError::MissingCredential);
        }
        Ok(())
    }

    fn model_url(&self, model: &str, action: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            trim_base_url(&self.profile.base_url),
            model,
            action
        )
    }

    async fn send_post(&self, url: &str, body: &Value) -> Result<String> {
        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json");
        for (name, value) in self.dialect.auth_headers(&self.profile.api_key) {
            request = request.header(name, value);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|err| StudioError::Transport(err.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StudioError::Network {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }
        Ok(text)
    }

    /// Official download URIs require the key as a query parameter; proxy
    /// and custom URIs are assumed self-contained.
    fn authorize_video_url(&self, uri: &str) -> String {
        if self.dialect != Dialect::Official {
            return uri.to_string();
        }
        match Url::parse(uri) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("key", &self.profile.api_key);
                url.to_string()
            }
            Err(_) => format!("{uri}&key={}", self.profile.api_key),
        }
    }
}

fn masked_prompt(prompt: &str) -> String {
    format!(
        "Apply the following instruction only to the masked area of the image: \"{prompt}\". Preserve the unmasked area."
    )
}
