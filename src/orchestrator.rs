use crate::client::GenerationClient;
use crate::error::{Result, StudioError};
use crate::models::{AspectRatio, GenerationResult, InlineImage};
use crate::poller::PollBudget;
use crate::registry::ProfileRegistry;

/// How a user-selected transformation maps onto provider calls.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformationPlan {
    SingleStep {
        prompt: String,
    },
    /// Two chained edits: the first output image becomes the second input.
    TwoStep {
        first_prompt: String,
        second_prompt: String,
    },
    Video {
        prompt: String,
        aspect_ratio: AspectRatio,
    },
}

/// Post-processing hook applied to every finished image before it is
/// handed back. The core treats the stamping itself as opaque.
pub trait Watermark {
    fn apply(&self, image_data_url: &str) -> Result<String>;
}

/// Identity watermark for callers that stamp elsewhere (or not at all).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWatermark;

impl Watermark for NoWatermark {
    fn apply(&self, image_data_url: &str) -> Result<String> {
        Ok(image_data_url.to_string())
    }
}

/// Thin sequencing layer over [`GenerationClient`]. Resolves the active
/// profile once per run, so edits made mid-flight affect only later runs.
#[derive(Debug)]
pub struct Orchestrator<W: Watermark> {
    registry: ProfileRegistry,
    watermark: W,
    budget: PollBudget,
}

impl<W: Watermark> Orchestrator<W> {
    pub fn new(registry: ProfileRegistry, watermark: W) -> Self {
        Self {
            registry,
            watermark,
            budget: PollBudget::default(),
        }
    }

    pub fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProfileRegistry {
        &mut self.registry
    }

    pub async fn run(
        &self,
        plan: &TransformationPlan,
        primary: Option<&InlineImage>,
        mask: Option<&str>,
        secondary: Option<&InlineImage>,
        on_progress: &mut dyn FnMut(&str),
    ) -> Result<GenerationResult> {
        let client = GenerationClient::new(self.registry.active()?);

        match plan {
            TransformationPlan::SingleStep { prompt } => {
                let primary = require_primary(primary)?;
                let result = client.edit_image(primary, prompt, mask, secondary).await?;
                self.stamp(result)
            }
            TransformationPlan::TwoStep {
                first_prompt,
                second_prompt,
            } => {
                let primary = require_primary(primary)?;
                // Two-step transforms operate on the whole image; any mask
                // the caller drew applies only to single-step edits.
                on_progress("Running transformation step 1 of 2...");
                let first = client.edit_image(primary, first_prompt, None, None).await?;
                let intermediate = first
                    .image_url
                    .as_deref()
                    .ok_or(StudioError::NoImageReturned)
                    .and_then(image_from_data_url)?;

                on_progress("Running transformation step 2 of 2...");
                let second = client
                    .edit_image(&intermediate, second_prompt, None, secondary)
                    .await?;
                self.stamp(second)
            }
            TransformationPlan::Video {
                prompt,
                aspect_ratio,
            } => {
                let video_url = client
                    .generate_video(prompt, primary, *aspect_ratio, &self.budget, on_progress)
                    .await?;
                Ok(GenerationResult {
                    image_url: None,
                    text: None,
                    video_url: Some(video_url),
                })
            }
        }
    }

    fn stamp(&self, mut result: GenerationResult) -> Result<GenerationResult> {
        if let Some(image_url) = result.image_url.take() {
            result.image_url = Some(self.watermark.apply(&image_url)?);
        }
        Ok(result)
    }
}

fn require_primary(primary: Option<&InlineImage>) -> Result<&InlineImage> {
    primary.ok_or_else(|| {
        StudioError::Validation("image transformations require a primary image".to_string())
    })
}

/// Split a `data:{mime};base64,{payload}` URL back into an inline image.
/// A missing mime type defaults to png, matching the response scanner.
pub fn image_from_data_url(url: &str) -> Result<InlineImage> {
    let rest = url.trim().strip_prefix("data:").ok_or_else(|| {
        StudioError::MalformedResponse("image url is not a data url".to_string())
    })?;
    let (mime, data) = rest.split_once(";base64,").ok_or_else(|| {
        StudioError::MalformedResponse("data url is not base64-encoded".to_string())
    })?;

    let mime = if mime.trim().is_empty() {
        "image/png"
    } else {
        mime.trim()
    };
    Ok(InlineImage::new(data, mime))
}
