use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::dialect::Dialect;
use crate::error::{Result, StudioError};
use crate::utils::trim_base_url;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Explicit ceiling on the poll loop. The provider is expected to report
/// `done` well before this; exhausting the budget is a failure, not a hang.
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Provider-side job handle for video generation. Created by the submit
/// call, replaced wholesale by each successful poll, terminal once `done`.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    pub error: Option<OperationError>,
    pub response: Option<OperationResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationResponse {
    #[serde(rename = "generatedVideos", alias = "generated_videos", default)]
    pub generated_videos: Vec<GeneratedVideo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedVideo {
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoRef {
    pub uri: Option<String>,
}

impl Operation {
    pub fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generated_videos
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
    }
}

/// Re-fetch the operation until it reports `done`, sleeping a fixed
/// interval between polls. Transport errors, non-success statuses, and
/// unreadable bodies are transient misses: logged, retried on the next
/// tick, and counted against the budget.
pub async fn poll_until_done(
    http: &Client,
    dialect: Dialect,
    base_url: &str,
    api_key: &str,
    mut operation: Operation,
    budget: &PollBudget,
) -> Result<Operation> {
    let mut attempts = 0u32;
    while !operation.done {
        if attempts >= budget.max_attempts {
            return Err(StudioError::OperationFailed(format!(
                "video operation '{}' did not complete within {} polls",
                operation.name, budget.max_attempts
            )));
        }
        attempts += 1;
        tokio::time::sleep(budget.interval).await;

        let url = format!(
            "{}/v1beta/operations/{}",
            trim_base_url(base_url),
            operation.name
        );
        let mut request = http.get(&url);
        for (name, value) in dialect.auth_headers(api_key) {
            request = request.header(name, value);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                log::warn!("operation poll failed, retrying: {err}");
                continue;
            }
        };
        if !response.status().is_success() {
            log::warn!("operation poll returned HTTP {}, retrying", response.status());
            continue;
        }

        match response.json::<Operation>().await {
            Ok(next) => {
                let previous_name = std::mem::take(&mut operation.name);
                operation = next;
                if operation.name.trim().is_empty() {
                    operation.name = previous_name;
                }
            }
            Err(err) => {
                log::warn!("operation poll body unreadable, retrying: {err}");
            }
        }
    }

    if let Some(error) = &operation.error {
        let message = error
            .message
            .clone()
            .unwrap_or_else(|| "Video generation failed during operation.".to_string());
        return Err(StudioError::OperationFailed(message));
    }
    Ok(operation)
}
