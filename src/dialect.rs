use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{AspectRatio, InlineImage, ProfileKind};
use crate::utils::shorten_body;

/// Wire-format and auth-convention variant. The official endpoint expects
/// camelCase part naming plus response modality flags; proxies and custom
/// relays speak the snake_cased raw HTTP shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Official,
    Raw,
}

impl Dialect {
    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Official => Dialect::Official,
            ProfileKind::Proxy | ProfileKind::Custom => Dialect::Raw,
        }
    }

    /// Raw sends both conventions at once; unknown intermediaries disagree
    /// about which one they forward.
    pub fn auth_headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        match self {
            Dialect::Official => vec![("x-goog-api-key", api_key.to_string())],
            Dialect::Raw => vec![
                ("Authorization", format!("Bearer {api_key}")),
                ("x-goog-api-key", api_key.to_string()),
            ],
        }
    }

    pub fn image_part(&self, image: &InlineImage) -> Value {
        match self {
            Dialect::Official => json!({
                "inlineData": { "data": image.data, "mimeType": image.mime_type }
            }),
            Dialect::Raw => json!({
                "inline_data": { "data": image.data, "mime_type": image.mime_type }
            }),
        }
    }

    pub fn text_part(&self, text: &str) -> Value {
        json!({ "text": text })
    }

    pub fn generate_content_body(&self, parts: Vec<Value>) -> Value {
        match self {
            Dialect::Official => json!({
                "contents": [{ "parts": parts }],
                "generationConfig": { "responseModalities": ["IMAGE", "TEXT"] }
            }),
            Dialect::Raw => json!({
                "contents": [{ "parts": parts }],
                "generationConfig": { "response_mime_type": "application/json" }
            }),
        }
    }

    /// Video submissions share one shape across dialects.
    pub fn generate_videos_body(
        &self,
        prompt: &str,
        image: Option<&InlineImage>,
        aspect_ratio: AspectRatio,
    ) -> Value {
        let mut body = json!({
            "prompt": prompt,
            "config": { "numberOfVideos": 1, "aspectRatio": aspect_ratio.as_str() }
        });
        if let Some(image) = image {
            body["image"] = json!({ "imageBytes": image.data, "mimeType": image.mime_type });
        }
        body
    }
}

// Different upstreams normalize the response casing differently, so the
// parse side accepts both regardless of the dialect that sent the request.
#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    #[serde(rename = "finishReason", alias = "finish_reason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
    #[serde(rename = "inlineData", alias = "inline_data")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
pub struct InlineData {
    pub data: String,
    #[serde(rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Default)]
pub struct ScannedResponse {
    /// First inline binary part, as (mime type, base64 payload).
    pub image: Option<(String, String)>,
    /// All text parts, newline-joined.
    pub text: Option<String>,
    pub finish_reason: Option<String>,
}

impl ScannedResponse {
    pub fn safety_blocked(&self) -> bool {
        self.finish_reason
            .as_deref()
            .is_some_and(|reason| reason.eq_ignore_ascii_case("SAFETY"))
    }
}

pub fn scan_generate_response(response: GenerateContentResponse) -> ScannedResponse {
    let mut scanned = ScannedResponse::default();
    let Some(candidate) = response.candidates.into_iter().next() else {
        return scanned;
    };
    scanned.finish_reason = candidate.finish_reason;

    let parts = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default();
    for part in parts {
        if let Some(text) = part.text {
            scanned.text = Some(match scanned.text.take() {
                Some(existing) => format!("{existing}\n{text}"),
                None => text,
            });
        } else if let Some(inline) = part.inline_data {
            if scanned.image.is_none() {
                let mime = inline.mime_type.unwrap_or_else(|| "image/png".to_string());
                scanned.image = Some((mime, inline.data));
            }
        }
    }
    scanned
}

/// Pull the nested provider message out of an error body, falling back to
/// the shortened body text.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(|message| message.as_str())
        {
            let message = message.trim();
            if !message.is_empty() {
                return message.to_string();
            }
        }
    }

    let shortened = shorten_body(body);
    if shortened.is_empty() {
        "request failed".to_string()
    } else {
        shortened
    }
}
