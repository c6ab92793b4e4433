use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("path error: {0}")]
    Path(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store error: {0}")]
    Store(String),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {status}: {message}")]
    Network { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("An API key is required before the official endpoint can be used.")]
    MissingCredential,
    #[error("The model responded: \"{0}\"")]
    ModelRefused(String),
    #[error("The request was blocked for safety reasons. Please modify your prompt or image.")]
    SafetyBlocked,
    #[error("The model did not return an image. It might have refused the request. Please try a different image or prompt.")]
    NoImageReturned,
    #[error("{0}")]
    OperationFailed(String),
    #[error("Video generation completed, but no download link was found.")]
    NoResultReturned,
}

pub type Result<T> = std::result::Result<T, StudioError>;
