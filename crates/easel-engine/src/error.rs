use easel_contracts::models::Transport;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

/// Every way a generation request can fail.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// No endpoint or a missing required credential. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{transport} request failed ({status}): {message}")]
    Transport {
        transport: Transport,
        status: u16,
        message: String,
    },

    #[error("{transport} returned no image: {detail}")]
    NoImage { transport: Transport, detail: String },

    #[error("reference image error: {0}")]
    ReferenceImage(String),

    #[error("{transport} returned a malformed response: {detail}")]
    MalformedResponse { transport: Transport, detail: String },

    #[error("{transport} network failure")]
    Network {
        transport: Transport,
        #[source]
        source: reqwest::Error,
    },
}

impl GenerationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        GenerationError::Configuration(message.into())
    }

    pub fn no_image(transport: Transport, detail: impl Into<String>) -> Self {
        GenerationError::NoImage {
            transport,
            detail: detail.into(),
        }
    }

    pub fn malformed(transport: Transport, detail: impl Into<String>) -> Self {
        GenerationError::MalformedResponse {
            transport,
            detail: detail.into(),
        }
    }

    pub fn network(transport: Transport, source: reqwest::Error) -> Self {
        GenerationError::Network { transport, source }
    }

    /// HTTP status for transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            GenerationError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, GenerationError::Configuration(_))
    }
}
