use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::normalize::{normalize_aspect_ratio, normalize_size_token};

pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

static DATA_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:image/([A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=\r\n]+)$")
        .expect("valid data uri regex")
});

/// One canonical image request, independent of any provider envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    model_id: String,
    prompt: String,
    aspect_ratio: String,
    size_option: Option<String>,
    reference_images: Vec<String>,
}

impl GenerationRequest {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            size_option: None,
            reference_images: Vec::new(),
        }
    }

    /// Normalizes `raw`; an unparseable value leaves the current ratio alone.
    pub fn with_aspect_ratio(mut self, raw: &str) -> Self {
        let normalized = normalize_aspect_ratio(raw);
        if !normalized.is_empty() {
            self.aspect_ratio = normalized;
        }
        self
    }

    pub fn with_size_option(mut self, raw: &str) -> Self {
        let normalized = normalize_size_token(raw);
        self.size_option = (!normalized.is_empty()).then_some(normalized);
        self
    }

    pub fn with_reference_image(mut self, data_uri: impl Into<String>) -> Self {
        self.reference_images.push(data_uri.into());
        self
    }

    pub fn with_reference_images<I, S>(mut self, data_uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_images
            .extend(data_uris.into_iter().map(Into::into));
        self
    }

    /// Replaces every reference image, keeping order.
    pub fn replacing_reference_images<I, S>(mut self, data_uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_images = data_uris.into_iter().map(Into::into).collect();
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn aspect_ratio(&self) -> &str {
        &self.aspect_ratio
    }

    pub fn size_option(&self) -> Option<&str> {
        self.size_option.as_deref()
    }

    pub fn reference_images(&self) -> &[String] {
        &self.reference_images
    }

    pub fn has_reference_images(&self) -> bool {
        !self.reference_images.is_empty()
    }
}

/// Decoded image returned by every transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    /// Base64 without a `data:` prefix.
    pub image_data: String,
    pub mime_type: String,
}

impl GenerationResult {
    pub fn new(image_data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            image_data: image_data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.image_data)
    }
}

/// A validated `data:image/<type>;base64,<payload>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub data: String,
}

impl DataUri {
    pub fn parse(raw: &str) -> Option<Self> {
        let captures = DATA_URI_RE.captures(raw.trim())?;
        let data: String = captures[2]
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect();
        if data.is_empty() {
            return None;
        }
        Some(Self {
            mime_type: format!("image/{}", captures[1].to_ascii_lowercase()),
            data,
        })
    }

    pub fn as_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}
