use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::{normalize_aspect_ratio, parse_dimensions, ratio_for_dimensions};
use crate::providers::{descriptor_for, ProviderId};

use super::family::infer_family;
use super::metadata::{
    advertises_responses_endpoint, explicit_image_input, explicit_max_reference_images,
    extract_capabilities,
};
use super::presets::family_preset;

/// Name fragments of models known to accept reference images.
const KNOWN_IMAGE_INPUT_FRAGMENTS: &[&str] = &[
    "gpt-4o-image",
    "gpt-image",
    "kontext",
    "gemini-2.0-flash-exp-image",
    "gemini-2.5-flash-preview-native-image",
    "image-to-image",
    "image_to_image",
    "img2img",
    "riverflow",
    "qwen-image-edit",
    "seedream-4",
];

/// FLUX variants that condition on an input image.
const FLUX_INPUT_VARIANTS: &[&str] = &["kontext", "redux", "canny", "depth", "flex"];

/// Ordered; the first fragment contained in the id decides the limit.
const MAX_REFERENCE_TABLE: &[(&str, u32)] = &[
    ("gemini-3-pro-image", 14),
    ("nano-banana-pro", 14),
    ("gemini-2.5-flash-image", 3),
    ("nano-banana", 3),
    ("gpt-image", 16),
];

const GEMINI_SIZE_TIER_FRAGMENTS: &[&str] = &["gemini-3-pro-image", "nano-banana-pro"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "gemini-image")]
    GeminiImage,
    #[serde(rename = "openai-image")]
    OpenAiImage,
    #[serde(rename = "minimax-image")]
    MinimaxImage,
    #[serde(rename = "flux")]
    Flux,
    #[serde(rename = "stable-diffusion")]
    StableDiffusion,
    #[serde(rename = "ideogram")]
    Ideogram,
    #[serde(rename = "recraft")]
    Recraft,
    #[serde(rename = "seedream")]
    Seedream,
    #[serde(rename = "qwen-image")]
    QwenImage,
    #[serde(rename = "hidream")]
    HiDream,
    #[serde(rename = "imagen")]
    Imagen,
    #[serde(rename = "midjourney")]
    Midjourney,
    #[serde(rename = "riverflow")]
    Riverflow,
    #[serde(rename = "generic-image")]
    GenericImage,
}

impl ModelFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::GeminiImage => "gemini-image",
            ModelFamily::OpenAiImage => "openai-image",
            ModelFamily::MinimaxImage => "minimax-image",
            ModelFamily::Flux => "flux",
            ModelFamily::StableDiffusion => "stable-diffusion",
            ModelFamily::Ideogram => "ideogram",
            ModelFamily::Recraft => "recraft",
            ModelFamily::Seedream => "seedream",
            ModelFamily::QwenImage => "qwen-image",
            ModelFamily::HiDream => "hidream",
            ModelFamily::Imagen => "imagen",
            ModelFamily::Midjourney => "midjourney",
            ModelFamily::Riverflow => "riverflow",
            ModelFamily::GenericImage => "generic-image",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire protocol used to reach a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    #[serde(rename = "gemini-native")]
    GeminiNative,
    #[serde(rename = "openrouter-responses")]
    OpenRouterResponses,
    #[serde(rename = "openrouter-chat")]
    OpenRouterChat,
    #[serde(rename = "pollinations-url")]
    PollinationsUrl,
    #[serde(rename = "generic-openai")]
    GenericOpenAi,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::GeminiNative => "gemini-native",
            Transport::OpenRouterResponses => "openrouter-responses",
            Transport::OpenRouterChat => "openrouter-chat",
            Transport::PollinationsUrl => "pollinations-url",
            Transport::GenericOpenAi => "generic-openai",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one model can do on one provider, derived fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRuntimeProfile {
    pub model_id: String,
    pub provider: ProviderId,
    pub family: ModelFamily,
    pub transport: Transport,
    pub supports_image_input: bool,
    pub supports_size_control: bool,
    pub prefers_dimension_size: bool,
    /// `None` means unknown; callers must not clamp.
    pub max_reference_images: Option<u32>,
    pub available_aspect_ratios: IndexSet<String>,
    pub available_size_options: IndexSet<String>,
}

impl ModelRuntimeProfile {
    /// Dimension options only, in profile order.
    pub fn dimension_options(&self) -> Vec<&str> {
        self.available_size_options
            .iter()
            .map(String::as_str)
            .filter(|option| parse_dimensions(option).is_some())
            .collect()
    }

    /// Whether the model takes an explicit `imageSize` tier on Gemini-style APIs.
    pub fn supports_size_tier(&self) -> bool {
        gemini_supports_image_size(&self.model_id)
    }
}

/// Derives a profile from an id plus optional listing metadata.
///
/// Pure: the same inputs always produce the same profile, and the ratio list
/// is never empty.
pub fn profile_model(
    model_id: &str,
    metadata: Option<&Value>,
    provider: ProviderId,
) -> ModelRuntimeProfile {
    let model_id = model_id.trim();
    let family = infer_family(model_id, metadata, provider);
    let extracted = extract_capabilities(model_id, metadata);

    let mut available_aspect_ratios = extracted.ratios.clone();
    for dimension in &extracted.dimensions {
        if let Some((width, height)) = parse_dimensions(dimension) {
            available_aspect_ratios.insert(ratio_for_dimensions(width, height));
        }
    }

    let mut available_size_options: IndexSet<String> = extracted
        .tiers
        .iter()
        .chain(extracted.dimensions.iter())
        .cloned()
        .collect();

    let preset = family_preset(family);
    if available_aspect_ratios.is_empty() {
        if let Some(preset) = preset {
            available_aspect_ratios.extend(canonical_ratios(preset.aspect_ratios));
        }
    }
    if available_aspect_ratios.is_empty() {
        available_aspect_ratios
            .extend(canonical_ratios(descriptor_for(provider).default_aspect_ratios));
    }
    if available_size_options.is_empty() {
        if let Some(preset) = preset {
            available_size_options.extend(preset.size_options.iter().map(|size| size.to_string()));
        }
    }

    let supports_size_control = !available_size_options.is_empty();
    let prefers_dimension_size = supports_size_control
        && available_size_options
            .iter()
            .all(|option| parse_dimensions(option).is_some());

    let responses_hint = metadata.map(advertises_responses_endpoint).unwrap_or(false);
    let transport = preferred_transport(provider, family, responses_hint);

    ModelRuntimeProfile {
        model_id: model_id.to_string(),
        provider,
        family,
        transport,
        supports_image_input: supports_image_input(model_id, metadata, family),
        supports_size_control,
        prefers_dimension_size,
        max_reference_images: max_reference_images(model_id, metadata),
        available_aspect_ratios,
        available_size_options,
    }
}

/// Profiles a listing entry, reading the id from `id` or `name`.
pub fn profile_metadata(metadata: &Value, provider: ProviderId) -> ModelRuntimeProfile {
    let model_id = ["id", "name"]
        .iter()
        .find_map(|key| metadata.get(*key).and_then(Value::as_str))
        .unwrap_or_default();
    profile_model(model_id, Some(metadata), provider)
}

/// Explicit metadata decides when present; otherwise a known input-capable
/// name or the Gemini image family.
pub fn supports_image_input(model_id: &str, metadata: Option<&Value>, family: ModelFamily) -> bool {
    if let Some(explicit) = metadata.and_then(explicit_image_input) {
        return explicit;
    }
    name_accepts_image_input(model_id) || family == ModelFamily::GeminiImage
}

/// Name-only image-input check, shared with the catalog filters.
pub fn name_accepts_image_input(model_id: &str) -> bool {
    let lowered = model_id.to_ascii_lowercase();
    KNOWN_IMAGE_INPUT_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
        || (lowered.contains("flux")
            && FLUX_INPUT_VARIANTS
                .iter()
                .any(|variant| lowered.contains(variant)))
        || (lowered.contains("gemini") && lowered.contains("image"))
}

pub fn max_reference_images(model_id: &str, metadata: Option<&Value>) -> Option<u32> {
    if let Some(limit) = metadata.and_then(explicit_max_reference_images) {
        return Some(limit);
    }
    let lowered = model_id.to_ascii_lowercase();
    MAX_REFERENCE_TABLE
        .iter()
        .find(|(fragment, _)| lowered.contains(fragment))
        .map(|(_, limit)| *limit)
}

pub fn gemini_supports_image_size(model_id: &str) -> bool {
    let lowered = model_id.to_ascii_lowercase();
    GEMINI_SIZE_TIER_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

fn preferred_transport(provider: ProviderId, family: ModelFamily, responses_hint: bool) -> Transport {
    match provider {
        ProviderId::LinkApi if family == ModelFamily::GeminiImage => Transport::GeminiNative,
        ProviderId::OpenRouter if family == ModelFamily::OpenAiImage || responses_hint => {
            Transport::OpenRouterResponses
        }
        ProviderId::OpenRouter => Transport::OpenRouterChat,
        ProviderId::Pollinations => Transport::PollinationsUrl,
        _ => Transport::GenericOpenAi,
    }
}

fn canonical_ratios<'a>(labels: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
    labels
        .iter()
        .map(|label| normalize_aspect_ratio(label))
        .filter(|ratio| !ratio.is_empty())
}
