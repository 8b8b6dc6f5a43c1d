use serde_json::Value;

use crate::providers::ProviderId;

use super::profile::ModelFamily;

/// Code names that resolve to the Gemini image family without saying "gemini".
const GEMINI_IMAGE_ALIASES: &[&str] = &["nano-banana", "nano banana", "nanobanana"];

const OPENAI_IMAGE_PATTERNS: &[&str] = &["gpt-image", "gpt-4o-image", "chatgpt-image", "dall-e"];

/// Checked in order after the Gemini and OpenAI groups; first hit wins.
const FAMILY_PATTERNS: &[(&str, ModelFamily)] = &[
    ("flux", ModelFamily::Flux),
    ("stable-diffusion", ModelFamily::StableDiffusion),
    ("stable_diffusion", ModelFamily::StableDiffusion),
    ("sdxl", ModelFamily::StableDiffusion),
    ("sd3", ModelFamily::StableDiffusion),
    ("ideogram", ModelFamily::Ideogram),
    ("recraft", ModelFamily::Recraft),
    ("seedream", ModelFamily::Seedream),
    ("qwen-image", ModelFamily::QwenImage),
    ("hidream", ModelFamily::HiDream),
    ("imagen", ModelFamily::Imagen),
    ("midjourney", ModelFamily::Midjourney),
    ("riverflow", ModelFamily::Riverflow),
    ("minimax", ModelFamily::MinimaxImage),
];

/// OpenRouter `vendor/model` prefixes. `google` is resolved from the model part.
const OPENROUTER_VENDORS: &[(&str, ModelFamily)] = &[
    ("openai", ModelFamily::OpenAiImage),
    ("black-forest-labs", ModelFamily::Flux),
    ("stabilityai", ModelFamily::StableDiffusion),
    ("ideogram", ModelFamily::Ideogram),
    ("ideogram-ai", ModelFamily::Ideogram),
    ("recraft", ModelFamily::Recraft),
    ("recraft-ai", ModelFamily::Recraft),
    ("bytedance", ModelFamily::Seedream),
    ("bytedance-seed", ModelFamily::Seedream),
    ("qwen", ModelFamily::QwenImage),
    ("hidream-ai", ModelFamily::HiDream),
    ("midjourney", ModelFamily::Midjourney),
    ("sourceful", ModelFamily::Riverflow),
    ("minimax", ModelFamily::MinimaxImage),
];

const DESCRIPTIVE_FIELDS: &[&str] = &[
    "name",
    "displayName",
    "display_name",
    "description",
    "owned_by",
    "owner",
];

/// Infers the model lineage from the id plus descriptive metadata text.
pub fn infer_family(model_id: &str, metadata: Option<&Value>, provider: ProviderId) -> ModelFamily {
    if provider == ProviderId::OpenRouter {
        if let Some(family) = family_from_vendor_prefix(model_id) {
            return family;
        }
    }
    let haystack = family_haystack(model_id, metadata);
    family_from_text(&haystack)
}

fn family_from_text(haystack: &str) -> ModelFamily {
    if (haystack.contains("gemini") && haystack.contains("image"))
        || GEMINI_IMAGE_ALIASES
            .iter()
            .any(|alias| haystack.contains(alias))
    {
        return ModelFamily::GeminiImage;
    }
    if OPENAI_IMAGE_PATTERNS
        .iter()
        .any(|pattern| haystack.contains(pattern))
    {
        return ModelFamily::OpenAiImage;
    }
    FAMILY_PATTERNS
        .iter()
        .find(|(pattern, _)| haystack.contains(pattern))
        .map(|(_, family)| *family)
        .unwrap_or(ModelFamily::GenericImage)
}

fn family_from_vendor_prefix(model_id: &str) -> Option<ModelFamily> {
    let lowered = model_id.trim().to_ascii_lowercase();
    let (vendor, model) = lowered.split_once('/')?;
    if vendor == "google" {
        if model.contains("imagen") {
            return Some(ModelFamily::Imagen);
        }
        if model.contains("gemini") && model.contains("image") {
            return Some(ModelFamily::GeminiImage);
        }
        return None;
    }
    OPENROUTER_VENDORS
        .iter()
        .find(|(prefix, _)| *prefix == vendor)
        .map(|(_, family)| *family)
}

fn family_haystack(model_id: &str, metadata: Option<&Value>) -> String {
    let mut parts = vec![model_id.trim().to_ascii_lowercase()];
    if let Some(object) = metadata.and_then(Value::as_object) {
        if let Some(id) = object.get("id").and_then(Value::as_str) {
            parts.push(id.to_ascii_lowercase());
        }
        for field in DESCRIPTIVE_FIELDS {
            if let Some(text) = object.get(*field).and_then(Value::as_str) {
                parts.push(text.to_ascii_lowercase());
            }
        }
    }
    parts.join(" ")
}
