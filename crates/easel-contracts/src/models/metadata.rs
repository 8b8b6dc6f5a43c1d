//! Capability hints pulled out of arbitrary model-listing JSON.
//!
//! Providers describe the same facts under different keys and nesting. Each
//! [`FieldStrategy`] names one fact and the dotted paths it may live under;
//! the tree is flattened once and every strategy runs against it in order.

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use serde_json::Value;

use crate::normalize::{normalize_aspect_ratio, normalize_size_token};

const MAX_WALK_DEPTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HintKind {
    Ratio,
    Size,
}

#[derive(Debug, Clone, Copy)]
struct FieldStrategy {
    name: &'static str,
    kind: HintKind,
    aliases: &'static [&'static str],
}

const FIELD_STRATEGIES: &[FieldStrategy] = &[
    FieldStrategy {
        name: "aspect_ratios",
        kind: HintKind::Ratio,
        aliases: &[
            "aspect_ratios",
            "aspectRatios",
            "supported_aspect_ratios",
            "supportedAspectRatios",
            "image_config.aspect_ratios",
            "imageConfig.aspectRatios",
            "parameters.aspect_ratio.enum",
            "ratios",
        ],
    },
    FieldStrategy {
        name: "sizes",
        kind: HintKind::Size,
        aliases: &[
            "sizes",
            "supported_sizes",
            "supportedSizes",
            "image_sizes",
            "imageSizes",
            "image_config.image_sizes",
            "imageConfig.imageSizes",
            "parameters.size.enum",
            "output_sizes",
        ],
    },
    FieldStrategy {
        name: "resolutions",
        kind: HintKind::Size,
        aliases: &[
            "resolutions",
            "supported_resolutions",
            "supportedResolutions",
            "dimensions",
            "supported_dimensions",
        ],
    },
];

const FREE_TEXT_FIELDS: &[&str] = &["id", "name", "displayName", "description", "tags"];

/// Set by the catalog filters from the provider listing.
pub const CATALOG_INPUT_FLAG: &str = "_supportsImageInput";

const IMAGE_INPUT_FLAGS: &[&str] = &[
    "supports_image_input",
    "supportsImageInput",
    "capabilities.image_to_image",
    "capabilities.image_input",
    "capabilities.image",
    "supports.image_to_image",
    "supports.image_input",
];

const INPUT_MODALITY_FIELDS: &[&str] = &["input_modalities", "architecture.input_modalities"];

const MAX_REFERENCE_FIELDS: &[&str] = &[
    "max_reference_images",
    "maxReferenceImages",
    "max_input_images",
    "maxInputImages",
    "capabilities.max_reference_images",
    "limits.max_reference_images",
];

const ENDPOINT_FIELDS: &[&str] = &["supported_endpoints", "endpoints"];

static TEXT_RATIO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}:\d{1,2})\b").expect("valid text ratio regex"));

static TEXT_DIMENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{3,5}\s*[x×]\s*\d{3,5})\b").expect("valid text dimension regex")
});

static TEXT_TIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([1-8]\s?k)\b").expect("valid text tier regex"));

static TEXT_PROGRESSIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{3,4}p)\b").expect("valid text progressive regex"));

static IMAGE_FEATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)image|img|image_to_image|image-input|img2img").expect("valid feature regex")
});

/// Canonical tokens discovered in one metadata object, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedCapabilities {
    pub ratios: IndexSet<String>,
    pub tiers: IndexSet<String>,
    pub dimensions: IndexSet<String>,
}

impl ExtractedCapabilities {
    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty() && self.tiers.is_empty() && self.dimensions.is_empty()
    }

    fn absorb(&mut self, raw: &str, kind: HintKind) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        let size = normalize_size_token(raw);
        let ratio = normalize_aspect_ratio(raw);
        match kind {
            HintKind::Ratio if !ratio.is_empty() && size.is_empty() => {
                self.ratios.insert(ratio);
            }
            _ if size.ends_with('K') => {
                self.tiers.insert(size);
            }
            _ if !size.is_empty() => {
                self.dimensions.insert(size);
            }
            _ if !ratio.is_empty() => {
                self.ratios.insert(ratio);
            }
            _ => {}
        }
    }
}

/// Runs every field strategy, then scans descriptive free text.
///
/// `model_id` is always scanned, so an id such as `sdxl-1024x1024` yields a
/// dimension even without metadata.
pub fn extract_capabilities(model_id: &str, metadata: Option<&Value>) -> ExtractedCapabilities {
    let mut extracted = ExtractedCapabilities::default();
    if let Some(metadata) = metadata {
        let fields = flatten(metadata);
        for strategy in FIELD_STRATEGIES {
            let before = extracted.clone();
            for alias in strategy.aliases {
                for (path, value) in &fields {
                    if path_matches(path, alias) {
                        let mut tokens = Vec::new();
                        collect_tokens(value, &mut tokens);
                        for token in tokens {
                            extracted.absorb(&token, strategy.kind);
                        }
                    }
                }
            }
            if extracted != before {
                tracing::trace!(strategy = strategy.name, "metadata strategy matched");
            }
        }
    }
    for text in free_text(model_id, metadata) {
        scan_text(&text, &mut extracted);
    }
    extracted
}

/// Explicit image-input flags; `None` when the metadata carries none.
///
/// The catalog's own `_supportsImageInput` verdict wins outright. Otherwise
/// any positive flag, modality, feature or `type` hint gives `Some(true)`,
/// and only negative flags give `Some(false)`.
pub fn explicit_image_input(metadata: &Value) -> Option<bool> {
    if let Some(verdict) = metadata.get(CATALOG_INPUT_FLAG).and_then(Value::as_bool) {
        return Some(verdict);
    }
    let fields = flatten(metadata);
    let mut seen = None;
    for flag in IMAGE_INPUT_FLAGS {
        if let Some(value) = lookup(&fields, flag).and_then(Value::as_bool) {
            if value {
                return Some(true);
            }
            seen = Some(false);
        }
    }
    for field in INPUT_MODALITY_FIELDS {
        if let Some(modalities) = lookup(&fields, field).and_then(Value::as_array) {
            if modalities
                .iter()
                .filter_map(Value::as_str)
                .any(|modality| modality.eq_ignore_ascii_case("image"))
            {
                return Some(true);
            }
            seen = Some(false);
        }
    }
    if let Some(features) = lookup(&fields, "features").and_then(Value::as_array) {
        if features
            .iter()
            .filter_map(Value::as_str)
            .any(|feature| IMAGE_FEATURE_RE.is_match(feature))
        {
            return Some(true);
        }
    }
    if metadata
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.to_ascii_lowercase().contains("image"))
    {
        return Some(true);
    }
    seen
}

pub fn explicit_max_reference_images(metadata: &Value) -> Option<u32> {
    let fields = flatten(metadata);
    MAX_REFERENCE_FIELDS.iter().find_map(|field| {
        let value = lookup(&fields, field)?;
        let count = match value {
            Value::Number(number) => number.as_u64()?,
            Value::String(text) => text.trim().parse::<u64>().ok()?,
            _ => return None,
        };
        u32::try_from(count).ok().filter(|count| *count > 0)
    })
}

/// True when the listing advertises a Responses-style endpoint for the model.
pub fn advertises_responses_endpoint(metadata: &Value) -> bool {
    let fields = flatten(metadata);
    ENDPOINT_FIELDS.iter().any(|field| {
        lookup(&fields, field)
            .and_then(Value::as_array)
            .map(|endpoints| {
                endpoints
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|endpoint| endpoint.trim_end_matches('/').ends_with("responses"))
            })
            .unwrap_or(false)
    })
}

fn flatten(root: &Value) -> Vec<(String, &Value)> {
    let mut fields = Vec::new();
    walk(root, String::new(), 0, &mut fields);
    fields
}

fn walk<'a>(value: &'a Value, path: String, depth: usize, out: &mut Vec<(String, &'a Value)>) {
    if depth > MAX_WALK_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            if !path.is_empty() {
                out.push((path.clone(), value));
            }
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk(child, child_path, depth + 1, out);
            }
        }
        Value::Array(items) => {
            if !path.is_empty() {
                out.push((path.clone(), value));
            }
            for item in items.iter().filter(|item| item.is_object()) {
                walk(item, path.clone(), depth + 1, out);
            }
        }
        _ => {
            if !path.is_empty() {
                out.push((path, value));
            }
        }
    }
}

fn path_matches(path: &str, alias: &str) -> bool {
    path == alias
        || path
            .strip_suffix(alias)
            .map(|prefix| prefix.ends_with('.'))
            .unwrap_or(false)
}

fn lookup<'a>(fields: &[(String, &'a Value)], alias: &str) -> Option<&'a Value> {
    fields
        .iter()
        .find(|(path, _)| path == alias)
        .or_else(|| fields.iter().find(|(path, _)| path_matches(path, alias)))
        .map(|(_, value)| *value)
}

fn collect_tokens(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.extend(text.split(',').map(|part| part.trim().to_string())),
        Value::Number(number) => out.push(number.to_string()),
        Value::Array(items) => {
            for item in items {
                collect_tokens(item, out);
            }
        }
        Value::Object(map) => {
            let width = map.get("width").and_then(Value::as_u64);
            let height = map.get("height").and_then(Value::as_u64);
            if let (Some(width), Some(height)) = (width, height) {
                out.push(format!("{width}x{height}"));
                return;
            }
            if let Some(label) = ["value", "id", "name", "label"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
            {
                out.push(label.to_string());
                return;
            }
            // keyed maps such as {"16:9": "1344x768"}
            out.extend(map.keys().cloned());
        }
        _ => {}
    }
}

fn free_text(model_id: &str, metadata: Option<&Value>) -> Vec<String> {
    let mut texts = vec![model_id.to_string()];
    let Some(object) = metadata.and_then(Value::as_object) else {
        return texts;
    };
    for field in FREE_TEXT_FIELDS {
        match object.get(*field) {
            Some(Value::String(text)) => texts.push(text.clone()),
            Some(Value::Array(items)) => {
                texts.extend(items.iter().filter_map(Value::as_str).map(str::to_string))
            }
            _ => {}
        }
    }
    texts
}

fn scan_text(text: &str, extracted: &mut ExtractedCapabilities) {
    for captures in TEXT_RATIO_RE.captures_iter(text) {
        extracted.absorb(&captures[1], HintKind::Ratio);
    }
    for regex in [&*TEXT_DIMENSION_RE, &*TEXT_TIER_RE, &*TEXT_PROGRESSIVE_RE] {
        for captures in regex.captures_iter(text) {
            extracted.absorb(&captures[1], HintKind::Size);
        }
    }
}
