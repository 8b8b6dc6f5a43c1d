use anyhow::{bail, Result};
use indexmap::IndexMap;
use serde_json::Value;

use crate::providers::ProviderId;

use super::metadata::CATALOG_INPUT_FLAG as INPUT_FLAG;
use super::profile::{name_accepts_image_input, profile_model, ModelRuntimeProfile};

const LINKAPI_IMAGE_PATTERNS: &[&str] = &[
    "-image",
    "diffusion",
    "dall-e",
    "gpt-image",
    "flux",
    "midjourney",
    "ideogram",
    "recraft",
];

const OPENROUTER_IMAGE_PATTERNS: &[&str] = &[
    "dall-e",
    "gpt-image",
    "flux",
    "stable-diffusion",
    "sdxl",
    "midjourney",
    "ideogram",
    "recraft",
    "playground",
    "kandinsky",
    "imagen",
    "riverflow",
];

const OPENROUTER_EXCLUDED: &[&str] = &["/auto", "/free", "router"];

/// Previously fetched model listing for one provider.
///
/// Owned by the caller and handed to the router; nothing in the crate keeps
/// a process-wide copy.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    provider: ProviderId,
    models: IndexMap<String, Value>,
}

impl ModelCatalog {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            models: IndexMap::new(),
        }
    }

    /// Builds a catalog from a raw listing body.
    ///
    /// Accepts `{"data": [...]}`, `{"models": [...]}` or a bare array, then
    /// keeps only entries the provider can use for image generation.
    pub fn from_listing(provider: ProviderId, body: &Value) -> Result<Self> {
        let entries = match body {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("data").or_else(|| map.get("models")) {
                Some(Value::Array(items)) => items,
                _ => bail!("model listing has neither a data nor a models array"),
            },
            _ => bail!("model listing must be a JSON object or array"),
        };

        let mut catalog = Self::new(provider);
        let mut paid = Vec::new();
        let mut free = Vec::new();
        for entry in entries {
            let Some(entry) = adapt_entry(provider, entry) else {
                continue;
            };
            if provider == ProviderId::Pollinations
                && entry.get("paid_only").and_then(Value::as_bool) == Some(true)
            {
                paid.push(entry);
            } else {
                free.push(entry);
            }
        }
        for entry in paid.into_iter().chain(free) {
            catalog.insert(entry);
        }
        tracing::debug!(
            provider = %provider,
            listed = entries.len(),
            kept = catalog.len(),
            "parsed model listing"
        );
        Ok(catalog)
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Inserts an entry keyed by its `id`; entries without one are ignored.
    pub fn insert(&mut self, entry: Value) -> bool {
        let Some(id) = entry.get("id").and_then(Value::as_str).map(str::to_string) else {
            return false;
        };
        self.models.insert(id, entry);
        true
    }

    pub fn get(&self, model_id: &str) -> Option<&Value> {
        self.models.get(model_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Profiles `model_id` with its cached metadata when present.
    pub fn profile(&self, model_id: &str) -> ModelRuntimeProfile {
        profile_model(model_id, self.get(model_id), self.provider)
    }
}

fn adapt_entry(provider: ProviderId, entry: &Value) -> Option<Value> {
    let mut entry = match entry {
        Value::Object(_) => entry.clone(),
        Value::String(id) => serde_json::json!({ "id": id }),
        _ => return None,
    };
    let object = entry.as_object_mut()?;

    match provider {
        ProviderId::LinkApi if !object.contains_key("id") => {
            if let Some(name) = object.get("name").and_then(Value::as_str) {
                let id = name.strip_prefix("models/").unwrap_or(name).to_string();
                let display = object
                    .get("displayName")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                object.insert("id".to_string(), Value::String(id));
                if let Some(display) = display {
                    object.insert("name".to_string(), Value::String(display));
                }
            }
        }
        ProviderId::Pollinations if !object.contains_key("id") => {
            if let Some(name) = object.get("name").cloned() {
                object.insert("id".to_string(), name);
            }
        }
        _ => {}
    }

    let id = object
        .get("id")
        .and_then(Value::as_str)?
        .trim()
        .to_ascii_lowercase();
    let keep = match provider {
        ProviderId::LinkApi => linkapi_keeps(&id, object),
        ProviderId::OpenRouter => openrouter_keeps(&id, object),
        ProviderId::Pollinations => pollinations_keeps(object),
        ProviderId::NanoGpt | ProviderId::Custom => true,
    };
    keep.then_some(entry)
}

fn linkapi_keeps(id: &str, object: &mut serde_json::Map<String, Value>) -> bool {
    let keep = LINKAPI_IMAGE_PATTERNS
        .iter()
        .any(|pattern| id.contains(pattern))
        || (id.starts_with("veo-") && id.contains("generate"));
    if keep {
        let input = id.contains("gpt-image")
            || (id.contains("flux") && id.contains("kontext"))
            || (id.contains("gemini") && id.contains("image"));
        object.insert(INPUT_FLAG.to_string(), Value::Bool(input));
    }
    keep
}

fn openrouter_keeps(id: &str, object: &mut serde_json::Map<String, Value>) -> bool {
    if OPENROUTER_EXCLUDED.iter().any(|pattern| id.contains(pattern)) {
        return false;
    }
    let by_modality = modalities(object, "output_modalities").any(|item| item == "image");
    let by_name = OPENROUTER_IMAGE_PATTERNS
        .iter()
        .any(|pattern| id.contains(pattern))
        || (id.contains("gemini") && id.contains("image"));
    let keep = by_modality || by_name;
    if keep {
        let input = modalities(object, "input_modalities").any(|item| item == "image")
            || name_accepts_image_input(id);
        object.insert(INPUT_FLAG.to_string(), Value::Bool(input));
    }
    keep
}

fn pollinations_keeps(object: &mut serde_json::Map<String, Value>) -> bool {
    let outputs: Vec<String> = modalities(object, "output_modalities").collect();
    if !outputs.iter().any(|item| item == "image") || outputs.iter().any(|item| item == "video") {
        return false;
    }
    let input = modalities(object, "input_modalities").any(|item| item == "image");
    object.insert(INPUT_FLAG.to_string(), Value::Bool(input));
    true
}

/// Reads `field` at the top level or under `architecture`.
fn modalities<'a>(
    object: &'a serde_json::Map<String, Value>,
    field: &str,
) -> impl Iterator<Item = String> + 'a {
    object
        .get("architecture")
        .and_then(|architecture| architecture.get(field))
        .or_else(|| object.get(field))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::models::ModelFamily;

    use super::*;

    #[test]
    fn accepts_all_three_listing_shapes() -> anyhow::Result<()> {
        let entries = json!([{ "id": "flux-dev" }, { "id": "hidream" }]);
        for body in [
            entries.clone(),
            json!({ "data": entries.clone() }),
            json!({ "models": entries.clone() }),
        ] {
            let catalog = ModelCatalog::from_listing(ProviderId::NanoGpt, &body)?;
            assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["flux-dev", "hidream"]);
        }
        assert!(ModelCatalog::from_listing(ProviderId::NanoGpt, &json!({ "x": 1 })).is_err());
        assert!(ModelCatalog::from_listing(ProviderId::NanoGpt, &json!("nope")).is_err());
        Ok(())
    }

    #[test]
    fn linkapi_strips_models_prefix_and_filters_text_models() -> anyhow::Result<()> {
        let body = json!({
            "models": [
                { "name": "models/gemini-2.5-flash-image", "displayName": "Nano Banana" },
                { "name": "models/gemini-2.5-pro", "displayName": "Gemini Pro" },
            ]
        });
        let catalog = ModelCatalog::from_listing(ProviderId::LinkApi, &body)?;
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["gemini-2.5-flash-image"]);
        let entry = catalog.get("gemini-2.5-flash-image").unwrap();
        assert_eq!(entry["name"], json!("Nano Banana"));
        assert_eq!(entry[INPUT_FLAG], json!(true));
        Ok(())
    }

    #[test]
    fn saved_linkapi_entries_keep_their_id() -> anyhow::Result<()> {
        let body = json!({
            "data": [{ "id": "gemini-2.5-flash-image", "name": "Nano Banana" }]
        });
        let catalog = ModelCatalog::from_listing(ProviderId::LinkApi, &body)?;
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["gemini-2.5-flash-image"]);
        Ok(())
    }

    #[test]
    fn openrouter_keeps_image_output_and_drops_routers() -> anyhow::Result<()> {
        let body = json!({
            "data": [
                { "id": "acme/painter", "architecture": { "output_modalities": ["image", "text"] } },
                { "id": "openrouter/auto", "architecture": { "output_modalities": ["image"] } },
                { "id": "anthropic/claude", "architecture": { "output_modalities": ["text"] } },
                { "id": "black-forest-labs/flux.2-pro" },
            ]
        });
        let catalog = ModelCatalog::from_listing(ProviderId::OpenRouter, &body)?;
        assert_eq!(
            catalog.ids().collect::<Vec<_>>(),
            vec!["acme/painter", "black-forest-labs/flux.2-pro"]
        );
        assert_eq!(
            catalog.profile("black-forest-labs/flux.2-pro").family,
            ModelFamily::Flux
        );
        Ok(())
    }

    #[test]
    fn openrouter_marks_image_input_from_modalities_and_names() -> anyhow::Result<()> {
        let body = json!({
            "data": [
                { "id": "acme/painter", "architecture": { "input_modalities": ["text"], "output_modalities": ["image"] } },
                { "id": "acme/editor", "architecture": { "input_modalities": ["text", "image"], "output_modalities": ["image"] } },
                { "id": "black-forest-labs/flux-canny-pro" },
                { "id": "black-forest-labs/flux.2-pro" },
            ]
        });
        let catalog = ModelCatalog::from_listing(ProviderId::OpenRouter, &body)?;
        let flag = |id: &str| catalog.get(id).map(|entry| entry[INPUT_FLAG].clone());
        assert_eq!(flag("acme/painter"), Some(json!(false)));
        assert_eq!(flag("acme/editor"), Some(json!(true)));
        assert_eq!(flag("black-forest-labs/flux-canny-pro"), Some(json!(true)));
        assert_eq!(flag("black-forest-labs/flux.2-pro"), Some(json!(false)));
        assert!(!catalog.profile("acme/painter").supports_image_input);
        assert!(catalog.profile("acme/editor").supports_image_input);
        Ok(())
    }

    #[test]
    fn linkapi_input_flag_vetoes_name_heuristics() -> anyhow::Result<()> {
        let body = json!({ "data": [{ "id": "img2img-diffusion" }, { "id": "flux-kontext-max" }] });
        let catalog = ModelCatalog::from_listing(ProviderId::LinkApi, &body)?;
        assert_eq!(catalog.get("img2img-diffusion").unwrap()[INPUT_FLAG], json!(false));
        assert!(!catalog.profile("img2img-diffusion").supports_image_input);
        assert!(catalog.profile("flux-kontext-max").supports_image_input);
        Ok(())
    }

    #[test]
    fn pollinations_uses_name_as_id_and_orders_paid_first() -> anyhow::Result<()> {
        let body = json!([
            { "name": "flux", "output_modalities": ["image"] },
            { "name": "veo", "output_modalities": ["video"] },
            { "name": "kontext", "output_modalities": ["image"], "input_modalities": ["text", "image"], "paid_only": true },
        ]);
        let catalog = ModelCatalog::from_listing(ProviderId::Pollinations, &body)?;
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["kontext", "flux"]);
        assert!(catalog.profile("kontext").supports_image_input);
        Ok(())
    }

    #[test]
    fn profile_without_entry_still_usable() {
        let catalog = ModelCatalog::new(ProviderId::Custom);
        assert!(catalog.is_empty());
        let profile = catalog.profile("unlisted");
        assert!(!profile.available_aspect_ratios.is_empty());
    }
}
