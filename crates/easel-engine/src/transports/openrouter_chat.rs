use async_trait::async_trait;
use easel_contracts::models::{ModelRuntimeProfile, Transport, GEMINI_ASPECT_RATIOS};
use easel_contracts::normalize::{best_dimension_for_ratio, nearest_ratio, parse_dimensions};
use easel_contracts::request::{DataUri, GenerationRequest, GenerationResult};
use reqwest::RequestBuilder;
use serde_json::{json, Map, Value};

use super::gemini::image_size_tier;
use super::{prepare_references, with_aspect_directive, TransportContext, Translator};
use crate::config::EngineConfig;
use crate::error::{GenerationError, Result};
use crate::http::{
    decode_bare_base64, decode_data_url, fetch_image_as_base64, read_json_or_error, truncate_text,
};

/// OpenRouter `chat/completions` with image output modalities.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRouterChatTranslator;

#[async_trait]
impl Translator for OpenRouterChatTranslator {
    fn transport(&self) -> Transport {
        Transport::OpenRouterChat
    }

    async fn generate(
        &self,
        ctx: &TransportContext<'_>,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let transport = self.transport();
        let references = prepare_references(ctx, transport, request)?;
        let api_key = ctx.required_credential()?;
        let endpoint = format!("{}/chat/completions", ctx.api_base()?);
        let payload = build_payload(ctx.profile, request, &references);

        tracing::debug!(
            %transport,
            model = request.model_id(),
            references = references.len(),
            %endpoint,
            "dispatching OpenRouter chat completion"
        );
        let mut builder =
            apply_openrouter_headers(ctx.http.post(&endpoint), ctx.config).json(&payload);
        if let Some(api_key) = api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| GenerationError::network(transport, err))?;
        let body = read_json_or_error(transport, response).await?;

        let image = first_message_image(&body).ok_or_else(|| {
            let detail = match message_text(&body) {
                Some(text) => format!("model replied without an image: {}", truncate_text(&text, 200)),
                None => "response has no choices[0].message.images entry".to_string(),
            };
            GenerationError::no_image(transport, detail)
        })?;
        materialize(ctx, &image).await
    }
}

/// Attribution headers OpenRouter uses for app rankings.
pub(super) fn apply_openrouter_headers(
    mut builder: RequestBuilder,
    config: &EngineConfig,
) -> RequestBuilder {
    if let Some(referer) = config.openrouter_referer.as_deref() {
        builder = builder.header("HTTP-Referer", referer);
    }
    if let Some(title) = config.openrouter_title.as_deref() {
        builder = builder.header("X-Title", title);
    }
    builder
}

/// `size` for dimension-driven families, otherwise `aspect_ratio` plus an
/// optional tier.
pub(super) fn image_config(profile: &ModelRuntimeProfile, request: &GenerationRequest) -> Value {
    let mut config = Map::new();
    if profile.prefers_dimension_size {
        if let Some(size) = dimension_size(profile, request) {
            config.insert("size".to_string(), Value::String(size));
            return Value::Object(config);
        }
    }
    let aspect_ratio = nearest_ratio(request.aspect_ratio(), GEMINI_ASPECT_RATIOS)
        .unwrap_or_else(|| "1:1".to_string());
    config.insert("aspect_ratio".to_string(), Value::String(aspect_ratio));
    if profile.supports_size_tier() {
        if let Some(size) = request.size_option() {
            config.insert("image_size".to_string(), Value::String(image_size_tier(size)));
        }
    }
    Value::Object(config)
}

/// Explicit dimension option first, then the profile size closest to the ratio.
pub(super) fn dimension_size(
    profile: &ModelRuntimeProfile,
    request: &GenerationRequest,
) -> Option<String> {
    if let Some((width, height)) = request.size_option().and_then(parse_dimensions) {
        return Some(format!("{width}x{height}"));
    }
    best_dimension_for_ratio(request.aspect_ratio(), &profile.dimension_options())
}

fn build_payload(
    profile: &ModelRuntimeProfile,
    request: &GenerationRequest,
    references: &[DataUri],
) -> Value {
    let prompt = with_aspect_directive(request.prompt(), request.aspect_ratio());
    let content = if references.is_empty() {
        Value::String(prompt)
    } else {
        let mut items = vec![json!({ "type": "text", "text": prompt })];
        items.extend(references.iter().map(|image| {
            json!({
                "type": "image_url",
                "image_url": { "url": image.as_url() },
            })
        }));
        Value::Array(items)
    };
    json!({
        "model": request.model_id(),
        "messages": [{ "role": "user", "content": content }],
        "modalities": ["image", "text"],
        "stream": false,
        "image_config": image_config(profile, request),
    })
}

fn first_message_image(body: &Value) -> Option<String> {
    let image = body
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("images")?
        .as_array()?
        .first()?;
    let url = match image {
        Value::String(raw) => Some(raw.as_str()),
        Value::Object(_) => image
            .get("image_url")
            .and_then(|image_url| image_url.get("url").or(Some(image_url)))
            .and_then(Value::as_str)
            .or_else(|| image.get("url").and_then(Value::as_str)),
        _ => None,
    }?;
    let url = url.trim();
    (!url.is_empty()).then(|| url.to_string())
}

fn message_text(body: &Value) -> Option<String> {
    body.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

async fn materialize(ctx: &TransportContext<'_>, image: &str) -> Result<GenerationResult> {
    let transport = Transport::OpenRouterChat;
    if image.starts_with("data:") {
        return decode_data_url(transport, image);
    }
    if image.starts_with("http://") || image.starts_with("https://") {
        return fetch_image_as_base64(ctx.http, transport, image).await;
    }
    decode_bare_base64(transport, image)
}
