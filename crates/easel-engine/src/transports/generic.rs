use async_trait::async_trait;
use easel_contracts::models::{ModelRuntimeProfile, Transport};
use easel_contracts::normalize::{best_dimension_for_ratio, nearest_ratio, parse_dimensions};
use easel_contracts::providers::ProviderId;
use easel_contracts::request::{DataUri, GenerationRequest, GenerationResult};
use serde_json::{json, Value};

use super::{prepare_references, with_aspect_directive, TransportContext, Translator};
use crate::error::{GenerationError, Result};
use crate::http::{decode_data_url, fetch_image_as_base64, read_json_or_error, DEFAULT_MIME};

const DEFAULT_SIZE: &str = "1024x1024";

const SIZE_TABLE: &[(&str, &str)] = &[
    ("1:1", "1024x1024"),
    ("16:9", "1792x1024"),
    ("9:16", "1024x1792"),
    ("4:3", "1152x896"),
    ("3:4", "896x1152"),
    ("3:2", "1536x1024"),
    ("2:3", "1024x1536"),
];

/// OpenAI-style `images/generations` endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericOpenAiTranslator;

#[async_trait]
impl Translator for GenericOpenAiTranslator {
    fn transport(&self) -> Transport {
        Transport::GenericOpenAi
    }

    async fn generate(
        &self,
        ctx: &TransportContext<'_>,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let transport = self.transport();
        let references = prepare_references(ctx, transport, request)?;
        let api_key = ctx.required_credential()?;
        let endpoint = ctx.config.image_endpoint(ctx.provider).ok_or_else(|| {
            GenerationError::configuration(format!(
                "{} has no image endpoint configured",
                ctx.provider.display_name
            ))
        })?;
        let payload = build_payload(ctx.provider.id, ctx.profile, request, &references);

        tracing::debug!(
            %transport,
            provider = %ctx.provider.id,
            model = request.model_id(),
            references = references.len(),
            %endpoint,
            "dispatching image generation"
        );
        let mut builder = ctx.http.post(&endpoint).json(&payload);
        if let Some(api_key) = api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| GenerationError::network(transport, err))?;
        let body = read_json_or_error(transport, response).await?;

        match find_image(&body) {
            Some(ImagePayload::Base64(data)) => Ok(GenerationResult::new(data, DEFAULT_MIME)),
            Some(ImagePayload::Url(url)) if url.starts_with("data:") => {
                decode_data_url(transport, &url)
            }
            Some(ImagePayload::Url(url)) => fetch_image_as_base64(ctx.http, transport, &url).await,
            None => Err(GenerationError::no_image(
                transport,
                "response has no b64_json, b64 or url field",
            )),
        }
    }
}

fn build_payload(
    provider: ProviderId,
    profile: &ModelRuntimeProfile,
    request: &GenerationRequest,
    references: &[DataUri],
) -> Value {
    let mut payload = json!({
        "model": request.model_id(),
        "prompt": with_aspect_directive(request.prompt(), request.aspect_ratio()),
        "n": 1,
        "size": request_size(profile, request),
        "response_format": "b64_json",
    });
    if provider != ProviderId::LinkApi {
        match references {
            [] => {}
            [single] => payload["imageDataUrl"] = Value::String(single.as_url()),
            many => {
                payload["imageDataUrls"] =
                    Value::Array(many.iter().map(|image| Value::String(image.as_url())).collect())
            }
        }
    }
    payload
}

fn request_size(profile: &ModelRuntimeProfile, request: &GenerationRequest) -> String {
    if let Some((width, height)) = request.size_option().and_then(parse_dimensions) {
        return format!("{width}x{height}");
    }
    if profile.prefers_dimension_size {
        if let Some(size) =
            best_dimension_for_ratio(request.aspect_ratio(), &profile.dimension_options())
        {
            return size;
        }
    }
    let labels: Vec<&str> = SIZE_TABLE.iter().map(|(ratio, _)| *ratio).collect();
    nearest_ratio(request.aspect_ratio(), &labels)
        .and_then(|ratio| {
            SIZE_TABLE
                .iter()
                .find(|(candidate, _)| *candidate == ratio)
                .map(|(_, size)| size.to_string())
        })
        .unwrap_or_else(|| DEFAULT_SIZE.to_string())
}

#[derive(Debug, PartialEq)]
enum ImagePayload {
    Base64(String),
    Url(String),
}

/// `data[0]`, `images[0]` or a bare array's first item, then the top level.
fn find_image(body: &Value) -> Option<ImagePayload> {
    let first = match body {
        Value::Array(items) => items.first(),
        _ => ["data", "images"].iter().find_map(|key| {
            body.get(*key)
                .and_then(Value::as_array)
                .and_then(|items| items.first())
        }),
    };
    first
        .and_then(image_fields)
        .or_else(|| image_fields(body))
}

fn image_fields(node: &Value) -> Option<ImagePayload> {
    let field = |key: &str| {
        node.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    field("b64_json")
        .or_else(|| field("b64"))
        .map(ImagePayload::Base64)
        .or_else(|| field("url").map(ImagePayload::Url))
}
