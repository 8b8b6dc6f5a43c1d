use async_trait::async_trait;
use easel_contracts::models::{Transport, GEMINI_ASPECT_RATIOS};
use easel_contracts::normalize::{is_size_tier, nearest_ratio, parse_dimensions};
use easel_contracts::request::{DataUri, GenerationRequest, GenerationResult};
use serde_json::{json, Value};

use super::{prepare_references, with_aspect_directive, TransportContext, Translator};
use crate::error::{GenerationError, Result};
use crate::http::{read_json_or_error, DEFAULT_MIME};

/// Gemini `generateContent`, as exposed by Gemini-compatible aggregators.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiNativeTranslator;

#[async_trait]
impl Translator for GeminiNativeTranslator {
    fn transport(&self) -> Transport {
        Transport::GeminiNative
    }

    async fn generate(
        &self,
        ctx: &TransportContext<'_>,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let transport = self.transport();
        let references = prepare_references(ctx, transport, request)?;
        let api_key = ctx.required_credential()?;
        let endpoint = endpoint_for_model(&ctx.api_base()?, request.model_id());
        let payload = build_payload(ctx, request, &references);

        tracing::debug!(
            %transport,
            model = request.model_id(),
            references = references.len(),
            %endpoint,
            "dispatching Gemini generateContent"
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
        extract_inline_image(&body)
    }
}

fn endpoint_for_model(base: &str, model: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{base}/v1beta/{model_path}:generateContent")
}

fn build_payload(
    ctx: &TransportContext<'_>,
    request: &GenerationRequest,
    references: &[DataUri],
) -> Value {
    let mut parts: Vec<Value> = references
        .iter()
        .map(|image| {
            json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": image.data,
                }
            })
        })
        .collect();
    parts.push(json!({
        "text": with_aspect_directive(request.prompt(), request.aspect_ratio()),
    }));

    let aspect_ratio =
        nearest_ratio(request.aspect_ratio(), GEMINI_ASPECT_RATIOS).unwrap_or_else(|| "1:1".to_string());
    let mut image_config = json!({ "aspectRatio": aspect_ratio });
    if ctx.profile.supports_size_tier() {
        if let Some(tier) = request.size_option().map(image_size_tier) {
            image_config["imageSize"] = Value::String(tier);
        }
    }

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseModalities": ["IMAGE", "TEXT"],
            "imageConfig": image_config,
        },
    })
}

/// Maps a size option onto Gemini's `1K`/`2K`/`4K` tiers.
pub(super) fn image_size_tier(size: &str) -> String {
    if is_size_tier(size) {
        return match size {
            "1K" | "2K" | "4K" => size.to_string(),
            "3K" => "2K".to_string(),
            _ => "4K".to_string(),
        };
    }
    match parse_dimensions(size) {
        Some((width, height)) if width.max(height) >= 3600 => "4K".to_string(),
        Some((width, height)) if width.max(height) >= 1800 => "2K".to_string(),
        _ => "1K".to_string(),
    }
}

fn extract_inline_image(body: &Value) -> Result<GenerationResult> {
    let transport = Transport::GeminiNative;
    let candidate = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| GenerationError::no_image(transport, "response has no candidates"))?;
    let parts = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for part in parts {
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MIME);
        return Ok(GenerationResult::new(data, mime_type));
    }

    Err(GenerationError::no_image(
        transport,
        "no image returned; the model may have replied with text only",
    ))
}

#[cfg(test)]
mod tests {
    use easel_contracts::events::RouterEvent;
    use easel_contracts::providers::ProviderId;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::config::EngineConfig;
    use crate::transports::test_support::{png_data_uri, Harness, PNG_B64};

    fn image_reply() -> Value {
        json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here you go" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "QUJD" } },
                    ]
                }
            }]
        })
    }

    fn harness(server: &MockServer, model: &str) -> Harness {
        let config = EngineConfig::default()
            .with_credential(ProviderId::LinkApi, "link-key")
            .with_api_base(ProviderId::LinkApi, server.uri());
        Harness::new(ProviderId::LinkApi, model, config)
    }

    #[tokio::test]
    async fn sends_images_first_and_snaps_ratio() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-3-pro-image-preview:generateContent"))
            .and(header("authorization", "Bearer link-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_reply()))
            .expect(1)
            .mount(&server)
            .await;

        let harness = harness(&server, "gemini-3-pro-image-preview");
        let request = GenerationRequest::new("gemini-3-pro-image-preview", "a lighthouse")
            .with_aspect_ratio("2.39:1")
            .with_size_option("4k")
            .with_reference_image(png_data_uri());
        let result = GeminiNativeTranslator
            .generate(&harness.ctx(), &request)
            .await?;
        assert_eq!(result, GenerationResult::new("QUJD", "image/jpeg"));

        let received: Vec<Request> = server.received_requests().await.unwrap_or_default();
        let sent: Value = serde_json::from_slice(&received[0].body)?;
        let parts = sent["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["inline_data"]["data"], json!(PNG_B64));
        assert_eq!(parts[0]["inline_data"]["mime_type"], json!("image/png"));
        assert!(parts[1]["text"]
            .as_str()
            .unwrap()
            .starts_with("Aspect ratio lock: 239:100."));
        let image_config = &sent["generationConfig"]["imageConfig"];
        assert_eq!(image_config["aspectRatio"], json!("21:9"));
        assert_eq!(image_config["imageSize"], json!("4K"));
        assert_eq!(
            sent["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
        Ok(())
    }

    #[tokio::test]
    async fn clamps_references_to_profile_limit() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_reply()))
            .mount(&server)
            .await;

        let harness = harness(&server, "gemini-2.5-flash-image");
        let request = GenerationRequest::new("gemini-2.5-flash-image", "a cat")
            .with_reference_images(vec![png_data_uri(); 5])
            .with_size_option("4K");
        GeminiNativeTranslator
            .generate(&harness.ctx(), &request)
            .await?;

        let received = server.received_requests().await.unwrap_or_default();
        let sent: Value = serde_json::from_slice(&received[0].body)?;
        let parts = sent["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 4);
        assert!(sent["generationConfig"]["imageConfig"].get("imageSize").is_none());

        let events = harness.events.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            RouterEvent::ReferenceImagesClamped { supplied: 5, limit: 3, .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn text_only_reply_is_no_image() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "I cannot draw that." }] } }]
            })))
            .mount(&server)
            .await;

        let harness = harness(&server, "gemini-2.5-flash-image");
        let err = GeminiNativeTranslator
            .generate(&harness.ctx(), &GenerationRequest::new("gemini-2.5-flash-image", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::NoImage { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn provider_error_message_is_surfaced() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "message": "API key not valid" }
            })))
            .mount(&server)
            .await;

        let harness = harness(&server, "gemini-2.5-flash-image");
        let err = GeminiNativeTranslator
            .generate(&harness.ctx(), &GenerationRequest::new("gemini-2.5-flash-image", "x"))
            .await
            .unwrap_err();
        match err {
            GenerationError::Transport {
                status, message, ..
            } => {
                assert_eq!(status, 403);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn size_tiers_follow_longest_edge() {
        assert_eq!(image_size_tier("2K"), "2K");
        assert_eq!(image_size_tier("8K"), "4K");
        assert_eq!(image_size_tier("1024x1024"), "1K");
        assert_eq!(image_size_tier("2048x1152"), "2K");
        assert_eq!(image_size_tier("4096x4096"), "4K");
    }

    #[test]
    fn missing_candidates_is_no_image() {
        assert!(matches!(
            extract_inline_image(&json!({})),
            Err(GenerationError::NoImage { .. })
        ));
        let snake = json!({
            "candidates": [{ "content": { "parts": [{ "inline_data": { "data": "QUJD" } }] } }]
        });
        assert_eq!(
            extract_inline_image(&snake).unwrap(),
            GenerationResult::new("QUJD", "image/png")
        );
    }
}
