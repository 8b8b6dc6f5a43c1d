use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use easel_contracts::models::{ModelRuntimeProfile, Transport, OPENAI_IMAGE_SIZES};
use easel_contracts::normalize::best_dimension_for_ratio;
use easel_contracts::request::{DataUri, GenerationRequest, GenerationResult};
use serde_json::{json, Value};

use super::openrouter_chat::{apply_openrouter_headers, dimension_size};
use super::{prepare_references, with_aspect_directive, TransportContext, Translator};
use crate::error::{GenerationError, Result};
use crate::http::{decode_data_url, read_json_or_error, sniff_mime, truncate_text};

/// OpenRouter `responses` endpoint; images come back inline only.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRouterResponsesTranslator;

#[async_trait]
impl Translator for OpenRouterResponsesTranslator {
    fn transport(&self) -> Transport {
        Transport::OpenRouterResponses
    }

    async fn generate(
        &self,
        ctx: &TransportContext<'_>,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let transport = self.transport();
        let references = prepare_references(ctx, transport, request)?;
        let api_key = ctx.required_credential()?;
        let endpoint = format!("{}/responses", ctx.api_base()?);
        let payload = build_payload(ctx.profile, request, &references);

        tracing::debug!(
            %transport,
            model = request.model_id(),
            references = references.len(),
            %endpoint,
            "dispatching OpenRouter responses request"
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
        extract_generated_image(&body)
    }
}

fn build_payload(
    profile: &ModelRuntimeProfile,
    request: &GenerationRequest,
    references: &[DataUri],
) -> Value {
    let mut content = vec![json!({
        "type": "input_text",
        "text": with_aspect_directive(request.prompt(), request.aspect_ratio()),
    })];
    content.extend(references.iter().map(|image| {
        json!({
            "type": "input_image",
            "image_url": image.as_url(),
        })
    }));
    let size = dimension_size(profile, request)
        .or_else(|| best_dimension_for_ratio(request.aspect_ratio(), OPENAI_IMAGE_SIZES))
        .unwrap_or_else(|| "1024x1024".to_string());
    json!({
        "model": request.model_id(),
        "input": [{ "role": "user", "content": content }],
        "modalities": ["image", "text"],
        "stream": false,
        "image_config": { "size": size },
    })
}

fn extract_generated_image(body: &Value) -> Result<GenerationResult> {
    let transport = Transport::OpenRouterResponses;
    let output = body
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let generated = output
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("image_generation_call"))
        .find_map(|item| {
            let result = item.get("result").and_then(Value::as_str)?.trim();
            (!result.is_empty()).then_some((item, result))
        });
    if let Some((item, result)) = generated {
        if result.starts_with("data:") {
            return decode_data_url(transport, result);
        }
        let mime_type = match item.get("output_format").and_then(Value::as_str) {
            Some(format) if !format.trim().is_empty() => {
                format!("image/{}", format.trim().to_ascii_lowercase())
            }
            _ => {
                let bytes = BASE64.decode(result.as_bytes()).map_err(|err| {
                    GenerationError::malformed(transport, format!("image result is not base64: {err}"))
                })?;
                sniff_mime(&bytes)
            }
        };
        return Ok(GenerationResult::new(result, mime_type));
    }

    let detail = match output_message_text(output) {
        Some(text) => format!(
            "model replied with text instead of an image: {}",
            truncate_text(&text, 300)
        ),
        None => "response output has no image_generation_call item".to_string(),
    };
    Err(GenerationError::no_image(transport, detail))
}

fn output_message_text(output: &[Value]) -> Option<String> {
    let texts: Vec<&str> = output
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
        .flat_map(|item| {
            item.get("content")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
        })
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect();
    (!texts.is_empty()).then(|| texts.join(" "))
}

#[cfg(test)]
mod tests {
    use easel_contracts::providers::ProviderId;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::EngineConfig;
    use crate::transports::test_support::{png_data_uri, Harness, PNG_B64};

    fn harness(server: &MockServer) -> Harness {
        let config = EngineConfig::default()
            .with_credential(ProviderId::OpenRouter, "or-key")
            .with_api_base(ProviderId::OpenRouter, server.uri());
        Harness::new(ProviderId::OpenRouter, "openai/gpt-5-image", config)
    }

    #[tokio::test]
    async fn returns_inline_result_and_sends_input_items() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/responses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": [
                    { "type": "reasoning", "summary": [] },
                    { "type": "image_generation_call", "status": "completed", "result": PNG_B64 },
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let harness = harness(&server);
        let request = GenerationRequest::new("openai/gpt-5-image", "a bridge")
            .with_aspect_ratio("16:9")
            .with_reference_image(png_data_uri());
        let result = OpenRouterResponsesTranslator
            .generate(&harness.ctx(), &request)
            .await?;
        assert_eq!(result, GenerationResult::new(PNG_B64, "image/png"));

        let received = server.received_requests().await.unwrap_or_default();
        let sent: Value = serde_json::from_slice(&received[0].body)?;
        let content = sent["input"][0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], json!("input_text"));
        assert_eq!(content[1]["type"], json!("input_image"));
        assert_eq!(content[1]["image_url"], json!(png_data_uri()));
        assert_eq!(sent["image_config"]["size"], json!("1536x1024"));
        Ok(())
    }

    #[test]
    fn message_text_is_surfaced_when_no_image() {
        let body = json!({
            "output": [{
                "type": "message",
                "content": [{ "type": "output_text", "text": "That request violates policy." }]
            }]
        });
        match extract_generated_image(&body) {
            Err(GenerationError::NoImage { detail, .. }) => {
                assert!(detail.contains("That request violates policy."))
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            extract_generated_image(&json!({ "output": [] })),
            Err(GenerationError::NoImage { .. })
        ));
    }

    #[test]
    fn output_format_sets_mime() {
        let body = json!({
            "output": [{ "type": "image_generation_call", "result": "QUJD", "output_format": "webp" }]
        });
        assert_eq!(
            extract_generated_image(&body).unwrap(),
            GenerationResult::new("QUJD", "image/webp")
        );
    }
}
