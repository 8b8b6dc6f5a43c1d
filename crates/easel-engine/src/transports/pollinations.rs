use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use easel_contracts::events::RouterEvent;
use easel_contracts::models::Transport;
use easel_contracts::normalize::nearest_ratio;
use easel_contracts::request::{GenerationRequest, GenerationResult};
use reqwest::Url;

use super::{TransportContext, Translator};
use crate::error::{GenerationError, Result};
use crate::http::{content_type, image_mime, provider_error_message, truncate_text};

const DEFAULT_MODEL: &str = "flux";

const DIMENSIONS: &[(&str, u32, u32)] = &[
    ("1:1", 1024, 1024),
    ("16:9", 1344, 768),
    ("9:16", 768, 1344),
    ("4:3", 1152, 896),
    ("3:4", 896, 1152),
    ("3:2", 1216, 832),
    ("2:3", 832, 1216),
];

/// Pollinations GET-by-URL image generation. Reference images are not
/// supported and are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollinationsTranslator;

#[async_trait]
impl Translator for PollinationsTranslator {
    fn transport(&self) -> Transport {
        Transport::PollinationsUrl
    }

    async fn generate(
        &self,
        ctx: &TransportContext<'_>,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let transport = self.transport();
        if request.prompt().trim().is_empty() {
            return Err(GenerationError::ReferenceImage(
                "Pollinations needs prompt text; reference images are not supported".to_string(),
            ));
        }
        let api_key = ctx.credential().ok_or_else(|| {
            GenerationError::configuration("Pollinations API key is required")
        })?;
        let base = ctx.config.image_endpoint(ctx.provider).ok_or_else(|| {
            GenerationError::configuration("Pollinations has no image endpoint configured")
        })?;
        if request.has_reference_images() {
            tracing::debug!(
                %transport,
                supplied = request.reference_images().len(),
                "ignoring reference images"
            );
        }
        let url = build_url(&base, request, api_key)?;

        let max_retries = ctx.config.pollinations_max_retries;
        let mut attempt = 0u32;
        loop {
            tracing::debug!(%transport, model = request.model_id(), attempt, "fetching Pollinations image");
            let response = ctx
                .http
                .get(url.clone())
                .send()
                .await
                .map_err(|err| GenerationError::network(transport, err))?;
            let status = response.status();

            if status.is_success() {
                let header_mime = content_type(&response);
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|err| GenerationError::network(transport, err))?;
                if bytes.is_empty() {
                    return Err(GenerationError::no_image(transport, "empty image body"));
                }
                let mime = image_mime(header_mime.as_deref(), &bytes);
                return Ok(GenerationResult::new(BASE64.encode(&bytes), mime));
            }

            if status.is_server_error() && attempt < max_retries {
                attempt += 1;
                tracing::warn!(
                    %transport,
                    status = status.as_u16(),
                    attempt,
                    max_retries,
                    "Pollinations server error, retrying"
                );
                ctx.events.emit(&RouterEvent::TransportRetry {
                    transport,
                    attempt,
                    max_retries,
                    status: status.as_u16(),
                });
                tokio::time::sleep(ctx.config.pollinations_retry_backoff * attempt).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Transport {
                transport,
                status: status.as_u16(),
                message: truncate_text(&provider_error_message(&body), 200),
            });
        }
    }
}

/// Width and height for a ratio, snapping to the closest supported ratio.
fn dimensions_for(aspect_ratio: &str) -> (u32, u32) {
    let labels: Vec<&str> = DIMENSIONS.iter().map(|(label, _, _)| *label).collect();
    let label = nearest_ratio(aspect_ratio, &labels).unwrap_or_else(|| "1:1".to_string());
    DIMENSIONS
        .iter()
        .find(|(candidate, _, _)| *candidate == label)
        .map(|(_, width, height)| (*width, *height))
        .unwrap_or((1024, 1024))
}

fn build_url(base: &str, request: &GenerationRequest, api_key: &str) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|err| {
        GenerationError::configuration(format!("invalid Pollinations endpoint '{base}': {err}"))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            GenerationError::configuration(format!("Pollinations endpoint '{base}' cannot take a path"))
        })?
        .pop_if_empty()
        .push(request.prompt().trim());

    let model = match request.model_id().trim() {
        "" => DEFAULT_MODEL,
        model => model,
    };
    let (width, height) = dimensions_for(request.aspect_ratio());
    url.query_pairs_mut()
        .append_pair("model", model)
        .append_pair("width", &width.to_string())
        .append_pair("height", &height.to_string())
        .append_pair("nologo", "true")
        .append_pair("enhance", "false")
        .append_pair("key", api_key);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use easel_contracts::providers::ProviderId;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::EngineConfig;
    use crate::transports::test_support::Harness;

    const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    fn harness(server: &MockServer) -> Harness {
        let config = EngineConfig::default()
            .with_credential(ProviderId::Pollinations, "poll-key")
            .with_image_endpoint(ProviderId::Pollinations, format!("{}/image/", server.uri()))
            .with_pollinations_retry_backoff(Duration::from_millis(1));
        Harness::new(ProviderId::Pollinations, "flux", config)
    }

    #[tokio::test]
    async fn encodes_prompt_and_dimensions_into_url() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image/a%20cat%20on%20a%20mat"))
            .and(query_param("model", "flux"))
            .and(query_param("width", "1344"))
            .and(query_param("height", "768"))
            .and(query_param("nologo", "true"))
            .and(query_param("enhance", "false"))
            .and(query_param("key", "poll-key"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG_BYTES.to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let harness = harness(&server);
        let request = GenerationRequest::new("flux", "a cat on a mat").with_aspect_ratio("16:9");
        let result = PollinationsTranslator
            .generate(&harness.ctx(), &request)
            .await?;
        assert_eq!(result.mime_type, "image/jpeg");
        assert_eq!(result.image_data, BASE64.encode(JPEG_BYTES));
        Ok(())
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/webp")
                    .set_body_bytes(vec![7u8, 7, 7]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let harness = harness(&server);
        let result = PollinationsTranslator
            .generate(&harness.ctx(), &GenerationRequest::new("flux", "dunes"))
            .await?;
        assert_eq!(result.mime_type, "image/webp");
        assert_eq!(BASE64.decode(&result.image_data)?, vec![7u8, 7, 7]);

        let retries: Vec<RouterEvent> = harness.events.events();
        assert_eq!(retries.len(), 2);
        assert!(matches!(
            retries[1],
            RouterEvent::TransportRetry { attempt: 2, max_retries: 2, status: 503, .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(3)
            .mount(&server)
            .await;

        let harness = harness(&server);
        let err = PollinationsTranslator
            .generate(&harness.ctx(), &GenerationRequest::new("flux", "dunes"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
        Ok(())
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .expect(1)
            .mount(&server)
            .await;

        let harness = harness(&server);
        let err = PollinationsTranslator
            .generate(&harness.ctx(), &GenerationRequest::new("flux", "dunes"))
            .await
            .unwrap_err();
        match err {
            GenerationError::Transport { status, message, .. } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid key");
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn missing_key_is_configuration_error() {
        let harness = Harness::new(ProviderId::Pollinations, "flux", EngineConfig::default());
        let err = PollinationsTranslator
            .generate(&harness.ctx(), &GenerationRequest::new("flux", "dunes"))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn unknown_ratios_snap_to_nearest_dimensions() {
        assert_eq!(dimensions_for("1:1"), (1024, 1024));
        assert_eq!(dimensions_for("2:3"), (832, 1216));
        assert_eq!(dimensions_for("21:9"), (1344, 768));
        assert_eq!(dimensions_for("9:21"), (768, 1344));
    }
}
