use std::io::Read;

use easel_contracts::models::{ModelCatalog, Transport};
use easel_contracts::providers::{descriptor_for, ProviderDescriptor, ProviderId};
use flate2::read::GzDecoder;
use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{GenerationError, Result};
use crate::http::{provider_error_message, truncate_text};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Fetches provider model listings into a [`ModelCatalog`].
#[derive(Debug, Clone)]
pub struct ModelLister {
    http: HttpClient,
    config: EngineConfig,
}

impl ModelLister {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            http: HttpClient::new(),
            config,
        }
    }

    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    pub async fn fetch(&self, provider: ProviderId) -> Result<ModelCatalog> {
        let descriptor = descriptor_for(provider);
        let transport = listing_transport(provider);
        let url = self.config.models_url(descriptor).ok_or_else(|| {
            GenerationError::configuration(format!(
                "{} has no model listing URL configured",
                descriptor.display_name
            ))
        })?;

        tracing::debug!(%provider, %url, "fetching model listing");
        let mut builder = self.http.get(&url);
        if let Some(api_key) = self.config.credential(provider) {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| GenerationError::network(transport, err))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| GenerationError::network(transport, err))?;
        if !status.is_success() {
            return Err(GenerationError::Transport {
                transport,
                status: status.as_u16(),
                message: provider_error_message(&String::from_utf8_lossy(&bytes)),
            });
        }
        let body = decode_listing_body(descriptor, &bytes)
            .map_err(|detail| GenerationError::malformed(transport, detail))?;

        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            GenerationError::malformed(
                transport,
                format!("model listing is not JSON ({err}): {}", truncate_text(&body, 200)),
            )
        })?;
        let catalog = ModelCatalog::from_listing(provider, &parsed)
            .map_err(|err| GenerationError::malformed(transport, err.to_string()))?;
        tracing::info!(%provider, models = catalog.len(), "loaded model listing");
        Ok(catalog)
    }
}

/// Transport tag reported on listing failures.
fn listing_transport(provider: ProviderId) -> Transport {
    match provider {
        ProviderId::OpenRouter => Transport::OpenRouterChat,
        ProviderId::LinkApi => Transport::GeminiNative,
        ProviderId::Pollinations => Transport::PollinationsUrl,
        ProviderId::NanoGpt | ProviderId::Custom => Transport::GenericOpenAi,
    }
}

/// Gunzips when the provider is known to gzip listings and the body says so.
fn decode_listing_body(
    descriptor: &ProviderDescriptor,
    bytes: &[u8],
) -> std::result::Result<String, String> {
    if descriptor.gzip_models_response && bytes.starts_with(&GZIP_MAGIC) {
        let mut decoded = String::new();
        GzDecoder::new(bytes)
            .read_to_string(&mut decoded)
            .map_err(|err| format!("failed to gunzip model listing: {err}"))?;
        return Ok(decoded);
    }
    String::from_utf8(bytes.to_vec()).map_err(|err| format!("model listing is not UTF-8: {err}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn gzip(body: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn gzipped_nano_gpt_listing_is_decoded() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let listing = json!({ "data": [{ "id": "flux-dev" }, { "id": "recraft-v3" }] });
        Mock::given(method("GET"))
            .and(path("/api/v1/image-models"))
            .and(header("authorization", "Bearer nano-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(gzip(listing.to_string().as_bytes())),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = EngineConfig::default()
            .with_credential(ProviderId::NanoGpt, "nano-key")
            .with_models_url(ProviderId::NanoGpt, format!("{}/api/v1/image-models", server.uri()));
        let catalog = ModelLister::new(config).fetch(ProviderId::NanoGpt).await?;
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["flux-dev", "recraft-v3"]);
        Ok(())
    }

    #[tokio::test]
    async fn plain_listing_strips_linkapi_prefix() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    { "name": "models/gemini-2.5-flash-image", "displayName": "Nano Banana" },
                    { "name": "models/gemini-2.5-pro" },
                ]
            })))
            .mount(&server)
            .await;

        let config = EngineConfig::default()
            .with_models_url(ProviderId::LinkApi, format!("{}/v1beta/models", server.uri()));
        let catalog = ModelLister::new(config).fetch(ProviderId::LinkApi).await?;
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["gemini-2.5-flash-image"]);
        Ok(())
    }

    #[tokio::test]
    async fn listing_errors_are_typed() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "missing key" }
            })))
            .mount(&server)
            .await;

        let config = EngineConfig::default()
            .with_models_url(ProviderId::OpenRouter, format!("{}/models", server.uri()));
        let err = ModelLister::new(config)
            .fetch(ProviderId::OpenRouter)
            .await
            .unwrap_err();
        match err {
            GenerationError::Transport { status, message, .. } => {
                assert_eq!(status, 401);
                assert_eq!(message, "missing key");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = ModelLister::new(EngineConfig::default())
            .fetch(ProviderId::Custom)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        Ok(())
    }

    #[test]
    fn gzip_requires_flag_and_magic() {
        let compressed = gzip(b"[]");
        assert_eq!(
            decode_listing_body(descriptor_for(ProviderId::NanoGpt), &compressed).unwrap(),
            "[]"
        );
        assert!(decode_listing_body(descriptor_for(ProviderId::OpenRouter), &compressed).is_err());
        assert_eq!(
            decode_listing_body(descriptor_for(ProviderId::NanoGpt), b"[]").unwrap(),
            "[]"
        );
    }
}
