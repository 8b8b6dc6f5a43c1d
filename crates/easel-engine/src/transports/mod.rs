//! One translator per wire protocol.
//!
//! A translator turns a [`GenerationRequest`] into the provider's native
//! envelope, sends it, and digs the image back out of the native response.

mod gemini;
mod generic;
mod openrouter_chat;
mod openrouter_responses;
mod pollinations;

use async_trait::async_trait;
use easel_contracts::events::{EventSink, RouterEvent};
use easel_contracts::models::{ModelRuntimeProfile, Transport};
use easel_contracts::providers::ProviderDescriptor;
use easel_contracts::request::{DataUri, GenerationRequest, GenerationResult};
use reqwest::Client as HttpClient;

use crate::config::EngineConfig;
use crate::error::{GenerationError, Result};

pub use gemini::GeminiNativeTranslator;
pub use generic::GenericOpenAiTranslator;
pub use openrouter_chat::OpenRouterChatTranslator;
pub use openrouter_responses::OpenRouterResponsesTranslator;
pub use pollinations::PollinationsTranslator;

/// Everything a translator may read while serving one request.
#[derive(Clone, Copy)]
pub struct TransportContext<'a> {
    pub http: &'a HttpClient,
    pub config: &'a EngineConfig,
    pub provider: &'a ProviderDescriptor,
    pub profile: &'a ModelRuntimeProfile,
    pub events: &'a dyn EventSink,
}

impl TransportContext<'_> {
    pub(crate) fn credential(&self) -> Option<&str> {
        self.config.credential(self.provider.id)
    }

    /// Fails when the provider needs a key and none is configured.
    pub(crate) fn required_credential(&self) -> Result<Option<&str>> {
        match self.credential() {
            Some(key) => Ok(Some(key)),
            None if self.provider.requires_credential => Err(GenerationError::configuration(
                format!("{} requires an API key", self.provider.display_name),
            )),
            None => Ok(None),
        }
    }

    pub(crate) fn api_base(&self) -> Result<String> {
        self.config.api_base(self.provider).ok_or_else(|| {
            GenerationError::configuration(format!(
                "{} has no API base configured",
                self.provider.display_name
            ))
        })
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    fn transport(&self) -> Transport;

    async fn generate(
        &self,
        ctx: &TransportContext<'_>,
        request: &GenerationRequest,
    ) -> Result<GenerationResult>;
}

/// Static translator for a transport tag.
pub fn translator_for(transport: Transport) -> &'static dyn Translator {
    match transport {
        Transport::GeminiNative => &GeminiNativeTranslator,
        Transport::OpenRouterResponses => &OpenRouterResponsesTranslator,
        Transport::OpenRouterChat => &OpenRouterChatTranslator,
        Transport::PollinationsUrl => &PollinationsTranslator,
        Transport::GenericOpenAi => &GenericOpenAiTranslator,
    }
}

/// Prepends the aspect-ratio lock sentence unless it is already there.
pub fn with_aspect_directive(prompt: &str, aspect_ratio: &str) -> String {
    let ratio = aspect_ratio.trim();
    if ratio.is_empty() {
        return prompt.to_string();
    }
    let directive =
        format!("Aspect ratio lock: {ratio}. Final image must strictly use {ratio}.");
    if prompt.contains(&directive) {
        return prompt.to_string();
    }
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return directive;
    }
    format!("{directive}\n\n{prompt}")
}

/// Validates, drops and clamps reference images, reporting what changed.
pub(crate) fn prepare_references(
    ctx: &TransportContext<'_>,
    transport: Transport,
    request: &GenerationRequest,
) -> Result<Vec<DataUri>> {
    let supplied = request.reference_images();
    let mut valid: Vec<DataUri> = supplied
        .iter()
        .filter_map(|raw| DataUri::parse(raw))
        .collect();
    let dropped = supplied.len() - valid.len();
    if dropped > 0 {
        tracing::warn!(
            %transport,
            model = request.model_id(),
            dropped,
            "dropping invalid reference images"
        );
        ctx.events.emit(&RouterEvent::ReferenceImagesDropped {
            transport,
            model_id: request.model_id().to_string(),
            dropped,
            kept: valid.len(),
        });
    }

    if let Some(limit) = ctx.profile.max_reference_images {
        let limit_len = limit as usize;
        if valid.len() > limit_len {
            tracing::warn!(
                %transport,
                model = request.model_id(),
                supplied = valid.len(),
                limit,
                "clamping reference images"
            );
            ctx.events.emit(&RouterEvent::ReferenceImagesClamped {
                transport,
                model_id: request.model_id().to_string(),
                supplied: valid.len(),
                limit,
            });
            valid.truncate(limit_len);
        }
    }

    if request.prompt().trim().is_empty() && valid.is_empty() {
        return Err(GenerationError::ReferenceImage(
            "request has no prompt text and no valid reference image".to_string(),
        ));
    }
    Ok(valid)
}


#[cfg(test)]
mod tests {
    use easel_contracts::providers::ProviderId;

    use super::test_support::{png_data_uri, Harness};
    use super::*;

    #[test]
    fn directive_is_prepended_once() {
        let once = with_aspect_directive("a red fox", "16:9");
        assert_eq!(
            once,
            "Aspect ratio lock: 16:9. Final image must strictly use 16:9.\n\na red fox"
        );
        assert_eq!(with_aspect_directive(&once, "16:9"), once);
        assert_ne!(with_aspect_directive(&once, "1:1"), once);
        assert_eq!(with_aspect_directive("a red fox", ""), "a red fox");
    }

    #[test]
    fn references_are_dropped_then_clamped() {
        let harness = Harness::new(
            ProviderId::LinkApi,
            "gemini-2.5-flash-image",
            EngineConfig::default(),
        );
        let request = GenerationRequest::new("gemini-2.5-flash-image", "portrait")
            .with_reference_images(vec![
                png_data_uri(),
                "https://example.com/not-inline.png".to_string(),
                png_data_uri(),
                png_data_uri(),
                png_data_uri(),
            ]);
        let prepared =
            prepare_references(&harness.ctx(), Transport::GeminiNative, &request).unwrap();
        assert_eq!(prepared.len(), 3);
        assert_eq!(
            harness.events.events(),
            vec![
                RouterEvent::ReferenceImagesDropped {
                    transport: Transport::GeminiNative,
                    model_id: "gemini-2.5-flash-image".to_string(),
                    dropped: 1,
                    kept: 4,
                },
                RouterEvent::ReferenceImagesClamped {
                    transport: Transport::GeminiNative,
                    model_id: "gemini-2.5-flash-image".to_string(),
                    supplied: 4,
                    limit: 3,
                },
            ]
        );
    }

    #[test]
    fn empty_prompt_without_valid_images_is_fatal() {
        let harness = Harness::new(ProviderId::NanoGpt, "flux-kontext", EngineConfig::default());
        let request =
            GenerationRequest::new("flux-kontext", "  ").with_reference_image("data:bogus");
        let err = prepare_references(&harness.ctx(), Transport::GenericOpenAi, &request)
            .unwrap_err();
        assert!(matches!(err, GenerationError::ReferenceImage(_)));

        let request = GenerationRequest::new("flux-kontext", "").with_reference_image(png_data_uri());
        assert_eq!(
            prepare_references(&harness.ctx(), Transport::GenericOpenAi, &request)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn translator_table_matches_tags() {
        for transport in [
            Transport::GeminiNative,
            Transport::OpenRouterResponses,
            Transport::OpenRouterChat,
            Transport::PollinationsUrl,
            Transport::GenericOpenAi,
        ] {
            assert_eq!(translator_for(transport).transport(), transport);
        }
    }
}
