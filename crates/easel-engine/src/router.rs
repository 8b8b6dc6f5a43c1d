use std::sync::Arc;

use easel_contracts::events::{EventSink, NullSink, RouterEvent};
use easel_contracts::models::{ModelCatalog, ModelFamily, ModelRuntimeProfile, Transport};
use easel_contracts::providers::{ProviderDescriptor, ProviderId, ProviderRegistry};
use easel_contracts::request::{GenerationRequest, GenerationResult};
use reqwest::Client as HttpClient;

use crate::config::EngineConfig;
use crate::error::{GenerationError, Result};
use crate::transports::{prepare_references, translator_for, TransportContext};

/// Transport chosen for one request, plus the single fallback it may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub primary: Transport,
    pub fallback: Option<Transport>,
}

impl Route {
    fn direct(primary: Transport) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }
}

/// Picks the transport for a provider, profile and request.
pub fn select_route(
    provider: ProviderId,
    profile: &ModelRuntimeProfile,
    request: &GenerationRequest,
) -> Route {
    match provider {
        ProviderId::LinkApi if profile.family == ModelFamily::GeminiImage => {
            Route::direct(Transport::GeminiNative)
        }
        ProviderId::OpenRouter
            if profile.transport == Transport::OpenRouterResponses
                && request.has_reference_images() =>
        {
            Route {
                primary: Transport::OpenRouterResponses,
                fallback: Some(Transport::OpenRouterChat),
            }
        }
        ProviderId::OpenRouter => Route::direct(Transport::OpenRouterChat),
        ProviderId::Pollinations => Route::direct(Transport::PollinationsUrl),
        _ => Route::direct(Transport::GenericOpenAi),
    }
}

/// Sends image requests to the right provider transport.
///
/// Holds no per-request state; share one instance behind an `Arc`.
#[derive(Clone)]
pub struct ImageRouter {
    http: HttpClient,
    config: EngineConfig,
    registry: ProviderRegistry<ProviderDescriptor>,
    events: Arc<dyn EventSink>,
}

impl ImageRouter {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            http: HttpClient::new(),
            config,
            registry: ProviderRegistry::builtin(),
            events: Arc::new(NullSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    pub fn with_registry(mut self, registry: ProviderRegistry<ProviderDescriptor>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Profiles the model from `catalog` and generates on the catalog's provider.
    pub async fn generate_with_catalog(
        &self,
        catalog: &ModelCatalog,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let profile = catalog.profile(request.model_id());
        self.generate(catalog.provider(), &profile, request).await
    }

    pub async fn generate(
        &self,
        provider: ProviderId,
        profile: &ModelRuntimeProfile,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let descriptor = self.registry.descriptor(provider).ok_or_else(|| {
            GenerationError::configuration(format!("provider '{provider}' is not registered"))
        })?;
        let ctx = TransportContext {
            http: &self.http,
            config: &self.config,
            provider: descriptor,
            profile,
            events: self.events.as_ref(),
        };
        let route = select_route(provider, profile, request);
        tracing::debug!(
            %provider,
            model = request.model_id(),
            family = %profile.family,
            transport = %route.primary,
            "routing image request"
        );

        // Prepared once; a fallback translator sees the cleaned list.
        let prepared = prepare_references(&ctx, route.primary, request)?;
        let request = &request
            .clone()
            .replacing_reference_images(prepared.iter().map(|image| image.as_url()));

        let err = match translator_for(route.primary).generate(&ctx, request).await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };
        let fallback = match route.fallback {
            Some(fallback) if self.config.responses_fallback && !err.is_configuration() => fallback,
            _ => return Err(err),
        };

        tracing::warn!(
            from = %route.primary,
            to = %fallback,
            model = request.model_id(),
            error = %err,
            "transport failed, falling back"
        );
        self.events.emit(&RouterEvent::TransportFallback {
            from: route.primary,
            to: fallback,
            model_id: request.model_id().to_string(),
            reason: err.to_string(),
        });
        translator_for(fallback).generate(&ctx, request).await
    }
}
