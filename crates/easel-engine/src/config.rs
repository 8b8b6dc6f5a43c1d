use std::collections::HashMap;
use std::env;
use std::time::Duration;

use easel_contracts::providers::{ProviderDescriptor, ProviderId};

pub const DEFAULT_POLLINATIONS_RETRIES: u32 = 2;
pub const DEFAULT_POLLINATIONS_BACKOFF: Duration = Duration::from_millis(1000);

const CREDENTIAL_VARS: &[(ProviderId, &str)] = &[
    (ProviderId::NanoGpt, "NANOGPT_API_KEY"),
    (ProviderId::OpenRouter, "OPENROUTER_API_KEY"),
    (ProviderId::LinkApi, "LINKAPI_API_KEY"),
    (ProviderId::Pollinations, "POLLINATIONS_API_KEY"),
    (ProviderId::Custom, "EASEL_CUSTOM_API_KEY"),
];

const IMAGE_ENDPOINT_VARS: &[(ProviderId, &str)] = &[
    (ProviderId::NanoGpt, "NANOGPT_IMAGE_ENDPOINT"),
    (ProviderId::Pollinations, "POLLINATIONS_IMAGE_BASE"),
    (ProviderId::Custom, "EASEL_CUSTOM_ENDPOINT"),
];

const API_BASE_VARS: &[(ProviderId, &str)] = &[
    (ProviderId::OpenRouter, "OPENROUTER_API_BASE"),
    (ProviderId::LinkApi, "LINKAPI_API_BASE"),
];

/// Credentials, endpoint overrides and transport knobs for the router.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    credentials: HashMap<ProviderId, String>,
    image_endpoints: HashMap<ProviderId, String>,
    api_bases: HashMap<ProviderId, String>,
    models_urls: HashMap<ProviderId, String>,
    pub openrouter_referer: Option<String>,
    pub openrouter_title: Option<String>,
    /// Retry a failed OpenRouter Responses call once over chat completions.
    pub responses_fallback: bool,
    pub pollinations_max_retries: u32,
    pub pollinations_retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            credentials: HashMap::new(),
            image_endpoints: HashMap::new(),
            api_bases: HashMap::new(),
            models_urls: HashMap::new(),
            openrouter_referer: None,
            openrouter_title: None,
            responses_fallback: true,
            pollinations_max_retries: DEFAULT_POLLINATIONS_RETRIES,
            pollinations_retry_backoff: DEFAULT_POLLINATIONS_BACKOFF,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Builds a config from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();
        for (provider, key) in CREDENTIAL_VARS {
            if let Some(value) = read(*key) {
                config = config.with_credential(*provider, value);
            }
        }
        for (provider, key) in IMAGE_ENDPOINT_VARS {
            if let Some(value) = read(*key) {
                config = config.with_image_endpoint(*provider, value);
            }
        }
        for (provider, key) in API_BASE_VARS {
            if let Some(value) = read(*key) {
                config = config.with_api_base(*provider, value);
            }
        }
        config.openrouter_referer = read("OPENROUTER_HTTP_REFERER");
        config.openrouter_title = read("OPENROUTER_X_TITLE");
        if let Some(raw) = read("EASEL_RESPONSES_FALLBACK") {
            config.responses_fallback = parse_flag(&raw).unwrap_or(true);
        }
        config
    }

    pub fn with_credential(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        self.credentials.insert(provider, key.into());
        self
    }

    pub fn with_image_endpoint(mut self, provider: ProviderId, url: impl Into<String>) -> Self {
        self.image_endpoints.insert(provider, url.into().trim().to_string());
        self
    }

    pub fn with_api_base(mut self, provider: ProviderId, url: impl Into<String>) -> Self {
        self.api_bases
            .insert(provider, url.into().trim().trim_end_matches('/').to_string());
        self
    }

    pub fn with_models_url(mut self, provider: ProviderId, url: impl Into<String>) -> Self {
        self.models_urls.insert(provider, url.into().trim().to_string());
        self
    }

    pub fn with_responses_fallback(mut self, enabled: bool) -> Self {
        self.responses_fallback = enabled;
        self
    }

    pub fn with_pollinations_retry_backoff(mut self, backoff: Duration) -> Self {
        self.pollinations_retry_backoff = backoff;
        self
    }

    pub fn credential(&self, provider: ProviderId) -> Option<&str> {
        self.credentials
            .get(&provider)
            .map(String::as_str)
            .filter(|key| !key.is_empty())
    }

    pub fn image_endpoint(&self, descriptor: &ProviderDescriptor) -> Option<String> {
        self.image_endpoints
            .get(&descriptor.id)
            .cloned()
            .or_else(|| descriptor.image_url.map(str::to_string))
            .filter(|url| !url.is_empty())
    }

    pub fn api_base(&self, descriptor: &ProviderDescriptor) -> Option<String> {
        let base = self
            .api_bases
            .get(&descriptor.id)
            .cloned()
            .or_else(|| descriptor.api_base.map(str::to_string))?;
        if descriptor.id == ProviderId::OpenRouter {
            return Some(openrouter_api_root(&base));
        }
        Some(base.trim_end_matches('/').to_string())
    }

    pub fn models_url(&self, descriptor: &ProviderDescriptor) -> Option<String> {
        self.models_urls
            .get(&descriptor.id)
            .cloned()
            .or_else(|| descriptor.models_url().map(str::to_string))
    }
}

/// Bare OpenRouter hosts get the `/api/v1` root appended.
fn openrouter_api_root(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/api/v1");
        }
    }
    base.trim_end_matches('/').to_string()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
