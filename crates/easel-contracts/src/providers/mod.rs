use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Ratios every provider can fall back to when neither metadata nor a family
/// preset says anything about the model.
pub const COMMON_ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProviderId {
    #[serde(rename = "nano-gpt")]
    NanoGpt,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "linkapi")]
    LinkApi,
    #[serde(rename = "pollinations")]
    Pollinations,
    #[serde(rename = "custom")]
    Custom,
}

impl ProviderId {
    pub const ALL: [ProviderId; 5] = [
        ProviderId::NanoGpt,
        ProviderId::OpenRouter,
        ProviderId::LinkApi,
        ProviderId::Pollinations,
        ProviderId::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::NanoGpt => "nano-gpt",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::LinkApi => "linkapi",
            ProviderId::Pollinations => "pollinations",
            ProviderId::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "nano-gpt" | "nanogpt" => Ok(ProviderId::NanoGpt),
            "openrouter" => Ok(ProviderId::OpenRouter),
            "linkapi" | "linkapi.ai" => Ok(ProviderId::LinkApi),
            "pollinations" | "pollinations.ai" => Ok(ProviderId::Pollinations),
            "custom" => Ok(ProviderId::Custom),
            other => Err(format!("Unknown provider '{other}'.")),
        }
    }
}

/// Static endpoints and flags of one supported provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub display_name: &'static str,
    /// Default image-generation endpoint.
    pub image_url: Option<&'static str>,
    /// Root that path-built transports (Gemini native, OpenRouter) append to.
    pub api_base: Option<&'static str>,
    /// Model listing URL first, connectivity check second.
    pub models_urls: &'static [&'static str],
    pub chat_url: Option<&'static str>,
    pub gzip_models_response: bool,
    pub requires_credential: bool,
    pub default_aspect_ratios: &'static [&'static str],
}

impl ProviderDescriptor {
    pub fn models_url(&self) -> Option<&'static str> {
        self.models_urls.first().copied()
    }
}

pub trait NamedProvider {
    fn name(&self) -> &str;
}

impl NamedProvider for ProviderDescriptor {
    fn name(&self) -> &str {
        self.id.as_str()
    }
}

pub static BUILTIN_PROVIDERS: [ProviderDescriptor; 5] = [
    ProviderDescriptor {
        id: ProviderId::NanoGpt,
        display_name: "NanoGPT",
        image_url: Some("https://nano-gpt.com/v1/images/generations"),
        api_base: Some("https://nano-gpt.com/api/v1"),
        models_urls: &[
            "https://nano-gpt.com/api/v1/image-models?detailed=true",
            "https://nano-gpt.com/api/v1/models",
        ],
        chat_url: Some("https://nano-gpt.com/api/v1/chat/completions"),
        gzip_models_response: true,
        requires_credential: true,
        default_aspect_ratios: COMMON_ASPECT_RATIOS,
    },
    ProviderDescriptor {
        id: ProviderId::OpenRouter,
        display_name: "OpenRouter",
        image_url: Some("https://openrouter.ai/api/v1/chat/completions"),
        api_base: Some("https://openrouter.ai/api/v1"),
        models_urls: &["https://openrouter.ai/api/v1/models"],
        chat_url: Some("https://openrouter.ai/api/v1/chat/completions"),
        gzip_models_response: false,
        requires_credential: true,
        default_aspect_ratios: COMMON_ASPECT_RATIOS,
    },
    ProviderDescriptor {
        id: ProviderId::LinkApi,
        display_name: "LinkAPI.ai",
        image_url: Some("https://api.linkapi.ai/v1/images/generations"),
        api_base: Some("https://api.linkapi.ai"),
        models_urls: &[
            "https://api.linkapi.ai/v1beta/models",
            "https://api.linkapi.ai/v1/models",
        ],
        chat_url: Some("https://api.linkapi.ai/v1/chat/completions"),
        gzip_models_response: false,
        requires_credential: true,
        default_aspect_ratios: COMMON_ASPECT_RATIOS,
    },
    ProviderDescriptor {
        id: ProviderId::Pollinations,
        display_name: "Pollinations.ai",
        image_url: Some("https://gen.pollinations.ai/image/"),
        api_base: Some("https://gen.pollinations.ai"),
        models_urls: &[
            "https://gen.pollinations.ai/image/models",
            "https://gen.pollinations.ai/text/models",
        ],
        chat_url: Some("https://text.pollinations.ai/openai/v1/chat/completions"),
        gzip_models_response: false,
        requires_credential: true,
        default_aspect_ratios: COMMON_ASPECT_RATIOS,
    },
    ProviderDescriptor {
        id: ProviderId::Custom,
        display_name: "Custom",
        image_url: None,
        api_base: None,
        models_urls: &[],
        chat_url: None,
        gzip_models_response: false,
        requires_credential: false,
        default_aspect_ratios: COMMON_ASPECT_RATIOS,
    },
];

pub fn descriptor_for(id: ProviderId) -> &'static ProviderDescriptor {
    BUILTIN_PROVIDERS
        .iter()
        .find(|descriptor| descriptor.id == id)
        .unwrap_or(&BUILTIN_PROVIDERS[BUILTIN_PROVIDERS.len() - 1])
}

#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

impl<T: NamedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &[T] {
        self.providers.as_slice()
    }
}

impl ProviderRegistry<ProviderDescriptor> {
    pub fn builtin() -> Self {
        Self::new(BUILTIN_PROVIDERS.to_vec())
    }

    pub fn descriptor(&self, id: ProviderId) -> Option<&ProviderDescriptor> {
        self.get(id.as_str())
    }
}

impl Default for ProviderRegistry<ProviderDescriptor> {
    fn default() -> Self {
        Self::builtin()
    }
}
