//! Model name resolution and provider detection.

/// Supported engine providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Hugging Face Inference API (or a compatible self-hosted endpoint).
    HuggingFace,
    /// `OpenAI` Images API (or an OpenAI-compatible diffusion server).
    OpenAi,
}

impl Provider {
    /// Display name used in messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::HuggingFace => "Hugging Face",
            Self::OpenAi => "OpenAI",
        }
    }

    /// Environment variable holding this provider's API key.
    #[must_use]
    pub fn key_env_var(self) -> &'static str {
        match self {
            Self::HuggingFace => "HUGGINGFACE_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Short name aliases for popular models.
const ALIASES: &[(&str, &str)] = &[
    ("sd-1.5", "runwayml/stable-diffusion-v1-5"),
    ("sd-2", "stabilityai/stable-diffusion-2"),
    ("sdxl", "stabilityai/stable-diffusion-xl-base-1.0"),
    ("flux-schnell", "black-forest-labs/FLUX.1-schnell"),
    ("gpt-1", "gpt-image-1"),
    ("gpt-1-mini", "gpt-image-1-mini"),
];

/// Resolve a model name (alias or exact) to the full model identifier.
#[must_use]
pub fn resolve_model(name: &str) -> String {
    for &(alias, full) in ALIASES {
        if name == alias {
            return full.to_string();
        }
    }
    name.to_string()
}

/// Detect the provider from a resolved model name.
///
/// Hub-style `owner/name` identifiers go to Hugging Face; `gpt-image-*` and
/// `dall-e-*` go to `OpenAI`.
///
/// # Errors
///
/// Returns an error if the model name doesn't match a known provider.
pub fn detect_provider(model: &str) -> Result<Provider, String> {
    if model.starts_with("gpt-image") || model.starts_with("dall-e") {
        Ok(Provider::OpenAi)
    } else if model.split_once('/').is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty())
    {
        Ok(Provider::HuggingFace)
    } else {
        Err(format!(
            "Unknown provider for model '{model}'. Expected '<owner>/<model>', 'gpt-image-*' or 'dall-e-*'."
        ))
    }
}
