//! Runtime configuration
//!
//! Provider credentials and model overrides come from the environment;
//! sandbox settings default to the process working directory and can be
//! overridden programmatically.

use std::path::PathBuf;

/// Environment-derived settings for one provider slot.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl ProviderSettings {
    fn from_env(key_var: &str, model_var: &str) -> Self {
        Self {
            api_key: read_env(key_var),
            model: read_env(model_var),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic: ProviderSettings,
    pub openai: ProviderSettings,
    pub perplexity: ProviderSettings,
    pub gemini: ProviderSettings,
    /// Tiebreaker provider name when no routing rule matches.
    pub default_provider: Option<String>,
    /// Root below which filesystem effects are allowed.
    pub sandbox_root: PathBuf,
    /// Extra terminal whitelist patterns appended to the defaults.
    pub extra_whitelist: Vec<String>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            anthropic: ProviderSettings::from_env("ANTHROPIC_API_KEY", "ANTHROPIC_MODEL"),
            openai: ProviderSettings::from_env("OPENAI_API_KEY", "OPENAI_MODEL"),
            perplexity: ProviderSettings::from_env("PERPLEXITY_API_KEY", "PERPLEXITY_MODEL"),
            gemini: ProviderSettings::from_env("GEMINI_API_KEY", "GEMINI_MODEL"),
            default_provider: read_env("DEFAULT_AI_PROVIDER"),
            sandbox_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            extra_whitelist: Vec::new(),
        }
    }

    pub fn with_sandbox_root(mut self, root: PathBuf) -> Self {
        self.sandbox_root = root;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn read_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
