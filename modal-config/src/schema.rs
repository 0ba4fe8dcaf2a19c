//! Strongly typed configuration schemas.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use modal_primitives::ModelCategory;
use serde::{Deserialize, Serialize};

/// Default byte ceiling applied to both inputs and outputs (25 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 25 * 1024 * 1024;

/// Default upper bound on the number of steps in one chain.
pub const DEFAULT_MAX_CHAIN_STEPS: usize = 16;

/// Default provider base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/";

/// Default provider call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Opt-in switches for access policy. Every flag defaults to `false`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessFlags {
    /// Permit reading `https://` references.
    pub allow_remote_urls: bool,
    /// Permit writing to remote (presigned upload) targets.
    pub allow_presigned_uploads: bool,
    /// Permit plain `http://` for remote references.
    pub allow_insecure_http: bool,
    /// Create missing parent directories of write targets.
    pub allow_mkdir: bool,
}

/// Byte ceilings per transfer direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteLimits {
    /// Maximum size of any input read by a tool.
    pub max_input_bytes: u64,
    /// Maximum size of any artifact written by a tool.
    pub max_output_bytes: u64,
}

impl Default for ByteLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_BYTES,
            max_output_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Model-name configuration, consulted after per-call overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelSettings {
    tool_models: HashMap<String, String>,
    category_models: HashMap<ModelCategory, String>,
}

impl ModelSettings {
    /// Sets the model used for a specific tool.
    pub fn set_tool_model(&mut self, tool: impl Into<String>, model: impl Into<String>) {
        self.tool_models.insert(tool.into(), model.into());
    }

    /// Sets the model used for every tool of a category.
    pub fn set_category_model(&mut self, category: ModelCategory, model: impl Into<String>) {
        self.category_models.insert(category, model.into());
    }

    /// Returns the model configured for the named tool, if any.
    #[must_use]
    pub fn tool_model(&self, tool: &str) -> Option<&str> {
        self.tool_models.get(tool).map(String::as_str)
    }

    /// Returns the model configured for the category, if any.
    #[must_use]
    pub fn category_model(&self, category: ModelCategory) -> Option<&str> {
        self.category_models.get(&category).map(String::as_str)
    }
}

/// Connection settings for the inference provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// API credential. Required only when the provider adapter is built.
    pub api_key: Option<String>,
    /// Base URL, with or without a trailing slash.
    pub base_url: String,
    /// Optional organization header.
    pub organization: Option<String>,
    /// Optional project header.
    pub project: Option<String>,
    /// Timeout applied to every provider call.
    pub timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_owned(),
            organization: None,
            project: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Process-wide configuration shared read-only by every host component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostConfig {
    access: AccessFlags,
    limits: ByteLimits,
    temp_dir: PathBuf,
    allowed_roots: Vec<PathBuf>,
    max_chain_steps: usize,
    models: ModelSettings,
    provider: ProviderSettings,
}

impl Default for HostConfig {
    fn default() -> Self {
        let temp_dir = std::env::temp_dir();
        Self {
            access: AccessFlags::default(),
            limits: ByteLimits::default(),
            allowed_roots: default_roots(&temp_dir),
            temp_dir,
            max_chain_steps: DEFAULT_MAX_CHAIN_STEPS,
            models: ModelSettings::default(),
            provider: ProviderSettings::default(),
        }
    }
}

fn default_roots(temp_dir: &Path) -> Vec<PathBuf> {
    let mut roots = Vec::with_capacity(2);
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    roots.push(temp_dir.to_path_buf());
    roots
}

impl HostConfig {
    /// Creates a configuration populated with built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the access flags.
    #[must_use]
    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Replaces the byte ceilings.
    #[must_use]
    pub fn with_limits(mut self, limits: ByteLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the temporary-directory root.
    ///
    /// When the allowed roots are still the defaults they are recomputed so
    /// the new temp root stays reachable.
    #[must_use]
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        let previous_defaults = default_roots(&self.temp_dir);
        self.temp_dir = temp_dir.into();
        if self.allowed_roots == previous_defaults {
            self.allowed_roots = default_roots(&self.temp_dir);
        }
        self
    }

    /// Replaces the roots every local reference must live under.
    #[must_use]
    pub fn with_allowed_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.allowed_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the upper bound on chain length.
    #[must_use]
    pub fn with_max_chain_steps(mut self, steps: usize) -> Self {
        self.max_chain_steps = steps;
        self
    }

    /// Configures the model for a specific tool.
    #[must_use]
    pub fn with_tool_model(mut self, tool: impl Into<String>, model: impl Into<String>) -> Self {
        self.models.set_tool_model(tool, model);
        self
    }

    /// Configures the model for a category of tools.
    #[must_use]
    pub fn with_category_model(mut self, category: ModelCategory, model: impl Into<String>) -> Self {
        self.models.set_category_model(category, model);
        self
    }

    /// Replaces the provider settings.
    #[must_use]
    pub fn with_provider(mut self, provider: ProviderSettings) -> Self {
        self.provider = provider;
        self
    }

    /// Returns the access flags.
    #[must_use]
    pub const fn access(&self) -> AccessFlags {
        self.access
    }

    /// Returns the byte ceilings.
    #[must_use]
    pub const fn limits(&self) -> ByteLimits {
        self.limits
    }

    /// Returns the temporary-directory root.
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Returns the allowed roots, in priority order.
    #[must_use]
    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Returns the chain length bound.
    #[must_use]
    pub const fn max_chain_steps(&self) -> usize {
        self.max_chain_steps
    }

    /// Returns the model settings.
    #[must_use]
    pub fn models(&self) -> &ModelSettings {
        &self.models
    }

    /// Returns the provider settings.
    #[must_use]
    pub fn provider(&self) -> &ProviderSettings {
        &self.provider
    }

    pub(crate) fn access_mut(&mut self) -> &mut AccessFlags {
        &mut self.access
    }

    pub(crate) fn limits_mut(&mut self) -> &mut ByteLimits {
        &mut self.limits
    }

    pub(crate) fn models_mut(&mut self) -> &mut ModelSettings {
        &mut self.models
    }

    pub(crate) fn provider_mut(&mut self) -> &mut ProviderSettings {
        &mut self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_closed() {
        let config = HostConfig::default();
        assert_eq!(config.access(), AccessFlags::default());
        assert!(!config.access().allow_remote_urls);
        assert_eq!(config.limits().max_input_bytes, 26_214_400);
        assert_eq!(config.limits().max_output_bytes, 26_214_400);
        assert_eq!(config.max_chain_steps(), 16);
        assert!(config.allowed_roots().contains(&std::env::temp_dir()));
    }

    #[test]
    fn temp_dir_follows_default_roots() {
        let config = HostConfig::default().with_temp_dir("/srv/scratch");
        assert!(config.allowed_roots().contains(&PathBuf::from("/srv/scratch")));

        let pinned = HostConfig::default()
            .with_allowed_roots(["/data"])
            .with_temp_dir("/srv/scratch");
        assert_eq!(pinned.allowed_roots(), [PathBuf::from("/data")]);
    }

    #[test]
    fn provider_debug_redacts_key() {
        let settings = ProviderSettings {
            api_key: Some("sk-secret".into()),
            ..ProviderSettings::default()
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
