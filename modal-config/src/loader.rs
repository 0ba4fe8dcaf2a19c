//! Environment-style configuration loading.

use std::path::PathBuf;
use std::time::Duration;

use modal_primitives::ModelCategory;
use thiserror::Error;
use tracing::debug;

use crate::schema::HostConfig;

/// Provider credential.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Provider base URL.
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
/// Provider organization header.
pub const OPENAI_ORG_ID_ENV: &str = "OPENAI_ORG_ID";
/// Provider project header.
pub const OPENAI_PROJECT_ENV: &str = "OPENAI_PROJECT";
/// Provider timeout in seconds.
pub const OPENAI_TIMEOUT_ENV: &str = "OPENAI_TIMEOUT_SECS";
/// Prefix of category and per-tool model keys.
pub const OPENAI_MODEL_PREFIX: &str = "OPENAI_MODEL_";

/// Enables remote reads.
pub const ALLOW_REMOTE_URLS_ENV: &str = "MULTIMODAL_ALLOW_REMOTE_URLS";
/// Enables presigned upload targets.
pub const ALLOW_PRESIGNED_UPLOADS_ENV: &str = "MULTIMODAL_ALLOW_PRESIGNED_UPLOADS";
/// Enables plain HTTP.
pub const ALLOW_INSECURE_HTTP_ENV: &str = "MULTIMODAL_ALLOW_INSECURE_HTTP";
/// Enables parent directory creation.
pub const ALLOW_MKDIR_ENV: &str = "MULTIMODAL_ALLOW_MKDIR";
/// Input byte ceiling.
pub const MAX_INPUT_BYTES_ENV: &str = "MULTIMODAL_MAX_INPUT_BYTES";
/// Output byte ceiling.
pub const MAX_OUTPUT_BYTES_ENV: &str = "MULTIMODAL_MAX_OUTPUT_BYTES";
/// Temporary-directory root.
pub const TEMP_DIR_ENV: &str = "MULTIMODAL_TEMP_DIR";
/// OS path-list of allowed roots.
pub const ALLOWED_ROOTS_ENV: &str = "MULTIMODAL_ALLOWED_ROOTS";
/// Chain length bound.
pub const MAX_CHAIN_STEPS_ENV: &str = "MULTIMODAL_MAX_CHAIN_STEPS";

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A key was present but its value could not be parsed.
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        /// Offending key.
        key: String,
        /// Raw value.
        value: String,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

impl HostConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a recognized key carries a
    /// value that cannot be parsed.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Loads configuration from arbitrary key/value pairs.
    ///
    /// Unknown keys are ignored; empty values are treated as absent.
    /// `OPENAI_MODEL_<CATEGORY>` keys configure a model category, any other
    /// `OPENAI_MODEL_<TOOL>` key configures the lower-cased tool name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a recognized key carries a
    /// value that cannot be parsed.
    pub fn from_vars<I, K, V>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = HostConfig::default();
        let mut temp_dir = None;
        let mut roots = None;

        for (key, value) in vars {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }

            match key {
                OPENAI_API_KEY_ENV => config.provider_mut().api_key = Some(value.to_owned()),
                OPENAI_BASE_URL_ENV => config.provider_mut().base_url = value.to_owned(),
                OPENAI_ORG_ID_ENV => config.provider_mut().organization = Some(value.to_owned()),
                OPENAI_PROJECT_ENV => config.provider_mut().project = Some(value.to_owned()),
                OPENAI_TIMEOUT_ENV => {
                    let secs = parse_u64(key, value)?;
                    config.provider_mut().timeout = Duration::from_secs(secs);
                }
                ALLOW_REMOTE_URLS_ENV => config.access_mut().allow_remote_urls = parse_bool(key, value)?,
                ALLOW_PRESIGNED_UPLOADS_ENV => {
                    config.access_mut().allow_presigned_uploads = parse_bool(key, value)?;
                }
                ALLOW_INSECURE_HTTP_ENV => {
                    config.access_mut().allow_insecure_http = parse_bool(key, value)?;
                }
                ALLOW_MKDIR_ENV => config.access_mut().allow_mkdir = parse_bool(key, value)?,
                MAX_INPUT_BYTES_ENV => config.limits_mut().max_input_bytes = parse_u64(key, value)?,
                MAX_OUTPUT_BYTES_ENV => {
                    config.limits_mut().max_output_bytes = parse_u64(key, value)?;
                }
                TEMP_DIR_ENV => temp_dir = Some(PathBuf::from(value)),
                ALLOWED_ROOTS_ENV => {
                    roots = Some(std::env::split_paths(value).collect::<Vec<_>>());
                }
                MAX_CHAIN_STEPS_ENV => {
                    let steps = usize::try_from(parse_u64(key, value)?).map_err(|_| {
                        invalid(key, value, "value does not fit in usize")
                    })?;
                    if steps == 0 {
                        return Err(invalid(key, value, "chain step bound must be positive"));
                    }
                    config = config.with_max_chain_steps(steps);
                }
                other => {
                    if let Some(suffix) = other.strip_prefix(OPENAI_MODEL_PREFIX) {
                        apply_model_key(&mut config, suffix, value);
                    }
                }
            }
        }

        if let Some(temp_dir) = temp_dir {
            config = config.with_temp_dir(temp_dir);
        }
        if let Some(roots) = roots {
            config = config.with_allowed_roots(roots);
        }

        debug!(
            roots = ?config.allowed_roots(),
            access = ?config.access(),
            "host configuration loaded"
        );
        Ok(config)
    }
}

fn apply_model_key(config: &mut HostConfig, suffix: &str, value: &str) {
    if suffix.is_empty() {
        return;
    }
    match ModelCategory::ALL
        .into_iter()
        .find(|category| category.config_suffix() == suffix)
    {
        Some(category) => config.models_mut().set_category_model(category, value),
        None => config
            .models_mut()
            .set_tool_model(suffix.to_ascii_lowercase(), value),
    }
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn parse_u64(key: &str, value: &str) -> ConfigResult<u64> {
    value
        .parse::<u64>()
        .map_err(|_| invalid(key, value, "expected a non-negative integer"))
}

fn invalid(key: &str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_environment_yields_defaults() {
        let config = HostConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn parses_flags_limits_and_models() {
        let config = HostConfig::from_vars([
            (ALLOW_REMOTE_URLS_ENV, "true"),
            (ALLOW_MKDIR_ENV, "1"),
            (ALLOW_INSECURE_HTTP_ENV, "off"),
            (MAX_INPUT_BYTES_ENV, "1024"),
            (OPENAI_TIMEOUT_ENV, "5"),
            ("OPENAI_MODEL_VISION", "gpt-4.1"),
            ("OPENAI_MODEL_IMAGE_EDIT", "gpt-image-1-mini"),
            ("UNRELATED", "ignored"),
        ])
        .unwrap();

        assert!(config.access().allow_remote_urls);
        assert!(config.access().allow_mkdir);
        assert!(!config.access().allow_insecure_http);
        assert_eq!(config.limits().max_input_bytes, 1024);
        assert_eq!(config.limits().max_output_bytes, crate::schema::DEFAULT_MAX_BYTES);
        assert_eq!(config.provider().timeout, Duration::from_secs(5));
        assert_eq!(config.models().category_model(ModelCategory::Vision), Some("gpt-4.1"));
        assert_eq!(config.models().tool_model("image_edit"), Some("gpt-image-1-mini"));
    }

    #[test]
    fn empty_values_are_absent() {
        let config = HostConfig::from_vars([(MAX_OUTPUT_BYTES_ENV, "  ")]).unwrap();
        assert_eq!(config.limits().max_output_bytes, crate::schema::DEFAULT_MAX_BYTES);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = HostConfig::from_vars([(ALLOW_MKDIR_ENV, "sometimes")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ALLOW_MKDIR_ENV));

        let err = HostConfig::from_vars([(MAX_CHAIN_STEPS_ENV, "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn roots_and_temp_dir_are_applied() {
        let config = HostConfig::from_vars([
            (TEMP_DIR_ENV, "/srv/tmp"),
            (ALLOWED_ROOTS_ENV, "/srv/data"),
        ])
        .unwrap();
        assert_eq!(config.temp_dir(), std::path::Path::new("/srv/tmp"));
        assert_eq!(config.allowed_roots(), [PathBuf::from("/srv/data")]);
    }
}
