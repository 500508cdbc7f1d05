//! Engine configuration.
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to load engine configuration: {0}")]
pub struct ConfigError(String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Joins child abstracts in the default abstract of a composite value.
    pub abstract_separator: String,
    /// Default abstract of `null` and absent values.
    pub null_placeholder: String,
    /// Check raw schemas against the meta-schema before compiling.
    pub meta_validation: bool,
    /// Enforce `format` assertions (`email`, `date`, ...) when validating.
    pub validate_formats: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            abstract_separator: ",".to_string(),
            null_placeholder: "~".to_string(),
            meta_validation: true,
            validate_formats: false,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        crate::path_de::from_file_with_path(path.as_ref()).map_err(ConfigError)
    }

    pub fn from_json_str(src: &str) -> Result<Self, ConfigError> {
        crate::path_de::from_str_with_path(src).map_err(ConfigError)
    }
}
