use std::path::Path;

use anyhow::{bail, Context, Result};
use assignment_kernel_core::EvaluateOptions;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{load_document, DocumentFormat};

fn default_validity_override() -> bool {
    true
}

/// Evaluation settings shared by every call made through one api instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
    /// Upper bound on open path segments; `None` leaves depth to cycle detection.
    #[serde(default)]
    pub max_path_length: Option<usize>,
    /// Expand invalid direct assignments so their content is still reported.
    #[serde(default = "default_validity_override")]
    pub validity_override: bool,
    /// Fixed "now"; the wall clock is read once per call when absent.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub evaluation_time: Option<OffsetDateTime>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self { max_path_length: None, validity_override: true, evaluation_time: None }
    }
}

impl KernelConfig {
    /// # Errors
    /// Returns an error when the document does not parse or fails [`Self::validate`].
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(input).context("failed to parse YAML kernel config")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error when the document does not parse or fails [`Self::validate`].
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(input).context("failed to parse JSON kernel config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.json`, `.yaml` or `.yml` file.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed, or fails validation.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = load_document(path, "kernel config")?;
        config
            .validate()
            .with_context(|| format!("invalid kernel config {}", path.display()))?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error when `max_path_length` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_path_length == Some(0) {
            bail!("max_path_length must be greater than zero");
        }
        Ok(())
    }

    #[must_use]
    pub fn evaluate_options(&self) -> EvaluateOptions {
        EvaluateOptions { validity_override: self.validity_override }
    }

    #[must_use]
    pub fn evaluation_time_or_now(&self) -> OffsetDateTime {
        self.evaluation_time.unwrap_or_else(OffsetDateTime::now_utc)
    }

    /// Serialize in the given format, suitable for [`Self::from_path`].
    ///
    /// # Errors
    /// Returns an error when serialization fails.
    pub fn render(&self, format: DocumentFormat) -> Result<String> {
        match format {
            DocumentFormat::Json => serde_json::to_string_pretty(self)
                .context("failed to serialize kernel config as JSON"),
            DocumentFormat::Yaml => {
                serde_yaml::to_string(self).context("failed to serialize kernel config as YAML")
            }
        }
    }
}
