use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use perfscope_core::{SampleStrategy, DEFAULT_MAX_SAMPLES};

/// Configuration for perfscope tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfscopeConfig {
    /// Metrics backend connection
    pub prometheus: PrometheusConfig,

    /// Sample production for distribution plots
    pub sampling: SamplingConfig,

    /// Where artifacts are written
    pub output: OutputConfig,
}

/// Prometheus connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Base URL of the HTTP API, without the `/api/v1` suffix
    pub url: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Bearer token sent with every request
    pub bearer_token: Option<String>,

    /// Skip TLS certificate verification
    pub accept_invalid_certs: bool,
}

/// Sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Upper bound of synthetic samples per run
    pub max_samples: usize,

    /// Seed for reproducible synthetic samples; random when unset
    pub seed: Option<u64>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving tables, figure descriptions and SVG files
    pub directory: PathBuf,

    /// Rendered figure width in pixels
    pub width: u32,

    /// Rendered figure height in pixels
    pub height: u32,
}

impl Default for PerfscopeConfig {
    fn default() -> Self {
        Self {
            prometheus: PrometheusConfig::default(),
            sampling: SamplingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            timeout_ms: 30000, // 30 seconds
            bearer_token: None,
            accept_invalid_certs: false,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
            seed: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("plots"),
            width: 1200,
            height: 600,
        }
    }
}

impl SamplingConfig {
    /// Histogram strategy bounded by [`SamplingConfig::max_samples`]
    pub fn histogram_strategy(&self) -> SampleStrategy {
        SampleStrategy::HistogramSynthetic {
            max_samples: self.max_samples,
        }
    }
}

impl PerfscopeConfig {
    /// Load configuration from environment variables and defaults
    pub fn load() -> Result<Self> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the process environment
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Override with environment variables if present
        if let Some(url) = lookup("PERFSCOPE_PROMETHEUS_URL") {
            config.prometheus.url = url.trim_end_matches('/').to_string();
        }

        if let Some(timeout) = lookup("PERFSCOPE_PROMETHEUS_TIMEOUT_MS") {
            config.prometheus.timeout_ms = timeout
                .parse()
                .context("PERFSCOPE_PROMETHEUS_TIMEOUT_MS must be an integer")?;
        }

        if let Some(token) = lookup("PERFSCOPE_PROMETHEUS_TOKEN") {
            config.prometheus.bearer_token = Some(token);
        }

        if let Some(insecure) = lookup("PERFSCOPE_PROMETHEUS_INSECURE") {
            config.prometheus.accept_invalid_certs = insecure
                .parse()
                .context("PERFSCOPE_PROMETHEUS_INSECURE must be true or false")?;
        }

        if let Some(max_samples) = lookup("PERFSCOPE_MAX_SAMPLES") {
            config.sampling.max_samples = max_samples
                .parse()
                .context("PERFSCOPE_MAX_SAMPLES must be an integer")?;
        }

        if let Some(seed) = lookup("PERFSCOPE_SAMPLING_SEED") {
            config.sampling.seed = Some(
                seed.parse()
                    .context("PERFSCOPE_SAMPLING_SEED must be an integer")?,
            );
        }

        if let Some(dir) = lookup("PERFSCOPE_OUTPUT_DIR") {
            config.output.directory = PathBuf::from(dir);
        }

        if let Some(width) = lookup("PERFSCOPE_FIGURE_WIDTH") {
            config.output.width = width.parse()?;
        }

        if let Some(height) = lookup("PERFSCOPE_FIGURE_HEIGHT") {
            config.output.height = height.parse()?;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.prometheus.url.is_empty() {
            return Err(anyhow::anyhow!("Prometheus URL cannot be empty"));
        }

        if !self.prometheus.url.starts_with("http://") && !self.prometheus.url.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "Prometheus URL must start with http:// or https://, got '{}'",
                self.prometheus.url
            ));
        }

        if self.prometheus.timeout_ms == 0 {
            return Err(anyhow::anyhow!("Prometheus timeout must be greater than 0"));
        }

        if self.sampling.max_samples == 0 {
            return Err(anyhow::anyhow!("Max samples must be greater than 0"));
        }

        if self.output.width == 0 || self.output.height == 0 {
            return Err(anyhow::anyhow!("Figure dimensions must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PerfscopeConfig::load_with(lookup(&[])).unwrap();
        assert_eq!(config.prometheus.url, "http://localhost:9090");
        assert_eq!(config.sampling.max_samples, DEFAULT_MAX_SAMPLES);
        config.validate().unwrap();
    }

    #[test]
    fn test_environment_overrides() {
        let config = PerfscopeConfig::load_with(lookup(&[
            ("PERFSCOPE_PROMETHEUS_URL", "https://prom.example:9091/"),
            ("PERFSCOPE_PROMETHEUS_TOKEN", "secret"),
            ("PERFSCOPE_PROMETHEUS_INSECURE", "true"),
            ("PERFSCOPE_MAX_SAMPLES", "500"),
            ("PERFSCOPE_SAMPLING_SEED", "42"),
            ("PERFSCOPE_OUTPUT_DIR", "/tmp/plots"),
        ]))
        .unwrap();

        assert_eq!(config.prometheus.url, "https://prom.example:9091");
        assert_eq!(config.prometheus.bearer_token.as_deref(), Some("secret"));
        assert!(config.prometheus.accept_invalid_certs);
        assert_eq!(config.sampling.seed, Some(42));
        assert_eq!(config.output.directory, PathBuf::from("/tmp/plots"));
        assert_eq!(
            config.sampling.histogram_strategy(),
            SampleStrategy::HistogramSynthetic { max_samples: 500 }
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(
            PerfscopeConfig::load_with(lookup(&[("PERFSCOPE_MAX_SAMPLES", "many")])).is_err()
        );

        let mut config = PerfscopeConfig::default();
        config.sampling.max_samples = 0;
        assert!(config.validate().is_err());

        let mut config = PerfscopeConfig::default();
        config.prometheus.url = "prom:9090".to_string();
        assert!(config.validate().is_err());
    }
}
