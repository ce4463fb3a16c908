//! Pipeline configuration
//!
//! Settings come from an optional YAML file, every field has a default, and
//! environment variables override the file. Credentials are referenced by
//! environment variable name and only resolved when a client is built.

use crate::engine::RunnerConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RateLimiterConfig};
use crate::output::CloudDestination;
use crate::resolver::ResolverConfig;
use crate::source::{CrmClient, CrmSettings, EntitySpec, SourceClient, TrackingClient, TrackingSettings};
use crate::types::{BackoffType, Source};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the landing destination
pub const DESTINATION_ENV: &str = "LANDING_DESTINATION";
/// Environment variable overriding the CRM API base URL
pub const CRM_BASE_ENV: &str = "CRM_API_BASE";
/// Environment variable overriding the tracking-tool API base URL
pub const TRACKING_BASE_ENV: &str = "TRACKING_API_BASE";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Landing destination URL or local path
    pub destination: Option<String>,

    /// Bound on every object-storage call
    pub storage_timeout_secs: u64,

    /// Share of id-less records tolerated per entity type
    pub max_skip_ratio: f64,

    pub http: HttpConfig,

    pub crm: CrmConfig,

    pub tracking: TrackingConfig,

    pub resolver: ResolverSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            destination: None,
            storage_timeout_secs: 60,
            max_skip_ratio: 0.05,
            http: HttpConfig::default(),
            crm: CrmConfig::default(),
            tracking: TrackingConfig::default(),
            resolver: ResolverSettings::default(),
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP client settings shared by both sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    /// Zero disables client-side rate limiting
    pub requests_per_second: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 5,
            initial_backoff_ms: 1000,
            max_backoff_secs: 60,
            requests_per_second: 10,
        }
    }
}

/// CRM source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API token
    pub token_env: String,
    pub page_size: u32,
    pub lookback_months: u32,
    pub won_stage: String,
    pub portal_id: Option<String>,
    pub resolve_associations: bool,
}

impl Default for CrmConfig {
    fn default() -> Self {
        let settings = CrmSettings::default();
        Self {
            base_url: "https://api.hubapi.com".to_string(),
            token_env: "CRM_API_TOKEN".to_string(),
            page_size: settings.page_size,
            lookback_months: settings.lookback_months,
            won_stage: settings.won_stage,
            portal_id: settings.portal_id,
            resolve_associations: settings.resolve_associations,
        }
    }
}

impl CrmConfig {
    pub fn settings(&self) -> CrmSettings {
        CrmSettings {
            page_size: self.page_size,
            lookback_months: self.lookback_months,
            won_stage: self.won_stage.clone(),
            portal_id: self.portal_id.clone(),
            resolve_associations: self.resolve_associations,
        }
    }
}

/// Tracking-tool source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API token
    pub token_env: String,
    pub lookback_days: u32,
    pub max_concurrency: usize,
    pub page_size_overrides: HashMap<String, u32>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        let settings = TrackingSettings::default();
        Self {
            base_url: "https://api.scope.ws".to_string(),
            token_env: "TRACKING_API_TOKEN".to_string(),
            lookback_days: settings.lookback_days,
            max_concurrency: settings.max_concurrency,
            page_size_overrides: settings.page_size_overrides,
        }
    }
}

impl TrackingConfig {
    pub fn settings(&self) -> TrackingSettings {
        TrackingSettings {
            lookback_days: self.lookback_days,
            max_concurrency: self.max_concurrency,
            page_size_overrides: self.page_size_overrides.clone(),
        }
    }
}

/// Resolver settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub max_bad_records: usize,
}

// ============================================================================
// Loading
// ============================================================================

impl PipelineConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("Cannot read config file {}: {e}", path.display()))
                })?;
                Self::from_yaml_str(&yaml)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply overrides from the process environment
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(destination) = lookup(DESTINATION_ENV) {
            self.destination = Some(destination);
        }
        if let Some(base_url) = lookup(CRM_BASE_ENV) {
            self.crm.base_url = base_url;
        }
        if let Some(base_url) = lookup(TRACKING_BASE_ENV) {
            self.tracking.base_url = base_url;
        }
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.max_skip_ratio) {
            return Err(Error::invalid_value(
                "max_skip_ratio",
                format!("{} is outside 0.0..=1.0", self.max_skip_ratio),
            ));
        }
        if self.storage_timeout_secs == 0 {
            return Err(Error::invalid_value("storage_timeout_secs", "must be positive"));
        }
        if self.crm.page_size == 0 {
            return Err(Error::invalid_value("crm.page_size", "must be positive"));
        }
        if let Some((entity, _)) = self.tracking.page_size_overrides.iter().find(|(_, s)| **s == 0) {
            return Err(Error::invalid_value(
                "tracking.page_size_overrides",
                format!("page size for '{entity}' must be positive"),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Builders
    // ========================================================================

    /// Open the landing destination
    pub fn destination(&self) -> Result<CloudDestination> {
        let url = self
            .destination
            .as_deref()
            .ok_or_else(|| Error::missing_field(format!("destination (or {DESTINATION_ENV})")))?;
        Ok(CloudDestination::parse(url)?
            .with_timeout(Duration::from_secs(self.storage_timeout_secs)))
    }

    /// HTTP settings for one API
    pub fn http_config(&self, base_url: &str) -> HttpClientConfig {
        let mut builder = HttpClientConfig::builder()
            .base_url(base_url)
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .max_retries(self.http.max_retries)
            .backoff(
                BackoffType::Exponential,
                Duration::from_millis(self.http.initial_backoff_ms),
                Duration::from_secs(self.http.max_backoff_secs),
            )
            .user_agent(concat!("saas-landing/", env!("CARGO_PKG_VERSION")));
        builder = if self.http.requests_per_second == 0 {
            builder.no_rate_limit()
        } else {
            builder.rate_limit(RateLimiterConfig::new(
                self.http.requests_per_second,
                self.http.requests_per_second,
            ))
        };
        builder.build()
    }

    /// Name of the environment variable holding a source's token
    pub fn token_env(&self, source: Source) -> &str {
        match source {
            Source::Crm => &self.crm.token_env,
            Source::Tracking => &self.tracking.token_env,
        }
    }

    /// Resolve a source's token through `lookup`
    pub fn token(&self, source: Source, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        let name = self.token_env(source);
        lookup(name)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::config(format!("{source} API token not set (expected in {name})")))
    }

    /// Build the client of a source with an already resolved token
    pub fn source_client_with_token(
        &self,
        source: Source,
        token: &str,
    ) -> Result<Box<dyn SourceClient>> {
        Ok(match source {
            Source::Crm => {
                let http = HttpClient::with_bearer(self.http_config(&self.crm.base_url), token)?;
                Box::new(CrmClient::new(http, self.crm.settings()))
            }
            Source::Tracking => {
                let http =
                    HttpClient::with_bearer(self.http_config(&self.tracking.base_url), token)?;
                Box::new(TrackingClient::new(http, self.tracking.settings()))
            }
        })
    }

    /// Build the client of a source, reading its token from the environment
    pub fn source_client(&self, source: Source) -> Result<Box<dyn SourceClient>> {
        let token = self.token(source, |key| std::env::var(key).ok())?;
        self.source_client_with_token(source, &token)
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::default().with_max_skip_ratio(self.max_skip_ratio)
    }

    /// Resolver settings for an entity type
    pub fn resolver_config(&self, entity: &EntitySpec) -> ResolverConfig {
        ResolverConfig::for_entity(entity).with_max_bad_records(self.resolver.max_bad_records)
    }
}
