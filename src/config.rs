use std::env;

use crate::{ReportError, Result};

pub const PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const ENDPOINT_ENV: &str = "MONITORING_ENDPOINT";
pub const DEFAULT_ENDPOINT: &str = "https://monitoring.googleapis.com";

/// Backend connection settings, resolved once and handed to the fetcher.
#[derive(Clone, PartialEq, Eq)]
pub struct MonitoringConfig {
    pub project_id: String,
    pub endpoint: String,
    pub access_token: Option<String>,
}

impl MonitoringConfig {
    pub fn new(project_id: impl Into<String>) -> Result<Self> {
        let project_id = project_id.into();
        if project_id.trim().is_empty() {
            return Err(ReportError::Configuration(
                "project identifier must not be empty".to_string(),
            ));
        }
        Ok(Self {
            project_id,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let project_id = lookup(PROJECT_ENV).ok_or_else(|| {
            ReportError::Configuration(format!("{} is not set", PROJECT_ENV))
        })?;

        let mut config = Self::new(project_id)?;
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|e| !e.trim().is_empty()) {
            config.endpoint = endpoint;
        }
        config.access_token = lookup(ACCESS_TOKEN_ENV).filter(|t| !t.trim().is_empty());
        Ok(config)
    }

    pub fn project_path(&self) -> String {
        format!("projects/{}", self.project_id)
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for MonitoringConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringConfig")
            .field("project_id", &self.project_id)
            .field("endpoint", &self.endpoint)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
