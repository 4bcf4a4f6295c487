//! Runtime configuration for the conversion and upload pipeline.
//!
//! All tunables are carried in explicit config values passed down to the
//! components; nothing in the core reads process environment variables at
//! call time. The HTTP and CLI layers build an [`AppConfig`] once, at the
//! edge, and thread it through.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Which Salesforce org the run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Sandbox org (test.salesforce.com).
    #[default]
    Sandbox,
    /// Production org (login.salesforce.com).
    Production,
}

impl Environment {
    /// Login host used for the OAuth token request.
    pub fn login_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => "https://test.salesforce.com/services/oauth2/token",
            Environment::Production => "https://login.salesforce.com/services/oauth2/token",
        }
    }

    /// Prefix for the credential environment variables of this org.
    pub fn credential_prefix(&self) -> &'static str {
        match self {
            Environment::Sandbox => "SANDBOX_",
            Environment::Production => "PRODUCTION_",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" => Ok(Environment::Sandbox),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Sandbox => write!(f, "sandbox"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Tuning for the Bulk API 2.0 uploader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Salesforce REST API version, without the leading `v`.
    pub api_version: String,

    /// Maximum records per ingest job.
    pub batch_size: usize,

    /// Delay between job status polls.
    #[serde(skip)]
    pub poll_interval: Duration,

    /// Maximum number of status polls before giving up on a job.
    pub max_poll_attempts: u32,

    /// Field length ceiling applied to every CSV value.
    pub field_max_len: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            api_version: "63.0".to_string(),
            // Salesforce-recommended chunk for best throughput
            batch_size: 2000,
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 30,
            field_max_len: 255,
        }
    }
}

/// Normalizer fallbacks and toggles.
///
/// The fallback strings and the monetary default are business constants of
/// the observed deployment, kept configurable rather than baked into the
/// transforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Substituted when `LastName` is empty after mapping.
    pub fallback_last_name: String,

    /// Substituted when `Company` is empty after mapping.
    pub fallback_company: String,

    /// Substituted when a monetary value is absent or unparsable.
    pub default_asset_value: i64,

    /// Split a multi-token `LastName` into first/last when `FirstName`
    /// is empty.
    pub split_combined_names: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            fallback_last_name: "Lead Sem Nome".to_string(),
            fallback_company: "Empresa Desconhecida".to_string(),
            default_asset_value: 1_300_000,
            split_combined_names: false,
        }
    }
}

/// Complete runtime configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Target Salesforce org.
    pub environment: Environment,

    /// Bulk uploader tuning.
    #[serde(default)]
    pub bulk: BulkConfig,

    /// Normalizer fallbacks.
    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Rows sampled for the AI mapping prompt.
    pub preview_rows: usize,

    /// Lead owner stamped on every record when set (15+ char Salesforce
    /// user id starting with `00`).
    pub owner_id: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            bulk: BulkConfig::default(),
            normalize: NormalizeConfig::default(),
            preview_rows: 10,
            owner_id: None,
        }
    }
}

impl AppConfig {
    /// Configuration for an environment with everything else at defaults.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    /// Set the lead owner, ignoring ids that are not plausible Salesforce
    /// user ids.
    pub fn with_owner(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id.filter(|id| {
            let id = id.trim();
            id.len() >= 15 && id.starts_with("00")
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_from_str() {
        assert_eq!("sandbox".parse::<Environment>().unwrap(), Environment::Sandbox);
        assert_eq!("Production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_environment_urls() {
        assert!(Environment::Sandbox.login_url().contains("test.salesforce.com"));
        assert!(Environment::Production.login_url().contains("login.salesforce.com"));
    }

    #[test]
    fn test_bulk_defaults() {
        let bulk = BulkConfig::default();
        assert_eq!(bulk.batch_size, 2000);
        assert_eq!(bulk.max_poll_attempts, 30);
        assert_eq!(bulk.poll_interval, Duration::from_secs(10));
        assert_eq!(bulk.api_version, "63.0");
    }

    #[test]
    fn test_normalize_defaults() {
        let n = NormalizeConfig::default();
        assert_eq!(n.fallback_last_name, "Lead Sem Nome");
        assert_eq!(n.fallback_company, "Empresa Desconhecida");
        assert_eq!(n.default_asset_value, 1_300_000);
        assert!(!n.split_combined_names);
    }

    #[test]
    fn test_owner_id_validation() {
        let cfg = AppConfig::default().with_owner(Some("005Aa000001abcdEFG".into()));
        assert!(cfg.owner_id.is_some());

        // Too short, or not a user id prefix
        let cfg = AppConfig::default().with_owner(Some("12345".into()));
        assert!(cfg.owner_id.is_none());
        let cfg = AppConfig::default().with_owner(Some("ZZ5Aa000001abcdEFG".into()));
        assert!(cfg.owner_id.is_none());
    }
}
