use crate::core::policy::{FailureMode, FailurePolicy};
use crate::core::polling::LoopSettings;
use crate::domain::model::{Month, PhoneNumber, Query};
use crate::utils::error::{Result, WatchError};
use crate::utils::validation::{
    normalize_day, validate_centers, validate_non_empty_string, validate_phone,
    validate_positive_number, validate_resolved, validate_url, Validate,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CENTER_COUNT: usize = 12;
pub const DEFAULT_VOICE_MESSAGE: &str =
    "A test appointment is available. Please check your messages for more details.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub watcher: WatcherConfig,
    pub failure: Option<FailureConfig>,
    pub portal: PortalConfig,
    pub twilio: TwilioConfig,
    pub server: Option<ServerConfig>,
    pub queries: Vec<QueryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub name: Option<String>,
    pub master_contact: String,
    pub poll_interval_seconds: Option<u64>,
    pub cooldown_seconds: Option<i64>,
    pub liveness_every: Option<u64>,
    pub operation_timeout_seconds: Option<u64>,
    pub shutdown_grace_seconds: Option<u64>,
    pub introduced_contacts: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureConfig {
    pub policy: Option<FailureMode>,
    pub max_consecutive_failures: Option<u32>,
    pub backoff_seconds: Option<i64>,
    pub max_backoff_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    pub login_url: String,
    pub search_url: String,
    pub username: String,
    pub password: String,
    pub username_field: Option<String>,
    pub password_field: Option<String>,
    /// Text that only appears once the search form is reachable.
    pub ready_marker: Option<String>,
}

impl PortalConfig {
    pub fn username_field(&self) -> &str {
        self.username_field.as_deref().unwrap_or("IDToken1")
    }

    pub fn password_field(&self) -> &str {
        self.password_field.as_deref().unwrap_or("IDToken2")
    }

    pub fn ready_marker(&self) -> &str {
        self.ready_marker.as_deref().unwrap_or("testCentersNearAddress")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    /// TwiML document Twilio fetches when a call connects.
    pub voice_url: String,
    pub api_base: Option<String>,
}

impl TwilioConfig {
    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or("https://api.twilio.com")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub voice_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub address: String,
    pub month: Month,
    pub day: String,
    pub centers: Option<Vec<usize>>,
    pub text_contacts: Vec<String>,
    pub call_contacts: Option<Vec<String>>,
}

impl QueryConfig {
    fn centers(&self) -> Vec<usize> {
        self.centers
            .clone()
            .unwrap_or_else(|| (0..DEFAULT_CENTER_COUNT).collect())
    }
}

impl WatchConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(WatchError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| WatchError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` placeholders from the environment; unset variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| WatchError::ConfigError {
            message: format!("placeholder pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_phone("watcher.master_contact", &self.watcher.master_contact)?;
        if let Some(name) = &self.watcher.name {
            validate_non_empty_string("watcher.name", name)?;
        }
        if let Some(secs) = self.watcher.poll_interval_seconds {
            validate_positive_number("watcher.poll_interval_seconds", secs, 1)?;
        }
        if let Some(every) = self.watcher.liveness_every {
            validate_positive_number("watcher.liveness_every", every, 1)?;
        }
        if let Some(secs) = self.watcher.operation_timeout_seconds {
            validate_positive_number("watcher.operation_timeout_seconds", secs, 1)?;
        }
        self.introduced_contacts()?;

        if let Some(failure) = &self.failure {
            if let Some(max) = failure.max_consecutive_failures {
                validate_positive_number("failure.max_consecutive_failures", max.into(), 1)?;
            }
        }

        validate_url("portal.login_url", &self.portal.login_url)?;
        validate_url("portal.search_url", &self.portal.search_url)?;
        validate_resolved("portal.username", &self.portal.username)?;
        validate_resolved("portal.password", &self.portal.password)?;
        validate_non_empty_string("portal.username", &self.portal.username)?;

        validate_resolved("twilio.account_sid", &self.twilio.account_sid)?;
        validate_resolved("twilio.auth_token", &self.twilio.auth_token)?;
        validate_non_empty_string("twilio.account_sid", &self.twilio.account_sid)?;
        validate_phone("twilio.from_number", &self.twilio.from_number)?;
        validate_url("twilio.voice_url", &self.twilio.voice_url)?;
        validate_url("twilio.api_base", self.twilio.api_base())?;

        if self.queries.is_empty() {
            return Err(WatchError::MissingConfigError {
                field: "queries".to_string(),
            });
        }
        self.queries(Utc::now())?;

        Ok(())
    }

    pub fn name(&self) -> &str {
        self.watcher.name.as_deref().unwrap_or("Slot watcher")
    }

    pub fn master_contact(&self) -> Result<PhoneNumber> {
        validate_phone("watcher.master_contact", &self.watcher.master_contact)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        let defaults = FailurePolicy::default();
        match &self.failure {
            None => defaults,
            Some(f) => FailurePolicy {
                mode: f.policy.unwrap_or(defaults.mode),
                max_consecutive_failures: f
                    .max_consecutive_failures
                    .unwrap_or(defaults.max_consecutive_failures),
                backoff_secs: f.backoff_seconds.unwrap_or(defaults.backoff_secs),
                max_backoff_secs: f.max_backoff_seconds.unwrap_or(defaults.max_backoff_secs),
            },
        }
    }

    pub fn loop_settings(&self) -> Result<LoopSettings> {
        let mut settings = LoopSettings::new(self.name(), self.master_contact()?);
        let w = &self.watcher;
        if let Some(secs) = w.poll_interval_seconds {
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = w.cooldown_seconds {
            settings.cooldown_secs = secs;
        }
        if let Some(every) = w.liveness_every {
            settings.liveness_every = every;
        }
        if let Some(secs) = w.operation_timeout_seconds {
            settings.operation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = w.shutdown_grace_seconds {
            settings.shutdown_grace = Duration::from_secs(secs);
        }
        settings.failure = self.failure_policy();
        Ok(settings)
    }

    /// Builds the registry contents; every query starts its cooldown at `created_at`.
    pub fn queries(&self, created_at: DateTime<Utc>) -> Result<Vec<Query>> {
        self.queries
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let field = |name: &str| format!("queries[{}].{}", i, name);

                validate_non_empty_string(&field("address"), &q.address)?;
                let day = normalize_day(&field("day"), &q.day)?;
                let centers = q.centers();
                validate_centers(&field("centers"), &centers)?;

                let text = q
                    .text_contacts
                    .iter()
                    .map(|p| validate_phone(&field("text_contacts"), p))
                    .collect::<Result<Vec<_>>>()?;
                let call = q
                    .call_contacts
                    .iter()
                    .flatten()
                    .map(|p| validate_phone(&field("call_contacts"), p))
                    .collect::<Result<Vec<_>>>()?;
                if text.is_empty() && call.is_empty() {
                    return Err(WatchError::InvalidConfigValueError {
                        field: field("text_contacts"),
                        value: "[]".to_string(),
                        reason: "Query needs at least one text or call contact".to_string(),
                    });
                }

                Ok(Query::new(
                    q.address.trim(),
                    q.month,
                    day,
                    centers,
                    text,
                    call,
                    created_at,
                ))
            })
            .collect()
    }

    pub fn introduced_contacts(&self) -> Result<BTreeSet<PhoneNumber>> {
        self.watcher
            .introduced_contacts
            .iter()
            .flatten()
            .map(|p| validate_phone("watcher.introduced_contacts", p))
            .collect()
    }

    pub fn server_port(&self) -> u16 {
        self.server.as_ref().and_then(|s| s.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn voice_message(&self) -> &str {
        self.server
            .as_ref()
            .and_then(|s| s.voice_message.as_deref())
            .unwrap_or(DEFAULT_VOICE_MESSAGE)
    }
}

impl Validate for WatchConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
