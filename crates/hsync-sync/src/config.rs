use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use hsync_adapters::garmin::{default_token_dir, OAUTH2_TOKEN_FILE};
use hsync_adapters::{GarminConfig, NotionConfig, OAuth2Token, SourceError, DEFAULT_NOTION_VERSION};
use hsync_core::MetricFamily;

use crate::errors::ConfigError;
use crate::window::{clamp_lookback, DEFAULT_LOOKBACK_DAYS};

pub const DEFAULT_TIME_ZONE: &str = "Europe/London";
pub const DEFAULT_CRON: &str = "0 */15 * * * *";

const FAMILY_CONTAINER_VARS: [(MetricFamily, &str); 3] = [
    (MetricFamily::Steps, "NOTION_STEPS_DB_ID"),
    (MetricFamily::Sleep, "NOTION_SLEEP_DB_ID"),
    (MetricFamily::Health, "NOTION_HEALTH_DB_ID"),
];

/// Where the Garmin bearer token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GarminCredential {
    /// Raw access token or token JSON.
    Inline(String),
    /// Directory holding `oauth2_token.json`.
    TokenDir(PathBuf),
}

impl GarminCredential {
    pub fn load_token(&self) -> Result<OAuth2Token, SourceError> {
        match self {
            GarminCredential::Inline(raw) => OAuth2Token::parse(raw),
            GarminCredential::TokenDir(dir) => OAuth2Token::load_from_dir(dir),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub notion_token: String,
    pub notion_version: String,
    /// Only needed when syncing from Garmin.
    pub garmin_credential: Option<GarminCredential>,
    pub garmin_domain: String,
    /// Destination container per configured family.
    pub containers: BTreeMap<MetricFamily, String>,
    pub activities_container: Option<String>,
    pub records_container: Option<String>,
    pub time_zone: Tz,
    pub create_missing_properties: bool,
    pub lookback_days: u32,
    pub cron: String,
    pub reports_dir: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    pub http_timeout_secs: u64,
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let notion_token = get("NOTION_TOKEN").ok_or_else(|| ConfigError::Missing("NOTION_TOKEN".to_string()))?;

        let garmin_credential = match (get("GARMIN_TOKEN"), get("GARMIN_TOKEN_DIR")) {
            (Some(token), _) => Some(GarminCredential::Inline(token)),
            (None, Some(dir)) => Some(GarminCredential::TokenDir(PathBuf::from(dir))),
            (None, None) => default_token_dir()
                .filter(|dir| dir.join(OAUTH2_TOKEN_FILE).is_file())
                .map(GarminCredential::TokenDir),
        };

        let mut containers = BTreeMap::new();
        for (family, key) in FAMILY_CONTAINER_VARS {
            if let Some(id) = get(key) {
                containers.insert(family, id);
            }
        }

        let time_zone_name = get("TZ").unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string());
        let time_zone: Tz = time_zone_name.parse().map_err(|e| ConfigError::Invalid {
            name: "TZ".to_string(),
            message: format!("{time_zone_name}: {e}"),
        })?;

        let lookback_days = match get("LOOKBACK_DAYS") {
            Some(raw) => clamp_lookback(raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
                name: "LOOKBACK_DAYS".to_string(),
                message: format!("{raw}: {e}"),
            })?),
            None => DEFAULT_LOOKBACK_DAYS,
        };

        let http_timeout_secs = match get("HSYNC_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: "HSYNC_HTTP_TIMEOUT_SECS".to_string(),
                message: format!("{raw}: {e}"),
            })?,
            None => 30,
        };

        Ok(Self {
            notion_token,
            notion_version: get("NOTION_VERSION")
                .or_else(|| get("Notion-Version"))
                .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
            garmin_credential,
            garmin_domain: get("GARMIN_DOMAIN").unwrap_or_else(|| "garmin.com".to_string()),
            containers,
            activities_container: get("NOTION_DB_ID"),
            records_container: get("NOTION_PR_DB_ID"),
            time_zone,
            create_missing_properties: get("CREATE_MISSING_PROPERTIES")
                .or_else(|| get("CREATE_MISSING_SLEEP_PROPERTIES"))
                .map(|v| truthy(&v))
                .unwrap_or(false),
            lookback_days,
            cron: get("HSYNC_CRON").unwrap_or_else(|| DEFAULT_CRON.to_string()),
            reports_dir: get("HSYNC_REPORTS_DIR").map(PathBuf::from),
            artifacts_dir: get("HSYNC_ARTIFACTS_DIR").map(PathBuf::from),
            http_timeout_secs,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn notion_config(&self) -> NotionConfig {
        NotionConfig {
            version: self.notion_version.clone(),
            timeout: self.http_timeout(),
            ..NotionConfig::new(self.notion_token.clone())
        }
    }

    /// Checks the settings a sync run needs beyond what every command needs.
    pub fn require_sync_settings(&self, needs_garmin: bool) -> Result<(), ConfigError> {
        if self.containers.is_empty() {
            return Err(ConfigError::Missing(
                "NOTION_STEPS_DB_ID, NOTION_SLEEP_DB_ID or NOTION_HEALTH_DB_ID".to_string(),
            ));
        }
        if needs_garmin && self.garmin_credential.is_none() {
            return Err(ConfigError::Missing("GARMIN_TOKEN or GARMIN_TOKEN_DIR".to_string()));
        }
        Ok(())
    }

    pub fn garmin_config(&self) -> Result<GarminConfig, SourceError> {
        let credential = self
            .garmin_credential
            .as_ref()
            .ok_or_else(|| SourceError::Auth("no Garmin credential configured".to_string()))?;
        let token = credential.load_token()?;
        Ok(GarminConfig {
            domain: self.garmin_domain.clone(),
            timeout: self.http_timeout(),
            ..GarminConfig::new(token)
        })
    }

    /// Container id for an inspection target name (a family, `activities` or `records`).
    pub fn container_for(&self, target: &str) -> Result<&str, ConfigError> {
        let (container, key) = match target.trim().to_ascii_lowercase().as_str() {
            "activities" => (self.activities_container.as_deref(), "NOTION_DB_ID"),
            "records" | "personal-records" => (self.records_container.as_deref(), "NOTION_PR_DB_ID"),
            other => {
                let family = MetricFamily::parse(other).ok_or_else(|| ConfigError::Invalid {
                    name: "target".to_string(),
                    message: format!("{target}: expected steps, sleep, health, activities or records"),
                })?;
                let key = FAMILY_CONTAINER_VARS
                    .iter()
                    .find(|(f, _)| *f == family)
                    .map(|(_, key)| *key)
                    .unwrap_or_default();
                (self.containers.get(&family).map(String::as_str), key)
            }
        };
        container.ok_or_else(|| ConfigError::Missing(key.to_string()))
    }
}
