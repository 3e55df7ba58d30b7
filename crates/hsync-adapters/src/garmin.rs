//! Garmin Connect source adapter.
//!
//! Authenticates with a pre-issued OAuth2 bearer token (the token file written
//! by garth-compatible login tools, or a raw token from the environment) and
//! reads one day of steps, sleep, HRV and daily summary data per call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use hsync_core::{DailyMetricRecord, MetricFamily};
use hsync_storage::{HttpClientConfig, JsonHttp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::{SourceAdapter, SourceError, SourceSession};

/// User agent the Connect mobile API expects.
const API_USER_AGENT: &str = "GCM-iOS-5.7.2.1";

/// File name of the OAuth2 token inside a token directory.
pub const OAUTH2_TOKEN_FILE: &str = "oauth2_token.json";

/// OAuth2 bearer token as persisted by Garmin login tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuth2Token {
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuth2Token {
    pub fn from_access_token(access_token: impl Into<String>) -> Self {
        Self {
            token_type: default_token_type(),
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: 0,
        }
    }

    /// Accepts either token JSON or a bare access token string.
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SourceError::Auth("empty Garmin token".to_string()));
        }
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed)
                .map_err(|e| SourceError::Auth(format!("invalid Garmin token JSON: {e}")));
        }
        Ok(Self::from_access_token(trimmed))
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self, SourceError> {
        let path = dir.join(OAUTH2_TOKEN_FILE);
        let text = std::fs::read_to_string(&path).map_err(|source| SourceError::Io {
            context: format!("reading {}", path.display()),
            source,
        })?;
        Self::parse(&text)
    }

    /// Tokens without an expiry stamp are assumed valid.
    pub fn is_expired(&self) -> bool {
        self.expires_at > 0 && self.expires_at < Utc::now().timestamp()
    }
}

/// Default token directory used by garth-compatible tooling.
pub fn default_token_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".garminconnect"))
}

#[derive(Debug, Clone)]
pub struct GarminConfig {
    pub domain: String,
    pub token: OAuth2Token,
    pub timeout: Duration,
}

impl GarminConfig {
    pub fn new(token: OAuth2Token) -> Self {
        Self {
            domain: "garmin.com".to_string(),
            token,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct GarminSource {
    http: JsonHttp,
    token: OAuth2Token,
}

impl GarminSource {
    pub fn new(config: GarminConfig) -> Result<Self, SourceError> {
        let base_url = format!("https://connectapi.{}", config.domain);
        Self::with_base_url(config, &base_url)
    }

    /// Points the adapter at an arbitrary API root (used against mock servers).
    pub fn with_base_url(config: GarminConfig, base_url: &str) -> Result<Self, SourceError> {
        let http = JsonHttp::new(HttpClientConfig {
            base_url: base_url.to_string(),
            timeout: config.timeout,
            user_agent: Some(API_USER_AGENT.to_string()),
            bearer_token: Some(config.token.access_token.clone()),
            headers: Vec::new(),
        })?;
        Ok(Self {
            http,
            token: config.token,
        })
    }

    async fn fetch_steps(&self, date: NaiveDate) -> Result<JsonValue, SourceError> {
        let day = date.format("%Y-%m-%d").to_string();
        let body = self
            .http
            .get(&format!("/usersummary-service/stats/steps/daily/{day}/{day}"))
            .await?;
        let entries = body
            .as_array()
            .ok_or_else(|| SourceError::Malformed("daily steps response is not an array".to_string()))?;
        entries
            .iter()
            .find(|entry| entry.get("calendarDate").and_then(|v| v.as_str()) == Some(day.as_str()))
            .cloned()
            .ok_or(SourceError::NoData {
                family: MetricFamily::Steps,
                date,
            })
    }

    async fn fetch_sleep(&self, display_name: &str, date: NaiveDate) -> Result<JsonValue, SourceError> {
        let body = self
            .http
            .get(&format!(
                "/wellness-service/wellness/dailySleepData/{display_name}?date={}&nonSleepBufferMinutes=60",
                date.format("%Y-%m-%d")
            ))
            .await?;
        if body.is_null() {
            return Err(SourceError::NoData {
                family: MetricFamily::Sleep,
                date,
            });
        }
        Ok(body)
    }

    async fn fetch_daily_summary(&self, display_name: &str, date: NaiveDate) -> Result<JsonValue, SourceError> {
        let body = self
            .http
            .get(&format!(
                "/usersummary-service/usersummary/daily/{display_name}?calendarDate={}",
                date.format("%Y-%m-%d")
            ))
            .await?;
        if body.is_null() {
            return Err(SourceError::NoData {
                family: MetricFamily::Health,
                date,
            });
        }
        Ok(body)
    }

    /// HRV is optional: devices without it answer 204/404, which maps to `{}`.
    async fn fetch_hrv(&self, date: NaiveDate) -> JsonValue {
        match self
            .http
            .get(&format!("/hrv-service/hrv/{}", date.format("%Y-%m-%d")))
            .await
        {
            Ok(JsonValue::Null) => json!({}),
            Ok(body) => body,
            Err(err) => {
                warn!(%date, error = %err, "hrv fetch failed; continuing without hrv");
                json!({})
            }
        }
    }
}

fn require_display_name(session: &SourceSession) -> Result<&str, SourceError> {
    session
        .display_name
        .as_deref()
        .ok_or_else(|| SourceError::Auth("session has no display name; call login first".to_string()))
}

#[async_trait]
impl SourceAdapter for GarminSource {
    fn source_id(&self) -> &'static str {
        "garmin-connect"
    }

    async fn login(&self) -> Result<SourceSession, SourceError> {
        if self.token.is_expired() {
            return Err(SourceError::Auth(
                "Garmin OAuth2 token has expired; refresh it with your Garmin login tool".to_string(),
            ));
        }
        let profile = self
            .http
            .get("/userprofile-service/socialProfile")
            .await
            .map_err(|err| match err.status() {
                Some(401) | Some(403) => SourceError::Auth(format!("Garmin rejected the token: {err}")),
                _ => SourceError::Http(err),
            })?;
        let display_name = profile
            .get("displayName")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| SourceError::Malformed("profile has no displayName".to_string()))?;
        debug!(%display_name, "garmin session established");
        Ok(SourceSession {
            display_name: Some(display_name),
            established_at: Utc::now(),
        })
    }

    async fn fetch_metrics(
        &self,
        session: &SourceSession,
        family: MetricFamily,
        date: NaiveDate,
    ) -> Result<DailyMetricRecord, SourceError> {
        let payload = match family {
            MetricFamily::Steps => self.fetch_steps(date).await?,
            MetricFamily::Sleep => {
                let display_name = require_display_name(session)?;
                let sleep = self.fetch_sleep(display_name, date).await?;
                json!({ "sleep": sleep, "hrv": self.fetch_hrv(date).await })
            }
            MetricFamily::Health => {
                let display_name = require_display_name(session)?;
                let summary = self.fetch_daily_summary(display_name, date).await?;
                json!({ "summary": summary, "hrv": self.fetch_hrv(date).await })
            }
        };
        Ok(DailyMetricRecord {
            family,
            date,
            payload,
        })
    }
}
