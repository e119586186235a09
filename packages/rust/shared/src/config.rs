//! Application configuration and the per-run report request.
//!
//! User config lives at `~/.oncall-report/oncall-report.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the env vars
//! that hold them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::types::{ReplaceRule, TagFilterSet};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "oncall-report.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".oncall-report";

/// Date format accepted for `--since` / `--until`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Config structs (matching oncall-report.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub pagerduty: PagerDutyConfig,

    #[serde(default)]
    pub datadog: DatadogConfig,

    #[serde(default)]
    pub confluence: ConfluenceConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Page urgency to report on.
    #[serde(default = "default_urgency")]
    pub urgency: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            urgency: default_urgency(),
        }
    }
}

fn default_urgency() -> String {
    "high".into()
}

/// `[pagerduty]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerDutyConfig {
    /// Name of the env var holding the API token.
    #[serde(default = "default_pd_token_env")]
    pub token_env: String,

    #[serde(default = "default_pd_api_url")]
    pub api_url: String,
}

impl Default for PagerDutyConfig {
    fn default() -> Self {
        Self {
            token_env: default_pd_token_env(),
            api_url: default_pd_api_url(),
        }
    }
}

fn default_pd_token_env() -> String {
    "PD_AUTH_TOKEN".into()
}
fn default_pd_api_url() -> String {
    "https://api.pagerduty.com".into()
}

/// `[datadog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatadogConfig {
    #[serde(default = "default_dd_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_dd_app_key_env")]
    pub app_key_env: String,

    /// API host, e.g. `https://api.datadoghq.eu` for the EU site.
    #[serde(default = "default_dd_api_url")]
    pub api_url: String,

    /// Web UI host used to build incident permalinks.
    #[serde(default = "default_dd_app_url")]
    pub app_url: String,
}

impl Default for DatadogConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_dd_api_key_env(),
            app_key_env: default_dd_app_key_env(),
            api_url: default_dd_api_url(),
            app_url: default_dd_app_url(),
        }
    }
}

fn default_dd_api_key_env() -> String {
    "DD_API_KEY".into()
}
fn default_dd_app_key_env() -> String {
    "DD_APP_KEY".into()
}
fn default_dd_api_url() -> String {
    "https://api.datadoghq.com".into()
}
fn default_dd_app_url() -> String {
    "https://app.datadoghq.com".into()
}

/// `[confluence]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// Atlassian cloud subdomain (`<subdomain>.atlassian.net`).
    #[serde(default)]
    pub subdomain: String,

    #[serde(default)]
    pub username: String,

    #[serde(default = "default_confluence_token_env")]
    pub token_env: String,

    /// Default space to publish into.
    #[serde(default)]
    pub space_key: String,

    /// Default parent page id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            subdomain: String::new(),
            username: String::new(),
            token_env: default_confluence_token_env(),
            space_key: String::new(),
            parent_id: None,
        }
    }
}

fn default_confluence_token_env() -> String {
    "CONFLUENCE_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Report request (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Raw, unvalidated inputs for a report run, as collected from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub teams: Vec<String>,
    pub pd_teams: Vec<String>,
    pub since: String,
    pub until: String,
    pub urgency: String,
    pub replace: Vec<String>,
    pub tags: Vec<String>,
    pub match_team: Option<String>,
    pub publish: Option<PublishTarget>,
}

/// Where a published report lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub space_key: String,
    pub parent_id: Option<String>,
}

impl PublishTarget {
    /// Resolve a target from CLI overrides, falling back to the config file.
    pub fn resolve(
        config: &ConfluenceConfig,
        space_key: Option<&str>,
        parent_id: Option<&str>,
    ) -> Result<Self> {
        let space_key = space_key
            .map(String::from)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| config.space_key.clone());
        if space_key.is_empty() {
            return Err(ReportError::config(
                "no Confluence space key (use --space or set confluence.space_key)",
            ));
        }
        let parent_id = parent_id
            .map(String::from)
            .or_else(|| config.parent_id.clone())
            .filter(|p| !p.is_empty());
        Ok(Self {
            space_key,
            parent_id,
        })
    }
}

/// One immutable description of a report run.
///
/// Built once by [`ReportRequest::from_params`], which performs every
/// configuration check, and then passed by reference through the pipeline.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    /// Monitoring-platform team names, as given.
    pub teams: Vec<String>,
    /// On-call platform team names, lowercased. Defaults to `teams`.
    pub pd_teams: Vec<String>,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub urgency: String,
    /// Applied to page titles in this order.
    pub replace_rules: Vec<ReplaceRule>,
    pub tag_filter: TagFilterSet,
    /// Required `team:` tag on a page's alerts, lowercased.
    pub match_team: Option<String>,
    pub publish: Option<PublishTarget>,
}

impl ReportRequest {
    pub fn from_params(params: RequestParams) -> Result<Self> {
        let teams: Vec<String> = params
            .teams
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if teams.is_empty() {
            return Err(ReportError::config("at least one team is required"));
        }

        let pd_source = if params.pd_teams.is_empty() {
            &teams
        } else {
            &params.pd_teams
        };
        let pd_teams = pd_source
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let (since, until) = parse_date_range(&params.since, &params.until)?;

        let replace_rules = params
            .replace
            .iter()
            .map(|r| r.parse::<ReplaceRule>())
            .collect::<Result<Vec<_>>>()?;

        let urgency = if params.urgency.trim().is_empty() {
            default_urgency()
        } else {
            params.urgency.trim().to_string()
        };

        Ok(Self {
            teams,
            pd_teams,
            since,
            until,
            urgency,
            replace_rules,
            tag_filter: TagFilterSet::new(&params.tags),
            match_team: params
                .match_team
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
            publish: params.publish,
        })
    }

    /// Start of the reporting range (midnight UTC).
    pub fn since_utc(&self) -> DateTime<Utc> {
        midnight_utc(self.since)
    }

    /// End of the reporting range (midnight UTC).
    pub fn until_utc(&self) -> DateTime<Utc> {
        midnight_utc(self.until)
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Parse `--since` / `--until` and check their order.
pub fn parse_date_range(since: &str, until: &str) -> Result<(NaiveDate, NaiveDate)> {
    let since_at = NaiveDate::parse_from_str(since.trim(), DATE_FORMAT)
        .map_err(|e| ReportError::config(format!("failed to parse --since '{since}': {e}")))?;
    let until_at = NaiveDate::parse_from_str(until.trim(), DATE_FORMAT)
        .map_err(|e| ReportError::config(format!("failed to parse --until '{until}': {e}")))?;
    if until_at < since_at {
        return Err(ReportError::config(format!(
            "--since must start before --until (since: {since}, until: {until})"
        )));
    }
    Ok((since_at, until_at))
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Secrets resolved from the environment before any network activity.
#[derive(Clone)]
pub struct Credentials {
    pub pagerduty_token: String,
    pub datadog_api_key: String,
    pub datadog_app_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

impl Credentials {
    /// Resolve fetch credentials; `pagerduty_override` wins over the env var.
    pub fn from_env(config: &AppConfig, pagerduty_override: Option<&str>) -> Result<Self> {
        let pagerduty_token = match pagerduty_override.filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => require_secret(&config.pagerduty.token_env, "PagerDuty token (--auth)")?,
        };
        Ok(Self {
            pagerduty_token,
            datadog_api_key: require_secret(&config.datadog.api_key_env, "Datadog API key")?,
            datadog_app_key: require_secret(&config.datadog.app_key_env, "Datadog application key")?,
        })
    }
}

/// Read a secret from `var_name`, failing with a config error when unset or empty.
pub fn require_secret(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ReportError::config(format!(
            "missing {what}. Set the {var_name} environment variable."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.oncall-report/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ReportError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.oncall-report/oncall-report.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ReportError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReportError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ReportError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReportError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RequestParams {
        RequestParams {
            teams: vec!["Platform".into()],
            since: "2024-01-01".into(),
            until: "2024-01-31".into(),
            urgency: "high".into(),
            ..Default::default()
        }
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("PD_AUTH_TOKEN"));
        assert!(toml_str.contains("https://api.datadoghq.com"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[confluence]
subdomain = "acme"
space_key = "OPS"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.confluence.subdomain, "acme");
        assert_eq!(config.confluence.token_env, "CONFLUENCE_TOKEN");
        assert_eq!(config.defaults.urgency, "high");
        assert_eq!(config.datadog.app_key_env, "DD_APP_KEY");
    }

    #[test]
    fn request_defaults_pd_teams_to_lowercased_teams() {
        let req = ReportRequest::from_params(params()).expect("valid request");
        assert_eq!(req.teams, vec!["Platform"]);
        assert_eq!(req.pd_teams, vec!["platform"]);
        assert_eq!(req.since, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(req.until_utc().to_rfc3339(), "2024-01-31T00:00:00+00:00");
    }

    #[test]
    fn request_keeps_replace_rule_order() {
        let mut p = params();
        p.replace = vec!["/A/B/".into(), "/B/C/".into()];
        let req = ReportRequest::from_params(p).expect("valid request");
        let patterns: Vec<&str> = req.replace_rules.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["A", "B"]);
    }

    #[test]
    fn request_rejects_bad_dates() {
        let mut p = params();
        p.since = "01/01/2024".into();
        let err = ReportRequest::from_params(p).unwrap_err();
        assert!(err.to_string().contains("--since"));

        let mut p = params();
        p.since = "2024-02-01".into();
        let err = ReportRequest::from_params(p).unwrap_err();
        assert!(err.to_string().contains("must start before"));
    }

    #[test]
    fn request_rejects_bad_rule_and_missing_team() {
        let mut p = params();
        p.replace = vec!["/[/x/".into()];
        assert!(matches!(
            ReportRequest::from_params(p),
            Err(ReportError::Config { .. })
        ));

        let mut p = params();
        p.teams = vec!["  ".into()];
        assert!(ReportRequest::from_params(p).is_err());
    }

    #[test]
    fn publish_target_falls_back_to_config() {
        let config = ConfluenceConfig {
            space_key: "OPS".into(),
            parent_id: Some("123".into()),
            ..Default::default()
        };
        let target = PublishTarget::resolve(&config, None, None).expect("target");
        assert_eq!(target.space_key, "OPS");
        assert_eq!(target.parent_id.as_deref(), Some("123"));

        let target = PublishTarget::resolve(&config, Some("SRE"), None).expect("target");
        assert_eq!(target.space_key, "SRE");

        assert!(PublishTarget::resolve(&ConfluenceConfig::default(), None, None).is_err());
    }

    #[test]
    fn missing_secret_is_config_error() {
        // Use a unique env var name to avoid interfering with other tests
        let result = require_secret("OR_TEST_NONEXISTENT_KEY_12345", "test key");
        assert!(result.unwrap_err().to_string().contains("OR_TEST_NONEXISTENT_KEY_12345"));
    }
}
