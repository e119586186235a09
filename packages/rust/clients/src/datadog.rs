//! Datadog incident search.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use oncall_report_shared::{DatadogConfig, Incident, IncidentSource, Result};

use crate::{build_client, check_status, network_error, read_json};

const SERVICE: &str = "Datadog";

/// Incidents requested per search call.
const PAGE_SIZE: usize = 100;

/// Client for the Datadog incidents search API.
pub struct DatadogClient {
    client: Client,
    api_url: String,
    app_url: String,
    api_key: String,
    app_key: String,
}

impl DatadogClient {
    pub fn new(config: &DatadogConfig, api_key: String, app_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            app_url: config.app_url.trim_end_matches('/').to_string(),
            api_key,
            app_key,
        })
    }

    /// All incidents tagged for `team` created within the range.
    #[instrument(skip(self, since, until))]
    async fn search_team(
        &self,
        team: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Incident>> {
        let url = format!("{}/api/v2/incidents/search", self.api_url);
        let query = format!(
            "created_before:{} created_after:{} teams:{team}",
            until.timestamp(),
            since.timestamp()
        );

        let mut incidents = Vec::new();
        let mut offset = 0;
        loop {
            let response = self
                .client
                .get(&url)
                .header("DD-API-KEY", &self.api_key)
                .header("DD-APPLICATION-KEY", &self.app_key)
                .header("Accept", "application/json")
                .query(&[
                    ("query", query.clone()),
                    ("filter[field_type]", "all".to_string()),
                    ("sort", "created".to_string()),
                    ("page[size]", PAGE_SIZE.to_string()),
                    ("page[offset]", offset.to_string()),
                ])
                .send()
                .await
                .map_err(|e| network_error(SERVICE, e))?;
            let response = check_status(SERVICE, response).await?;
            let body: SearchResponse = read_json(SERVICE, response).await?;

            // Paging counts every listed incident, including ones dropped below.
            let listed: Vec<IncludedItem> = body
                .included
                .into_iter()
                .filter(|item| item.kind == "incidents")
                .collect();
            let listed_len = listed.len();
            incidents.extend(
                listed
                    .into_iter()
                    .filter_map(|item| self.to_incident(item.attributes)),
            );

            if listed_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        debug!(count = incidents.len(), "incidents found for team");
        Ok(incidents)
    }

    fn to_incident(&self, attributes: Value) -> Option<Incident> {
        let attrs: IncidentAttributes = match serde_json::from_value(attributes) {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(error = %e, "skipping incident with unexpected attributes");
                return None;
            }
        };

        let public_id = attrs.public_id.unwrap_or_default();
        let commander = attrs
            .commander
            .and_then(|c| c.data)
            .and_then(|d| d.attributes)
            .unwrap_or_default();

        Some(Incident {
            id: format!("#incident-{public_id}"),
            title: attrs.title,
            link: format!("{}/incidents/{public_id}", self.app_url),
            severity: field_value(&attrs.fields, "severity"),
            commander_name: commander.name.unwrap_or_default(),
            commander_email: commander.email.unwrap_or_default(),
            root_cause: field_value(&attrs.fields, "root_cause"),
            summary: field_value(&attrs.fields, "summary"),
            customer_impact_scope: attrs.customer_impact_scope,
            customer_impact_duration: attrs
                .customer_impact_duration
                .map(|secs| Duration::from_secs(secs.max(0).unsigned_abs())),
            created_at: attrs.created,
            resolved_at: attrs.resolved,
            pages: Vec::new(),
        })
    }
}

#[async_trait]
impl IncidentSource for DatadogClient {
    async fn search_incidents(
        &self,
        teams: &[String],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Incident>> {
        let mut seen = HashSet::new();
        let mut incidents = Vec::new();
        for team in teams {
            for incident in self.search_team(team, since, until).await? {
                if seen.insert(incident.id.clone()) {
                    incidents.push(incident);
                }
            }
        }
        info!(count = incidents.len(), teams = teams.len(), "Datadog incidents fetched");
        Ok(incidents)
    }
}

/// Single-value user-defined field; multi-value fields are comma-joined.
fn field_value(fields: &HashMap<String, FieldAttributes>, name: &str) -> String {
    match fields.get(name).and_then(|f| f.value.as_ref()) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    included: Vec<IncludedItem>,
}

#[derive(Debug, Deserialize)]
struct IncludedItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Value,
}

#[derive(Debug, Deserialize)]
struct IncidentAttributes {
    #[serde(default)]
    public_id: Option<i64>,
    #[serde(default)]
    title: String,
    created: DateTime<Utc>,
    #[serde(default)]
    resolved: Option<DateTime<Utc>>,
    #[serde(default)]
    customer_impact_scope: Option<String>,
    #[serde(default)]
    customer_impact_duration: Option<i64>,
    #[serde(default)]
    fields: HashMap<String, FieldAttributes>,
    #[serde(default)]
    commander: Option<Commander>,
}

#[derive(Debug, Deserialize)]
struct FieldAttributes {
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Commander {
    #[serde(default)]
    data: Option<CommanderData>,
}

#[derive(Debug, Deserialize)]
struct CommanderData {
    #[serde(default)]
    attributes: Option<CommanderAttributes>,
}

#[derive(Debug, Default, Deserialize)]
struct CommanderAttributes {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DatadogClient {
        let config = DatadogConfig {
            api_url: server.uri(),
            app_url: "https://app.datadoghq.com".into(),
            ..Default::default()
        };
        DatadogClient::new(&config, "api-key".into(), "app-key".into()).unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn incident_json(public_id: i64, created: &str, resolved: Option<&str>) -> Value {
        json!({
            "type": "incidents",
            "id": format!("uuid-{public_id}"),
            "attributes": {
                "public_id": public_id,
                "title": format!("incident {public_id}"),
                "created": created,
                "resolved": resolved,
                "customer_impact_scope": "checkout errors",
                "customer_impact_duration": 600,
                "fields": {
                    "severity": { "type": "dropdown", "value": "SEV-2" },
                    "root_cause": { "type": "textbox", "value": "bad config push" },
                    "summary": { "type": "textbox", "value": null },
                    "services": { "type": "autocomplete", "value": ["api", "web"] }
                },
                "commander": {
                    "data": {
                        "type": "users",
                        "attributes": { "name": "Ada", "email": "ada@example.com" }
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn searches_and_maps_incidents() {
        let server = MockServer::start().await;
        let since = ts("2024-01-01T00:00:00Z");
        let until = ts("2024-01-31T00:00:00Z");

        Mock::given(method("GET"))
            .and(path("/api/v2/incidents/search"))
            .and(header("DD-API-KEY", "api-key"))
            .and(header("DD-APPLICATION-KEY", "app-key"))
            .and(query_param(
                "query",
                "created_before:1706659200 created_after:1704067200 teams:platform",
            ))
            .and(query_param("sort", "created"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "type": "incidents_search_results" },
                "included": [
                    incident_json(7, "2024-01-02T10:00:00Z", Some("2024-01-02T11:00:00Z")),
                    { "type": "users", "id": "u1", "attributes": { "name": "Ada" } },
                    incident_json(8, "2024-01-03T10:00:00Z", None)
                ]
            })))
            .mount(&server)
            .await;

        let incidents = client(&server)
            .search_incidents(&["platform".to_string()], since, until)
            .await
            .unwrap();

        assert_eq!(incidents.len(), 2);
        let first = &incidents[0];
        assert_eq!(first.id, "#incident-7");
        assert_eq!(first.link, "https://app.datadoghq.com/incidents/7");
        assert_eq!(first.severity, "SEV-2");
        assert_eq!(first.root_cause, "bad config push");
        assert_eq!(first.summary, "");
        assert_eq!(first.commander_email, "ada@example.com");
        assert_eq!(first.customer_impact_duration, Some(Duration::from_secs(600)));
        assert_eq!(first.resolved_at, Some(ts("2024-01-02T11:00:00Z")));
        assert_eq!(incidents[1].resolved_at, None);
    }

    #[tokio::test]
    async fn merges_teams_without_duplicates() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/incidents/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "included": [incident_json(1, "2024-01-02T10:00:00Z", None)]
            })))
            .mount(&server)
            .await;

        let incidents = client(&server)
            .search_incidents(
                &["platform".to_string(), "infra".to_string()],
                ts("2024-01-01T00:00:00Z"),
                ts("2024-01-31T00:00:00Z"),
            )
            .await
            .unwrap();
        assert_eq!(incidents.len(), 1);
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/incidents/search"))
            .respond_with(ResponseTemplate::new(403).set_body_string("{\"errors\":[\"Forbidden\"]}"))
            .mount(&server)
            .await;

        let err = client(&server)
            .search_incidents(
                &["platform".to_string()],
                ts("2024-01-01T00:00:00Z"),
                ts("2024-01-31T00:00:00Z"),
            )
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("HTTP 403"), "{msg}");
        assert!(msg.contains("Forbidden"), "{msg}");
    }

    #[tokio::test]
    async fn malformed_incident_does_not_end_paging() {
        let server = MockServer::start().await;

        let mut first_page: Vec<Value> = (1..=99)
            .map(|id| incident_json(id, "2024-01-02T10:00:00Z", None))
            .collect();
        first_page.push(json!({
            "type": "incidents",
            "id": "uuid-100",
            "attributes": { "public_id": 100, "title": "no creation time" }
        }));

        Mock::given(method("GET"))
            .and(path("/api/v2/incidents/search"))
            .and(query_param("page[offset]", "0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "included": first_page })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/incidents/search"))
            .and(query_param("page[offset]", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "included": [incident_json(101, "2024-01-05T10:00:00Z", None)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let incidents = client(&server)
            .search_incidents(
                &["platform".to_string()],
                ts("2024-01-01T00:00:00Z"),
                ts("2024-01-31T00:00:00Z"),
            )
            .await
            .unwrap();

        assert_eq!(incidents.len(), 100);
        assert!(incidents.iter().any(|i| i.id == "#incident-101"));
        assert!(!incidents.iter().any(|i| i.id == "#incident-100"));
    }

    #[test]
    fn multi_value_fields_are_joined() {
        let fields: HashMap<String, FieldAttributes> = serde_json::from_value(json!({
            "services": { "value": ["api", "web"] },
            "severity": { "value": 3 }
        }))
        .unwrap();
        assert_eq!(field_value(&fields, "services"), "api, web");
        assert_eq!(field_value(&fields, "severity"), "");
        assert_eq!(field_value(&fields, "missing"), "");
    }
}
