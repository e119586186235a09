//! PagerDuty REST API v2 client.
//!
//! Covers the handful of endpoints the report needs: team lookup, incident
//! listing, and the per-incident alerts, notes, log entries and users.
//! List endpoints use classic `offset`/`limit` pagination with a `more` flag.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use oncall_report_shared::{
    AlertRecord, PageQuery, PageSource, PagerDutyConfig, RawNote, RawPage, ReportError, Result,
    User,
};

use crate::{build_client, check_status, network_error, read_json};

const SERVICE: &str = "PagerDuty";

const ACCEPT: &str = "application/vnd.pagerduty+json;version=2";

/// Maximum page size accepted by the list endpoints.
const PAGE_LIMIT: usize = 100;

/// Client for the PagerDuty REST API.
pub struct PagerDutyClient {
    client: Client,
    api_url: String,
    token: String,
}

impl PagerDutyClient {
    pub fn new(config: &PagerDutyConfig, token: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{path}", self.api_url))
            .header("Authorization", format!("Token token={}", self.token))
            .header("Accept", ACCEPT)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .get(path)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        read_json(SERVICE, response).await
    }

    /// Walk every page of a list endpoint, collecting the array under `key`.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut offset = 0;
        loop {
            let response = self
                .get(path)
                .query(params)
                .query(&[("limit", PAGE_LIMIT), ("offset", offset)])
                .send()
                .await
                .map_err(|e| network_error(SERVICE, e))?;
            let response = check_status(SERVICE, response).await?;
            let mut body: Map<String, Value> = read_json(SERVICE, response).await?;

            let batch: Vec<T> = match body.remove(key) {
                Some(value) => serde_json::from_value(value).map_err(|e| {
                    ReportError::parse(format!("invalid {SERVICE} `{key}` list: {e}"))
                })?,
                None => Vec::new(),
            };
            let batch_len = batch.len();
            items.extend(batch);

            let more = body.get("more").and_then(Value::as_bool).unwrap_or(false);
            if !more || batch_len == 0 {
                break;
            }
            offset += batch_len;
        }
        Ok(items)
    }

    /// Exact, case-insensitive team name lookup.
    async fn find_team_id(&self, name: &str) -> Result<Option<String>> {
        let teams: Vec<TeamRecord> = self
            .get_all("/teams", "teams", &[("query", name.to_string())])
            .await?;
        let wanted = name.to_lowercase();
        Ok(teams
            .into_iter()
            .find(|t| t.name.to_lowercase() == wanted)
            .map(|t| t.id))
    }
}

#[async_trait]
impl PageSource for PagerDutyClient {
    #[instrument(skip(self))]
    async fn resolve_team_ids(&self, names: &[String]) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut problems = Vec::new();
        for name in names {
            match self.find_team_id(name).await {
                Ok(Some(id)) => {
                    debug!(team = %name, id = %id, "team resolved");
                    ids.push(id);
                }
                Ok(None) => {
                    warn!(team = %name, "no PagerDuty team with this name");
                    problems.push(format!("{name}: not found"));
                }
                Err(e) => {
                    warn!(team = %name, error = %e, "team lookup failed");
                    problems.push(format!("{name}: {e}"));
                }
            }
        }

        if ids.is_empty() {
            return Err(ReportError::config(format!(
                "could not resolve any PagerDuty team ({})",
                problems.join("; ")
            )));
        }
        Ok(ids)
    }

    #[instrument(skip(self), fields(teams = query.team_ids.len()))]
    async fn list_pages(&self, query: &PageQuery) -> Result<Vec<RawPage>> {
        let mut params: Vec<(&str, String)> = query
            .team_ids
            .iter()
            .map(|id| ("team_ids[]", id.clone()))
            .collect();
        params.push(("since", query.since.to_rfc3339()));
        params.push(("until", query.until.to_rfc3339()));
        params.push(("urgencies[]", query.urgency.clone()));

        let records: Vec<IncidentRecord> = self.get_all("/incidents", "incidents", &params).await?;
        let pages: Vec<RawPage> = records
            .into_iter()
            .map(|r| RawPage {
                id: r.id,
                title: r.title,
                link: r.html_url,
                created_at: r.created_at,
            })
            .collect();
        info!(count = pages.len(), "PagerDuty pages fetched");
        Ok(pages)
    }

    async fn list_alerts(&self, page_id: &str) -> Result<Vec<AlertRecord>> {
        let alerts: Vec<AlertEntry> = self
            .get_all(&format!("/incidents/{page_id}/alerts"), "alerts", &[])
            .await?;
        Ok(alerts
            .into_iter()
            .map(|a| AlertRecord {
                id: a.id,
                details: a
                    .body
                    .as_ref()
                    .and_then(|body| body.get("details"))
                    .filter(|details| !details.is_null())
                    .cloned(),
            })
            .collect())
    }

    async fn list_notes(&self, page_id: &str) -> Result<Vec<RawNote>> {
        let body: NotesResponse = self
            .get_json(&format!("/incidents/{page_id}/notes"))
            .await?;
        Ok(body
            .notes
            .into_iter()
            .map(|n| RawNote {
                content: n.content,
                user_id: n.user.map(|u| u.id),
            })
            .collect())
    }

    async fn list_responder_ids(&self, page_id: &str) -> Result<Vec<String>> {
        let entries: Vec<LogEntry> = self
            .get_all(&format!("/incidents/{page_id}/log_entries"), "log_entries", &[])
            .await?;

        let mut ids: Vec<String> = Vec::new();
        for reference in entries.into_iter().flat_map(|e| e.assignees) {
            if reference.kind == "user_reference" && !ids.contains(&reference.id) {
                ids.push(reference.id);
            }
        }
        Ok(ids)
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        let body: UserResponse = self.get_json(&format!("/users/{user_id}")).await?;
        Ok(User {
            id: body.user.id,
            name: body.user.name,
            email: body.user.email,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TeamRecord {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct IncidentRecord {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
struct AlertEntry {
    id: String,
    /// Shape varies by integration; only an object's `details` is read.
    #[serde(default)]
    body: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct NotesResponse {
    #[serde(default)]
    notes: Vec<NoteEntry>,
}

#[derive(Debug, Deserialize)]
struct NoteEntry {
    #[serde(default)]
    content: String,
    #[serde(default)]
    user: Option<Reference>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default)]
    assignees: Vec<Reference>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: UserRecord,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}
