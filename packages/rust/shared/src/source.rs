//! Collaborator traits for the upstream platforms.
//!
//! The core pipeline only talks to these traits; the HTTP implementations
//! live in `oncall-report-clients`, and tests plug in in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{AlertRecord, Incident, RawNote, RawPage, User};

/// Lists formal incidents from the monitoring platform.
#[async_trait]
pub trait IncidentSource: Send + Sync {
    /// Incidents created within `[since, until)` for any of `teams`.
    async fn search_incidents(
        &self,
        teams: &[String],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Incident>>;
}

/// Filter for listing pages from the on-call platform.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub team_ids: Vec<String>,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub urgency: String,
}

/// Lists pages and their per-page details from the on-call platform.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Map team names to ids. Errors only when none of the names resolve.
    async fn resolve_team_ids(&self, names: &[String]) -> Result<Vec<String>>;

    async fn list_pages(&self, query: &PageQuery) -> Result<Vec<RawPage>>;

    async fn list_alerts(&self, page_id: &str) -> Result<Vec<AlertRecord>>;

    async fn list_notes(&self, page_id: &str) -> Result<Vec<RawNote>>;

    /// User ids assigned to the page, in log order.
    async fn list_responder_ids(&self, page_id: &str) -> Result<Vec<String>>;

    async fn get_user(&self, user_id: &str) -> Result<User>;
}

/// A converted report ready to be pushed to the wiki.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPage {
    pub title: String,
    pub space_key: String,
    pub parent_id: Option<String>,
    /// XHTML storage-format body.
    pub body: String,
}

/// Pushes a finished report to a wiki-style endpoint.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, page: &PublishPage) -> Result<()>;
}
