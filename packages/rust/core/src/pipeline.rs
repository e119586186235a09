//! End-to-end `generate` pipeline: fetch → filter → normalize → enrich → correlate → render.
//!
//! Everything runs sequentially. Fetching incidents, resolving teams and
//! listing pages are fatal on error; per-page enrichment failures are logged
//! and leave a gap in the affected page.

use std::collections::HashMap;
use std::fmt::Display;
use std::time::Instant;

use chrono::TimeZone;
use tracing::{debug, info, instrument, warn};

use oncall_report_shared::{
    Incident, IncidentSource, Note, NoteAuthor, Page, PageQuery, PageSource, RawPage,
    ReportRequest, Result, User,
};

use crate::correlate::{self, CorrelationSummary};
use crate::normalize::normalize_title;
use crate::report::{self, ReportHeader};
use crate::tags::{self, TeamCheck};

/// Result of the `generate` pipeline.
#[derive(Debug, Clone)]
pub struct Report {
    /// Markdown document, starting with the `title:` front-matter block.
    pub markdown: String,
    pub title: String,
    pub incident_count: usize,
    pub page_count: usize,
    pub correlation: CorrelationSummary,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each listed page has been filtered and enriched.
    fn page_processed(&self, title: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, report: &Report);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_processed(&self, _title: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &Report) {}
}

/// Run the full `generate` pipeline.
///
/// 1. Search incidents for every team, sorted by creation time
/// 2. Resolve on-call team ids and list pages
/// 3. Filter, normalize and enrich each page
/// 4. Correlate pages with incidents
/// 5. Render the Markdown report
#[instrument(skip_all, fields(teams = ?request.teams, since = %request.since, until = %request.until))]
pub async fn generate<Tz>(
    request: &ReportRequest,
    incident_source: &dyn IncidentSource,
    page_source: &dyn PageSource,
    tz: &Tz,
    progress: &dyn ProgressReporter,
) -> Result<Report>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let start = Instant::now();

    progress.phase("Fetching incidents");
    let mut incidents = incident_source
        .search_incidents(&request.teams, request.since_utc(), request.until_utc())
        .await?;
    correlate::sort_incidents(&mut incidents);
    info!(count = incidents.len(), "incidents fetched");

    progress.phase("Fetching pages");
    let pages = fetch_pages(request, page_source, progress).await?;
    info!(count = pages.len(), "pages fetched");

    progress.phase("Rendering report");
    let mut report = build_report(request, incidents, pages, tz);
    report.elapsed = start.elapsed();

    progress.done(&report);
    Ok(report)
}

/// Correlate already-fetched entities and render them.
pub fn build_report<Tz>(
    request: &ReportRequest,
    mut incidents: Vec<Incident>,
    mut pages: Vec<Page>,
    tz: &Tz,
) -> Report
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    correlate::sort_incidents(&mut incidents);
    let correlation = correlate::correlate(&mut incidents, &mut pages);

    let header = ReportHeader {
        teams: &request.teams,
        since: request.since,
        until: request.until,
    };
    let markdown = report::render(&header, &incidents, &pages, tz);

    Report {
        markdown,
        title: report::report_title(&request.teams, request.until),
        incident_count: incidents.len(),
        page_count: pages.len(),
        correlation,
        elapsed: std::time::Duration::ZERO,
    }
}

/// List, filter, normalize and enrich the pages for the request.
pub async fn fetch_pages(
    request: &ReportRequest,
    source: &dyn PageSource,
    progress: &dyn ProgressReporter,
) -> Result<Vec<Page>> {
    let team_ids = source.resolve_team_ids(&request.pd_teams).await?;
    let query = PageQuery {
        team_ids,
        since: request.since_utc(),
        until: request.until_utc(),
        urgency: request.urgency.clone(),
    };
    let listed = source.list_pages(&query).await?;
    let total = listed.len();
    debug!(total, "pages listed");

    let mut users = UserCache::default();
    let mut pages = Vec::with_capacity(total);

    for (i, raw) in listed.into_iter().enumerate() {
        progress.page_processed(&raw.title, i + 1, total);

        if !admit_page(request, source, &raw).await {
            continue;
        }

        let title = normalize_title(&raw.title, &request.replace_rules);
        let mut page = Page::from_raw(raw, title);
        page.notes = fetch_notes(source, &mut users, &page.id).await;
        page.responders = fetch_responders(source, &mut users, &page.id).await;
        pages.push(page);
    }

    Ok(pages)
}

/// Apply the team-membership and tag filters to one listed page.
async fn admit_page(request: &ReportRequest, source: &dyn PageSource, raw: &RawPage) -> bool {
    if request.match_team.is_none() && request.tag_filter.is_empty() {
        return true;
    }

    let alerts = match source.list_alerts(&raw.id).await {
        Ok(alerts) => alerts,
        Err(e) => {
            warn!(page_id = %raw.id, error = %e, "could not fetch alerts for page, skipping");
            return false;
        }
    };

    if let Some(expected) = request.match_team.as_deref() {
        match tags::check_team(&alerts, expected) {
            TeamCheck::Matched => {}
            TeamCheck::Mismatch(found) => {
                warn!(page_id = %raw.id, expected, found = %found, "page belongs to another team, skipping");
                return false;
            }
            TeamCheck::Missing => {
                warn!(page_id = %raw.id, expected, "no team tag found for page, skipping");
                return false;
            }
        }
    }

    let matched = tags::matches_tag_filter(&alerts, &request.tag_filter);
    if !matched {
        debug!(page_id = %raw.id, "page does not carry the required tags");
    }
    matched
}

async fn fetch_notes(source: &dyn PageSource, users: &mut UserCache, page_id: &str) -> Vec<Note> {
    let raw_notes = match source.list_notes(page_id).await {
        Ok(notes) => notes,
        Err(e) => {
            warn!(page_id, error = %e, "could not fetch notes for page, ignoring");
            return Vec::new();
        }
    };

    let mut notes = Vec::with_capacity(raw_notes.len());
    for raw in raw_notes {
        let author = match raw.user_id.as_deref() {
            Some(user_id) => users.get(source, user_id).await.map(|u| NoteAuthor {
                name: u.name.clone(),
                email: u.email.clone(),
            }),
            None => None,
        };
        notes.push(Note {
            content: raw.content,
            author,
        });
    }
    notes
}

async fn fetch_responders(
    source: &dyn PageSource,
    users: &mut UserCache,
    page_id: &str,
) -> Vec<String> {
    let user_ids = match source.list_responder_ids(page_id).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(page_id, error = %e, "could not fetch responders for page, ignoring");
            return Vec::new();
        }
    };

    let mut responders = Vec::with_capacity(user_ids.len());
    for user_id in &user_ids {
        if let Some(user) = users.get(source, user_id).await {
            responders.push(user.email.clone());
        }
    }
    responders
}

/// Per-run memo of user lookups; failed lookups are remembered too.
#[derive(Default)]
struct UserCache {
    users: HashMap<String, Option<User>>,
}

impl UserCache {
    async fn get(&mut self, source: &dyn PageSource, user_id: &str) -> Option<&User> {
        if !self.users.contains_key(user_id) {
            let user = match source.get_user(user_id).await {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(user_id, error = %e, "could not fetch user, ignoring");
                    None
                }
            };
            self.users.insert(user_id.to_string(), user);
        }
        self.users.get(user_id).and_then(Option::as_ref)
    }
}
