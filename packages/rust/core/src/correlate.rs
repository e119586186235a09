//! Page ↔ incident correlation.
//!
//! A page belongs to an incident when it fired inside the open interval
//! `(created_at - 15m, resolved_at)`. Linkage is many-to-many and no page is
//! preferred over another; open incidents never match.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, instrument};

use oncall_report_shared::{Incident, Page};

/// How long before an incident's declaration a page still counts toward it.
pub const LEAD_WINDOW_MINUTES: i64 = 15;

/// Counts produced by a correlation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    /// Total page→incident links created.
    pub links: usize,
    /// Pages that matched no incident.
    pub unlinked_pages: usize,
}

/// True when `page_created` lies strictly inside the incident's window.
pub fn in_window(incident: &Incident, page_created: DateTime<Utc>) -> bool {
    let Some(resolved_at) = incident.resolved_at else {
        return false;
    };
    let opens = incident.created_at - TimeDelta::minutes(LEAD_WINDOW_MINUTES);
    page_created > opens && page_created < resolved_at
}

/// Stable sort by creation time; ties keep fetch order.
pub fn sort_incidents(incidents: &mut [Incident]) {
    incidents.sort_by_key(|i| i.created_at);
}

/// Link every page to every incident whose window contains it.
///
/// Pages are visited in slice order, so each incident's page list keeps
/// arrival order. Existing links are not cleared.
#[instrument(skip_all, fields(incidents = incidents.len(), pages = pages.len()))]
pub fn correlate(incidents: &mut [Incident], pages: &mut [Page]) -> CorrelationSummary {
    let mut summary = CorrelationSummary::default();

    for (page_idx, page) in pages.iter_mut().enumerate() {
        for incident in incidents.iter_mut() {
            if in_window(incident, page.created_at) {
                incident.pages.push(page_idx);
                page.incident_ids.push(incident.id.clone());
                summary.links += 1;
            }
        }
        if page.incident_ids.is_empty() {
            summary.unlinked_pages += 1;
        }
    }

    debug!(
        links = summary.links,
        unlinked = summary.unlinked_pages,
        "correlation complete"
    );
    summary
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    pub(crate) fn incident(id: &str, created: &str, resolved: Option<&str>) -> Incident {
        Incident {
            id: id.into(),
            title: format!("{id} title"),
            link: format!("https://app.example.com/incidents/{id}"),
            severity: "SEV-2".into(),
            commander_name: "Ada Lovelace".into(),
            commander_email: "ada@example.com".into(),
            root_cause: "bad deploy".into(),
            summary: "rolled back".into(),
            customer_impact_scope: None,
            customer_impact_duration: None,
            created_at: at(created),
            resolved_at: resolved.map(at),
            pages: Vec::new(),
        }
    }

    pub(crate) fn page(id: &str, created: &str) -> Page {
        Page {
            id: id.into(),
            title: format!("{id} fired"),
            link: format!("https://oncall.example.com/incidents/{id}"),
            created_at: at(created),
            incident_ids: Vec::new(),
            responders: Vec::new(),
            notes: Vec::new(),
        }
    }

    #[test]
    fn window_scenario() {
        let inc = incident("#incident-1", "2024-01-01T10:00:00Z", Some("2024-01-01T11:00:00Z"));
        assert!(in_window(&inc, at("2024-01-01T09:50:00Z")));
        assert!(in_window(&inc, at("2024-01-01T10:30:00Z")));
        assert!(!in_window(&inc, at("2024-01-01T09:44:00Z")));
        assert!(!in_window(&inc, at("2024-01-01T11:00:00Z")));
    }

    #[test]
    fn window_bounds_are_open() {
        let inc = incident("#incident-1", "2024-01-01T10:00:00Z", Some("2024-01-01T11:00:00Z"));
        assert!(!in_window(&inc, at("2024-01-01T09:45:00Z")));
        assert!(in_window(&inc, at("2024-01-01T09:45:01Z")));
        assert!(in_window(&inc, at("2024-01-01T10:59:59Z")));
    }

    #[test]
    fn open_incident_matches_nothing() {
        let mut incidents = vec![incident("#incident-1", "2024-01-01T10:00:00Z", None)];
        let mut pages = vec![
            page("P1", "2024-01-01T09:50:00Z"),
            page("P2", "2024-01-01T10:00:00Z"),
            page("P3", "2030-01-01T00:00:00Z"),
        ];
        let summary = correlate(&mut incidents, &mut pages);
        assert_eq!(summary.links, 0);
        assert_eq!(summary.unlinked_pages, 3);
        assert!(incidents[0].pages.is_empty());
    }

    #[test]
    fn resolved_before_created_matches_nothing() {
        let inc = incident("#incident-1", "2024-01-01T10:00:00Z", Some("2024-01-01T09:00:00Z"));
        assert!(!in_window(&inc, at("2024-01-01T09:50:00Z")));
    }

    #[test]
    fn overlapping_incidents_share_a_page() {
        let mut incidents = vec![
            incident("#incident-1", "2024-01-01T10:00:00Z", Some("2024-01-01T12:00:00Z")),
            incident("#incident-2", "2024-01-01T10:30:00Z", Some("2024-01-01T11:30:00Z")),
        ];
        let mut pages = vec![page("P1", "2024-01-01T10:45:00Z")];
        let summary = correlate(&mut incidents, &mut pages);

        assert_eq!(summary.links, 2);
        assert_eq!(incidents[0].pages, vec![0]);
        assert_eq!(incidents[1].pages, vec![0]);
        assert_eq!(pages[0].incident_ids, vec!["#incident-1", "#incident-2"]);
    }

    #[test]
    fn incident_pages_keep_arrival_order() {
        let mut incidents = vec![incident(
            "#incident-1",
            "2024-01-01T10:00:00Z",
            Some("2024-01-01T12:00:00Z"),
        )];
        let mut pages = vec![
            page("late", "2024-01-01T11:00:00Z"),
            page("outside", "2024-01-02T00:00:00Z"),
            page("early", "2024-01-01T09:55:00Z"),
        ];
        correlate(&mut incidents, &mut pages);
        assert_eq!(incidents[0].pages, vec![0, 2]);
        assert!(pages[1].incident_ids.is_empty());
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let mut incidents = vec![
            incident("#incident-3", "2024-01-03T00:00:00Z", None),
            incident("#incident-1a", "2024-01-01T00:00:00Z", None),
            incident("#incident-1b", "2024-01-01T00:00:00Z", None),
        ];
        sort_incidents(&mut incidents);
        let ids: Vec<&str> = incidents.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["#incident-1a", "#incident-1b", "#incident-3"]);
    }
}
