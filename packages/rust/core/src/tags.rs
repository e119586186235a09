//! Tag-based page filtering.
//!
//! Alerts carry a loosely-typed `details` payload that may embed a
//! comma-separated `tags` string. [`AlertTags`] turns that payload into a
//! typed outcome; the filters below decide whether a page is kept.

use std::collections::BTreeSet;

use serde_json::Value;

use oncall_report_shared::{AlertRecord, TagFilterSet};

/// Prefix of the tag carrying a page's owning team.
const TEAM_TAG_PREFIX: &str = "team:";

/// Tags extracted from one alert's `details` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertTags {
    /// No `details`, or `details` without a `tags` key.
    Absent,
    /// `details` or its `tags` entry has an unexpected shape.
    Malformed,
    /// Tokens in payload order.
    Present(Vec<String>),
}

impl AlertTags {
    pub fn from_details(details: Option<&Value>) -> Self {
        let Some(details) = details else {
            return Self::Absent;
        };
        let Some(map) = details.as_object() else {
            return Self::Malformed;
        };
        match map.get("tags") {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::String(raw)) => Self::Present(
                raw.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            ),
            Some(_) => Self::Malformed,
        }
    }

    pub fn tags(&self) -> Option<&[String]> {
        match self {
            Self::Present(tags) => Some(tags),
            Self::Absent | Self::Malformed => None,
        }
    }
}

/// Extract the tag set of a single alert.
pub fn alert_tags(alert: &AlertRecord) -> AlertTags {
    AlertTags::from_details(alert.details.as_ref())
}

/// True when some single alert carries every tag in `filter`.
///
/// An empty filter admits every page, even one without alerts.
pub fn matches_tag_filter(alerts: &[AlertRecord], filter: &TagFilterSet) -> bool {
    if filter.is_empty() {
        return true;
    }
    alerts.iter().any(|alert| {
        alert_tags(alert).tags().is_some_and(|tags| {
            let set: BTreeSet<String> = tags.iter().cloned().collect();
            filter.is_satisfied_by(&set)
        })
    })
}

/// Outcome of checking a page's owning team against the expected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamCheck {
    Matched,
    /// The page is tagged for a different team.
    Mismatch(String),
    /// No alert carries a `team:` tag.
    Missing,
}

/// First `team:<name>` tag found across the alerts, in payload order, lowercased.
pub fn resolve_team(alerts: &[AlertRecord]) -> Option<String> {
    alerts.iter().find_map(|alert| {
        alert_tags(alert).tags().and_then(|tags| {
            tags.iter()
                .find_map(|t| t.strip_prefix(TEAM_TAG_PREFIX))
                .map(str::to_lowercase)
        })
    })
}

/// Compare the page's resolved team with `expected` (already lowercased).
pub fn check_team(alerts: &[AlertRecord], expected: &str) -> TeamCheck {
    match resolve_team(alerts) {
        Some(team) if team == expected => TeamCheck::Matched,
        Some(team) => TeamCheck::Mismatch(team),
        None => TeamCheck::Missing,
    }
}
