//! Core domain types: incidents, pages, notes, and the per-run text rules.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

// ---------------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------------

/// A formally declared incident from the monitoring platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Display identity, e.g. `#incident-42`.
    pub id: String,
    pub title: String,
    /// Permalink to the incident in the monitoring UI.
    pub link: String,
    /// Severity label (e.g. `SEV-2`); empty when unset.
    pub severity: String,
    pub commander_name: String,
    pub commander_email: String,
    pub root_cause: String,
    pub summary: String,
    /// Free-text customer impact scope; `None` or empty means no impact block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_impact_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_impact_duration: Option<Duration>,
    pub created_at: DateTime<Utc>,
    /// `None` while the incident is still open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Indices into the run's page list, in page arrival order.
    /// Populated by the correlator.
    #[serde(skip)]
    pub pages: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// A page as listed by the on-call platform, before filtering and enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    /// Upstream identifier used for per-page enrichment calls.
    pub id: String,
    pub title: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

/// A filtered, normalized, enriched page ready for correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    /// Title after the replace rules have been applied.
    pub title: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
    /// Identities of the incidents this page was correlated with.
    #[serde(default)]
    pub incident_ids: Vec<String>,
    /// Emails of the users who acknowledged the page, in log order.
    #[serde(default)]
    pub responders: Vec<String>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Page {
    /// Build an un-enriched page from its raw listing and a normalized title.
    pub fn from_raw(raw: RawPage, title: String) -> Self {
        Self {
            id: raw.id,
            title,
            link: raw.link,
            created_at: raw.created_at,
            incident_ids: Vec::new(),
            responders: Vec::new(),
            notes: Vec::new(),
        }
    }
}

/// A free-text note attached to a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub content: String,
    /// `None` when the author could not be resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<NoteAuthor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteAuthor {
    pub name: String,
    pub email: String,
}

/// A note as listed upstream, carrying an unresolved user reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNote {
    pub content: String,
    pub user_id: Option<String>,
}

/// A resolved on-call platform user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// One alert attached to a page, with its loosely-typed `details` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub id: String,
    /// The alert body's `details` value, absent when the body has none.
    pub details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// ReplaceRule
// ---------------------------------------------------------------------------

/// A regex substitution applied to page titles.
///
/// Parsed from `/pattern/replacement/`; surrounding slashes are optional and
/// a missing replacement deletes the match. Replacements may reference
/// capture groups (`$1`, `${name}`).
#[derive(Debug, Clone)]
pub struct ReplaceRule {
    pub pattern: Regex,
    pub replacement: String,
}

impl ReplaceRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            ReportError::config(format!("invalid replace pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }
}

impl FromStr for ReplaceRule {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim_matches('/');
        let (pattern, replacement) = match trimmed.split_once('/') {
            Some((p, r)) => (p, r),
            None => (trimmed, ""),
        };
        if pattern.is_empty() {
            return Err(ReportError::config(format!(
                "invalid replace rule '{s}': expected /pattern/replacement/"
            )));
        }
        Self::new(pattern, replacement)
    }
}

// ---------------------------------------------------------------------------
// TagFilterSet
// ---------------------------------------------------------------------------

/// Tag tokens that a single alert must all carry for its page to be kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilterSet(BTreeSet<String>);

impl TagFilterSet {
    /// Build a filter from raw tokens; tokens are trimmed and blanks dropped.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True when `tags` contains every required token.
    pub fn is_satisfied_by(&self, tags: &BTreeSet<String>) -> bool {
        self.0.is_subset(tags)
    }
}
