//! Markdown-to-XHTML conversion for publishing reports.
//!
//! Strips the `title:` front-matter block from a generated report and
//! converts the remaining Markdown into the XHTML storage format expected by
//! the wiki, keeping tables, definition lists and heading anchors.

mod anchors;

use std::sync::LazyLock;

use chrono::NaiveDate;
use pulldown_cmark::{Event, Options, Parser};
use regex::Regex;
use tracing::{debug, instrument};

use oncall_report_shared::{DATE_FORMAT, ReportError, Result};

/// Front-matter block written by the report assembler.
static FRONT_MATTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"---\ntitle: (.*)\n---\n").expect("valid regex"));

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A report split into its front-matter title and Markdown body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatterSplit {
    /// Title from the first front-matter block, if any and non-empty.
    pub title: Option<String>,
    /// The document with every front-matter block removed.
    pub body: String,
}

/// A converted report ready for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub title: String,
    /// XHTML storage-format body.
    pub body: String,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Separate the front-matter title from the body.
pub fn split_front_matter(document: &str) -> FrontMatterSplit {
    let title = FRONT_MATTER_RE
        .captures(document)
        .map(|c| c[1].to_string())
        .filter(|t| !t.trim().is_empty());
    let body = FRONT_MATTER_RE.replace_all(document, "").into_owned();
    FrontMatterSplit { title, body }
}

/// Fallback title for documents without front matter.
pub fn fallback_title(today: NaiveDate) -> String {
    format!("On-Call Report {}", today.format(DATE_FORMAT))
}

/// Convert a Markdown body to XHTML.
///
/// Enables GFM tables, strikethrough and task lists plus definition lists,
/// and gives every heading an `id` anchor.
#[instrument(skip_all, fields(len = markdown.len()))]
pub fn to_storage_xhtml(markdown: &str) -> Result<String> {
    let mut events: Vec<Event<'_>> = Parser::new_ext(markdown, parser_options()).collect();
    anchors::assign_heading_ids(&mut events);

    let mut xhtml = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::write_html_fmt(&mut xhtml, events.into_iter())
        .map_err(|e| ReportError::Conversion(format!("rendering XHTML failed: {e}")))?;

    debug!(xhtml_len = xhtml.len(), "markdown converted");
    Ok(xhtml)
}

/// Split, title and convert a generated report in one step.
pub fn prepare_publication(document: &str, today: NaiveDate) -> Result<Publication> {
    let FrontMatterSplit { title, body } = split_front_matter(document);
    let body = to_storage_xhtml(&body)?;
    Ok(Publication {
        title: title.unwrap_or_else(|| fallback_title(today)),
        body,
    })
}

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_DEFINITION_LIST
        | Options::ENABLE_HEADING_ATTRIBUTES
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
