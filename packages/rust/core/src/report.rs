//! Report assembler.
//!
//! Renders correlated incidents and pages into a Markdown document that
//! starts with a `title:` front-matter block. Rendering is a pure function
//! of its inputs; the timezone used for display timestamps is passed in.

use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::instrument;

use oncall_report_shared::{Incident, Note, Page};

/// Marker left in every section meant for a human to complete.
pub const FILL_OUT_PLACEHOLDER: &str = "  _TODO: please fill out_";

/// Display format for incident and page timestamps.
pub const TIME_FORMAT: &str = "%Y-%m-%d @%H:%M:%S";

/// Follow-up prompts rendered under every incident.
const FOLLOW_UP_PROMPTS: [&str; 5] = [
    "Happened before/common theme",
    "How can we prevent it",
    "Runbooks",
    "Related PRs",
    "Action items",
];

/// Date range and team names shown in the document header.
#[derive(Debug, Clone, Copy)]
pub struct ReportHeader<'a> {
    pub teams: &'a [String],
    pub since: NaiveDate,
    pub until: NaiveDate,
}

/// Build the document title, e.g. `Platform, Infra On-Call Report 2024-01-31`.
pub fn report_title(teams: &[String], until: NaiveDate) -> String {
    let raw = format!(
        "{} On-Call Report {}",
        teams.join(", "),
        until.format(oncall_report_shared::DATE_FORMAT)
    );
    // The title must stay on the single front-matter line.
    title_case(&raw.replace(['\r', '\n'], " "))
}

/// Upper-case the first letter of every word.
///
/// Anything that isn't alphanumeric or `_` separates words, so `on-call`
/// becomes `On-Call`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}

/// The three-line block the converter later strips.
pub fn front_matter(title: &str) -> String {
    format!("---\ntitle: {title}\n---\n")
}

/// Compact duration such as `1h30m`, `45m10s`, or `0s`.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{s}s"));
    }
    out
}

/// Render the full report.
///
/// `incidents` must already be sorted and correlated; their `pages` indices
/// refer into `pages`.
#[instrument(skip_all, fields(incidents = incidents.len(), pages = pages.len()))]
pub fn render<Tz>(header: &ReportHeader<'_>, incidents: &[Incident], pages: &[Page], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut md = MarkdownWriter::default();
    let when = |ts: &DateTime<Utc>| ts.with_timezone(tz).format(TIME_FORMAT).to_string();

    md.raw(&front_matter(&report_title(header.teams, header.until)));
    md.para(&format!(
        "Report for {} - {}: total incidents - {}, total pages - {}",
        header.since.format(oncall_report_shared::DATE_FORMAT),
        header.until.format(oncall_report_shared::DATE_FORMAT),
        incidents.len(),
        pages.len()
    ));

    for incident in incidents {
        render_incident(&mut md, incident, pages, &when);
    }

    md.heading(3, "Other Pages");
    for page in pages.iter().filter(|p| p.incident_ids.is_empty()) {
        render_other_page(&mut md, page, &when);
    }

    md.finish()
}

fn render_incident(
    md: &mut MarkdownWriter,
    incident: &Incident,
    pages: &[Page],
    when: &dyn Fn(&DateTime<Utc>) -> String,
) {
    md.heading(
        3,
        &link(
            &format!(
                "{} | {} | {} | {}",
                incident.severity,
                incident.id,
                incident.title,
                when(&incident.created_at)
            ),
            &incident.link,
        ),
    );
    md.heading(4, &format!("IC: {}", commander(incident)));
    md.heading(4, "Root cause");
    md.para(&format!("  {}", incident.root_cause));
    md.heading(4, "Summary");
    md.para(&format!("  {}", incident.summary));

    if let Some(scope) = incident
        .customer_impact_scope
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        match incident.customer_impact_duration {
            Some(d) => md.heading(4, &format!("Customer impact ({})", format_duration(d))),
            None => md.heading(4, "Customer impact"),
        }
        md.para(&format!("  {scope}"));
    }

    md.heading(4, "PagerDuty pages");
    for page in incident.pages.iter().filter_map(|&idx| pages.get(idx)) {
        md.unordered(1, &page_link(page, when));
    }
    md.br();

    md.heading(4, "Action taken");
    md.para(FILL_OUT_PLACEHOLDER);
    md.heading(4, "Follow-up");
    for prompt in FOLLOW_UP_PROMPTS {
        md.unordered(1, &format!("**{prompt}**"));
        md.para(FILL_OUT_PLACEHOLDER);
    }
}

fn render_other_page(md: &mut MarkdownWriter, page: &Page, when: &dyn Fn(&DateTime<Utc>) -> String) {
    md.unordered(1, &page_link(page, when));
    md.unordered(2, &format!("**Ack'ed by**: {}", page.responders.join(", ")));
    if !page.notes.is_empty() {
        md.unordered(2, "**Notes**:");
        for note in &page.notes {
            md.unordered(3, &note_line(note));
        }
        md.br();
    }
    md.unordered(2, &format!("**Action taken**: {FILL_OUT_PLACEHOLDER}"));
    md.unordered(2, &format!("**Follow-up**: {FILL_OUT_PLACEHOLDER}"));
}

fn commander(incident: &Incident) -> String {
    match (incident.commander_name.is_empty(), incident.commander_email.is_empty()) {
        (false, false) => format!("{} ({})", incident.commander_name, incident.commander_email),
        (true, false) => incident.commander_email.clone(),
        (false, true) => incident.commander_name.clone(),
        (true, true) => "unassigned".to_string(),
    }
}

fn page_link(page: &Page, when: &dyn Fn(&DateTime<Utc>) -> String) -> String {
    link(&format!("{} {}", when(&page.created_at), page.title), &page.link)
}

fn note_line(note: &Note) -> String {
    match &note.author {
        Some(author) if !author.email.is_empty() => format!("**{}**: {}", author.email, note.content),
        Some(author) if !author.name.is_empty() => format!("**{}**: {}", author.name, note.content),
        _ => note.content.clone(),
    }
}

/// Markdown link whose text cannot close the bracket early.
fn link(text: &str, target: &str) -> String {
    format!("[{}]({target})", text.replace(['[', ']'], "|"))
}

// ---------------------------------------------------------------------------
// Markdown writer
// ---------------------------------------------------------------------------

/// Minimal append-only Markdown builder.
#[derive(Debug, Default)]
struct MarkdownWriter {
    buf: String,
}

impl MarkdownWriter {
    fn raw(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    fn heading(&mut self, level: usize, text: &str) {
        self.buf.push_str(&"#".repeat(level));
        self.buf.push(' ');
        self.buf.push_str(text);
        self.buf.push_str("\n\n");
    }

    fn para(&mut self, text: &str) {
        self.buf.push_str(text);
        self.buf.push_str("\n\n");
    }

    fn br(&mut self) {
        self.buf.push('\n');
    }

    fn unordered(&mut self, level: usize, item: &str) {
        self.buf.push_str(&"  ".repeat(level.saturating_sub(1)));
        self.buf.push_str("- ");
        self.buf.push_str(item);
        self.buf.push('\n');
    }

    fn finish(self) -> String {
        self.buf
    }
}
