//! Shared types, error model, and configuration for the on-call report tool.
//!
//! This crate is the foundation depended on by all other crates in the workspace.
//! It provides:
//! - [`ReportError`]: the unified error type
//! - Domain types ([`Incident`], [`Page`], [`Note`], [`ReplaceRule`], [`TagFilterSet`])
//! - Configuration ([`AppConfig`], [`ReportRequest`], [`Credentials`], config loading)
//! - Collaborator traits ([`IncidentSource`], [`PageSource`], [`Publisher`])

pub mod config;
pub mod error;
pub mod source;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConfluenceConfig, Credentials, DATE_FORMAT, DatadogConfig, DefaultsConfig,
    PagerDutyConfig, PublishTarget, ReportRequest, RequestParams, config_dir, config_file_path,
    init_config, load_config, load_config_from, parse_date_range, require_secret,
};
pub use error::{ReportError, Result};
pub use source::{IncidentSource, PageQuery, PageSource, PublishPage, Publisher};
pub use types::{
    AlertRecord, Incident, Note, NoteAuthor, Page, RawNote, RawPage, ReplaceRule, TagFilterSet,
    User,
};
