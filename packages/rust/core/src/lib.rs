//! Correlation and report-assembly engine for on-call reports.
//!
//! Normalizes page titles, filters pages by alert tags, links pages to
//! incidents by time window, and renders the result as Markdown
//! (see [`pipeline::generate`]). [`publish`] converts a finished report for
//! the wiki.

pub mod correlate;
pub mod normalize;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod tags;
