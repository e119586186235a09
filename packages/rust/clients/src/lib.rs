//! HTTP collaborators for the on-call report pipeline.
//!
//! - [`DatadogClient`] : incident search ([`IncidentSource`](oncall_report_shared::IncidentSource))
//! - [`PagerDutyClient`] : pages, alerts, notes, responders ([`PageSource`](oncall_report_shared::PageSource))
//! - [`ConfluenceClient`] : report publishing ([`Publisher`](oncall_report_shared::Publisher))

mod confluence;
mod datadog;
mod pagerduty;

use std::time::Duration;

use reqwest::{Client, Response};

use oncall_report_shared::{ReportError, Result};

pub use confluence::ConfluenceClient;
pub use datadog::DatadogClient;
pub use pagerduty::PagerDutyClient;

/// User-Agent string for all upstream requests.
const USER_AGENT: &str = concat!("oncall-report/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Build a reqwest client with the shared settings.
fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| ReportError::Network(format!("failed to build HTTP client: {e}")))
}

/// Turn a non-success response into [`ReportError::Api`] carrying the body.
async fn check_status(service: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ReportError::api(service, status.as_u16(), body))
}

/// Decode a JSON body, mapping failures to parse errors.
async fn read_json<T: serde::de::DeserializeOwned>(service: &str, response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| ReportError::parse(format!("invalid {service} response: {e}")))
}

fn network_error(service: &str, e: reqwest::Error) -> ReportError {
    ReportError::Network(format!("{service}: {e}"))
}
