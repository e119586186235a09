//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use oncall_report_clients::{ConfluenceClient, DatadogClient, PagerDutyClient};
use oncall_report_core::pipeline::{self, ProgressReporter, Report};
use oncall_report_core::publish::publish_report;
use oncall_report_shared::{
    AppConfig, Credentials, PublishTarget, ReportRequest, RequestParams, init_config,
    load_config, require_secret,
};
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// oncall-report: summarize a team's on-call period.
#[derive(Parser)]
#[command(
    name = "oncall-report",
    version,
    about = "Build an on-call report from Datadog incidents and PagerDuty pages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a report and print it to stdout.
    Generate(GenerateArgs),

    /// Publish an already generated report file.
    Publish {
        /// Markdown report to publish.
        #[arg(long)]
        input: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub(crate) struct GenerateArgs {
    /// Datadog team to report on (repeatable).
    #[arg(long = "team", required = true)]
    pub teams: Vec<String>,

    /// PagerDuty team name, when it differs from the Datadog team (repeatable).
    #[arg(long = "pd-team")]
    pub pd_teams: Vec<String>,

    /// First day of the report, YYYY-MM-DD.
    #[arg(long)]
    pub since: String,

    /// Last day of the report (exclusive), YYYY-MM-DD.
    #[arg(long)]
    pub until: String,

    /// Page urgency to include (defaults to `defaults.urgency`).
    #[arg(long)]
    pub urgency: Option<String>,

    /// Title rewrite rule in the form /pattern/replacement/ (repeatable, applied in order).
    #[arg(long)]
    pub replace: Vec<String>,

    /// Keep only pages whose alerts carry this tag (repeatable, all required).
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Drop pages whose alerts' `team:` tag is not this team.
    #[arg(long)]
    pub match_team: Option<String>,

    /// PagerDuty API token (overrides the configured env var).
    #[arg(long)]
    pub auth: Option<String>,

    /// Publish the report to Confluence after printing it.
    #[arg(long)]
    pub publish: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Confluence destination overrides.
#[derive(Args)]
pub(crate) struct TargetArgs {
    /// Confluence space key (defaults to `confluence.space_key`).
    #[arg(long)]
    pub space: Option<String>,

    /// Parent page id (defaults to `confluence.parent_id`).
    #[arg(long)]
    pub parent_id: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "warn,oncall_report=info",
        1 => "warn,oncall_report=debug",
        _ => "warn,oncall_report=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate(args) => cmd_generate(args).await,
        Command::Publish { input, target } => cmd_publish(&input, &target).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let config = load_config()?;

    // Every check that can fail without the network happens here.
    let publish = if args.publish {
        Some(PublishTarget::resolve(
            &config.confluence,
            args.target.space.as_deref(),
            args.target.parent_id.as_deref(),
        )?)
    } else {
        None
    };
    let request = ReportRequest::from_params(RequestParams {
        teams: args.teams,
        pd_teams: args.pd_teams,
        since: args.since,
        until: args.until,
        urgency: args
            .urgency
            .unwrap_or_else(|| config.defaults.urgency.clone()),
        replace: args.replace,
        tags: args.tags,
        match_team: args.match_team,
        publish,
    })?;
    let credentials = Credentials::from_env(&config, args.auth.as_deref())?;
    let confluence = match &request.publish {
        Some(_) => Some(confluence_client(&config)?),
        None => None,
    };

    let datadog = DatadogClient::new(
        &config.datadog,
        credentials.datadog_api_key.clone(),
        credentials.datadog_app_key.clone(),
    )?;
    let pagerduty = PagerDutyClient::new(&config.pagerduty, credentials.pagerduty_token.clone())?;

    info!(
        teams = ?request.teams,
        since = %request.since,
        until = %request.until,
        urgency = %request.urgency,
        "generating report"
    );

    let reporter = CliProgress::new();
    let report = pipeline::generate(&request, &datadog, &pagerduty, &Local, &reporter).await?;

    println!("{}", report.markdown);
    info!(
        incidents = report.incident_count,
        pages = report.page_count,
        links = report.correlation.links,
        unlinked = report.correlation.unlinked_pages,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "report generated"
    );

    if let (Some(target), Some(client)) = (&request.publish, &confluence) {
        let today = Local::now().date_naive();
        if let Err(e) = publish_report(&report.markdown, target, client, today).await {
            error!(error = %e, "publishing failed; the report above was not published");
            return Err(e.into());
        }
        eprintln!("Published '{}' to space {}", report.title, target.space_key);
    }

    Ok(())
}

async fn cmd_publish(input: &Path, target: &TargetArgs) -> Result<()> {
    let config = load_config()?;
    let target = PublishTarget::resolve(
        &config.confluence,
        target.space.as_deref(),
        target.parent_id.as_deref(),
    )?;
    let client = confluence_client(&config)?;

    let markdown = std::fs::read_to_string(input)
        .wrap_err_with(|| format!("failed to read report '{}'", input.display()))?;
    if markdown.trim().is_empty() {
        return Err(eyre!("report '{}' is empty", input.display()));
    }

    info!(input = %input.display(), space = %target.space_key, "publishing report");
    let page = publish_report(&markdown, &target, &client, Local::now().date_naive()).await?;

    println!("Published '{}' to space {}", page.title, page.space_key);
    Ok(())
}

fn confluence_client(config: &AppConfig) -> Result<ConfluenceClient> {
    let token = require_secret(&config.confluence.token_env, "Confluence API token")?;
    Ok(ConfluenceClient::new(&config.confluence, token)?)
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner on stderr so stdout carries only the report.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_processed(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processing page [{current}/{total}] {title}"));
    }

    fn done(&self, _report: &Report) {
        self.spinner.finish_and_clear();
    }
}
