//! Command-line interface

use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::GmailAuthenticator;
use crate::client::GmailMailClient;
use crate::config::{AuthFlow, Config, RunSettings};
use crate::error::Result;
use crate::pipeline::{download_pdfs, RunReport};
use crate::query::{Month, SearchQuery};

#[derive(Parser, Debug)]
#[command(name = "gmail-pdf-organizer")]
#[command(version)]
#[command(
    about = "Download PDF attachments from Gmail into a local folder",
    long_about = None
)]
pub struct Cli {
    /// Directory to save PDFs into [default: output]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Filename pattern using {id}, {subject}, {date} and {original_filename}
    #[arg(short = 'n', long)]
    pub name_pattern: Option<String>,

    /// Only messages received in this month (YYYY-MM) [default: current month]
    #[arg(short, long, conflicts_with = "any_date")]
    pub month: Option<String>,

    /// Search all messages regardless of date
    #[arg(long)]
    pub any_date: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Path to token cache file
    #[arg(long)]
    pub token_cache: Option<PathBuf>,

    /// Paste the authorization code instead of using a local callback
    #[arg(long)]
    pub manual_auth: bool,

    /// Don't try to open a browser for authorization
    #[arg(long)]
    pub no_browser: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Date filter for this run; `None` means any date
    pub fn month_filter(&self) -> Result<Option<Month>> {
        if self.any_date {
            return Ok(None);
        }
        match &self.month {
            Some(month) => month.parse().map(Some),
            None => Ok(Some(Month::current())),
        }
    }

    /// Apply command-line overrides on top of the file configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.download.output_dir = output.clone();
        }
        if let Some(pattern) = &self.name_pattern {
            config.download.name_pattern = pattern.clone();
        }
        if let Some(credentials) = &self.credentials {
            config.auth.credentials = credentials.clone();
        }
        if let Some(token_cache) = &self.token_cache {
            config.auth.token_cache = token_cache.clone();
        }
        if self.manual_auth {
            config.auth.flow = AuthFlow::Manual;
        }
        if self.no_browser {
            config.auth.open_browser = false;
        }
    }

    /// Resolve the settings for one run
    pub fn into_settings(&self, mut config: Config) -> Result<RunSettings> {
        self.apply_overrides(&mut config);
        config.validate()?;

        let query = SearchQuery::pdf_attachments(self.month_filter()?);
        Ok(RunSettings::from_config(&config, query))
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: Arc<MultiProgress>,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new(multi: Arc<MultiProgress>) -> Self {
        // Use {elapsed} for human-readable format (e.g., "1s", "234ms")
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    /// Reporter that draws no bars; printed lines still go to stdout
    pub fn hidden() -> Self {
        Self::new(Arc::new(MultiProgress::with_draw_target(
            ProgressDrawTarget::hidden(),
        )))
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Print a line above any active bars
    pub fn println(&self, line: &str) {
        // MultiProgress swallows output when it isn't drawing (e.g. piped stdout)
        if self.multi.is_hidden() {
            println!("{}", line);
        } else {
            let _ = self.multi.println(line);
        }
    }
}

/// Authenticate, then download every matching PDF
pub async fn run(settings: &RunSettings, reporter: &ProgressReporter) -> Result<RunReport> {
    info!("Authenticating with Gmail API...");
    let authenticator = GmailAuthenticator::build(&settings.auth).await?;
    let credential = authenticator.obtain_credential().await?;
    info!(
        "Authorized (refresh token {})",
        if credential.refresh_token.is_some() {
            "present"
        } else {
            "absent"
        }
    );

    let hub = authenticator.into_hub()?;
    let client = GmailMailClient::new(hub, settings.client.clone());

    download_pdfs(&client, settings, reporter).await
}
