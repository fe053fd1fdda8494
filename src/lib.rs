//! Gmail PDF Organizer
//!
//! Finds Gmail messages carrying PDF attachments and saves each PDF into a
//! local folder under a name built from a template.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 with an on-disk token cache, using either a
//!   local redirect listener or a pasted authorization code
//! - **Search**: lazy, paginated listing of messages with PDF attachments,
//!   optionally limited to one calendar month
//! - **Naming**: `{id}`, `{subject}`, `{date}` and `{original_filename}`
//!   placeholders
//! - **Download**: one message and one attachment at a time; per-message and
//!   per-file failures are logged and skipped
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_pdf_organizer::auth::GmailAuthenticator;
//! use gmail_pdf_organizer::cli::ProgressReporter;
//! use gmail_pdf_organizer::client::GmailMailClient;
//! use gmail_pdf_organizer::config::{Config, RunSettings};
//! use gmail_pdf_organizer::pipeline::download_pdfs;
//! use gmail_pdf_organizer::query::SearchQuery;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let query = SearchQuery::pdf_attachments(Some("2025-02".parse()?));
//!     let settings = RunSettings::from_config(&config, query);
//!
//!     let authenticator = GmailAuthenticator::build(&settings.auth).await?;
//!     authenticator.obtain_credential().await?;
//!     let client = GmailMailClient::new(authenticator.into_hub()?, settings.client.clone());
//!
//!     let report = download_pdfs(&client, &settings, &ProgressReporter::hidden()).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 code acquisition and Gmail hub setup
//! - [`callback`] - One-shot local redirect listener
//! - [`cli`] - Command-line interface and progress output
//! - [`client`] - Gmail API client and lazy message search
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`formatter`] - Output filename templating
//! - [`models`] - Message and attachment structures
//! - [`pipeline`] - The download run
//! - [`query`] - Search expressions and month ranges
//! - [`token_store`] - Persisted OAuth2 credential

pub mod auth;
pub mod callback;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod formatter;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod token_store;

pub use error::{OrganizerError, Result};
pub use models::{Attachment, AttachmentPart, Header, Message, MessagePart};
