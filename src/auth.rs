//! OAuth2 authorization for the Gmail API
//!
//! yup-oauth2 owns the token exchange and refresh. Getting the authorization
//! code from the user is done here, either by reading a pasted code or by
//! catching the browser redirect on a local port.

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::ApplicationSecret;

use crate::callback::CallbackListener;
use crate::config::{AuthFlow, AuthSettings};
use crate::error::{OrganizerError, Result};
use crate::token_store::{Credential, TokenStore};

/// Read-only mailbox access; nothing is ever modified
pub const READONLY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

/// Redirect target for the manual flow when the client secret lists none
const DEFAULT_MANUAL_REDIRECT: &str = "http://localhost";

/// Extra time allowed for the code exchange after the user has answered
const EXCHANGE_GRACE: Duration = Duration::from_secs(30);

type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<HttpsConnector>;

/// Load the OAuth2 client secret
///
/// Reads the downloaded `credentials.json` when it exists, otherwise falls
/// back to `GMAIL_CLIENT_ID` / `GMAIL_CLIENT_SECRET`.
pub async fn load_application_secret(path: &Path) -> Result<ApplicationSecret> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return yup_oauth2::read_application_secret(path).await.map_err(|e| {
            OrganizerError::AuthError(format!(
                "Failed to read credentials from {:?}: {}",
                path, e
            ))
        });
    }

    debug!("{:?} not found, trying environment credentials", path);
    load_credentials_from_env().map_err(|e| {
        OrganizerError::ConfigError(format!(
            "No credentials file at {:?} and {}",
            path, e
        ))
    })
}

/// Load OAuth2 credentials from environment variables
///
/// # Environment Variables
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| OrganizerError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| OrganizerError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![DEFAULT_MANUAL_REDIRECT.to_string()],
        ..Default::default()
    })
}

/// How the authorization code reaches us
#[derive(Debug, Clone, PartialEq, Eq)]
enum CodeSource {
    /// User copies the code from the browser and types it in
    Manual,
    /// Browser is redirected to a listener on this port
    LocalCallback { port: u16, open_browser: bool },
}

/// Supplies the authorization code to yup-oauth2's installed flow
pub struct CodeFlowDelegate {
    source: CodeSource,
    redirect_uri: String,
    timeout: Duration,
}

impl CodeFlowDelegate {
    pub fn manual(redirect_uri: impl Into<String>, timeout: Duration) -> Self {
        Self {
            source: CodeSource::Manual,
            redirect_uri: redirect_uri.into(),
            timeout,
        }
    }

    pub fn local_callback(port: u16, open_browser: bool, timeout: Duration) -> Self {
        Self {
            source: CodeSource::LocalCallback { port, open_browser },
            redirect_uri: format!("http://127.0.0.1:{}/", port),
            timeout,
        }
    }

    pub fn from_settings(settings: &AuthSettings, secret: &ApplicationSecret) -> Self {
        match settings.flow {
            AuthFlow::Manual => {
                let redirect = secret
                    .redirect_uris
                    .first()
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_MANUAL_REDIRECT.to_string());
                Self::manual(redirect, settings.authorization_timeout)
            }
            AuthFlow::LocalCallback => Self::local_callback(
                settings.callback_port,
                settings.open_browser,
                settings.authorization_timeout,
            ),
        }
    }

    async fn acquire_code(&self, url: &str) -> Result<String> {
        match &self.source {
            CodeSource::Manual => {
                println!(
                    "Go to the following link in your browser, then enter the authorization code:\n{}\n",
                    url
                );
                prompt_for_code(self.timeout).await
            }
            CodeSource::LocalCallback { port, open_browser } => {
                // Bound before the URL is shown so the redirect cannot arrive first
                let listener = CallbackListener::bind(*port).await?;

                println!("Open the following link to authorize access:\n{}\n", url);
                if *open_browser {
                    open_browser_best_effort(url);
                }
                info!("Waiting for authorization on {}", listener.redirect_uri());

                listener.wait_for_code(self.timeout).await
            }
        }
    }
}

impl InstalledFlowDelegate for CodeFlowDelegate {
    fn redirect_uri(&self) -> Option<&str> {
        Some(&self.redirect_uri)
    }

    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move { self.acquire_code(url).await.map_err(|e| e.to_string()) })
    }
}

/// Read one authorization code from the terminal
async fn prompt_for_code(timeout: Duration) -> Result<String> {
    let prompt = tokio::task::spawn_blocking(|| {
        inquire::Text::new("Authorization code:")
            .with_validator(inquire::required!("The code cannot be empty"))
            .prompt()
    });

    match tokio::time::timeout(timeout, prompt).await {
        Ok(Ok(Ok(code))) => Ok(code.trim().to_string()),
        Ok(Ok(Err(e))) => Err(OrganizerError::AuthError(format!(
            "Unable to read authorization code: {}",
            e
        ))),
        Ok(Err(e)) => Err(OrganizerError::AuthError(format!(
            "Authorization prompt failed: {}",
            e
        ))),
        Err(_) => Err(OrganizerError::Timeout {
            operation: "authorization code entry".to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

/// Platform opener command for a URL
fn browser_command(url: &str) -> Command {
    #[cfg(target_os = "macos")]
    {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        cmd
    }
    #[cfg(target_os = "windows")]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(url);
        cmd
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        cmd
    }
}

/// Try to open `url` in the default browser; failure only gets logged
pub fn open_browser_best_effort(url: &str) {
    let spawned = browser_command(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(child) => {
            debug!("Launched browser for authorization");
            reap_in_background(child);
        }
        Err(e) => warn!("Could not open a browser automatically: {}", e),
    }
}

/// Wait on a launcher process off the runtime so it never lingers as a zombie
fn reap_in_background(mut child: Child) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || match child.wait() {
        Ok(status) => debug!("Browser launcher exited with {}", status),
        Err(e) => debug!("Could not wait on browser launcher: {}", e),
    })
}

/// Authenticator wired to the on-disk token cache
pub struct GmailAuthenticator {
    auth: Authenticator<HttpsConnector>,
    store: TokenStore,
    timeout: Duration,
}

impl GmailAuthenticator {
    /// Build the authenticator; no network traffic happens yet
    pub async fn build(settings: &AuthSettings) -> Result<Self> {
        let secret = load_application_secret(&settings.credentials).await?;
        let delegate = CodeFlowDelegate::from_settings(settings, &secret);
        let store = TokenStore::new(settings.token_cache.clone());

        // Interactive: the delegate produces the code, yup only exchanges it
        let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            yup_oauth2::InstalledFlowReturnMethod::Interactive,
        )
        .flow_delegate(Box::new(delegate))
        .with_storage(Box::new(store.clone()))
        .build()
        .await
        .map_err(|e| OrganizerError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        Ok(Self {
            auth,
            store,
            timeout: settings.authorization_timeout + EXCHANGE_GRACE,
        })
    }

    /// Return a usable credential, running the interactive flow if the cache
    /// has none
    ///
    /// A freshly obtained credential is already persisted when this returns.
    pub async fn obtain_credential(&self) -> Result<Credential> {
        let token = tokio::time::timeout(self.timeout, self.auth.token(READONLY_SCOPES))
            .await
            .map_err(|_| OrganizerError::Timeout {
                operation: "authorization".to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| OrganizerError::AuthError(format!("Failed to obtain token: {}", e)))?;

        if token.token().is_none() {
            return Err(OrganizerError::AuthError(
                "Authorization returned no access token".to_string(),
            ));
        }

        self.store.load().await.map_err(|e| {
            OrganizerError::AuthError(format!(
                "Token was granted but could not be read back from {:?}: {}",
                self.store.path(),
                e
            ))
        })
    }

    /// Configure the Gmail hub over an HTTP/1 TLS client
    pub fn into_hub(self) -> Result<GmailHub> {
        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(
                    hyper_rustls::HttpsConnectorBuilder::new()
                        .with_native_roots()
                        .map_err(|e| {
                            OrganizerError::AuthError(format!("Failed to load TLS roots: {}", e))
                        })?
                        .https_or_http()
                        .enable_http1()
                        .build(),
                );

        Ok(Gmail::new(client, self.auth))
    }
}
