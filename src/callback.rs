//! One-shot local HTTP listener that receives the OAuth2 redirect
//!
//! The listener is bound before the authorization URL is shown so the
//! redirect can never race it. It answers exactly one request and is
//! dropped afterwards.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{OrganizerError, Result};

const SUCCESS_PAGE: &str = "<html><body style=\"font-family:system-ui;text-align:center;margin-top:4em\">\
<h2>Authorization received</h2><p>You can close this window and return to the terminal.</p></body></html>";

/// Outcome of the single redirected request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    Denied(String),
    Malformed,
}

/// A bound listener waiting for one redirect
pub struct CallbackListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackListener {
    /// Bind on 127.0.0.1; port 0 picks a free port
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
            OrganizerError::AuthError(format!(
                "Failed to bind callback listener on port {}: {}",
                port, e
            ))
        })?;
        let addr = listener.local_addr()?;
        debug!("Callback listener bound on {}", addr);
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Redirect URI to register in the authorization request
    pub fn redirect_uri(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Serve a single request in the background and return the receiving
    /// half of the rendezvous
    pub fn spawn(self) -> (oneshot::Receiver<CallbackOutcome>, JoinHandle<()>) {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let outcome = match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("Callback request from {}", peer);
                    handle_request(stream).await
                }
                Err(e) => {
                    warn!("Callback listener accept failed: {}", e);
                    CallbackOutcome::Malformed
                }
            };
            let _ = tx.send(outcome);
            // listener dropped here, closing the port
        });
        (rx, handle)
    }

    /// Block until the redirect arrives or `timeout` elapses
    pub async fn wait_for_code(self, timeout: Duration) -> Result<String> {
        let (rx, handle) = self.spawn();
        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(received) => received,
            Err(_) => {
                handle.abort();
                return Err(OrganizerError::Timeout {
                    operation: "waiting for the authorization redirect".to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        };
        let outcome = outcome.map_err(|_| {
            OrganizerError::AuthError("Callback listener stopped unexpectedly".to_string())
        })?;

        match outcome {
            CallbackOutcome::Code(code) => Ok(code),
            CallbackOutcome::Denied(reason) => Err(OrganizerError::AuthError(format!(
                "Authorization was denied: {}",
                reason
            ))),
            CallbackOutcome::Malformed => Err(OrganizerError::AuthError(
                "Redirect did not carry an authorization code".to_string(),
            )),
        }
    }
}

async fn handle_request(mut stream: TcpStream) -> CallbackOutcome {
    let mut buf = vec![0u8; 8192];
    let n = match stream.read(&mut buf).await {
        Ok(n) => n,
        Err(e) => {
            warn!("Failed to read callback request: {}", e);
            return CallbackOutcome::Malformed;
        }
    };

    let request = String::from_utf8_lossy(&buf[..n]);
    let outcome = parse_request_line(request.lines().next().unwrap_or(""));

    let (status, body) = match &outcome {
        CallbackOutcome::Code(_) => ("200 OK", SUCCESS_PAGE.to_string()),
        CallbackOutcome::Denied(reason) => (
            "200 OK",
            format!(
                "<html><body><h2>Authorization failed</h2><p>{}</p></body></html>",
                escape_html(reason)
            ),
        ),
        CallbackOutcome::Malformed => (
            "400 Bad Request",
            "<html><body>Missing authorization code</body></html>".to_string(),
        ),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Failed to answer callback request: {}", e);
    }
    let _ = stream.shutdown().await;

    outcome
}

/// Extract `code` or `error` from a request line such as
/// `GET /?code=4/0Ab&scope=... HTTP/1.1`
pub fn parse_request_line(line: &str) -> CallbackOutcome {
    let target = line.split_whitespace().nth(1).unwrap_or("");
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");

    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some(error) = params.get("error") {
        let reason = params
            .get("error_description")
            .cloned()
            .unwrap_or_else(|| error.clone());
        return CallbackOutcome::Denied(reason);
    }

    match params.get("code") {
        Some(code) if !code.is_empty() => CallbackOutcome::Code(code.clone()),
        _ => CallbackOutcome::Malformed,
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn send(addr: SocketAddr, request_line: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("{}\r\nHost: {}\r\n\r\n", request_line, addr);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_parse_code() {
        let outcome = parse_request_line("GET /?code=4%2F0AbCd&scope=gmail HTTP/1.1");
        assert_eq!(outcome, CallbackOutcome::Code("4/0AbCd".to_string()));
    }

    #[test]
    fn test_parse_error() {
        let outcome = parse_request_line("GET /?error=access_denied HTTP/1.1");
        assert_eq!(outcome, CallbackOutcome::Denied("access_denied".to_string()));
    }

    #[test]
    fn test_parse_missing_code() {
        assert_eq!(parse_request_line("GET /favicon.ico HTTP/1.1"), CallbackOutcome::Malformed);
        assert_eq!(parse_request_line(""), CallbackOutcome::Malformed);
        assert_eq!(parse_request_line("GET /?code= HTTP/1.1"), CallbackOutcome::Malformed);
    }

    #[tokio::test]
    async fn test_listener_receives_code() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let addr = listener.local_addr();
        assert!(listener.redirect_uri().starts_with("http://127.0.0.1:"));

        let waiter = tokio::spawn(listener.wait_for_code(Duration::from_secs(5)));
        let response = send(addr, "GET /?code=abc123 HTTP/1.1").await;

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Authorization received"));
        assert_eq!(waiter.await.unwrap().unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_listener_reports_denial() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let addr = listener.local_addr();

        let waiter = tokio::spawn(listener.wait_for_code(Duration::from_secs(5)));
        let response = send(addr, "GET /?error=access_denied HTTP/1.1").await;

        assert!(response.contains("Authorization failed"));
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, OrganizerError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_listener_rejects_request_without_code() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let addr = listener.local_addr();

        let waiter = tokio::spawn(listener.wait_for_code(Duration::from_secs(5)));
        let response = send(addr, "GET / HTTP/1.1").await;

        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(waiter.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_listener_times_out() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let err = listener
            .wait_for_code(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, OrganizerError::Timeout { .. }));
    }
}
