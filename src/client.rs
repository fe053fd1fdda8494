//! Gmail API client: message search, message detail and attachment download

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::Stream;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::auth::{GmailHub, READONLY_SCOPES};
use crate::config::ClientSettings;
use crate::error::{OrganizerError, Result};
use crate::models::{message_from_api, Message};
use crate::query::SearchQuery;

/// One page of message ids from `messages.list`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub message_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Trait defining the Gmail calls the organizer needs, for easier testing
#[async_trait]
pub trait MailClient: Send + Sync {
    /// List one page of message ids matching `query`
    async fn list_messages_page(
        &self,
        query: &str,
        page_token: Option<String>,
    ) -> Result<MessagePage>;

    /// Get full message detail (headers and body parts)
    async fn get_message(&self, id: &str) -> Result<Message>;

    /// Download and decode one attachment payload
    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>>;
}

/// Lazily walk every page of `query`, yielding message ids
///
/// Each call starts again from the first page. The next page is requested
/// only once the previous page's ids have been consumed; the first failing
/// page ends the stream with that error.
pub fn search<'a, C>(
    client: &'a C,
    query: &'a SearchQuery,
) -> Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>
where
    C: MailClient + ?Sized,
{
    Box::pin(stream! {
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = match client.list_messages_page(query.as_str(), page_token.take()).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            };
            pages += 1;
            debug!("Search page {} returned {} ids", pages, page.message_ids.len());

            for id in page.message_ids {
                yield Ok(id);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
    })
}

/// Gmail-backed client with a bounded wait on every request
pub struct GmailMailClient {
    hub: GmailHub,
    settings: ClientSettings,
}

impl GmailMailClient {
    pub fn new(hub: GmailHub, settings: ClientSettings) -> Self {
        Self { hub, settings }
    }
}

/// Run `call`, failing with `Timeout` once `limit` has elapsed
pub(crate) async fn with_timeout<T, F>(operation: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(OrganizerError::Timeout {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}

/// Validate a decoded attachment body
pub(crate) fn attachment_bytes(
    body: google_gmail1::api::MessagePartBody,
    attachment_id: &str,
) -> Result<Vec<u8>> {
    match body.data {
        Some(data) if !data.is_empty() => Ok(data),
        _ => Err(OrganizerError::DecodeError(format!(
            "Attachment {} has no payload",
            attachment_id
        ))),
    }
}

#[async_trait]
impl MailClient for GmailMailClient {
    async fn list_messages_page(
        &self,
        query: &str,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let call = async {
            let mut call = self
                .hub
                .users()
                .messages_list(&self.settings.user_id)
                .q(query)
                .max_results(self.settings.page_size);

            if let Some(token) = page_token.as_deref() {
                call = call.page_token(token);
            }

            let (_, response) = call.add_scopes(READONLY_SCOPES).doit().await?;

            let message_ids = response
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|msg_ref| msg_ref.id)
                .collect();

            Ok(MessagePage {
                message_ids,
                next_page_token: response.next_page_token,
            })
        };

        with_timeout("messages.list", self.settings.request_timeout, call).await
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        let call = async {
            let (_, msg) = self
                .hub
                .users()
                .messages_get(&self.settings.user_id, id)
                .format("full")
                .add_scopes(READONLY_SCOPES)
                .doit()
                .await?;
            message_from_api(msg)
        };

        with_timeout("messages.get", self.settings.request_timeout, call).await
    }

    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        if attachment_id.is_empty() {
            return Err(OrganizerError::InvalidMessageFormat(format!(
                "Message {} has a PDF part without an attachment id",
                message_id
            )));
        }

        let call = async {
            // The API layer base64url-decodes `data`; a malformed payload
            // surfaces as a JSON decode error
            let (_, body) = self
                .hub
                .users()
                .messages_attachments_get(&self.settings.user_id, message_id, attachment_id)
                .add_scopes(READONLY_SCOPES)
                .doit()
                .await?;
            attachment_bytes(body, attachment_id)
        };

        with_timeout(
            "messages.attachments.get",
            self.settings.request_timeout,
            call,
        )
        .await
    }
}
