use serde::{Deserialize, Serialize};

use crate::error::{OrganizerError, Result};

/// MIME type of the parts this tool saves
pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// One top-level body part of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    pub mime_type: String,
    pub filename: String,
    pub attachment_id: Option<String>,
}

/// A mail item as returned by the message detail call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub headers: Vec<Header>,
    pub parts: Vec<MessagePart>,
}

impl Message {
    /// First header with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    pub fn date(&self) -> Option<&str> {
        self.header("Date")
    }
}

/// Reference to a PDF attachment whose bytes have not been fetched yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentPart {
    pub mime_type: String,
    pub filename: String,
    pub attachment_id: String,
}

/// Fetched attachment bytes, held only until written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Top-level parts typed `application/pdf` with a non-empty filename, in
/// message order
///
/// A part without an attachment id keeps an empty id; fetching it fails for
/// that message only.
pub fn extract_pdf_parts(message: &Message) -> Vec<AttachmentPart> {
    message
        .parts
        .iter()
        .filter(|part| part.mime_type == PDF_MIME_TYPE && !part.filename.is_empty())
        .map(|part| AttachmentPart {
            mime_type: part.mime_type.clone(),
            filename: part.filename.clone(),
            attachment_id: part.attachment_id.clone().unwrap_or_default(),
        })
        .collect()
}

/// Convert a Gmail API message (fetched with `format=full`)
pub fn message_from_api(msg: google_gmail1::api::Message) -> Result<Message> {
    let id = msg
        .id
        .ok_or_else(|| OrganizerError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let payload = msg.payload.unwrap_or_default();

    let headers = payload
        .headers
        .unwrap_or_default()
        .into_iter()
        .filter_map(|header| match (header.name, header.value) {
            (Some(name), Some(value)) => Some(Header { name, value }),
            _ => None,
        })
        .collect();

    let parts = payload
        .parts
        .unwrap_or_default()
        .into_iter()
        .map(|part| MessagePart {
            mime_type: part.mime_type.unwrap_or_default(),
            filename: part.filename.unwrap_or_default(),
            attachment_id: part.body.and_then(|body| body.attachment_id),
        })
        .collect();

    Ok(Message { id, headers, parts })
}
