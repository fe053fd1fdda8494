//! Common test utilities and fixtures

#![allow(dead_code)]

use gmail_pdf_organizer::client::{MailClient, MessagePage};
use gmail_pdf_organizer::config::{Config, RunSettings};
use gmail_pdf_organizer::error::Result;
use gmail_pdf_organizer::models::{Header, Message, MessagePart};
use gmail_pdf_organizer::query::SearchQuery;
use mockall::mock;
use std::path::Path;

/// Minimal bytes that look like a PDF
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj <<>> endobj\ntrailer <<>>\n%%EOF\n";

/// Create a test message with a Subject and Date header
pub fn create_test_message(id: &str, subject: &str, parts: Vec<MessagePart>) -> Message {
    Message {
        id: id.to_string(),
        headers: vec![
            Header {
                name: "From".to_string(),
                value: "lab@clinic.example".to_string(),
            },
            Header {
                name: "Subject".to_string(),
                value: subject.to_string(),
            },
            Header {
                name: "Date".to_string(),
                value: "Tue, 23 Dec 2025 12:34:56 -0600".to_string(),
            },
        ],
        parts,
    }
}

/// A PDF attachment part
pub fn pdf_part(filename: &str, attachment_id: &str) -> MessagePart {
    MessagePart {
        mime_type: "application/pdf".to_string(),
        filename: filename.to_string(),
        attachment_id: Some(attachment_id.to_string()),
    }
}

/// A plain text body part
pub fn text_part() -> MessagePart {
    MessagePart {
        mime_type: "text/plain".to_string(),
        filename: String::new(),
        attachment_id: None,
    }
}

/// A single page of results
pub fn single_page(ids: &[&str]) -> MessagePage {
    MessagePage {
        message_ids: ids.iter().map(|s| s.to_string()).collect(),
        next_page_token: None,
    }
}

/// Run settings writing into `output_dir`, searching without a date range
pub fn test_settings(output_dir: &Path) -> RunSettings {
    let mut settings =
        RunSettings::from_config(&Config::default(), SearchQuery::pdf_attachments(None));
    settings.output_dir = output_dir.to_path_buf();
    settings
}

/// Names of the regular files in `dir`, sorted
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// Mock implementation of MailClient for testing
mock! {
    pub MailClient {}

    #[async_trait::async_trait]
    impl MailClient for MailClient {
        async fn list_messages_page(
            &self,
            query: &str,
            page_token: Option<String>,
        ) -> Result<MessagePage>;
        async fn get_message(&self, id: &str) -> Result<Message>;
        async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>>;
    }
}
