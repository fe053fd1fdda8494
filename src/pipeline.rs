//! Download run: search, then fetch and save PDFs one message at a time

use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cli::ProgressReporter;
use crate::client::{search, MailClient};
use crate::config::RunSettings;
use crate::error::{OrganizerError, Result};
use crate::formatter::format_filename;
use crate::models::{extract_pdf_parts, Attachment, AttachmentPart, Message};

/// Used when a formatted name sanitizes down to nothing
const FALLBACK_FILENAME: &str = "attachment.pdf";

/// Longest file name written, in bytes; common filesystems stop at 255
const MAX_FILENAME_BYTES: usize = 200;

/// Longest suffix still treated as an extension when truncating
const MAX_EXTENSION_BYTES: usize = 16;

/// Counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub messages_scanned: usize,
    pub messages_skipped: usize,
    pub attachments_saved: usize,
    pub attachments_failed: usize,
    pub saved_paths: Vec<PathBuf>,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "Scanned {} messages, saved {} PDFs ({} messages skipped, {} files failed)",
            self.messages_scanned,
            self.attachments_saved,
            self.messages_skipped,
            self.attachments_failed
        )
    }
}

/// Run the download loop against an authenticated client
///
/// Output-directory and search failures are returned as errors, as is a
/// credential rejected mid-run. A message whose detail or attachments cannot
/// be fetched is skipped, and a file that cannot be written is skipped; both
/// are logged and counted.
///
/// Files left by earlier runs are overwritten. Names that collide within
/// this run get a `_1`, `_2`, ... suffix instead.
pub async fn download_pdfs<C>(
    client: &C,
    settings: &RunSettings,
    reporter: &ProgressReporter,
) -> Result<RunReport>
where
    C: MailClient + ?Sized,
{
    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .map_err(|e| {
            OrganizerError::ConfigError(format!(
                "Failed to create output directory {:?}: {}",
                settings.output_dir, e
            ))
        })?;

    info!("Searching for messages: {}", settings.query);
    let spinner = reporter.add_spinner("Searching for messages with PDF attachments...");

    let mut report = RunReport::default();
    let mut written: HashSet<String> = HashSet::new();
    let mut ids = search(client, &settings.query);

    while let Some(next) = ids.next().await {
        let id = match next {
            Ok(id) => id,
            Err(e) => {
                spinner.finish_and_clear();
                return Err(e);
            }
        };
        report.messages_scanned += 1;
        spinner.set_message(format!("Processing message {}", report.messages_scanned));

        let message = match client.get_message(&id).await {
            Ok(message) => message,
            Err(e) if e.is_startup() => {
                spinner.finish_and_clear();
                return Err(e);
            }
            Err(e) => {
                warn!("Skipping message {}: {}", id, e);
                report.messages_skipped += 1;
                continue;
            }
        };

        reporter.println(&format!("Subject: {}", message.subject().unwrap_or("")));

        let parts = extract_pdf_parts(&message);
        if parts.is_empty() {
            debug!("Message {} has no PDF attachments", id);
            continue;
        }

        let attachments = match fetch_attachments(client, &message, &parts).await {
            Ok(attachments) => attachments,
            Err(e) if e.is_startup() => {
                spinner.finish_and_clear();
                return Err(e);
            }
            Err(e) => {
                warn!("Skipping attachments of message {}: {}", id, e);
                report.messages_skipped += 1;
                continue;
            }
        };

        for attachment in attachments {
            let name = format_filename(&message, &attachment.filename, &settings.name_pattern);
            let file_name = unique_in_run(&sanitize_path_component(&name), &written);
            let path = settings.output_dir.join(&file_name);

            match write_attachment(&path, &attachment.data).await {
                Ok(()) => {
                    reporter.println(&format!("Saved {}", path.display()));
                    written.insert(file_name);
                    report.attachments_saved += 1;
                    report.saved_paths.push(path);
                }
                Err(e) => {
                    warn!("Failed to write {:?}: {}", path, e);
                    report.attachments_failed += 1;
                }
            }
        }
    }

    spinner.finish_and_clear();
    info!("{}", report.summary());
    Ok(report)
}

/// Fetch every PDF of one message; the first failure abandons the message
async fn fetch_attachments<C>(
    client: &C,
    message: &Message,
    parts: &[AttachmentPart],
) -> Result<Vec<Attachment>>
where
    C: MailClient + ?Sized,
{
    let mut attachments = Vec::with_capacity(parts.len());
    for part in parts {
        let data = client
            .get_attachment(&message.id, &part.attachment_id)
            .await?;
        debug!("Fetched {} ({} bytes) from {}", part.filename, data.len(), message.id);
        attachments.push(Attachment {
            filename: part.filename.clone(),
            data,
        });
    }
    Ok(attachments)
}

async fn write_attachment(path: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data).await?;
    Ok(())
}

/// Make a formatted name safe to use as a single path component
///
/// Separators, NUL, control characters and the characters Windows rejects in
/// file names become `_`; `.` and `..` are replaced outright. Long names are
/// cut on a character boundary, keeping a short extension.
pub fn sanitize_path_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return FALLBACK_FILENAME.to_string();
    }

    truncate_keeping_extension(trimmed, MAX_FILENAME_BYTES)
}

fn truncate_keeping_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    let (stem, ext) = split_extension(name);
    let budget = max_bytes - ext.len();
    let mut end = 0;
    for (idx, c) in stem.char_indices() {
        if idx + c.len_utf8() > budget {
            break;
        }
        end = idx + c.len_utf8();
    }

    format!("{}{}", stem[..end].trim_end(), ext)
}

/// Split `name.pdf` into `("name", ".pdf")`; a long or spaced suffix is not
/// an extension
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx)
            if idx > 0
                && name.len() - idx <= MAX_EXTENSION_BYTES
                && !name[idx..].contains(' ') =>
        {
            name.split_at(idx)
        }
        _ => (name, ""),
    }
}

/// `name`, or `stem_N.ext` with the first `N` not yet written this run
fn unique_in_run(name: &str, written: &HashSet<String>) -> String {
    if !written.contains(name) {
        return name.to_string();
    }

    let (stem, ext) = split_extension(name);
    (1..)
        .map(|i| format!("{}_{}{}", stem, i, ext))
        .find(|candidate| !written.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}
