//! Output filename templating
//!
//! Recognized placeholders: `{id}`, `{subject}`, `{date}` and
//! `{original_filename}`. Anything else in the pattern, including unknown
//! `{tokens}`, is copied through unchanged.

use chrono::{DateTime, FixedOffset};

use crate::models::Message;

/// Render `pattern` for one attachment of `message`
///
/// Substitution happens in a single left-to-right pass, so values that
/// themselves look like placeholders are never expanded again.
pub fn format_filename(message: &Message, original_filename: &str, pattern: &str) -> String {
    let subject = message.subject().unwrap_or("");
    let date = message
        .date()
        .and_then(parse_header_date)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    let mut out = String::with_capacity(pattern.len() + subject.len() + original_filename.len());
    let mut rest = pattern;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];

        let replacement = candidate.find('}').and_then(|end| {
            let value = match &candidate[1..end] {
                "id" => message.id.as_str(),
                "subject" => subject,
                "date" => date.as_str(),
                "original_filename" => original_filename,
                _ => return None,
            };
            Some((value, end + 1))
        });

        match replacement {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('{');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);

    out
}

/// Parse an RFC 2822 `Date` header, keeping the sender's UTC offset
///
/// The weekday is dropped before parsing: mail clients get it wrong often
/// enough that a mismatch should not lose the date. Trailing comments such as
/// `(UTC)` are ignored.
pub fn parse_header_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = value.trim();
    let without_weekday = match trimmed.split_once(',') {
        Some((weekday, rest)) if weekday.trim().chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim()
        }
        _ => trimmed,
    };
    let without_comment = match without_weekday.find('(') {
        Some(idx) => without_weekday[..idx].trim_end(),
        None => without_weekday,
    };

    DateTime::parse_from_rfc2822(without_comment)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
        .ok()
}
