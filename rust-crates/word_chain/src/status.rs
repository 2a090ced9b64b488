//! Transient status-line messages.
//!
//! Every message shown to the user passes through [`sanitize_status`]: long
//! hex strings such as transaction hashes are replaced by `(tx)` and the text
//! is capped at [`MAX_STATUS_LEN`] characters.

use crate::error::Error;
use std::time::Duration;
use tokio::time::Instant;

pub const MAX_STATUS_LEN: usize = 100;
const MAX_ERROR_DETAIL_LEN: usize = 50;
const MIN_MASKED_HEX_DIGITS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
    pub posted_at: Instant,
}

impl StatusMessage {
    pub fn new(text: impl AsRef<str>, level: StatusLevel) -> Self {
        Self {
            text: sanitize_status(text.as_ref()),
            level,
            posted_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.posted_at.elapsed() >= ttl
    }
}

pub fn sanitize_status(message: &str) -> String {
    let masked = mask_hex_runs(message);
    if masked.chars().count() > MAX_STATUS_LEN {
        let mut cut: String = masked.chars().take(MAX_STATUS_LEN - 3).collect();
        cut.push_str("...");
        cut
    } else {
        masked
    }
}

/// Short human description of a failure: the first line of the error,
/// capped at 50 characters, or "Transaction cancelled" for a rejection.
pub fn describe_error(error: &Error) -> String {
    if error.is_rejection() {
        return String::from("Transaction cancelled");
    }
    let rendered = error.to_string();
    let first_line = rendered.lines().next().unwrap_or_default();
    first_line.chars().take(MAX_ERROR_DETAIL_LEN).collect()
}

fn mask_hex_runs(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(pos) = rest.find("0x") {
        let (before, tail) = rest.split_at(pos);
        out.push_str(before);
        let digits = tail[2..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .count();
        if digits >= MIN_MASKED_HEX_DIGITS {
            out.push_str("(tx)");
            rest = &tail[2 + digits..];
        } else {
            out.push_str("0x");
            rest = &tail[2..];
        }
    }
    out.push_str(rest);
    out
}
