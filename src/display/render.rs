//! Display content.
//!
//! Produces the text shown for a queue and the hash used to skip renders whose
//! content did not change.

use super::QueueSnapshot;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Rendered display text with its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDisplay {
    pub text: String,
    /// Hex SHA-256 of `text`.
    pub hash: String,
}

/// Render a queue snapshot.
pub fn render(snapshot: &QueueSnapshot) -> RenderedDisplay {
    let queue = &snapshot.queue;
    let mut text = String::new();

    let title = queue.header.as_deref().unwrap_or("Queue");
    let _ = write!(text, "[#{:06x}] {title}", queue.color);
    if queue.locked {
        text.push_str(" (locked)");
    }
    match queue.size_limit {
        Some(limit) => {
            let _ = writeln!(text, " - {}/{limit}", snapshot.entries.len());
        }
        None => {
            let _ = writeln!(text, " - {}", snapshot.entries.len());
        }
    }

    if snapshot.entries.is_empty() {
        text.push_str("No one is waiting.\n");
    }
    for (position, entry) in snapshot.entries.iter().enumerate() {
        let _ = write!(text, "{}. <@{}>", position + 1, entry.member_id);
        if entry.priority {
            text.push_str(" (priority)");
        }
        if entry.disconnected_at.is_some() {
            text.push_str(" (away)");
        }
        text.push('\n');
    }

    let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
    RenderedDisplay { text, hash }
}
