//! Chatlog framing of the first outbound message and its display cleanup.

use regex::Regex;

use crate::error::BabResult;

/// Opening delimiter of the hidden history block.
pub const CHATLOG_OPEN: &str = "<chatlog>";
/// Closing delimiter of the hidden history block.
pub const CHATLOG_CLOSE: &str = "</chatlog>";

const CONTINUE_INSTRUCTION: &str = "Here is the previous chatlog for reference, act as if you are continuing the conversation and don't mention the chatlog.";

/// Prepend prior history to `message` as a hidden chatlog block.
#[must_use]
pub fn frame_with_history(history: &[String], message: &str) -> String {
    let mut out = String::with_capacity(
        CONTINUE_INSTRUCTION.len() + message.len() + history.iter().map(String::len).sum::<usize>() + 64,
    );

    out.push_str(CHATLOG_OPEN);
    out.push('\n');
    out.push_str(CONTINUE_INSTRUCTION);
    out.push('\n');
    out.push_str(&history.join("\n"));
    out.push('\n');
    out.push_str(CHATLOG_CLOSE);
    out.push('\n');
    out.push_str(message);
    out
}

/// Strips leftover chatlog blocks from message text before display.
#[derive(Clone, Debug)]
pub struct MessageCleaner {
    patterns: Vec<Regex>,
}

impl MessageCleaner {
    /// Compile the cleanup patterns.
    ///
    /// # Errors
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> BabResult<Self> {
        Ok(Self {
            patterns: vec![
                Regex::new(r"(?s)<chatlog>.*?</chatlog>")?,
                // Malformed closing tag written by older clients.
                Regex::new(r"(?s)<chatlog>.*?<chatlog/>")?,
            ],
        })
    }

    /// Remove every chatlog block and trim the remainder.
    #[must_use]
    pub fn clean(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            out = pattern.replace_all(&out, "").into_owned();
        }
        out.trim().to_string()
    }
}
