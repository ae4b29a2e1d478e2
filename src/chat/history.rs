//! Conversation history stored in a memory module.

use std::collections::HashSet;

use serde_json::Value;

use crate::api::{ModuleContent, ModuleStore};
use crate::chat::message::{Attachment, Message, Sender, now_millis};
use crate::ids::ModuleId;

/// Turn stored module entries into an ordered conversation.
///
/// Entries without text or sender are dropped, `"system"` senders become the
/// assistant, a missing `createdAt` is stamped with `now`, exact duplicates
/// (same time, sender and text) are kept once, and the result is sorted by
/// creation time. Key order in the module carries no meaning.
#[must_use]
pub fn messages_from_content(content: &ModuleContent, now: i64) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut messages: Vec<Message> = content
        .values()
        .filter_map(|record| message_from_record(record, now))
        .filter(|m| {
            let (created_at, user, text) = m.identity_key();
            seen.insert((created_at, user, text.to_string()))
        })
        .collect();

    messages.sort_by_key(|m| m.created_at);
    messages
}

fn message_from_record(record: &Value, now: i64) -> Option<Message> {
    let text = record.get("text").and_then(Value::as_str)?;
    if text.is_empty() {
        return None;
    }
    let user = record
        .get("user")
        .and_then(Value::as_str)
        .and_then(Sender::from_label)?;

    let created_at = record
        .get("createdAt")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(now);

    let attachments = record
        .get("attachments")
        .and_then(|v| serde_json::from_value::<Vec<Attachment>>(v.clone()).ok());

    Some(Message {
        text: text.to_string(),
        user,
        created_at,
        attachments,
    })
}

/// Render every entry except `exclude_key` as `sender: text` lines.
#[must_use]
pub fn history_lines(content: &ModuleContent, exclude_key: &str) -> Vec<String> {
    let prior: ModuleContent = content
        .iter()
        .filter(|(key, _)| key.as_str() != exclude_key)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    messages_from_content(&prior, now_millis())
        .iter()
        .map(Message::history_line)
        .collect()
}

/// Fetch and normalise a module's history.
///
/// Failures are logged and read as an empty history so the conversation can
/// proceed.
pub async fn load_history(store: &dyn ModuleStore, module_id: &ModuleId) -> Vec<Message> {
    match store.get_module(module_id).await {
        Ok(content) => {
            let messages = messages_from_content(&content, now_millis());
            tracing::debug!(
                "Loaded {} messages from memory module {module_id}",
                messages.len()
            );
            messages
        }
        Err(err) => {
            tracing::error!("Failed to load memory module {module_id}: {err}");
            Vec::new()
        }
    }
}
