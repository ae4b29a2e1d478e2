//! Conversation message model.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Who authored a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Sender {
    /// The human user.
    User,
    /// The agent.
    Assistant,
}

impl Sender {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Interpret a stored or received sender label.
    ///
    /// `"user"` is the human; the legacy `"system"` label, `"assistant"` and
    /// any other non-empty label (backends may answer with the agent name)
    /// are the agent. An empty label is not a sender.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "" => None,
            "user" => Some(Self::User),
            _ => Some(Self::Assistant),
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Sender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::from_label(&label).ok_or_else(|| serde::de::Error::custom("empty sender label"))
    }
}

/// File metadata embedded in a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Where the file can be displayed from.
    pub url: String,
    /// MIME type.
    pub content_type: String,
    /// Display title, usually the file name.
    pub title: String,
}

/// A single conversation turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message body.
    pub text: String,
    /// Author.
    pub user: Sender,
    /// Creation time in milliseconds since the Unix epoch; the ordering key.
    pub created_at: i64,
    /// Attached files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl Message {
    /// A message typed by the user.
    #[must_use]
    pub fn user(
        text: impl Into<String>,
        created_at: i64,
        attachments: Option<Vec<Attachment>>,
    ) -> Self {
        Self {
            text: text.into(),
            user: Sender::User,
            created_at,
            attachments,
        }
    }

    /// A message produced by the agent.
    #[must_use]
    pub fn assistant(text: impl Into<String>, created_at: i64) -> Self {
        Self {
            text: text.into(),
            user: Sender::Assistant,
            created_at,
            attachments: None,
        }
    }

    /// Identity used to recognise the same message twice.
    #[must_use]
    pub fn identity_key(&self) -> (i64, Sender, &str) {
        (self.created_at, self.user, &self.text)
    }

    /// The record stored in a memory module for this message.
    #[must_use]
    pub fn to_record(&self) -> Value {
        let mut record = Map::new();
        record.insert("text".to_string(), Value::String(self.text.clone()));
        record.insert(
            "user".to_string(),
            Value::String(self.user.as_str().to_string()),
        );
        record.insert("createdAt".to_string(), Value::from(self.created_at));
        if let Some(attachments) = &self.attachments {
            let list = attachments
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "url": a.url,
                        "contentType": a.content_type,
                        "title": a.title,
                    })
                })
                .collect();
            record.insert("attachments".to_string(), Value::Array(list));
        }
        Value::Object(record)
    }

    /// History line used in the chatlog preamble.
    #[must_use]
    pub fn history_line(&self) -> String {
        format!("{}: {}", self.user, self.text)
    }
}

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Module entry key for a user turn.
#[must_use]
pub fn user_entry_key(timestamp: i64) -> String {
    format!("message_{timestamp}_user")
}

/// Module entry key for the `index`-th assistant message of a response.
#[must_use]
pub fn assistant_entry_key(timestamp: i64, index: usize) -> String {
    format!("message_{timestamp}_{index}_assistant")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_system_label_reads_as_assistant() {
        let message: Result<Message, _> =
            serde_json::from_value(json!({"text": "yo", "user": "system", "createdAt": 2}));
        assert_eq!(message.ok().map(|m| m.user), Some(Sender::Assistant));
    }

    #[test]
    fn test_empty_label_is_rejected() {
        assert_eq!(Sender::from_label("  "), None);
        assert!(serde_json::from_value::<Sender>(json!("")).is_err());
    }

    #[test]
    fn test_record_omits_missing_attachments() {
        let record = Message::user("hi", 1, None).to_record();
        assert_eq!(record, json!({"text": "hi", "user": "user", "createdAt": 1}));
    }

    #[test]
    fn test_record_keeps_attachments() {
        let attachment = Attachment {
            url: "attachment://cat.png".to_string(),
            content_type: "image/png".to_string(),
            title: "cat.png".to_string(),
        };
        let record = Message::user("look", 5, Some(vec![attachment])).to_record();
        assert_eq!(record["attachments"][0]["contentType"], "image/png");
    }

    #[test]
    fn test_entry_keys() {
        assert_eq!(user_entry_key(1_700_000_000_000), "message_1700000000000_user");
        assert_eq!(assistant_entry_key(42, 0), "message_42_0_assistant");
    }
}
