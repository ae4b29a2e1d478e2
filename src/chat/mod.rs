//! Agent conversations backed by a memory module.
//!
//! - `message`: the message model and module entry keys
//! - `history`: loading and normalising stored history
//! - `framing`: the hidden chatlog preamble and its display cleanup
//! - `session`: the mounted conversation and its send flow

pub mod framing;
pub mod history;
pub mod message;
pub mod session;

pub use framing::{MessageCleaner, frame_with_history};
pub use history::{history_lines, load_history, messages_from_content};
pub use message::{Attachment, Message, Sender};
pub use session::{
    ChatSession, Draft, IgnoreReason, Notification, NotificationVariant, SendState,
    SubmitOutcome,
};
