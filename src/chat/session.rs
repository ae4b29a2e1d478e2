//! A mounted conversation with one agent.
//!
//! Sending follows `Idle -> Sending -> Succeeded | Failed -> Idle`. The user
//! message is shown immediately and persisted by a detached task while the
//! chat request is awaited; the two are not ordered. A submit that is
//! dropped before the backend answers returns the session to `Idle`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, mpsc, watch};

use crate::api::{ChatBackend, FileUpload, ModuleContent, ModuleStore};
use crate::chat::framing::{MessageCleaner, frame_with_history};
use crate::chat::history::{history_lines, load_history};
use crate::chat::message::{Message, assistant_entry_key, now_millis, user_entry_key};
use crate::error::{BabError, BabResult};
use crate::ids::{AgentId, ModuleId};
use crate::modules::FieldError;
use crate::storage::SessionContext;

/// Title of the notification published when a send fails.
pub const SEND_FAILED_TITLE: &str = "Unable to send message";

/// Progress of the current send.
///
/// `Succeeded` and `Failed` are transient: the session moves on to `Idle` in
/// the same step, so `watch` subscribers usually only observe
/// `Sending -> Idle`. The outcome itself is returned by
/// [`ChatSession::submit`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SendState {
    /// Ready to send.
    #[default]
    Idle,
    /// A request is in flight.
    Sending,
    /// The last request completed. Transient.
    Succeeded,
    /// The last request failed. Transient.
    Failed,
}

/// Visual weight of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationVariant {
    /// Informational.
    Default,
    /// An operation failed.
    Destructive,
}

/// A user-facing notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Visual weight.
    pub variant: NotificationVariant,
    /// Short title.
    pub title: String,
    /// Details.
    pub description: String,
}

impl Notification {
    fn send_failed(description: String) -> Self {
        Self {
            variant: NotificationVariant::Destructive,
            title: SEND_FAILED_TITLE.to_string(),
            description,
        }
    }
}

/// Input staged for the next send.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Draft {
    /// Message text.
    pub input: String,
    /// Staged image.
    pub file: Option<FileUpload>,
}

impl Draft {
    /// A draft holding `input`.
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            file: None,
        }
    }

    /// Stage an image for the next send.
    ///
    /// # Errors
    /// Returns `InvalidUpload` for files that are not images.
    pub fn attach(&mut self, file: FileUpload) -> BabResult<()> {
        if !file.is_image() {
            return Err(BabError::InvalidUpload(vec![FieldError::new(
                "file",
                format!("{} is not an image", file.file_name),
            )]));
        }
        self.file = Some(file);
        Ok(())
    }

    /// Take the staged input, leaving an empty draft behind.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Why a submit did nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Nothing to send.
    EmptyInput,
    /// Another send is in flight.
    Busy,
}

/// Result of [`ChatSession::submit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing was sent.
    Ignored(IgnoreReason),
    /// The agent answered.
    Sent {
        /// Normalised replies.
        responses: Vec<Message>,
        /// Whether the outbound text carried the chatlog preamble.
        framed: bool,
    },
    /// The chat backend failed; a notification was published.
    Failed {
        /// Error text shown to the user.
        message: String,
    },
}

/// Conversation state for one `(agent, memory module)` pair.
pub struct ChatSession {
    agent_id: AgentId,
    module_id: ModuleId,
    chat: Arc<dyn ChatBackend>,
    store: Arc<dyn ModuleStore>,
    context: SessionContext,
    cleaner: MessageCleaner,
    messages: Arc<RwLock<Vec<Message>>>,
    mounted: AtomicBool,
    state: watch::Sender<SendState>,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl ChatSession {
    /// Create a session and the receiver for its notifications.
    ///
    /// The session applies responses until [`ChatSession::unmount`].
    ///
    /// # Errors
    /// Returns an error if the display cleaner cannot be built.
    pub fn new(
        agent_id: AgentId,
        module_id: ModuleId,
        chat: Arc<dyn ChatBackend>,
        store: Arc<dyn ModuleStore>,
        context: SessionContext,
    ) -> BabResult<(Self, mpsc::UnboundedReceiver<Notification>)> {
        let (notifications, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SendState::Idle);

        let session = Self {
            agent_id,
            module_id,
            chat,
            store,
            context,
            cleaner: MessageCleaner::new()?,
            messages: Arc::new(RwLock::new(Vec::new())),
            mounted: AtomicBool::new(true),
            state,
            notifications,
        };
        Ok((session, receiver))
    }

    /// Agent this session talks to.
    #[must_use]
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Memory module backing the conversation.
    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    /// Load history into an empty conversation.
    ///
    /// A conversation that already holds messages is left untouched, so
    /// mounting twice never duplicates history. Returns the message count.
    pub async fn mount(&self) -> usize {
        self.mounted.store(true, Ordering::SeqCst);

        {
            let messages = self.messages.read().await;
            if !messages.is_empty() {
                return messages.len();
            }
        }

        let history = load_history(self.store.as_ref(), &self.module_id).await;

        let mut messages = self.messages.write().await;
        if messages.is_empty() {
            messages.extend(history);
        }
        messages.len()
    }

    /// Stop applying responses to this session.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    /// Whether responses are still applied.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Snapshot of the conversation.
    pub async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    /// Snapshot with chatlog blocks stripped for display.
    pub async fn display_messages(&self) -> Vec<Message> {
        self.messages
            .read()
            .await
            .iter()
            .map(|m| Message {
                text: self.cleaner.clean(&m.text),
                ..m.clone()
            })
            .collect()
    }

    /// Current send state.
    #[must_use]
    pub fn state(&self) -> SendState {
        *self.state.borrow()
    }

    /// Watch send state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SendState> {
        self.state.subscribe()
    }

    /// Send the staged draft.
    ///
    /// Empty input and submits while another send is in flight are ignored
    /// and leave the draft as it was. Otherwise the draft is emptied.
    pub async fn submit(&self, draft: &mut Draft) -> SubmitOutcome {
        if draft.input.is_empty() {
            return SubmitOutcome::Ignored(IgnoreReason::EmptyInput);
        }

        let claimed = self.state.send_if_modified(|state| {
            if *state == SendState::Sending {
                false
            } else {
                *state = SendState::Sending;
                true
            }
        });
        if !claimed {
            return SubmitOutcome::Ignored(IgnoreReason::Busy);
        }
        let mut guard = SendGuard::new(self);

        let Draft { input, file } = draft.take();
        let timestamp = now_millis();
        let user_key = user_entry_key(timestamp);
        let user_message = Message::user(
            input.clone(),
            timestamp,
            file.as_ref().map(|f| vec![f.attachment()]),
        );

        self.messages.write().await.push(user_message.clone());
        self.persist_detached(user_key.clone(), &user_message);

        let first_send = !self.context.is_agent_started(self.agent_id);
        let (outbound, framed) = if first_send {
            if let Err(err) = self.context.mark_agent_started(self.agent_id) {
                tracing::warn!("Failed to persist started flag for agent {}: {err}", self.agent_id);
            }
            guard.rollback_started = true;
            self.framed_text(&input, &user_key).await
        } else {
            (input, false)
        };

        match self.chat.send_message(self.agent_id, outbound, file).await {
            Ok(replies) => {
                guard.rollback_started = false;
                let created_at = now_millis();
                let responses: Vec<Message> = replies
                    .into_iter()
                    .map(|reply| reply.into_message(created_at))
                    .collect();

                if self.is_mounted() {
                    self.messages.write().await.extend(responses.iter().cloned());
                } else {
                    tracing::debug!("Session for agent {} unmounted, response not applied", self.agent_id);
                }
                self.persist_responses(created_at, &responses).await;

                guard.settle(SendState::Succeeded);
                SubmitOutcome::Sent { responses, framed }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!("Failed to send message to agent {}: {message}", self.agent_id);

                if first_send {
                    self.reset_started();
                }
                if self.is_mounted()
                    && self
                        .notifications
                        .send(Notification::send_failed(message.clone()))
                        .is_err()
                {
                    tracing::debug!("Notification receiver for agent {} is gone", self.agent_id);
                }

                guard.settle(SendState::Failed);
                SubmitOutcome::Failed { message }
            }
        }
    }

    fn finish(&self, outcome: SendState) {
        self.state.send_replace(outcome);
        self.state.send_replace(SendState::Idle);
    }

    fn reset_started(&self) {
        if let Err(err) = self.context.reset_agent_started(self.agent_id) {
            tracing::warn!("Failed to reset started flag for agent {}: {err}", self.agent_id);
        }
    }

    /// Prefix `input` with every stored turn except the current one.
    async fn framed_text(&self, input: &str, user_key: &str) -> (String, bool) {
        let content = match self.store.get_module(&self.module_id).await {
            Ok(content) => content,
            Err(err) => {
                tracing::error!("Failed to read history of module {}: {err}", self.module_id);
                ModuleContent::new()
            }
        };

        let history = history_lines(&content, user_key);
        if history.is_empty() {
            (input.to_string(), false)
        } else {
            (frame_with_history(&history, input), true)
        }
    }

    fn persist_detached(&self, key: String, message: &Message) {
        let mut entries = ModuleContent::new();
        entries.insert(key, message.to_record());

        let store = Arc::clone(&self.store);
        let module_id = self.module_id.clone();
        tokio::spawn(async move {
            if let Err(err) = store.append_module(&module_id, entries).await {
                tracing::error!("Failed to store user message in module {module_id}: {err}");
            }
        });
    }

    async fn persist_responses(&self, created_at: i64, responses: &[Message]) {
        if responses.is_empty() {
            return;
        }

        let entries: ModuleContent = responses
            .iter()
            .enumerate()
            .map(|(i, m)| (assistant_entry_key(created_at, i), m.to_record()))
            .collect();

        if let Err(err) = self.store.append_module(&self.module_id, entries).await {
            tracing::error!("Failed to store response in module {}: {err}", self.module_id);
        }
    }
}

/// Settles a claimed send, or puts the session back to `Idle` when the
/// submit future is dropped first.
struct SendGuard<'a> {
    session: &'a ChatSession,
    rollback_started: bool,
    settled: bool,
}

impl<'a> SendGuard<'a> {
    const fn new(session: &'a ChatSession) -> Self {
        Self {
            session,
            rollback_started: false,
            settled: false,
        }
    }

    fn settle(mut self, outcome: SendState) {
        self.settled = true;
        self.session.finish(outcome);
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::debug!("Send to agent {} abandoned before an answer", self.session.agent_id);
        if self.rollback_started {
            self.session.reset_started();
        }
        self.session.state.send_replace(SendState::Idle);
    }
}
