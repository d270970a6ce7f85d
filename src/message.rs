//! Chat message structures and conversation keys

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix for ids of messages that only exist locally
const LOCAL_ID_PREFIX: &str = "local-";

/// A chat message as stored by the messaging backend
///
/// Field names follow the backend's camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID
    pub id: String,
    /// Sender user ID
    pub sender_id: String,
    /// Receiver user ID
    pub receiver_id: String,
    /// Message body
    pub text: String,
    /// Creation time, assigned by the backend
    pub created_at: DateTime<Utc>,
    /// Whether the receiver has read the message
    #[serde(default)]
    pub read: bool,
    /// Whether the message was edited after sending
    #[serde(default)]
    pub edited: bool,
    /// Whether the message was deleted
    #[serde(default)]
    pub deleted: bool,
    /// ID of the message this one replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replied_to: Option<String>,
}

impl Message {
    /// Create a local-only pending message
    ///
    /// Used by screens that want to keep showing a message whose send failed.
    /// The id is `local-<uuid>` and never collides with backend ids.
    ///
    /// # Example
    /// ```rust
    /// use campus_chat::Message;
    ///
    /// let msg = Message::local_pending("student_1", "teacher_7", "Is the quiz open?", None)
    ///     .expect("valid message");
    /// assert!(msg.is_local());
    /// ```
    pub fn local_pending(
        sender_id: &str,
        receiver_id: &str,
        text: &str,
        replied_to: Option<String>,
    ) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(Error::Validation("Message text is empty".to_string()));
        }

        Ok(Self {
            id: format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4()),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text: text.trim().to_string(),
            created_at: Utc::now(),
            read: false,
            edited: false,
            deleted: false,
            replied_to,
        })
    }

    /// Whether this message was created locally and never confirmed by the backend
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

/// Identifies one conversation, and therefore one polling session
///
/// The two participant ids are sorted, so `(a, b)` and `(b, a)` produce the
/// same key. Rendered as `"<first>-<second>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    first: String,
    second: String,
}

impl ConversationKey {
    /// Build the key for a pair of participants
    pub fn new(participant_a: &str, participant_b: &str) -> Self {
        let (first, second) = if participant_a <= participant_b {
            (participant_a, participant_b)
        } else {
            (participant_b, participant_a)
        };

        Self {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    /// Key for the conversation a message belongs to
    pub fn for_message(message: &Message) -> Self {
        Self::new(&message.sender_id, &message.receiver_id)
    }

    /// Both participants, in canonical order
    pub fn participants(&self) -> (&str, &str) {
        (&self.first, &self.second)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.second)
    }
}
