//! Per-conversation polling state
//!
//! A session tracks the cursor (timestamp of the last message seen), the
//! consecutive server-error count and some health data. The logic here is
//! pure; the polling task in [`crate::realtime`] drives it.

use crate::{message::ConversationKey, message::Message, Error};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Consecutive 5xx responses tolerated before a session stops itself
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// What a failed fetch did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Not a server error, the retry budget is untouched
    Ignored,
    /// Server error counted, session keeps polling
    Counted(u32),
    /// Retry budget exhausted, session must stop
    Exhausted(u32),
}

/// Snapshot of a session's health
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHealth {
    /// Conversation this session polls
    pub key: ConversationKey,
    /// Timestamp of the most recent message seen
    pub cursor: Option<DateTime<Utc>>,
    /// Consecutive server errors
    pub retry_count: u32,
    /// Completed polls, successful or not
    pub ticks: u64,
    /// Time of the last successful fetch
    pub last_success: Option<DateTime<Utc>>,
    /// When the session was started
    pub started_at: DateTime<Utc>,
    /// Sent messages the polls have not caught up with yet
    pub pending_announcements: usize,
}

/// Mutable state of one polling session
#[derive(Debug)]
pub struct SessionState {
    cursor: Option<DateTime<Utc>>,
    retry_count: u32,
    ticks: u64,
    last_success: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    /// IDs already emitted by a send with their `created_at`, skipped once
    /// by the poll that first returns them
    announced: HashMap<String, DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Fresh state: no cursor, zero retries
    pub fn new() -> Self {
        Self {
            cursor: None,
            retry_count: 0,
            ticks: 0,
            last_success: None,
            started_at: Utc::now(),
            announced: HashMap::new(),
        }
    }

    /// Timestamp of the most recent message seen
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    /// Consecutive server errors
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Apply a successful fetch and return the messages to emit
    ///
    /// A message is new when it is strictly newer than the cursor, or when
    /// there is no cursor yet. The cursor moves to the `created_at` of the
    /// last fetched message, in backend order. Resets the retry counter.
    /// Announcements at or before the new cursor are dropped, whether or not
    /// the backend returned them.
    pub fn apply_fetch(&mut self, messages: Vec<Message>) -> Vec<Message> {
        self.ticks += 1;
        self.retry_count = 0;
        self.last_success = Some(Utc::now());

        let cursor = self.cursor;
        let last = messages.last().map(|m| m.created_at);

        let fresh = messages
            .into_iter()
            .filter(|m| {
                let announced = self.announced.remove(&m.id).is_some();
                let newer = cursor.is_none_or(|c| m.created_at > c);
                newer && !announced
            })
            .collect();

        if let Some(last) = last {
            self.cursor = Some(last);
            self.announced.retain(|_, created_at| *created_at > last);
        }

        fresh
    }

    /// Apply a failed fetch
    pub fn record_failure(&mut self, error: &Error, max_retries: u32) -> FailureOutcome {
        self.ticks += 1;

        if !error.is_server_error() {
            return FailureOutcome::Ignored;
        }

        self.retry_count += 1;
        if self.retry_count >= max_retries {
            FailureOutcome::Exhausted(self.retry_count)
        } else {
            FailureOutcome::Counted(self.retry_count)
        }
    }

    /// Remember a message that was already emitted outside of polling
    ///
    /// Ignored when the cursor is already at or past the message: the cursor
    /// filters it on its own.
    pub fn announce(&mut self, message: &Message) {
        if self.cursor.is_some_and(|c| message.created_at <= c) {
            return;
        }
        self.announced.insert(message.id.clone(), message.created_at);
    }

    /// Number of announcements still waiting for a poll
    pub fn pending_announcements(&self) -> usize {
        self.announced.len()
    }

    /// Health snapshot for this session
    pub fn health(&self, key: &ConversationKey) -> SessionHealth {
        SessionHealth {
            key: key.clone(),
            cursor: self.cursor,
            retry_count: self.retry_count,
            ticks: self.ticks,
            last_success: self.last_success,
            started_at: self.started_at,
            pending_announcements: self.announced.len(),
        }
    }
}
