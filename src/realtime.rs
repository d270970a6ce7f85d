//! Real-time chat over polling
//!
//! [`ChatPollingService`] keeps one background task per open conversation.
//! Each task fetches the conversation on a fixed interval, emits
//! [`ChatEvent::NewMessage`] for messages newer than its cursor and stops
//! itself after too many consecutive server errors. Send, edit and delete go
//! straight to the backend and emit once the backend confirms.

use crate::{
    config::ChatConfig,
    events::{ChatEvent, EventBus, EventKind, ListenerId},
    message::{ConversationKey, Message},
    session::{FailureOutcome, SessionHealth, SessionState, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL_MS},
    transport::{HttpBackend, MessagingBackend, SendMessageRequest},
    Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A live polling session
pub(crate) struct Session {
    /// Distinguishes this session from earlier ones with the same key
    generation: u64,
    state: SessionState,
    task: JoinHandle<()>,
}

pub(crate) type SessionMap = Arc<Mutex<HashMap<ConversationKey, Session>>>;

/// Everything a polling task needs, moved into the task
struct PollTask {
    key: ConversationKey,
    generation: u64,
    participant_a: String,
    participant_b: String,
    period: Duration,
    max_retries: u32,
    backend: Arc<dyn MessagingBackend>,
    events: EventBus,
    sessions: SessionMap,
}

/// Polling-based real-time chat service
///
/// Construct one per process and share it (e.g., behind an `Arc`) with the
/// screens that need it. Dropping the service stops every polling task.
///
/// # Example
/// ```rust,no_run
/// use campus_chat::{ChatConfig, ChatEvent, ChatPollingService, EventKind};
///
/// # async fn example() -> campus_chat::Result<()> {
/// let service = ChatPollingService::from_config(&ChatConfig::default())?;
///
/// service
///     .on(EventKind::NewMessage, |event| {
///         if let ChatEvent::NewMessage(msg) = event {
///             println!("{}: {}", msg.sender_id, msg.text);
///         }
///     })
///     .await;
///
/// let key = service.start_polling("student_1", "teacher_7").await;
///
/// service.send_message("student_1", "teacher_7", "Hello!", None).await?;
///
/// if let Some(key) = key {
///     service.stop_polling(&key).await;
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatPollingService {
    backend: Arc<dyn MessagingBackend>,
    events: EventBus,
    sessions: SessionMap,
    next_generation: AtomicU64,
    default_interval: Duration,
    max_retries: u32,
    /// Parent of every task's cancel token, reachable without the session lock
    shutdown: CancellationToken,
}

impl ChatPollingService {
    /// Create a service over the given backend with default settings
    pub fn new(backend: Arc<dyn MessagingBackend>) -> Self {
        Self {
            backend,
            events: EventBus::new(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            default_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a service talking HTTP to the configured backend
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        config.validate()?;
        let backend = HttpBackend::from_config(config)?;

        Ok(Self::new(Arc::new(backend))
            .with_default_interval(Duration::from_millis(config.poll_interval_ms))
            .with_max_retries(config.max_retries))
    }

    /// Interval used by [`start_polling`](Self::start_polling)
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    /// Consecutive server errors tolerated before a session stops itself
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The listener registry
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe a callback to an event channel
    pub async fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler).await
    }

    /// Unsubscribe a callback
    pub async fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.events.off(kind, id).await
    }

    /// Start polling a conversation at the default interval
    ///
    /// See [`start_polling_every`](Self::start_polling_every).
    pub async fn start_polling(
        &self,
        participant_a: &str,
        participant_b: &str,
    ) -> Option<ConversationKey> {
        self.start_polling_every(participant_a, participant_b, self.default_interval)
            .await
    }

    /// Start polling a conversation
    ///
    /// Replaces any session already polling the same conversation. The first
    /// fetch happens one interval after the call.
    ///
    /// # Returns
    /// * `Some(key)` - Session started
    /// * `None` - A participant id was empty or the interval was zero (logged)
    pub async fn start_polling_every(
        &self,
        participant_a: &str,
        participant_b: &str,
        interval: Duration,
    ) -> Option<ConversationKey> {
        let participant_a = participant_a.trim();
        let participant_b = participant_b.trim();

        if participant_a.is_empty() || participant_b.is_empty() {
            warn!(
                "Cannot start polling: missing participant (a: '{}', b: '{}')",
                participant_a, participant_b
            );
            return None;
        }
        if interval.is_zero() {
            warn!("Cannot start polling {} <-> {}: zero interval", participant_a, participant_b);
            return None;
        }

        let key = ConversationKey::new(participant_a, participant_b);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut sessions = self.sessions.lock().await;

        if let Some(previous) = sessions.remove(&key) {
            debug!("Restarting polling for {}", key);
            previous.task.abort();
        }

        let poll = poll_loop(PollTask {
            key: key.clone(),
            generation,
            participant_a: participant_a.to_string(),
            participant_b: participant_b.to_string(),
            period: interval,
            max_retries: self.max_retries,
            backend: self.backend.clone(),
            events: self.events.clone(),
            sessions: self.sessions.clone(),
        });
        let cancel = self.shutdown.child_token();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Polling {} cancelled by shutdown", task_key);
                }
                _ = poll => {}
            }
        });

        sessions.insert(
            key.clone(),
            Session {
                generation,
                state: SessionState::new(),
                task,
            },
        );

        info!("Started polling {} every {}ms", key, interval.as_millis());
        Some(key)
    }

    /// Stop polling one conversation
    ///
    /// Returns false if no session was active for the key.
    pub async fn stop_polling(&self, key: &ConversationKey) -> bool {
        let removed = self.sessions.lock().await.remove(key);

        match removed {
            Some(session) => {
                session.task.abort();
                info!("Stopped polling {}", key);
                true
            }
            None => false,
        }
    }

    /// Stop every polling session
    ///
    /// Returns the number of sessions stopped.
    pub async fn stop_all_polling(&self) -> usize {
        let drained: Vec<(ConversationKey, Session)> =
            self.sessions.lock().await.drain().collect();

        for (_, session) in &drained {
            session.task.abort();
        }

        if !drained.is_empty() {
            info!("Stopped {} polling sessions", drained.len());
        }
        drained.len()
    }

    /// Whether a session is active for the key
    pub async fn is_polling(&self, key: &ConversationKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }

    /// Keys of all active sessions, sorted
    pub async fn active_sessions(&self) -> Vec<ConversationKey> {
        let mut keys: Vec<ConversationKey> = self.sessions.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Health of an active session
    pub async fn session_health(&self, key: &ConversationKey) -> Option<SessionHealth> {
        let sessions = self.sessions.lock().await;
        sessions.get(key).map(|s| s.state.health(key))
    }

    /// Shared session registry
    #[cfg(test)]
    pub(crate) fn session_map(&self) -> SessionMap {
        self.sessions.clone()
    }

    /// Always true; polling has no connection to lose
    ///
    /// Use [`session_health`](Self::session_health) for the actual state of a
    /// conversation.
    pub fn is_connected(&self) -> bool {
        true
    }

    /// Send a message
    ///
    /// Emits [`ChatEvent::NewMessage`] with the backend-confirmed message once
    /// the request succeeds, and returns that message. On failure nothing is
    /// emitted and the error is returned. The text is sent as given.
    pub async fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
        replied_to: Option<&str>,
    ) -> Result<Message> {
        let request = SendMessageRequest {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text: text.to_string(),
            replied_to: replied_to.map(str::to_string),
        };

        let message = self.backend.send_message(&request).await?;

        // The next poll will fetch this message too; make sure it is not emitted twice
        let key = ConversationKey::new(sender_id, receiver_id);
        if let Some(session) = self.sessions.lock().await.get_mut(&key) {
            session.state.announce(&message);
        }

        self.events.emit(&ChatEvent::NewMessage(message.clone())).await;
        Ok(message)
    }

    /// Edit a message and emit [`ChatEvent::MessageEdited`] on success
    pub async fn edit_message(&self, message_id: &str, user_id: &str, text: &str) -> Result<Message> {
        let message = self.backend.edit_message(message_id, user_id, text).await?;
        self.events.emit(&ChatEvent::MessageEdited(message.clone())).await;
        Ok(message)
    }

    /// Delete a message and emit [`ChatEvent::MessageDeleted`] on success
    pub async fn delete_message(&self, message_id: &str, user_id: &str) -> Result<()> {
        self.backend.delete_message(message_id, user_id).await?;
        self.events
            .emit(&ChatEvent::MessageDeleted(message_id.to_string()))
            .await;
        Ok(())
    }
}

impl Drop for ChatPollingService {
    fn drop(&mut self) {
        // Ends every task even while a poll or caller holds the session lock
        self.shutdown.cancel();

        if let Ok(mut sessions) = self.sessions.try_lock() {
            for (_, session) in sessions.drain() {
                session.task.abort();
            }
        }
    }
}

/// Body of a polling task
///
/// Runs until aborted by a stop, or until the retry budget is exhausted.
async fn poll_loop(task: PollTask) {
    let mut ticker = tokio::time::interval_at(Instant::now() + task.period, task.period);
    // A slow fetch delays the next tick instead of bunching ticks up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let result = task
            .backend
            .fetch_conversation(&task.participant_a, &task.participant_b)
            .await;

        let fresh = {
            let mut sessions = task.sessions.lock().await;

            let Some(session) = sessions
                .get_mut(&task.key)
                .filter(|s| s.generation == task.generation)
            else {
                debug!("Discarding poll result for stopped session {}", task.key);
                return;
            };

            match result {
                Ok(messages) => session.state.apply_fetch(messages),
                Err(e) => match session.state.record_failure(&e, task.max_retries) {
                    FailureOutcome::Ignored => {
                        debug!("Poll for {} failed: {}", task.key, e);
                        Vec::new()
                    }
                    FailureOutcome::Counted(count) => {
                        warn!(
                            "Poll for {} hit server error ({}/{}): {}",
                            task.key, count, task.max_retries, e
                        );
                        Vec::new()
                    }
                    FailureOutcome::Exhausted(count) => {
                        warn!(
                            "Stopping polling {} after {} consecutive server errors: {}",
                            task.key, count, e
                        );
                        sessions.remove(&task.key);
                        return;
                    }
                },
            }
        };

        if !fresh.is_empty() {
            debug!("{} new messages in {}", fresh.len(), task.key);
        }

        for message in fresh {
            task.events.emit(&ChatEvent::NewMessage(message)).await;
        }
    }
}
