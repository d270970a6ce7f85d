//! Chat events and the listener registry
//!
//! Screens subscribe a callback to one of three channels and receive every
//! event on that channel in subscription order.

use crate::message::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Event channels a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A message appeared in a conversation
    NewMessage,
    /// A message was edited
    MessageEdited,
    /// A message was deleted
    MessageDeleted,
}

impl EventKind {
    /// Channel name as used by the portal screens
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewMessage => "newMessage",
            EventKind::MessageEdited => "messageEdited",
            EventKind::MessageDeleted => "messageDeleted",
        }
    }
}

/// An event delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// New message, either polled or confirmed after a send
    NewMessage(Message),
    /// Message after a confirmed edit
    MessageEdited(Message),
    /// ID of a message whose deletion was confirmed
    MessageDeleted(String),
}

impl ChatEvent {
    /// The channel this event is delivered on
    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::NewMessage(_) => EventKind::NewMessage,
            ChatEvent::MessageEdited(_) => EventKind::MessageEdited,
            ChatEvent::MessageDeleted(_) => EventKind::MessageDeleted,
        }
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback type for chat events
pub type EventHandler = Arc<dyn Fn(&ChatEvent) + Send + Sync>;

struct Listener {
    id: ListenerId,
    kind: EventKind,
    handler: EventHandler,
}

/// Registry of event listeners
///
/// Cloning shares the registry.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Listener>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a callback to a channel
    pub async fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.listeners.write().await;
        guard.push(Listener {
            id,
            kind,
            handler: Arc::new(handler),
        });
        debug!("Listener {:?} subscribed to {}", id, kind.as_str());
        id
    }

    /// Unsubscribe a callback
    ///
    /// Returns false if no such listener was registered on that channel.
    pub async fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut guard = self.listeners.write().await;
        let before = guard.len();
        guard.retain(|l| !(l.id == id && l.kind == kind));
        before > guard.len()
    }

    /// Number of listeners on a channel
    pub async fn listener_count(&self, kind: EventKind) -> usize {
        let guard = self.listeners.read().await;
        guard.iter().filter(|l| l.kind == kind).count()
    }

    /// Deliver an event to every listener on its channel
    ///
    /// Handlers are called after the registry lock is released, so a handler
    /// may subscribe or unsubscribe without deadlocking.
    pub async fn emit(&self, event: &ChatEvent) {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = {
            let guard = self.listeners.read().await;
            guard
                .iter()
                .filter(|l| l.kind == kind)
                .map(|l| l.handler.clone())
                .collect()
        };

        for handler in handlers {
            handler(event);
        }
    }
}
