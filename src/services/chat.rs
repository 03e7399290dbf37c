//! Turn-based assistant conversation
//!
//! Each accepted prompt gets a monotonic `RequestId`. Replies are released to
//! the transcript strictly in id order, so overlapping submissions always
//! read as `user, user, ..., reply, reply` in the order they were asked,
//! regardless of which request the network finished first.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::adapters::{AssistantClient, Credentials};
use crate::config::ChatConfig;
use crate::domain::{ChatMessage, RequestId};

/// Reply recorded for requests resolved by `cancel_all`
pub const CANCELLED_REPLY: &str = "Request cancelled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Idle,
    AwaitingResponse,
}

impl std::fmt::Display for ChatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatState::Idle => write!(f, "idle"),
            ChatState::AwaitingResponse => write!(f, "awaiting_response"),
        }
    }
}

/// One accepted submission
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub id: RequestId,
    pub prompt: String,
    /// User message to append immediately
    pub message: ChatMessage,
}

#[derive(Debug)]
enum Slot {
    InFlight,
    Ready(ChatMessage),
}

#[derive(Debug, Default)]
struct Book {
    last_id: u64,
    pending: BTreeMap<RequestId, Slot>,
}

impl Book {
    /// Pop every leading ready reply
    fn drain_ready(&mut self) -> Vec<ChatMessage> {
        let mut released = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if matches!(entry.get(), Slot::InFlight) {
                break;
            }
            if let Slot::Ready(message) = entry.remove() {
                released.push(message);
            }
        }
        released
    }
}

pub struct ChatSession {
    assistant: Arc<dyn AssistantClient>,
    fallback_reply: String,
    book: Mutex<Book>,
}

impl ChatSession {
    pub fn new(assistant: Arc<dyn AssistantClient>, config: &ChatConfig) -> Self {
        Self {
            assistant,
            fallback_reply: config.fallback_reply.clone(),
            book: Mutex::new(Book::default()),
        }
    }

    pub fn state(&self) -> ChatState {
        if self.lock().pending.is_empty() {
            ChatState::Idle
        } else {
            ChatState::AwaitingResponse
        }
    }

    /// Number of requests whose reply has not reached the transcript yet
    pub fn unresolved(&self) -> usize {
        self.lock().pending.len()
    }

    /// Accept a prompt. Blank input is ignored and returns `None`.
    pub fn begin(&self, text: &str) -> Option<ChatTurn> {
        if text.trim().is_empty() {
            debug!("Ignoring blank chat submission");
            return None;
        }

        let mut book = self.lock();
        book.last_id += 1;
        let id = RequestId(book.last_id);
        book.pending.insert(id, Slot::InFlight);

        info!(request = %id, in_flight = book.pending.len(), "Chat request accepted");
        Some(ChatTurn {
            id,
            prompt: text.to_string(),
            message: ChatMessage::user(id, text),
        })
    }

    /// Ask the assistant; failures turn into the fallback reply
    pub async fn ask(&self, credentials: &Credentials, turn: &ChatTurn) -> ChatMessage {
        match self.assistant.ask(credentials, &turn.prompt).await {
            Ok(answer) => ChatMessage::assistant(turn.id, answer),
            Err(e) => {
                warn!(request = %turn.id, kind = %e.kind(), "Assistant request failed: {}", e);
                ChatMessage::assistant(turn.id, self.fallback_reply.clone())
            }
        }
    }

    /// Record the reply for `id` and return the replies now ready for the
    /// transcript, in request order. A reply for a request that was already
    /// resolved (cancelled) is discarded.
    pub fn resolve(&self, id: RequestId, reply: ChatMessage) -> Vec<ChatMessage> {
        let mut book = self.lock();
        match book.pending.get_mut(&id) {
            Some(slot) if matches!(slot, Slot::InFlight) => *slot = Slot::Ready(reply),
            _ => {
                debug!(request = %id, "Discarding reply for resolved request");
                return Vec::new();
            }
        }

        let released = book.drain_ready();
        if released.len() > 1 {
            debug!(request = %id, released = released.len(), "Released held replies");
        }
        released
    }

    /// Resolve every in-flight request with a cancellation reply
    pub fn cancel_all(&self) -> Vec<ChatMessage> {
        let mut book = self.lock();
        let mut cancelled = 0usize;
        for (id, slot) in book.pending.iter_mut() {
            if matches!(slot, Slot::InFlight) {
                *slot = Slot::Ready(ChatMessage::assistant(*id, CANCELLED_REPLY));
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(cancelled, "Cancelled in-flight chat requests");
        }
        book.drain_ready()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
