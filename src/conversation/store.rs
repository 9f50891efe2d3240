//! # Conversation Store
//!
//! Owns every conversation record. Handlers and the audio pipeline only ever hold
//! snapshots returned by [`ConversationStore::get`] and mutate through the trait.
//!
//! ## Thread Safety:
//! The in-memory store keeps one `RwLock` around the whole map. Every operation
//! takes the lock exactly once, so each create/append/list is atomic with respect
//! to the others. Two requests appending to the same conversation can still
//! interleave *between* operations; that ordering race is accepted.

use crate::conversation::message::{Conversation, ConversationMessage, ConversationSummary};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// Storage seam for conversations.
///
/// Swapping the in-memory map for a persistent backend means implementing this
/// trait; nothing in the request pipeline depends on the concrete store.
pub trait ConversationStore: Send + Sync {
    /// Create a conversation seeded with one system message and return its id.
    ///
    /// `None` or blank `seed` falls back to the store's default instruction.
    fn create(&self, seed: Option<&str>) -> String;

    /// Snapshot of a conversation, or `None` for an unknown id.
    fn get(&self, conversation_id: &str) -> Option<Conversation>;

    /// Append a message. Returns `false`, mutating nothing, when the id is unknown.
    fn append(&self, conversation_id: &str, message: ConversationMessage) -> bool;

    /// Summaries of every stored conversation, oldest first.
    fn list_summaries(&self) -> Vec<ConversationSummary>;

    /// Number of stored conversations.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime store backed by a `HashMap`.
///
/// No eviction: conversations live until the process exits.
#[derive(Debug)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    default_seed: String,
}

impl InMemoryConversationStore {
    /// Create an empty store.
    ///
    /// ## Parameters:
    /// - **default_seed**: system instruction used when `create` gets no context
    pub fn new(default_seed: impl Into<String>) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            default_seed: default_seed.into(),
        }
    }
}

// A panic while holding the lock cannot leave a half-applied append behind (push is
// the last step), so a poisoned map is still consistent and safe to keep using.
impl ConversationStore for InMemoryConversationStore {
    fn create(&self, seed: Option<&str>) -> String {
        let seed = seed
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.default_seed);

        let conversation_id = Uuid::new_v4().to_string();
        let conversation = Conversation::seeded(conversation_id.clone(), seed);

        self.conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation_id.clone(), conversation);

        conversation_id
    }

    fn get(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned()
    }

    fn append(&self, conversation_id: &str, message: ConversationMessage) -> bool {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match conversations.get_mut(conversation_id) {
            Some(conversation) => {
                conversation.push(message);
                true
            }
            None => false,
        }
    }

    fn list_summaries(&self) -> Vec<ConversationSummary> {
        let conversations = self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut summaries: Vec<ConversationSummary> =
            conversations.values().map(Conversation::summary).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    fn len(&self) -> usize {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
