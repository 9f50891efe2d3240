//! # Conversation Data Types
//!
//! The records the store owns and the projections handed to other components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
///
/// Serialized lower-case (`"system"`, `"user"`, `"assistant"`), which is also the
/// wire format chat-completion APIs expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Seed instruction establishing the assistant's behavior
    System,
    /// Transcribed speech from the caller
    User,
    /// Generated reply
    Assistant,
}

/// A single stored turn. Never modified after it has been appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    /// Build a message stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// An ordered, append-only sequence of messages.
///
/// ## Invariants:
/// - `messages` always starts with exactly one `system` message
/// - messages are in append order, which is also timestamp order
/// - `last_updated_at` >= `created_at` and >= the last message's timestamp
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ConversationMessage>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Start a conversation seeded with one system instruction.
    pub fn seeded(id: String, system_content: impl Into<String>) -> Self {
        let seed = ConversationMessage::system(system_content);
        let now = seed.timestamp;
        Self {
            id,
            messages: vec![seed],
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Append a message and refresh `last_updated_at`.
    pub fn push(&mut self, message: ConversationMessage) {
        let now = Utc::now().max(message.timestamp).max(self.last_updated_at);
        self.messages.push(message);
        self.last_updated_at = now;
    }

    /// Project every message to the `{role, content}` pairs a dialogue model consumes.
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(ChatMessage::from).collect()
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            messages_count: self.messages.len(),
            created_at: self.created_at,
            last_updated_at: self.last_updated_at,
        }
    }
}

/// Role and content only; what the dialogue collaborator sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ConversationMessage> for ChatMessage {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Listing projection used by the debug endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub messages_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn test_seeded_conversation() {
        let conversation = Conversation::seeded("abc".to_string(), "Be a tutor");
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::System);
        assert_eq!(conversation.messages[0].content, "Be a tutor");
        assert_eq!(conversation.created_at, conversation.last_updated_at);
    }

    #[test]
    fn test_push_advances_last_updated() {
        let mut conversation = Conversation::seeded("abc".to_string(), "Be a tutor");
        let message = ConversationMessage::user("hi");
        let stamped = message.timestamp;
        conversation.push(message);

        assert_eq!(conversation.messages.len(), 2);
        assert!(conversation.last_updated_at >= conversation.created_at);
        assert!(conversation.last_updated_at >= stamped);
    }

    #[test]
    fn test_chat_history_keeps_order_and_seed() {
        let mut conversation = Conversation::seeded("abc".to_string(), "Be a tutor");
        conversation.push(ConversationMessage::user("hi"));
        conversation.push(ConversationMessage::assistant("hello there"));

        let history = conversation.chat_history();
        assert_eq!(
            history,
            vec![
                ChatMessage::new(Role::System, "Be a tutor"),
                ChatMessage::new(Role::User, "hi"),
                ChatMessage::new(Role::Assistant, "hello there"),
            ]
        );
    }

    #[test]
    fn test_summary_wire_names() {
        let conversation = Conversation::seeded("abc".to_string(), "Be a tutor");
        let json = serde_json::to_value(conversation.summary()).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["messagesCount"], 1);
        assert!(json["createdAt"].is_string());
        assert!(json["lastUpdatedAt"].is_string());
    }
}
