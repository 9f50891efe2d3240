//! # Conversation Module
//!
//! Multi-turn conversation state: the message types and the store that owns every
//! conversation for the lifetime of the process.
//!
//! ## Key Components:
//! - **Messages**: role-tagged, timestamped turns (`system`, `user`, `assistant`)
//! - **Store**: the `ConversationStore` trait and its in-memory implementation
//!
//! Conversations are never evicted; memory grows with the number of conversations
//! started since the process came up.

pub mod message;
pub mod store;

pub use message::{ChatMessage, Conversation, ConversationMessage, ConversationSummary, Role};
pub use store::{ConversationStore, InMemoryConversationStore};
