//! Storage module for persistent data storage
//!
//! SQLite-backed conversation log, user feedback and document registry.

mod database;

pub use database::{Analytics, ConversationDb, ConversationEntry, ConversationLog};
