//! 对话轮次协调状态机。

mod constants;
mod runtime;

pub mod config;
pub mod types;

pub use config::{CoordinatorConfig, TurnPolicy};
pub use runtime::ConversationHandle;
pub(crate) use runtime::{spawn_conversation, ConversationParts};
pub use types::{
    ChatEntry, ChatSender, ConversationCommand, ConversationUpdate, EndReason, VoiceState,
};

#[cfg(test)]
mod tests;
