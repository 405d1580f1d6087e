/// Who authored a chat entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSender {
    User,
    Ai,
    System,
}

impl ChatSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatSender::User => "user",
            ChatSender::Ai => "ai",
            ChatSender::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub sender: ChatSender,
    pub content: String,
}

impl ChatEntry {
    pub fn new(sender: ChatSender, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
        }
    }
}

/// Conversation phase. Written exclusively by the coordinator worker; every
/// other component only reports raw events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    /// Session opened, waiting for the AI greeting to arrive and play.
    AwaitingGreeting,
    Listening,
    /// An utterance was forwarded; waiting for the AI response.
    Processing,
    Speaking,
    Error(String),
    Ended,
}

impl VoiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceState::Idle => "idle",
            VoiceState::AwaitingGreeting => "awaiting_greeting",
            VoiceState::Listening => "listening",
            VoiceState::Processing => "processing",
            VoiceState::Speaking => "speaking",
            VoiceState::Error(_) => "error",
            VoiceState::Ended => "ended",
        }
    }

    /// Status line shown by the display collaborator.
    pub fn status_line(&self) -> String {
        match self {
            VoiceState::Idle => "Idle".to_string(),
            VoiceState::AwaitingGreeting => "Connecting...".to_string(),
            VoiceState::Listening => "Listening...".to_string(),
            VoiceState::Processing => "Processing...".to_string(),
            VoiceState::Speaking => "AI Speaking...".to_string(),
            VoiceState::Error(reason) => format!("Error: {reason}"),
            VoiceState::Ended => "Session ended".to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VoiceState::Ended)
    }
}

/// Why a conversation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    UserRequested,
    ConnectionClosed,
    ConnectionError(String),
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::UserRequested => "user_requested",
            EndReason::ConnectionClosed => "connection_closed",
            EndReason::ConnectionError(_) => "connection_error",
        }
    }
}

/// Commands accepted by a running conversation.
#[derive(Debug, Clone)]
pub enum ConversationCommand {
    /// Forward a typed chat message. Empty input after trimming is ignored.
    SendChat(String),
    /// Append a system chat entry without touching the backend.
    Notice(String),
    End,
}

/// Updates pushed to the display collaborator, in occurrence order.
#[derive(Debug, Clone)]
pub enum ConversationUpdate {
    Chat(ChatEntry),
    Status(String),
    Voice(VoiceState),
    Ended(EndReason),
}
