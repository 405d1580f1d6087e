use serde::{Deserialize, Serialize};

/// Messages sent to the backend over the conversation channel.
///
/// The `type` discriminator and field names follow the service's wire
/// contract; ordering within the channel is FIFO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "start_session")]
    StartSession { title: String, description: String },
    #[serde(rename = "user_message")]
    UserMessage { content: String },
    #[serde(rename = "voice_message")]
    VoiceMessage { content: String },
}

/// Messages received from the backend.
///
/// `speak` flags whether the response should be routed to speech playback in
/// addition to the chat display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "ai_response")]
    AiResponse { content: String, speak: bool },
    #[serde(rename = "webrtc_answer")]
    WebRtcAnswer { sdp: String },
}
