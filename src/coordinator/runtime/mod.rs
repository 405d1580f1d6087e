mod handle;
mod state;
mod worker;

pub use handle::ConversationHandle;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::capture::{CaptureController, SpeechRecognizer};
use crate::coordinator::config::CoordinatorConfig;
use crate::coordinator::types::{ConversationUpdate, VoiceState};
use crate::playback::{PlaybackController, SpeechSynthesizer};
use crate::session::media::{MediaStreamHandle, PeerLink};
use crate::session::SessionDescriptor;
use crate::transport::{Channel, ChannelEvent};

use self::state::{ChatLog, VoiceStateCell};
use self::worker::ConversationWorker;

/// Everything a conversation needs beyond its configuration.
pub(crate) struct ConversationParts {
    pub(crate) channel: Arc<dyn Channel>,
    pub(crate) transport_rx: mpsc::Receiver<ChannelEvent>,
    pub(crate) recognizer: Arc<dyn SpeechRecognizer>,
    pub(crate) synthesizer: Arc<dyn SpeechSynthesizer>,
    pub(crate) media: Option<MediaStreamHandle>,
    pub(crate) peer: Option<Arc<dyn PeerLink>>,
    pub(crate) camera_denied: bool,
}

pub(crate) fn spawn_conversation(
    config: CoordinatorConfig,
    descriptor: SessionDescriptor,
    parts: ConversationParts,
) -> (ConversationHandle, mpsc::Receiver<ConversationUpdate>) {
    let (updates_tx, updates_rx) = mpsc::channel(config.buffer_capacity);
    let (command_tx, command_rx) = mpsc::channel(config.buffer_capacity);
    let (capture, capture_rx) = CaptureController::new(parts.recognizer, config.buffer_capacity);
    let (playback, playback_rx) =
        PlaybackController::new(parts.synthesizer, config.buffer_capacity);
    let chat_log = Arc::new(ChatLog::default());
    let voice_state = Arc::new(VoiceStateCell::new(VoiceState::Idle));

    let worker = ConversationWorker::new(
        config,
        descriptor,
        parts.channel,
        capture,
        capture_rx,
        playback,
        playback_rx,
        parts.transport_rx,
        command_rx,
        updates_tx,
        Arc::clone(&chat_log),
        Arc::clone(&voice_state),
        parts.media,
        parts.peer,
        parts.camera_denied,
    );
    let join = tokio::spawn(worker.run());
    let handle = ConversationHandle::new(command_tx, chat_log, voice_state, join);

    (handle, updates_rx)
}
