use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::capture::{CaptureController, CaptureEvent};
use crate::coordinator::config::{CoordinatorConfig, TurnPolicy};
use crate::coordinator::types::{ChatSender, ConversationCommand, ConversationUpdate, EndReason, VoiceState};
use crate::playback::{PlaybackController, PlaybackEvent};
use crate::session::media::{MediaStreamHandle, PeerLink};
use crate::session::SessionDescriptor;
use crate::telemetry::events::{record_session_closed, record_turn_roundtrip};
use crate::transport::{Channel, ChannelEvent, ClientMessage, ServerMessage};

use super::state::{ChatLog, ScheduleGeneration, VoiceStateCell};

const VOICE_ACTIVE_NOTICE: &str =
    "Voice conversation active. Start speaking after the AI finishes.";
const DISCONNECTED_NOTICE: &str = "Backend disconnected. Session ended.";
const CONNECTION_ERROR_NOTICE: &str = "Connection error. Please restart the backend.";
const CAMERA_DENIED_NOTICE: &str = "Camera access denied. Voice chat will still work.";
const VOICE_UNSUPPORTED_NOTICE: &str =
    "Voice recognition is not available. Text chat will still work.";
const INTERRUPTED_STATUS: &str = "Interrupted";

#[derive(Debug, Clone, Copy)]
pub(crate) enum TimerAction {
    AnnounceVoiceActive,
    StartListening(ListenTrigger),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ListenTrigger {
    InitialGreeting,
    Response,
    PlaybackFinished,
    SynthError,
    RecoverableError,
    CaptureEnded,
    StartRetry,
}

impl ListenTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            ListenTrigger::InitialGreeting => "initial_greeting",
            ListenTrigger::Response => "response",
            ListenTrigger::PlaybackFinished => "playback_finished",
            ListenTrigger::SynthError => "synth_error",
            ListenTrigger::RecoverableError => "recoverable_error",
            ListenTrigger::CaptureEnded => "capture_ended",
            ListenTrigger::StartRetry => "start_retry",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TimerEvent {
    generation: u64,
    action: TimerAction,
}

struct PendingTurn {
    index: u64,
    utterance_chars: usize,
    sent_at: Instant,
}

/// Single writer of `VoiceState` and the chat log. Every event source
/// (transport, capture, playback, commands, timers) funnels into one
/// `select!` loop, so handlers are atomic with respect to each other.
pub(crate) struct ConversationWorker {
    config: CoordinatorConfig,
    descriptor: SessionDescriptor,
    channel: Arc<dyn Channel>,
    capture: CaptureController,
    playback: PlaybackController,
    transport_rx: mpsc::Receiver<ChannelEvent>,
    capture_rx: mpsc::Receiver<CaptureEvent>,
    playback_rx: mpsc::Receiver<PlaybackEvent>,
    command_rx: mpsc::Receiver<ConversationCommand>,
    timer_tx: mpsc::Sender<TimerEvent>,
    timer_rx: mpsc::Receiver<TimerEvent>,
    updates_tx: mpsc::Sender<ConversationUpdate>,
    chat_log: Arc<ChatLog>,
    voice_state: Arc<VoiceStateCell>,
    schedule_generation: ScheduleGeneration,
    media: Option<MediaStreamHandle>,
    peer: Option<Arc<dyn PeerLink>>,
    camera_denied: bool,
    turn_index: u64,
    pending_turn: Option<PendingTurn>,
    ended: bool,
}

impl ConversationWorker {
    pub(crate) fn new(
        config: CoordinatorConfig,
        descriptor: SessionDescriptor,
        channel: Arc<dyn Channel>,
        capture: CaptureController,
        capture_rx: mpsc::Receiver<CaptureEvent>,
        playback: PlaybackController,
        playback_rx: mpsc::Receiver<PlaybackEvent>,
        transport_rx: mpsc::Receiver<ChannelEvent>,
        command_rx: mpsc::Receiver<ConversationCommand>,
        updates_tx: mpsc::Sender<ConversationUpdate>,
        chat_log: Arc<ChatLog>,
        voice_state: Arc<VoiceStateCell>,
        media: Option<MediaStreamHandle>,
        peer: Option<Arc<dyn PeerLink>>,
        camera_denied: bool,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel(config.buffer_capacity);
        Self {
            config,
            descriptor,
            channel,
            capture,
            playback,
            transport_rx,
            capture_rx,
            playback_rx,
            command_rx,
            timer_tx,
            timer_rx,
            updates_tx,
            chat_log,
            voice_state,
            schedule_generation: ScheduleGeneration::default(),
            media,
            peer,
            camera_denied,
            turn_index: 0,
            pending_turn: None,
            ended: false,
        }
    }

    pub(crate) async fn run(mut self) {
        self.begin_session().await;

        loop {
            tokio::select! {
                biased;

                maybe_command = self.command_rx.recv() => {
                    match maybe_command {
                        Some(command) => self.handle_command(command).await,
                        None => self.end_session(EndReason::UserRequested).await,
                    }
                }

                Some(timer) = self.timer_rx.recv() => {
                    self.handle_timer(timer).await;
                }

                maybe_event = self.transport_rx.recv() => {
                    // A dropped event stream is a close the channel never got
                    // to announce.
                    let event = maybe_event.unwrap_or(ChannelEvent::Closed);
                    self.handle_transport(event).await;
                }

                Some(event) = self.capture_rx.recv() => {
                    self.handle_capture(event).await;
                }

                Some(event) = self.playback_rx.recv() => {
                    self.handle_playback(event).await;
                }
            }

            if self.ended {
                break;
            }
        }

        info!(target: "turn_coordinator", "conversation worker stopped");
    }

    async fn begin_session(&mut self) {
        info!(
            target: "turn_coordinator",
            policy = self.config.policy.as_str(),
            title = %self.descriptor.title,
            "conversation starting"
        );

        if self.camera_denied {
            self.append_chat(ChatSender::System, CAMERA_DENIED_NOTICE).await;
        }
        if !self.capture.is_available() {
            self.append_chat(ChatSender::System, VOICE_UNSUPPORTED_NOTICE).await;
        }

        let message = ClientMessage::StartSession {
            title: self.descriptor.title.clone(),
            description: self.descriptor.description.clone(),
        };
        self.send_message(message).await;
        self.set_voice_state(VoiceState::AwaitingGreeting).await;
        self.schedule(self.config.greeting_notice_delay, TimerAction::AnnounceVoiceActive);
    }

    /// Spawn a cancellable timer. The callback carries the generation current
    /// at schedule time; a stale generation at fire time means the callback
    /// lost its slot and must do nothing.
    fn schedule(&self, delay: Duration, action: TimerAction) {
        let generation = self.schedule_generation.current();
        let timer_tx = self.timer_tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = timer_tx.send(TimerEvent { generation, action }).await;
        });
    }

    async fn handle_timer(&mut self, timer: TimerEvent) {
        match timer.action {
            TimerAction::AnnounceVoiceActive => {
                if self.ended {
                    return;
                }
                self.append_chat(ChatSender::System, VOICE_ACTIVE_NOTICE).await;
                self.schedule(
                    self.config.initial_listen_delay,
                    TimerAction::StartListening(ListenTrigger::InitialGreeting),
                );
            }
            TimerAction::StartListening(trigger) => {
                if !self.schedule_generation.is_current(timer.generation) {
                    debug!(
                        target: "turn_coordinator",
                        trigger = trigger.as_str(),
                        "ignoring stale listen timer"
                    );
                    return;
                }
                self.try_start_listening(trigger).await;
            }
        }
    }

    async fn handle_command(&mut self, command: ConversationCommand) {
        match command {
            ConversationCommand::SendChat(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return;
                }
                self.append_chat(ChatSender::User, trimmed).await;
                self.send_message(ClientMessage::UserMessage {
                    content: trimmed.to_string(),
                })
                .await;
            }
            ConversationCommand::Notice(text) => {
                self.append_chat(ChatSender::System, &text).await;
            }
            ConversationCommand::End => {
                self.end_session(EndReason::UserRequested).await;
            }
        }
    }

    async fn handle_transport(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(message) => self.handle_server_message(message).await,
            ChannelEvent::Closed => {
                self.append_chat(ChatSender::System, DISCONNECTED_NOTICE).await;
                self.end_session(EndReason::ConnectionClosed).await;
            }
            ChannelEvent::Failed(reason) => {
                warn!(target: "turn_coordinator", %reason, "transport failure");
                self.append_chat(ChatSender::System, CONNECTION_ERROR_NOTICE).await;
                self.end_session(EndReason::ConnectionError(reason)).await;
            }
        }
    }

    async fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::AiResponse { content, speak } => {
                self.append_chat(ChatSender::Ai, &content).await;
                self.finish_turn(&content, speak);

                if speak {
                    self.set_voice_state(VoiceState::Speaking).await;
                    if self.config.policy == TurnPolicy::TurnTaking {
                        self.capture.stop().await;
                    }
                    self.playback.speak(&content).await;
                } else {
                    self.try_start_listening(ListenTrigger::Response).await;
                }
            }
            ServerMessage::WebRtcAnswer { sdp } => match &self.peer {
                Some(peer) => {
                    if let Err(err) = peer.apply_answer(&sdp).await {
                        warn!(target: "turn_coordinator", %err, "peer link rejected answer");
                    }
                }
                None => {
                    debug!(target: "turn_coordinator", "no peer link attached, dropping answer");
                }
            },
        }
    }

    async fn handle_capture(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Utterance(text) => self.handle_utterance(text).await,
            CaptureEvent::RecognitionError(code) => {
                self.emit_status(format!("Recognition error: {}", code.as_str())).await;
                if code.is_recoverable() {
                    debug!(
                        target: "turn_coordinator",
                        code = code.as_str(),
                        "recoverable recognition error, scheduling restart"
                    );
                    self.schedule(
                        self.config.capture_restart_backoff,
                        TimerAction::StartListening(ListenTrigger::RecoverableError),
                    );
                } else {
                    warn!(
                        target: "turn_coordinator",
                        code = code.as_str(),
                        "unrecoverable recognition error"
                    );
                    self.set_voice_state(VoiceState::Error(code.as_str().to_string())).await;
                }
            }
            CaptureEvent::StartFailed => {
                self.emit_status("Failed to start listening").await;
                self.schedule(
                    self.config.capture_restart_backoff,
                    TimerAction::StartListening(ListenTrigger::StartRetry),
                );
            }
            CaptureEvent::Ended => {
                if matches!(self.voice_state.get(), VoiceState::Listening) {
                    self.set_voice_state(VoiceState::Idle).await;
                }
                self.emit_status("Stopped").await;

                let resume = match self.config.policy {
                    TurnPolicy::BargeIn => true,
                    TurnPolicy::TurnTaking => !self.playback.is_speaking(),
                };
                if resume {
                    self.schedule(
                        self.config.capture_idle_restart_delay,
                        TimerAction::StartListening(ListenTrigger::CaptureEnded),
                    );
                } else {
                    debug!(
                        target: "turn_coordinator",
                        "capture ended during playback, completion will resume listening"
                    );
                }
            }
        }
    }

    async fn handle_utterance(&mut self, text: String) {
        if self.playback.is_speaking() {
            match self.config.policy {
                TurnPolicy::TurnTaking => {
                    debug!(
                        target: "turn_coordinator",
                        chars = text.chars().count(),
                        "dropping utterance captured during playback"
                    );
                    return;
                }
                TurnPolicy::BargeIn => {
                    info!(target: "turn_coordinator", "user interrupted playback");
                    self.playback.cancel().await;
                    self.emit_status(INTERRUPTED_STATUS).await;
                }
            }
        }

        self.set_voice_state(VoiceState::Processing).await;
        self.append_chat(ChatSender::User, &text).await;
        self.send_message(ClientMessage::VoiceMessage {
            content: text.clone(),
        })
        .await;

        self.turn_index += 1;
        self.pending_turn = Some(PendingTurn {
            index: self.turn_index,
            utterance_chars: text.chars().count(),
            sent_at: Instant::now(),
        });
    }

    async fn handle_playback(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Started => {
                self.set_voice_state(VoiceState::Speaking).await;
            }
            PlaybackEvent::Finished => {
                if matches!(self.voice_state.get(), VoiceState::Speaking) {
                    self.set_voice_state(VoiceState::Idle).await;
                }
                self.emit_status("AI Finished").await;
                match self.config.policy {
                    TurnPolicy::TurnTaking => self.schedule(
                        self.config.resume_listen_grace,
                        TimerAction::StartListening(ListenTrigger::PlaybackFinished),
                    ),
                    TurnPolicy::BargeIn => {
                        self.try_start_listening(ListenTrigger::PlaybackFinished).await;
                    }
                }
            }
            PlaybackEvent::Error(reason) => {
                warn!(target: "turn_coordinator", %reason, "playback error");
                if matches!(self.voice_state.get(), VoiceState::Speaking) {
                    self.set_voice_state(VoiceState::Idle).await;
                }
                self.emit_status("Speech error").await;
                self.schedule(
                    self.config.synth_error_resume_delay,
                    TimerAction::StartListening(ListenTrigger::SynthError),
                );
            }
        }
    }

    async fn try_start_listening(&mut self, trigger: ListenTrigger) {
        if self.ended {
            return;
        }
        if !self.capture.is_available() {
            debug!(
                target: "turn_coordinator",
                trigger = trigger.as_str(),
                "capture unavailable, staying chat-only"
            );
            self.set_voice_state(VoiceState::Idle).await;
            return;
        }
        if self.capture.is_listening() {
            // Barge-in keeps capture live through playback; only the state
            // needs to move back.
            self.set_voice_state(VoiceState::Listening).await;
            return;
        }
        if self.config.policy == TurnPolicy::TurnTaking && self.playback.is_speaking() {
            debug!(
                target: "turn_coordinator",
                trigger = trigger.as_str(),
                "deferring listen start until playback completes"
            );
            return;
        }

        // Claim the restart slot; any other pending listen timer is now stale.
        self.schedule_generation.advance();
        debug!(target: "turn_coordinator", trigger = trigger.as_str(), "starting capture");
        self.capture.start().await;
        if self.capture.is_listening() {
            self.set_voice_state(VoiceState::Listening).await;
        }
    }

    fn finish_turn(&mut self, response: &str, spoken: bool) {
        if let Some(turn) = self.pending_turn.take() {
            record_turn_roundtrip(
                turn.index,
                turn.utterance_chars,
                response.chars().count(),
                spoken,
                turn.sent_at.elapsed(),
            );
        }
    }

    async fn end_session(&mut self, reason: EndReason) {
        if self.ended {
            return;
        }
        self.ended = true;

        info!(target: "turn_coordinator", reason = reason.as_str(), "ending session");
        self.schedule_generation.advance();
        self.capture.stop().await;
        self.playback.cancel().await;
        self.channel.close().await;
        if let Some(media) = self.media.take() {
            media.release().await;
        }

        record_session_closed(reason.as_str(), self.turn_index, self.chat_log.len());
        self.set_voice_state(VoiceState::Ended).await;
        self.chat_log.clear();
        self.push_update(ConversationUpdate::Ended(reason)).await;
    }

    async fn send_message(&self, message: ClientMessage) {
        if let Err(err) = self.channel.send(message).await {
            warn!(target: "turn_coordinator", %err, "failed to send message to backend");
        }
    }

    async fn append_chat(&self, sender: ChatSender, content: &str) {
        let entry = self.chat_log.append(sender, content);
        self.push_update(ConversationUpdate::Chat(entry)).await;
    }

    async fn emit_status(&self, status: impl Into<String>) {
        self.push_update(ConversationUpdate::Status(status.into())).await;
    }

    async fn set_voice_state(&self, next: VoiceState) {
        let previous = self.voice_state.replace(next.clone());
        if previous == next {
            return;
        }
        debug!(
            target: "turn_coordinator",
            from = previous.as_str(),
            to = next.as_str(),
            "voice state changed"
        );
        self.push_update(ConversationUpdate::Voice(next.clone())).await;
        self.push_update(ConversationUpdate::Status(next.status_line())).await;
    }

    async fn push_update(&self, update: ConversationUpdate) {
        if self.updates_tx.send(update).await.is_err() {
            debug!(target: "turn_coordinator", "update receiver dropped");
        }
    }
}
