//! Speech capture controller wrapping a continuous recognizer.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const RECOGNIZER_EVENT_BUFFER: usize = 32;

/// One fragment of a recognition result batch.
#[derive(Debug, Clone)]
pub struct TranscriptFragment {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptFragment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn finalized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Raw events pushed by a recognizer session.
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// One result batch; fragments arrive in recognizer order.
    Result(Vec<TranscriptFragment>),
    Error(RecognitionErrorCode),
    /// The recognition session terminated on its own. Continuous sessions
    /// still end periodically; the coordinator decides whether to restart.
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorCode {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Network,
    Other(String),
}

impl RecognitionErrorCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" => Self::NotAllowed,
            "network" => Self::Network,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::AudioCapture => "audio-capture",
            Self::NotAllowed => "not-allowed",
            Self::Network => "network",
            Self::Other(code) => code,
        }
    }

    /// Whether the coordinator may schedule an automatic restart.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::AudioCapture)
    }
}

/// Continuous speech recognition collaborator.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Begin one recognition session. The recognizer pushes events into
    /// `events` until the session ends or `stop` is called.
    async fn start(&self, events: mpsc::Sender<RecognitionEvent>) -> Result<()>;

    async fn stop(&self);

    /// Deployments without a recognition backend report `false` and the
    /// session degrades to chat-only.
    fn is_available(&self) -> bool {
        true
    }
}

/// Events the controller forwards to the coordinator.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A finalized, trimmed, non-empty utterance.
    Utterance(String),
    RecognitionError(RecognitionErrorCode),
    /// The recognizer refused to start; recoverable via scheduled retry.
    StartFailed,
    Ended,
}

/// Owns the Stopped/Listening state and filters recognizer output down to the
/// events the coordinator acts on. Events from a superseded recognition
/// session are dropped via a session counter rather than timing.
pub struct CaptureController {
    recognizer: Arc<dyn SpeechRecognizer>,
    events_tx: mpsc::Sender<CaptureEvent>,
    listening: Arc<AtomicBool>,
    session_counter: Arc<AtomicU64>,
}

impl CaptureController {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<CaptureEvent>) {
        let (events_tx, events_rx) = mpsc::channel(buffer);
        (
            Self {
                recognizer,
                events_tx,
                listening: Arc::new(AtomicBool::new(false)),
                session_counter: Arc::new(AtomicU64::new(0)),
            },
            events_rx,
        )
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_available()
    }

    /// Start a recognition session. No-op while already listening.
    pub async fn start(&self) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let session = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let (raw_tx, raw_rx) = mpsc::channel(RECOGNIZER_EVENT_BUFFER);

        if let Err(err) = self.recognizer.start(raw_tx).await {
            self.listening.store(false, Ordering::SeqCst);
            warn!(target: "voice_capture", %err, "recognizer failed to start");
            let _ = self.events_tx.send(CaptureEvent::StartFailed).await;
            return;
        }

        self.spawn_pump(session, raw_rx);
    }

    /// Stop the active session. No-op while already stopped. Anything the old
    /// session still emits afterwards is discarded.
    pub async fn stop(&self) {
        if !self.listening.swap(false, Ordering::SeqCst) {
            return;
        }
        self.session_counter.fetch_add(1, Ordering::SeqCst);
        self.recognizer.stop().await;
    }

    fn spawn_pump(&self, session: u64, mut raw_rx: mpsc::Receiver<RecognitionEvent>) {
        let events_tx = self.events_tx.clone();
        let listening = Arc::clone(&self.listening);
        let session_counter = Arc::clone(&self.session_counter);

        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                if session_counter.load(Ordering::SeqCst) != session {
                    debug!(
                        target: "voice_capture",
                        session,
                        "dropping event from superseded recognition session"
                    );
                    break;
                }

                match event {
                    RecognitionEvent::Result(fragments) => {
                        if let Some(utterance) = finalize_batch(&fragments) {
                            if events_tx
                                .send(CaptureEvent::Utterance(utterance))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                    RecognitionEvent::Error(code) => {
                        if events_tx
                            .send(CaptureEvent::RecognitionError(code))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    RecognitionEvent::Ended => {
                        listening.store(false, Ordering::SeqCst);
                        let _ = events_tx.send(CaptureEvent::Ended).await;
                        break;
                    }
                }
            }
        });
    }
}

/// Concatenate the final fragments of one result batch, then trim. Batches
/// with nothing final, or only whitespace, produce no utterance.
fn finalize_batch(fragments: &[TranscriptFragment]) -> Option<String> {
    let mut combined = String::new();
    for fragment in fragments {
        if fragment.is_final {
            combined.push_str(&fragment.text);
        }
    }

    let trimmed = combined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Stands in when the deployment has no speech recognition backend; `start`
/// always fails and availability reports false, so the coordinator keeps the
/// session alive as chat-only.
#[derive(Debug, Default)]
pub struct UnsupportedRecognizer;

#[async_trait]
impl SpeechRecognizer for UnsupportedRecognizer {
    async fn start(&self, _events: mpsc::Sender<RecognitionEvent>) -> Result<()> {
        Err(anyhow::anyhow!("speech recognition is not available"))
    }

    async fn stop(&self) {}

    fn is_available(&self) -> bool {
        false
    }
}
