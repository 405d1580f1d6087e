//! Speech playback controller wrapping a text-to-speech collaborator.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const SYNTHESIS_EVENT_BUFFER: usize = 8;

/// Progress events pushed by the synthesizer for one utterance.
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    Started,
    Finished,
    Error(String),
}

/// Text-to-speech collaborator.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one utterance, pushing progress into `events`. A later call
    /// to `cancel` must stop the utterance promptly.
    async fn speak(&self, text: &str, events: mpsc::Sender<SynthesisEvent>) -> Result<()>;

    async fn cancel(&self);
}

/// Events the controller forwards to the coordinator. `Finished` is delivered
/// at most once per `speak` call; a superseded utterance never reports.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    Started,
    Finished,
    Error(String),
}

/// Owns the Idle/Speaking state. At most one utterance is active: `speak`
/// supersedes and cancels any utterance still in flight instead of queueing.
pub struct PlaybackController {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    events_tx: mpsc::Sender<PlaybackEvent>,
    speaking: Arc<AtomicBool>,
    utterance_counter: Arc<AtomicU64>,
}

impl PlaybackController {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<PlaybackEvent>) {
        let (events_tx, events_rx) = mpsc::channel(buffer);
        (
            Self {
                synthesizer,
                events_tx,
                speaking: Arc::new(AtomicBool::new(false)),
                utterance_counter: Arc::new(AtomicU64::new(0)),
            },
            events_rx,
        )
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Begin speaking `text`, cancelling any in-progress utterance first. The
    /// supersession happens before the cancel so the old utterance's terminal
    /// event can never leak through.
    pub async fn speak(&self, text: &str) {
        let utterance = self.utterance_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if self.speaking.swap(true, Ordering::SeqCst) {
            self.synthesizer.cancel().await;
        }

        let (raw_tx, raw_rx) = mpsc::channel(SYNTHESIS_EVENT_BUFFER);
        self.spawn_pump(utterance, raw_rx);

        let synthesizer = Arc::clone(&self.synthesizer);
        let speaking = Arc::clone(&self.speaking);
        let utterance_counter = Arc::clone(&self.utterance_counter);
        let events_tx = self.events_tx.clone();
        let text = text.to_string();

        tokio::spawn(async move {
            if let Err(err) = synthesizer.speak(&text, raw_tx).await {
                if utterance_counter.load(Ordering::SeqCst) == utterance {
                    speaking.store(false, Ordering::SeqCst);
                    warn!(target: "speech_playback", %err, "synthesis failed");
                    let _ = events_tx.send(PlaybackEvent::Error(err.to_string())).await;
                }
            }
        });
    }

    /// Stop playback immediately; Idle afterwards regardless of prior state.
    pub async fn cancel(&self) {
        self.utterance_counter.fetch_add(1, Ordering::SeqCst);
        if self.speaking.swap(false, Ordering::SeqCst) {
            self.synthesizer.cancel().await;
        }
    }

    fn spawn_pump(&self, utterance: u64, mut raw_rx: mpsc::Receiver<SynthesisEvent>) {
        let events_tx = self.events_tx.clone();
        let speaking = Arc::clone(&self.speaking);
        let utterance_counter = Arc::clone(&self.utterance_counter);

        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                if utterance_counter.load(Ordering::SeqCst) != utterance {
                    debug!(
                        target: "speech_playback",
                        utterance,
                        "dropping event from superseded utterance"
                    );
                    break;
                }

                match event {
                    SynthesisEvent::Started => {
                        if events_tx.send(PlaybackEvent::Started).await.is_err() {
                            break;
                        }
                    }
                    SynthesisEvent::Finished => {
                        speaking.store(false, Ordering::SeqCst);
                        let _ = events_tx.send(PlaybackEvent::Finished).await;
                        break;
                    }
                    SynthesisEvent::Error(reason) => {
                        speaking.store(false, Ordering::SeqCst);
                        let _ = events_tx.send(PlaybackEvent::Error(reason)).await;
                        break;
                    }
                }
            }
        });
    }
}

/// Completes every utterance immediately without producing audio; used where
/// no synthesis backend exists so the conversation flow still advances.
#[derive(Debug, Default)]
pub struct NullSynthesizer;

#[async_trait]
impl SpeechSynthesizer for NullSynthesizer {
    async fn speak(&self, _text: &str, events: mpsc::Sender<SynthesisEvent>) -> Result<()> {
        let _ = events.send(SynthesisEvent::Started).await;
        let _ = events.send(SynthesisEvent::Finished).await;
        Ok(())
    }

    async fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::time::{sleep, timeout, Duration};

    struct SlowSynthesizer {
        spoken: Mutex<Vec<String>>,
        cancelled: AtomicUsize,
        finish_delay: Duration,
    }

    impl SlowSynthesizer {
        fn new(finish_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                spoken: Mutex::new(Vec::new()),
                cancelled: AtomicUsize::new(0),
                finish_delay,
            })
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for SlowSynthesizer {
        async fn speak(&self, text: &str, events: mpsc::Sender<SynthesisEvent>) -> Result<()> {
            self.spoken
                .lock()
                .expect("spoken lock poisoned")
                .push(text.to_string());
            let delay = self.finish_delay;
            tokio::spawn(async move {
                let _ = events.send(SynthesisEvent::Started).await;
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                let _ = events.send(SynthesisEvent::Finished).await;
            });
            Ok(())
        }

        async fn cancel(&self) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn finished_fires_once_per_utterance() {
        let synthesizer = SlowSynthesizer::new(Duration::from_millis(5));
        let (controller, mut events) = PlaybackController::new(Arc::clone(&synthesizer) as _, 8);

        controller.speak("hello").await;
        assert!(controller.is_speaking());

        let mut finished = 0;
        while let Ok(Some(event)) = timeout(Duration::from_millis(300), events.recv()).await {
            if matches!(event, PlaybackEvent::Finished) {
                finished += 1;
                break;
            }
        }
        assert_eq!(finished, 1);
        assert!(!controller.is_speaking());
    }

    #[tokio::test]
    async fn speak_supersedes_in_progress_utterance() {
        let synthesizer = SlowSynthesizer::new(Duration::from_millis(200));
        let (controller, mut events) = PlaybackController::new(Arc::clone(&synthesizer) as _, 8);

        controller.speak("first").await;
        controller.speak("second").await;
        sleep(Duration::from_millis(20)).await;

        assert_eq!(synthesizer.cancelled.load(Ordering::SeqCst), 1);
        let mut spoken = synthesizer
            .spoken
            .lock()
            .expect("spoken lock poisoned")
            .clone();
        spoken.sort();
        assert_eq!(spoken, vec!["first".to_string(), "second".to_string()]);

        // Only the second utterance may report; the first was superseded
        // before its events could be forwarded.
        let mut started = 0;
        let mut finished = 0;
        while let Ok(Some(event)) = timeout(Duration::from_millis(400), events.recv()).await {
            match event {
                PlaybackEvent::Started => started += 1,
                PlaybackEvent::Finished => {
                    finished += 1;
                    break;
                }
                PlaybackEvent::Error(reason) => panic!("unexpected error: {reason}"),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn cancel_is_synchronous_and_idempotent() {
        let synthesizer = SlowSynthesizer::new(Duration::from_millis(200));
        let (controller, mut events) = PlaybackController::new(Arc::clone(&synthesizer) as _, 8);

        controller.speak("cut me off").await;
        controller.cancel().await;
        assert!(!controller.is_speaking());
        controller.cancel().await;
        assert_eq!(synthesizer.cancelled.load(Ordering::SeqCst), 1);

        // The cancelled utterance's Finished is filtered out.
        sleep(Duration::from_millis(250)).await;
        while let Ok(event) = events.try_recv() {
            assert!(
                !matches!(event, PlaybackEvent::Finished),
                "cancelled utterance must not report Finished"
            );
        }
    }

    #[tokio::test]
    async fn null_synthesizer_completes_immediately() {
        let (controller, mut events) = PlaybackController::new(Arc::new(NullSynthesizer), 8);

        controller.speak("anything").await;
        let event = timeout(Duration::from_millis(200), events.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        assert!(matches!(event, PlaybackEvent::Started));
        let event = timeout(Duration::from_millis(200), events.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        assert!(matches!(event, PlaybackEvent::Finished));
    }
}
