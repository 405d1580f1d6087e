//! 会话管理与资源生命周期。

pub mod lifecycle;
pub mod media;

pub use lifecycle::{SessionDescriptor, SessionError};
pub use media::{MediaConstraints, MediaError, MediaSource, MediaStream, PeerLink};

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::capture::SpeechRecognizer;
use crate::coordinator::{
    spawn_conversation, ConversationHandle, ConversationParts, ConversationUpdate,
    CoordinatorConfig, VoiceState,
};
use crate::playback::SpeechSynthesizer;
use crate::transport::{ChannelConnector, WsConnector};

/// Owns the collaborators a conversation is assembled from and enforces the
/// one-active-session rule. Ending is idempotent; every resource tolerates
/// being released twice.
pub struct SessionManager {
    server_url: String,
    config: CoordinatorConfig,
    connector: Arc<dyn ChannelConnector>,
    recognizer: Arc<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    media: Arc<dyn MediaSource>,
    peer: Option<Arc<dyn PeerLink>>,
    active: Mutex<Option<ConversationHandle>>,
}

impl SessionManager {
    pub fn new(
        server_url: impl Into<String>,
        config: CoordinatorConfig,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        media: Arc<dyn MediaSource>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            config,
            connector: Arc::new(WsConnector),
            recognizer,
            synthesizer,
            media,
            peer: None,
            active: Mutex::new(None),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn ChannelConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_peer_link(mut self, peer: Arc<dyn PeerLink>) -> Self {
        self.peer = Some(peer);
        self
    }

    /// 启动会话：校验描述、连接后端、尽力获取摄像头，然后生成协调器。
    /// 校验失败时不产生任何副作用。
    pub async fn start_session(
        &self,
        descriptor: SessionDescriptor,
    ) -> Result<mpsc::Receiver<ConversationUpdate>, SessionError> {
        descriptor.validate()?;
        let descriptor = descriptor.normalized();

        let mut active = self.active.lock().await;
        if active.as_ref().map(|handle| !handle.is_finished()).unwrap_or(false) {
            return Err(SessionError::AlreadyActive);
        }

        let (channel, transport_rx) = self.connector.connect(&self.server_url).await?;

        // 摄像头获取失败只降级，不中止。
        let (media_stream, camera_denied) =
            match self.media.acquire(MediaConstraints::default()).await {
                Ok(stream) => (Some(stream), false),
                Err(err) => {
                    warn!(
                        target: "session_manager",
                        %err,
                        "camera acquisition failed, continuing without video"
                    );
                    (None, true)
                }
            };

        let parts = ConversationParts {
            channel,
            transport_rx,
            recognizer: Arc::clone(&self.recognizer),
            synthesizer: Arc::clone(&self.synthesizer),
            media: media_stream,
            peer: self.peer.clone(),
            camera_denied,
        };
        let (handle, updates_rx) = spawn_conversation(self.config.clone(), descriptor, parts);
        *active = Some(handle);

        info!(target: "session_manager", "session started");
        Ok(updates_rx)
    }

    /// 结束当前会话；可重复调用，也容忍会话已经自行终止。
    pub async fn end_session(&self) {
        let handle = { self.active.lock().await.take() };
        if let Some(handle) = handle {
            handle.end().await;
            info!(target: "session_manager", "session ended");
        }
    }

    /// Forward a typed chat message into the active session, if any.
    pub async fn send_chat(&self, text: impl Into<String>) {
        let guard = self.active.lock().await;
        if let Some(handle) = guard.as_ref() {
            if let Err(err) = handle.send_chat(text.into()).await {
                warn!(target: "session_manager", %err, "chat message not delivered");
            }
        }
    }

    pub async fn is_active(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn voice_state(&self) -> VoiceState {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|handle| handle.voice_state())
            .unwrap_or(VoiceState::Idle)
    }

    pub async fn chat_log(&self) -> Vec<crate::coordinator::ChatEntry> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|handle| handle.chat_log())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::UnsupportedRecognizer;
    use crate::coordinator::{ChatSender, TurnPolicy};
    use crate::playback::NullSynthesizer;
    use crate::transport::{Channel, ChannelEvent, ClientMessage, TransportError};
    use async_trait::async_trait;
    use super::media::{MediaStreamHandle, NullMediaSource};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::timeout;

    struct RecordingChannel {
        sent: StdMutex<Vec<ClientMessage>>,
        closed: AtomicUsize,
    }

    impl RecordingChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: StdMutex::new(Vec::new()),
                closed: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
            self.sent.lock().expect("sent lock poisoned").push(message);
            Ok(())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StaticConnector {
        channel: Arc<RecordingChannel>,
        server_tx: StdMutex<Option<mpsc::Sender<ChannelEvent>>>,
        connects: AtomicUsize,
    }

    impl StaticConnector {
        fn new(channel: Arc<RecordingChannel>) -> Arc<Self> {
            Arc::new(Self {
                channel,
                server_tx: StdMutex::new(None),
                connects: AtomicUsize::new(0),
            })
        }

        /// Drop the backend side of the channel, as a dying server would.
        fn drop_server(&self) {
            self.server_tx
                .lock()
                .expect("server tx lock poisoned")
                .take();
        }
    }

    #[async_trait]
    impl ChannelConnector for StaticConnector {
        async fn connect(
            &self,
            _url: &str,
        ) -> Result<(Arc<dyn Channel>, mpsc::Receiver<ChannelEvent>), TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(32);
            *self.server_tx.lock().expect("server tx lock poisoned") = Some(tx);
            Ok((Arc::clone(&self.channel) as Arc<dyn Channel>, rx))
        }
    }

    struct TrackedStream {
        released: AtomicBool,
    }

    #[async_trait]
    impl MediaStream for TrackedStream {
        async fn release(&self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct TrackedMediaSource {
        stream: Arc<TrackedStream>,
    }

    #[async_trait]
    impl MediaSource for TrackedMediaSource {
        async fn acquire(
            &self,
            _constraints: MediaConstraints,
        ) -> Result<MediaStreamHandle, MediaError> {
            Ok(Arc::clone(&self.stream) as MediaStreamHandle)
        }
    }

    fn test_config() -> CoordinatorConfig {
        CoordinatorConfig {
            policy: TurnPolicy::TurnTaking,
            greeting_notice_delay: Duration::from_millis(10),
            initial_listen_delay: Duration::from_millis(10),
            resume_listen_grace: Duration::from_millis(10),
            synth_error_resume_delay: Duration::from_millis(10),
            capture_idle_restart_delay: Duration::from_millis(10),
            capture_restart_backoff: Duration::from_millis(10),
            buffer_capacity: 32,
        }
    }

    fn manager_with(connector: Arc<StaticConnector>, media: Arc<dyn MediaSource>) -> SessionManager {
        SessionManager::new(
            "ws://localhost:8080/ws",
            test_config(),
            Arc::new(UnsupportedRecognizer),
            Arc::new(NullSynthesizer),
            media,
        )
        .with_connector(connector)
    }

    #[tokio::test]
    async fn validation_failure_has_no_side_effects() {
        let channel = RecordingChannel::new();
        let connector = StaticConnector::new(Arc::clone(&channel));
        let manager = manager_with(Arc::clone(&connector), Arc::new(NullMediaSource));

        let result = manager
            .start_session(SessionDescriptor::new("", "Practice"))
            .await;
        assert!(matches!(
            result,
            Err(SessionError::Validation { field: "title" })
        ));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert!(!manager.is_active().await);
    }

    #[tokio::test]
    async fn start_session_sends_descriptor_and_rejects_second_start() {
        let channel = RecordingChannel::new();
        let connector = StaticConnector::new(Arc::clone(&channel));
        let manager = manager_with(Arc::clone(&connector), Arc::new(NullMediaSource));

        let _updates = manager
            .start_session(SessionDescriptor::new(" Interview ", "Practice"))
            .await
            .expect("session starts");
        assert!(manager.is_active().await);

        // The descriptor goes out trimmed, exactly once.
        timeout(Duration::from_millis(500), async {
            loop {
                let sent = channel.sent.lock().expect("sent lock poisoned").clone();
                if !sent.is_empty() {
                    assert_eq!(
                        sent[0],
                        ClientMessage::StartSession {
                            title: "Interview".into(),
                            description: "Practice".into(),
                        }
                    );
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("start_session message observed");

        let second = manager
            .start_session(SessionDescriptor::new("Another", "One"))
            .await;
        assert!(matches!(second.err(), Some(SessionError::AlreadyActive)));

        manager.end_session().await;
    }

    #[tokio::test]
    async fn end_session_is_idempotent_and_releases_resources() {
        let channel = RecordingChannel::new();
        let connector = StaticConnector::new(Arc::clone(&channel));
        let stream = Arc::new(TrackedStream {
            released: AtomicBool::new(false),
        });
        let manager = manager_with(
            Arc::clone(&connector),
            Arc::new(TrackedMediaSource {
                stream: Arc::clone(&stream),
            }),
        );

        let _updates = manager
            .start_session(SessionDescriptor::new("Interview", "Practice"))
            .await
            .expect("session starts");

        manager.end_session().await;
        assert!(!manager.is_active().await);
        assert!(stream.released.load(Ordering::SeqCst));
        assert_eq!(channel.closed.load(Ordering::SeqCst), 1);
        assert!(manager.chat_log().await.is_empty());
        assert_eq!(manager.voice_state().await, VoiceState::Idle);

        manager.end_session().await;
        assert_eq!(channel.closed.load(Ordering::SeqCst), 1);
        assert!(manager.chat_log().await.is_empty());
    }

    #[tokio::test]
    async fn backend_disconnect_ends_session() {
        let channel = RecordingChannel::new();
        let connector = StaticConnector::new(Arc::clone(&channel));
        let manager = manager_with(Arc::clone(&connector), Arc::new(NullMediaSource));

        let _updates = manager
            .start_session(SessionDescriptor::new("Interview", "Practice"))
            .await
            .expect("session starts");
        assert!(manager.is_active().await);

        connector.drop_server();

        timeout(Duration::from_secs(2), async {
            while manager.is_active().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session ends after backend disconnect");
        assert_eq!(channel.closed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.voice_state().await, VoiceState::Ended);
    }

    #[tokio::test]
    async fn camera_denial_degrades_with_system_notice() {
        let channel = RecordingChannel::new();
        let connector = StaticConnector::new(Arc::clone(&channel));
        let manager = manager_with(Arc::clone(&connector), Arc::new(NullMediaSource));

        let mut updates = manager
            .start_session(SessionDescriptor::new("Interview", "Practice"))
            .await
            .expect("session starts");

        let notice = timeout(Duration::from_millis(500), async {
            loop {
                match updates.recv().await {
                    Some(ConversationUpdate::Chat(entry))
                        if entry.sender == ChatSender::System =>
                    {
                        break entry.content;
                    }
                    Some(_) => continue,
                    None => panic!("updates ended early"),
                }
            }
        })
        .await
        .expect("system notice observed");
        assert!(notice.contains("Camera access denied"));

        manager.end_session().await;
    }
}
