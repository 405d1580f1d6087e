use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

use crate::coordinator::types::{ChatEntry, ConversationCommand, VoiceState};

use super::state::{ChatLog, VoiceStateCell};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Command surface of a running conversation. Dropping the handle aborts the
/// worker; `end` shuts it down cleanly first.
pub struct ConversationHandle {
    command_tx: mpsc::Sender<ConversationCommand>,
    chat_log: Arc<ChatLog>,
    voice_state: Arc<VoiceStateCell>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationHandle {
    pub(super) fn new(
        command_tx: mpsc::Sender<ConversationCommand>,
        chat_log: Arc<ChatLog>,
        voice_state: Arc<VoiceStateCell>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            command_tx,
            chat_log,
            voice_state,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Forward a typed chat message. Fails only once the conversation ended.
    pub async fn send_chat(
        &self,
        text: impl Into<String>,
    ) -> Result<(), mpsc::error::SendError<ConversationCommand>> {
        self.command_tx
            .send(ConversationCommand::SendChat(text.into()))
            .await
    }

    /// Append a system chat entry without touching the backend.
    pub async fn notice(
        &self,
        text: impl Into<String>,
    ) -> Result<(), mpsc::error::SendError<ConversationCommand>> {
        self.command_tx
            .send(ConversationCommand::Notice(text.into()))
            .await
    }

    /// End the conversation and wait for teardown. Safe to call repeatedly;
    /// a conversation that already ended on its own is simply reaped.
    pub async fn end(&self) {
        let _ = self.command_tx.send(ConversationCommand::End).await;
        let worker = self.worker.lock().expect("worker slot poisoned").take();
        if let Some(mut worker) = worker {
            if timeout(SHUTDOWN_TIMEOUT, &mut worker).await.is_err() {
                warn!(target: "turn_coordinator", "worker did not stop in time, aborting");
                worker.abort();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .lock()
            .expect("worker slot poisoned")
            .as_ref()
            .map(|worker| worker.is_finished())
            .unwrap_or(true)
    }

    pub fn voice_state(&self) -> VoiceState {
        self.voice_state.get()
    }

    pub fn chat_log(&self) -> Vec<ChatEntry> {
        self.chat_log.snapshot()
    }
}

impl Drop for ConversationHandle {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.worker.lock() {
            if let Some(worker) = guard.take() {
                worker.abort();
            }
        }
    }
}
