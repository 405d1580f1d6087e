use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::coordinator::types::{ChatEntry, ChatSender, VoiceState};

/// Append-only conversation log; cleared only when the session ends.
#[derive(Default)]
pub(crate) struct ChatLog {
    entries: Mutex<Vec<ChatEntry>>,
}

impl ChatLog {
    pub(crate) fn append(&self, sender: ChatSender, content: impl Into<String>) -> ChatEntry {
        let entry = ChatEntry::new(sender, content);
        self.entries
            .lock()
            .expect("chat log lock poisoned")
            .push(entry.clone());
        entry
    }

    pub(crate) fn snapshot(&self) -> Vec<ChatEntry> {
        self.entries.lock().expect("chat log lock poisoned").clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().expect("chat log lock poisoned").len()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().expect("chat log lock poisoned").clear();
    }
}

/// Current voice state, readable from outside the worker.
pub(crate) struct VoiceStateCell {
    state: Mutex<VoiceState>,
}

impl VoiceStateCell {
    pub(crate) fn new(initial: VoiceState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub(crate) fn get(&self) -> VoiceState {
        self.state.lock().expect("voice state lock poisoned").clone()
    }

    /// Install `next`, returning the previous state.
    pub(crate) fn replace(&self, next: VoiceState) -> VoiceState {
        let mut guard = self.state.lock().expect("voice state lock poisoned");
        std::mem::replace(&mut *guard, next)
    }
}

/// Monotonic guard for scheduled callbacks: a callback is honored only if the
/// generation it captured at schedule time is still current when it fires.
/// Ending the session or accepting a restart advances the generation, so
/// overlapping timers can never double-start listening.
#[derive(Default)]
pub(crate) struct ScheduleGeneration {
    current: AtomicU64,
}

impl ScheduleGeneration {
    pub(crate) fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub(crate) fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}
