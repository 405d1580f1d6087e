use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::coordinator::constants::{
    CAPTURE_IDLE_RESTART_DELAY, CAPTURE_RESTART_BACKOFF, GREETING_NOTICE_DELAY,
    INITIAL_LISTEN_DELAY, RESUME_LISTEN_GRACE, SYNTH_ERROR_RESUME_DELAY,
};

/// Listening-restart and interruption policy for a conversation. Picked once
/// per deployment; the two behaviors are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPolicy {
    /// Never listen while playback is active; resume after a grace delay once
    /// the AI finishes speaking. Speech arriving mid-playback is discarded.
    TurnTaking,
    /// Keep capture live during playback; a finalized utterance interrupts
    /// the AI, cancelling playback before the utterance is forwarded.
    BargeIn,
}

impl TurnPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPolicy::TurnTaking => "turn_taking",
            TurnPolicy::BargeIn => "barge_in",
        }
    }
}

impl Default for TurnPolicy {
    fn default() -> Self {
        TurnPolicy::TurnTaking
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub policy: TurnPolicy,
    /// Delay after session start before the voice-active notice appears.
    pub greeting_notice_delay: Duration,
    /// Further delay before listening begins, letting the greeting play out.
    pub initial_listen_delay: Duration,
    /// Grace period between playback completion and listen restart
    /// (turn-taking only; barge-in resumes immediately).
    pub resume_listen_grace: Duration,
    /// Listen-resume delay after a synthesizer error.
    pub synth_error_resume_delay: Duration,
    /// Restart delay after the recognizer session ends on its own.
    pub capture_idle_restart_delay: Duration,
    /// Backoff for recoverable recognizer errors and failed starts.
    pub capture_restart_backoff: Duration,
    pub buffer_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            policy: TurnPolicy::default(),
            greeting_notice_delay: GREETING_NOTICE_DELAY,
            initial_listen_delay: INITIAL_LISTEN_DELAY,
            resume_listen_grace: RESUME_LISTEN_GRACE,
            synth_error_resume_delay: SYNTH_ERROR_RESUME_DELAY,
            capture_idle_restart_delay: CAPTURE_IDLE_RESTART_DELAY,
            capture_restart_backoff: CAPTURE_RESTART_BACKOFF,
            buffer_capacity: 32,
        }
    }
}
