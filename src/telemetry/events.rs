use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) const TARGET: &str = "telemetry::conversation";
pub(crate) const EVENT_TURN: &str = "turn_roundtrip";
pub(crate) const EVENT_SESSION: &str = "session_closed";

#[derive(Debug, Serialize)]
pub struct TurnRoundtripEvent {
    pub turn_index: u64,
    pub utterance_chars: usize,
    pub response_chars: usize,
    pub spoken: bool,
    pub roundtrip_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionClosedEvent {
    pub reason: &'static str,
    pub turns: u64,
    pub chat_entries: usize,
}

pub fn record_turn_roundtrip(
    turn_index: u64,
    utterance_chars: usize,
    response_chars: usize,
    spoken: bool,
    roundtrip: Duration,
) {
    let event = TurnRoundtripEvent {
        turn_index,
        utterance_chars,
        response_chars,
        spoken,
        roundtrip_ms: duration_to_ms(roundtrip),
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_TURN,
            turn_index = event.turn_index,
            utterance_chars = event.utterance_chars,
            response_chars = event.response_chars,
            spoken = event.spoken,
            roundtrip_ms = event.roundtrip_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_TURN,
            %err,
            "failed to encode turn roundtrip event"
        ),
    }
}

pub fn record_session_closed(reason: &'static str, turns: u64, chat_entries: usize) {
    let event = SessionClosedEvent {
        reason,
        turns,
        chat_entries,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_SESSION,
            reason = event.reason,
            turns = event.turns,
            chat_entries = event.chat_entries,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_SESSION,
            %err,
            "failed to encode session closed event"
        ),
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
