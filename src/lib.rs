//! Parley Core Library
//!
//! This crate provides the client-side runtime for voice-and-chat
//! conversations with a remote AI service: the message transport, the speech
//! capture and playback controllers, turn coordination, and session lifecycle.

pub mod capture;
pub mod coordinator;
pub mod playback;
pub mod session;
pub mod telemetry;
pub mod transport;
