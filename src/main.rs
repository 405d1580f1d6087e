use std::sync::Arc;

use anyhow::Result;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use parley_core::capture::UnsupportedRecognizer;
use parley_core::coordinator::{ConversationUpdate, CoordinatorConfig};
use parley_core::playback::NullSynthesizer;
use parley_core::session::media::NullMediaSource;
use parley_core::session::{SessionDescriptor, SessionManager};
use parley_core::telemetry::init_tracing;

const DEFAULT_SERVER_URL: &str = "ws://localhost:8080/ws";

/// Console shell around the conversation core. Without speech and camera
/// backends the session degrades to text chat, which is exactly what the
/// coordinator announces.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let server_url =
        std::env::var("PARLEY_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
    let manager = SessionManager::new(
        server_url,
        CoordinatorConfig::default(),
        Arc::new(UnsupportedRecognizer),
        Arc::new(NullSynthesizer),
        Arc::new(NullMediaSource),
    );

    let mut lines = BufReader::new(stdin()).lines();

    println!("Session title:");
    let title = lines.next_line().await?.unwrap_or_default();
    println!("Session description:");
    let description = lines.next_line().await?.unwrap_or_default();

    let mut updates = manager
        .start_session(SessionDescriptor::new(title, description))
        .await?;

    let renderer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            match update {
                ConversationUpdate::Chat(entry) => {
                    println!("[{}] {}", entry.sender.as_str(), entry.content);
                }
                ConversationUpdate::Status(status) => {
                    println!("-- {status}");
                }
                ConversationUpdate::Voice(_) => {}
                ConversationUpdate::Ended(reason) => {
                    println!("-- session ended ({})", reason.as_str());
                    break;
                }
            }
        }
    });

    println!("Type a message and press enter; /end closes the session.");
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed == "/end" {
            break;
        }
        if !trimmed.is_empty() {
            manager.send_chat(trimmed).await;
        }
    }

    manager.end_session().await;
    renderer.await?;
    Ok(())
}
