//! WebSocket message dispatch
//!
//! Anything that waits on timers or the network runs in its own task, so the
//! socket keeps reading while a submission plays out. That is what lets a
//! repeated submit reach the guard and be dropped.

use std::sync::Arc;
use tokio::sync::mpsc;

use super::audio::RemoteAudio;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{SessionController, SubmitOutcome};

/// Per-connection handles the dispatcher needs
#[derive(Clone)]
pub struct Connection {
    pub session: Arc<SessionController>,
    pub outbox: mpsc::UnboundedSender<ServerMessage>,
    pub audio: Option<Arc<RemoteAudio>>,
}

/// Handle a client message and return an optional immediate response
pub async fn handle_message(msg: ClientMessage, conn: &Connection) -> Option<ServerMessage> {
    match msg {
        ClientMessage::SubmitAddress { address } => {
            let conn = conn.clone();
            tokio::spawn(async move {
                let outcome = conn.session.submit_address(&address).await;
                report_outcome(&conn, outcome);
            });
            None
        }

        ClientMessage::SkipAddress => {
            let conn = conn.clone();
            tokio::spawn(async move {
                let outcome = conn.session.skip().await;
                report_outcome(&conn, outcome);
            });
            None
        }

        ClientMessage::StartMusic => {
            // Armed inline so the following playback_result has somewhere to go
            if let Some(audio) = &conn.audio {
                audio.arm().await;
            }
            let conn = conn.clone();
            tokio::spawn(async move {
                if let Err(e) = conn.session.start_music().await {
                    let _ = conn.outbox.send(ServerMessage::MusicError { msg: e.to_string() });
                }
            });
            None
        }

        ClientMessage::ToggleMusic => {
            if let Some(audio) = &conn.audio {
                audio.arm().await;
            }
            let session = conn.session.clone();
            tokio::spawn(async move { session.toggle_music().await });
            None
        }

        ClientMessage::PlaybackResult { ok, error } => {
            let Some(audio) = &conn.audio else {
                return Some(ServerMessage::Error {
                    code: "NO_AUDIO".to_string(),
                    msg: "Music is disabled for this page".to_string(),
                });
            };

            let reply = if ok {
                Ok(())
            } else {
                Err(error.unwrap_or_else(|| "playback failed".to_string()))
            };
            audio.resolve(reply).await;
            None
        }
    }
}

fn report_outcome(conn: &Connection, outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Revealed { delivered } => {
            tracing::info!(
                session = conn.session.id(),
                delivered,
                "Session revealed"
            );
        }
        SubmitOutcome::Rejected(reason) => {
            // Ignore send errors (socket may already be gone)
            let _ = conn.outbox.send(ServerMessage::Rejected { reason });
        }
    }
}
