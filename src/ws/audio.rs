//! Audio output that lives in the visitor's browser.
//!
//! Browsers only allow playback started inside a click handler, so the page
//! calls `audio.play()` itself when the visitor taps, sends the intent
//! (`start_music` / `toggle_music`) and then the `playback_result`. The
//! dispatcher [`arm`](RemoteAudio::arm)s a reply slot when the intent arrives,
//! and `play` waits on that slot instead of asking the page to play later.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::protocol::{AudioCommand, ServerMessage};
use crate::session::{AudioOutput, PlaybackError};

type PlaybackReply = Result<(), String>;

/// Reply slot for the click currently being handled
#[derive(Default)]
struct ClickReply {
    tx: Option<oneshot::Sender<PlaybackReply>>,
    rx: Option<oneshot::Receiver<PlaybackReply>>,
}

pub struct RemoteAudio {
    outbox: mpsc::UnboundedSender<ServerMessage>,
    click: Mutex<ClickReply>,
    ack_timeout: Duration,
}

impl RemoteAudio {
    pub fn new(outbox: mpsc::UnboundedSender<ServerMessage>, ack_timeout: Duration) -> Self {
        Self {
            outbox,
            click: Mutex::new(ClickReply::default()),
            ack_timeout,
        }
    }

    /// A music click arrived; its `playback_result` follows on the socket.
    /// A newer click replaces an unanswered one.
    pub async fn arm(&self) {
        let (tx, rx) = oneshot::channel();
        *self.click.lock().await = ClickReply {
            tx: Some(tx),
            rx: Some(rx),
        };
    }

    /// Record the page's answer for the armed click.
    /// Returns false when no click is waiting for one.
    pub async fn resolve(&self, reply: PlaybackReply) -> bool {
        match self.click.lock().await.tx.take() {
            Some(waiter) => waiter.send(reply).is_ok(),
            None => {
                tracing::debug!("Unsolicited playback result");
                false
            }
        }
    }
}

#[async_trait]
impl AudioOutput for RemoteAudio {
    async fn play(&self) -> Result<(), PlaybackError> {
        let Some(rx) = self.click.lock().await.rx.take() else {
            return Err(PlaybackError::NoGesture);
        };

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Err(_) => Err(PlaybackError::Timeout(self.ack_timeout)),
            Ok(Err(_)) => Err(PlaybackError::Disconnected),
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(PlaybackError::Rejected(reason)),
        }
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        self.outbox
            .send(ServerMessage::Audio {
                command: AudioCommand::Pause,
            })
            .map_err(|_| PlaybackError::Disconnected)
    }
}
