use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Background track status as the page shows it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioState {
    /// Nothing played yet, the "tap for music" prompt is up
    #[default]
    Prompting,
    Playing,
    Paused,
}

impl AudioState {
    pub fn music_prompt_visible(&self) -> bool {
        matches!(self, AudioState::Prompting)
    }

    pub fn music_playing(&self) -> bool {
        matches!(self, AudioState::Playing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Playback rejected: {0}")]
    Rejected(String),

    #[error("No audio source loaded")]
    NoSource,

    #[error("Playback must start from a click on the page")]
    NoGesture,

    #[error("Audio output did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Audio output disconnected")]
    Disconnected,
}

/// Something that can actually make noise
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self) -> Result<(), PlaybackError>;
    async fn pause(&self) -> Result<(), PlaybackError>;
}

/// Computes the next [`AudioState`] by driving the output, if there is one
#[derive(Clone, Default)]
pub struct AudioController {
    output: Option<Arc<dyn AudioOutput>>,
}

impl AudioController {
    pub fn new(output: Option<Arc<dyn AudioOutput>>) -> Self {
        Self { output }
    }

    /// First play after the user interacted with the prompt.
    /// On error the caller keeps `current`.
    pub async fn start(&self, current: AudioState) -> Result<AudioState, PlaybackError> {
        let output = self.output.as_ref().ok_or(PlaybackError::NoSource)?;
        if current == AudioState::Playing {
            return Ok(current);
        }
        output.play().await?;
        Ok(AudioState::Playing)
    }

    /// Flip between playing and paused. Errors are logged and leave the state alone.
    /// The prompt is only answered through [`start`](Self::start).
    pub async fn toggle(&self, current: AudioState) -> AudioState {
        let Some(output) = &self.output else {
            tracing::debug!("Toggle ignored, no audio source loaded");
            return current;
        };

        let (result, next) = match current {
            AudioState::Prompting => {
                tracing::debug!("Toggle ignored, music prompt still open");
                return current;
            }
            AudioState::Playing => (output.pause().await, AudioState::Paused),
            AudioState::Paused => (output.play().await, AudioState::Playing),
        };

        match result {
            Ok(()) => next,
            Err(e) => {
                tracing::warn!("Music toggle error: {}", e);
                current
            }
        }
    }
}
