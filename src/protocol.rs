use serde::{Deserialize, Serialize};

use crate::session::{SessionSnapshot, SubmitRejection, ViewState};
use crate::types::SessionId;

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    SubmitAddress {
        address: String,
    },
    SkipAddress,
    /// Visitor tapped the music prompt. The page has already called
    /// `audio.play()` and follows up with `playback_result`.
    StartMusic,
    /// Visitor tapped play/pause; when resuming, `playback_result` follows
    ToggleMusic,
    /// Outcome of the `audio.play()` the page started in the click handler
    PlaybackResult {
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCommand {
    Pause,
}

/// Flattened render state for the page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    #[serde(flatten)]
    pub view: ViewState,
    pub notification_visible: bool,
    pub music_prompt_visible: bool,
    pub music_playing: bool,
}

impl From<SessionSnapshot> for ViewSnapshot {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            view: snapshot.view,
            notification_visible: snapshot.notification_visible(),
            music_prompt_visible: snapshot.music_prompt_visible(),
            music_playing: snapshot.music_playing(),
        }
    }
}


#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        session_id: SessionId,
        /// Track the page should load, if music is enabled
        audio_src: Option<String>,
        state: ViewSnapshot,
    },
    State {
        state: ViewSnapshot,
    },
    Audio {
        command: AudioCommand,
    },
    Rejected {
        reason: SubmitRejection,
    },
    MusicError {
        msg: String,
    },
    Error {
        code: String,
        msg: String,
    },
}
