//! Per-visitor session: the view state machine, the submission guard and the
//! audio controller, threaded through one explicit [`SessionController`].
//!
//! A session lives as long as one page load (one WebSocket connection). Every
//! transition publishes a fresh [`SessionSnapshot`] on a watch channel.

mod audio;
mod guard;
mod view;

pub use audio::{AudioController, AudioOutput, AudioState, PlaybackError};
pub use guard::{SubmissionGuard, SubmissionPermit};
pub use view::{LandingPhase, TransitionError, ViewState};

use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OnceCell};

use crate::config::{env_parse, env_trimmed};
use crate::geo::{self, GeoLookup};
use crate::report::{self, EventReporter};
use crate::types::{EventDraft, LocationRecord, SessionId};

/// Everything the page needs to render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub view: ViewState,
    pub audio: AudioState,
}

impl SessionSnapshot {
    pub fn notification_visible(&self) -> bool {
        self.view.notification_visible()
    }

    pub fn music_prompt_visible(&self) -> bool {
        self.audio.music_prompt_visible()
    }

    pub fn music_playing(&self) -> bool {
        self.audio.music_playing()
    }
}

/// Why a submit or skip did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitRejection {
    EmptyAddress,
    InFlight,
    AlreadyRevealed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The view reached `Revealed`; `delivered` says whether the relay took the event
    Revealed { delivered: bool },
    Rejected(SubmitRejection),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long the acknowledgment banner stays up
    pub acknowledge_for: Duration,
    /// Pause between hiding the banner and revealing
    pub reveal_after: Duration,
    /// Track the page loops; `None` disables audio
    pub audio_src: Option<String>,
    /// How long to wait for the page to confirm playback
    pub audio_ack_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            acknowledge_for: Duration::from_millis(1500),
            reveal_after: Duration::from_millis(300),
            audio_src: Some("/audio.mp3".to_string()),
            audio_ack_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Set but empty AUDIO_SRC turns music off
        let audio_src = match std::env::var("AUDIO_SRC") {
            Ok(_) => env_trimmed("AUDIO_SRC"),
            Err(_) => defaults.audio_src,
        };

        Self {
            acknowledge_for: env_parse("ACK_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.acknowledge_for),
            reveal_after: env_parse("REVEAL_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reveal_after),
            audio_src,
            audio_ack_timeout: env_parse("AUDIO_ACK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.audio_ack_timeout),
        }
    }
}

/// Session context for one page load
pub struct SessionController {
    id: SessionId,
    visitor_ip: Option<IpAddr>,
    geo: Arc<dyn GeoLookup>,
    reporter: Arc<dyn EventReporter>,
    audio: AudioController,
    /// Serializes play/pause so concurrent clicks see each other's result
    audio_op: Mutex<()>,
    guard: SubmissionGuard,
    /// Filled once by the page-opened announcement
    location: OnceCell<Option<LocationRecord>>,
    snapshot: watch::Sender<SessionSnapshot>,
    config: SessionConfig,
}

impl SessionController {
    pub fn new(
        visitor_ip: Option<IpAddr>,
        geo: Arc<dyn GeoLookup>,
        reporter: Arc<dyn EventReporter>,
        audio: AudioController,
        config: SessionConfig,
    ) -> Self {
        let (snapshot, _rx) = watch::channel(SessionSnapshot::default());
        Self {
            id: ulid::Ulid::new().to_string(),
            visitor_ip,
            geo,
            reporter,
            audio,
            audio_op: Mutex::new(()),
            guard: SubmissionGuard::new(),
            location: OnceCell::new(),
            snapshot,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.snapshot.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Cached visitor location, if the lookup has finished and succeeded
    pub fn location(&self) -> Option<LocationRecord> {
        self.location.get().cloned().flatten()
    }

    pub fn submission_in_flight(&self) -> bool {
        self.guard.is_held()
    }

    /// Resolve the visitor location and report the page-opened event.
    /// Runs once per session; later and concurrent calls wait for that run.
    pub async fn open(&self) {
        self.opened_location().await;
    }

    async fn opened_location(&self) -> Option<&LocationRecord> {
        self.location
            .get_or_init(|| self.announce())
            .await
            .as_ref()
    }

    async fn announce(&self) -> Option<LocationRecord> {
        let location = geo::resolve_location(self.geo.as_ref(), self.visitor_ip).await;

        let event = EventDraft::page_opened(location.clone().unwrap_or_default())
            .into_event(location.as_ref());
        tracing::info!(session = %self.id, ip = %event.ip, city = %event.city, "Page opened");
        report::report_best_effort(self.reporter.as_ref(), &event).await;

        location
    }

    /// Address submission: acknowledge, report, then reveal on a timer.
    /// The report outcome never changes the transitions.
    pub async fn submit_address(&self, address: &str) -> SubmitOutcome {
        if address.trim().is_empty() {
            tracing::debug!(session = %self.id, "Ignoring empty address");
            return SubmitOutcome::Rejected(SubmitRejection::EmptyAddress);
        }

        let permit = match self.begin_submission() {
            Ok(permit) => permit,
            Err(reason) => return SubmitOutcome::Rejected(reason),
        };

        self.transition(ViewState::acknowledge);

        let cached = self.opened_location().await;
        let event = EventDraft::address_received(address.to_string()).into_event(cached);
        tracing::info!(session = %self.id, "Address received");
        let delivered = report::report_best_effort(self.reporter.as_ref(), &event).await;

        tokio::time::sleep(self.config.acknowledge_for).await;
        self.transition(ViewState::dismiss_notification);

        tokio::time::sleep(self.config.reveal_after).await;
        self.transition(ViewState::reveal);

        drop(permit);
        SubmitOutcome::Revealed { delivered }
    }

    /// Skip the address form: report and reveal right away
    pub async fn skip(&self) -> SubmitOutcome {
        let permit = match self.begin_submission() {
            Ok(permit) => permit,
            Err(reason) => return SubmitOutcome::Rejected(reason),
        };

        let cached = self.opened_location().await;
        let event = EventDraft::skipped().into_event(cached);
        tracing::info!(session = %self.id, "Address skipped");
        let delivered = report::report_best_effort(self.reporter.as_ref(), &event).await;

        self.transition(ViewState::reveal);

        drop(permit);
        SubmitOutcome::Revealed { delivered }
    }

    fn begin_submission(&self) -> Result<SubmissionPermit, SubmitRejection> {
        let Some(permit) = self.guard.try_acquire() else {
            tracing::debug!(session = %self.id, "Dropping duplicate submission");
            return Err(SubmitRejection::InFlight);
        };

        if !self.snapshot().view.accepts_address() {
            tracing::debug!(session = %self.id, "Submission after reveal ignored");
            return Err(SubmitRejection::AlreadyRevealed);
        }

        Ok(permit)
    }

    /// Apply a view transition and publish it. Invalid transitions leave the
    /// view untouched.
    fn transition(&self, step: fn(ViewState) -> Result<ViewState, TransitionError>) {
        let id = &self.id;
        self.snapshot.send_if_modified(|snapshot| match step(snapshot.view) {
            Ok(next) => {
                tracing::debug!(session = %id, from = ?snapshot.view, to = ?next, "View transition");
                snapshot.view = next;
                true
            }
            Err(e) => {
                tracing::warn!(session = %id, "{}", e);
                false
            }
        });
    }

    fn set_audio(&self, next: AudioState) {
        self.snapshot.send_if_modified(|snapshot| {
            let changed = snapshot.audio != next;
            snapshot.audio = next;
            changed
        });
    }

    /// Start the background track after the user tapped the music prompt
    pub async fn start_music(&self) -> Result<(), PlaybackError> {
        let _op = self.audio_op.lock().await;

        match self.audio.start(self.snapshot().audio).await {
            Ok(next) => {
                self.set_audio(next);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %self.id, "Music play error: {}", e);
                Err(e)
            }
        }
    }

    pub async fn toggle_music(&self) {
        let _op = self.audio_op.lock().await;

        let next = self.audio.toggle(self.snapshot().audio).await;
        self.set_audio(next);
    }
}
