use serde::{Deserialize, Serialize};

/// Sub-steps of the landing view while an address submission plays out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandingPhase {
    /// Address form is shown and accepts input
    Form,
    /// Acknowledgment banner is shown
    Acknowledging,
    /// Banner gone, waiting for the reveal
    Leaving,
}

/// Which view the page renders. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", content = "phase", rename_all = "snake_case")]
pub enum ViewState {
    Landing(LandingPhase),
    Revealed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Invalid view transition: cannot {action} from {from:?}")]
    Invalid {
        from: ViewState,
        action: &'static str,
    },

    #[error("View is already revealed")]
    AlreadyRevealed,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState::Landing(LandingPhase::Form)
    }
}

impl ViewState {
    pub fn is_revealed(&self) -> bool {
        matches!(self, ViewState::Revealed)
    }

    pub fn accepts_address(&self) -> bool {
        matches!(self, ViewState::Landing(LandingPhase::Form))
    }

    pub fn notification_visible(&self) -> bool {
        matches!(self, ViewState::Landing(LandingPhase::Acknowledging))
    }

    /// Form -> Acknowledging
    pub fn acknowledge(self) -> Result<Self, TransitionError> {
        match self {
            ViewState::Landing(LandingPhase::Form) => {
                Ok(ViewState::Landing(LandingPhase::Acknowledging))
            }
            ViewState::Revealed => Err(TransitionError::AlreadyRevealed),
            from => Err(TransitionError::Invalid {
                from,
                action: "acknowledge",
            }),
        }
    }

    /// Acknowledging -> Leaving
    pub fn dismiss_notification(self) -> Result<Self, TransitionError> {
        match self {
            ViewState::Landing(LandingPhase::Acknowledging) => {
                Ok(ViewState::Landing(LandingPhase::Leaving))
            }
            ViewState::Revealed => Err(TransitionError::AlreadyRevealed),
            from => Err(TransitionError::Invalid {
                from,
                action: "dismiss notification",
            }),
        }
    }

    /// Any landing phase -> Revealed
    pub fn reveal(self) -> Result<Self, TransitionError> {
        match self {
            ViewState::Landing(_) => Ok(ViewState::Revealed),
            ViewState::Revealed => Err(TransitionError::AlreadyRevealed),
        }
    }
}
