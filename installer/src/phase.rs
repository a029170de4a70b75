//! Install run state machine.
//!
//! A run moves `Pending -> Verifying -> Extracting -> Installing` and ends in
//! `Installed` or `RolledBack`. Any non-terminal phase may fail to
//! `RolledBack`; no transition skips verification.

use std::fmt;

/// Phase of a single install run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    /// Manifest accepted, nothing fetched yet.
    Pending,
    /// Artefact bytes are being fetched and checked.
    Verifying,
    /// Verified bytes are being unpacked into staging.
    Extracting,
    /// Install steps are being applied.
    Installing,
    /// Every step applied and the receipt written.
    Installed,
    /// The run failed and any partial effects were reverted.
    RolledBack,
}

impl InstallPhase {
    /// Return whether the phase is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Installed | Self::RolledBack)
    }

    /// Return whether moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Verifying)
                | (Self::Verifying, Self::Extracting)
                | (Self::Extracting, Self::Installing)
                | (Self::Installing, Self::Installed)
                | (
                    Self::Pending | Self::Verifying | Self::Extracting | Self::Installing,
                    Self::RolledBack
                )
        )
    }

    /// Return the lowercase label used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted transition that the state machine forbids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal phase transition {from} -> {to}")]
pub struct IllegalTransition {
    /// Phase the run was in.
    pub from: InstallPhase,
    /// Phase that was requested.
    pub to: InstallPhase,
}

/// Tracks the current phase and enforces legal transitions.
#[derive(Debug)]
pub struct PhaseTracker {
    current: InstallPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: InstallPhase::Pending,
        }
    }
}

impl PhaseTracker {
    /// Start a tracker in [`InstallPhase::Pending`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current phase.
    #[must_use]
    pub const fn current(&self) -> InstallPhase {
        self.current
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] and stays put when the move is not
    /// allowed.
    pub fn advance(&mut self, next: InstallPhase) -> Result<(), IllegalTransition> {
        if !self.current.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.current,
                to: next,
            });
        }
        log::debug!("phase {} -> {next}", self.current);
        self.current = next;
        Ok(())
    }
}
