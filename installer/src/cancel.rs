//! Cooperative cancellation shared between the signal handler and a run.

use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable flag checked between pipeline phases and install steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes the request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Return whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Route Ctrl-C to `token` instead of terminating the process.
///
/// # Errors
///
/// Returns [`ctrlc::Error`] if a handler was already installed or the
/// signal disposition could not be changed.
pub fn install_sigint_handler(token: &CancelToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        debug!("interrupt received; cancelling");
        token.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn handler_can_only_be_installed_once() {
        let token = CancelToken::new();
        install_sigint_handler(&token).expect("first handler");
        assert!(install_sigint_handler(&token).is_err());
        assert!(!token.is_cancelled());
    }
}
