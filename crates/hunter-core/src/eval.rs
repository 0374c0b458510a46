//! Evaluation-server client boundary.
//!
//! The engine tracks login/submit state opaquely; the actual network
//! calls are someone else's problem. [`NullEvalServerClient`] keeps the
//! state machine exercisable (and is what [`crate::engine::Engine`] uses
//! by default) without pulling in an HTTP stack.

use crate::error::{HunterError, Result};
use crate::ids::FrameId;

/// Outcome of a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    /// The server accepted the frame as correct.
    Correct,
    /// The server rejected the frame as incorrect.
    Incorrect,
    /// The server rejected the submission itself as not authorized (the
    /// session was logged in locally but the server's own check failed).
    NotAuthorized,
}

/// A remote evaluation server session.
pub trait EvalServerClient {
    /// Attempts to log in with `user_token`.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::TransientIoFailure`] if the server is
    /// unreachable, or [`HunterError::NotAuthorized`] if the token is
    /// rejected.
    fn login(&mut self, user_token: &str) -> Result<()>;

    /// Logs out. Idempotent.
    fn logout(&mut self);

    /// Submits `frame_id` as the current known-item answer.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::NotAuthorized`] if not logged in.
    fn submit(&mut self, frame_id: FrameId) -> Result<SubmitResult>;

    /// Whether a login has succeeded and not since been logged out.
    fn is_logged_in(&self) -> bool;
}

/// A client with no backing server: `login` always fails with
/// [`HunterError::TransientIoFailure`], and `submit` always fails with
/// [`HunterError::NotAuthorized`]. This is the default the engine runs
/// with when no `eval_server_url` is configured.
#[derive(Debug, Default)]
pub struct NullEvalServerClient;

impl EvalServerClient for NullEvalServerClient {
    fn login(&mut self, _user_token: &str) -> Result<()> {
        Err(HunterError::TransientIoFailure("no evaluation server configured".into()))
    }

    fn logout(&mut self) {}

    fn submit(&mut self, _frame_id: FrameId) -> Result<SubmitResult> {
        Err(HunterError::NotAuthorized)
    }

    fn is_logged_in(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_client_rejects_every_action() {
        let mut client = NullEvalServerClient;
        assert!(client.login("token").is_err());
        assert!(client.submit(FrameId::new(0)).is_err());
        assert!(!client.is_logged_in());
    }
}
