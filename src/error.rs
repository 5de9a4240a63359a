use crate::backend::BackendError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureAction {
    Start,
    Stop,
}

/// Errors surfaced to whoever drives the session.
///
/// Malformed packets and stale group references are not errors: the first is
/// dropped with a diagnostic, the second is a no-op.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backend rejected the filter expression. Nothing was changed.
    #[error("invalid filter: {0}")]
    Filter(#[source] BackendError),
    /// The capture flag still reflects the last successful transition.
    #[error("failed to {action} capture: {source}")]
    CaptureTransition {
        action: CaptureAction,
        #[source]
        source: BackendError,
    },
    /// The filtered log keeps its previous contents.
    #[error("re-filter failed: {0}")]
    Refilter(#[source] BackendError),
}

impl SessionError {
    pub fn transition(action: CaptureAction) -> impl FnOnce(BackendError) -> Self {
        move |source| SessionError::CaptureTransition { action, source }
    }
}

impl fmt::Display for CaptureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureAction::Start => write!(f, "start"),
            CaptureAction::Stop => write!(f, "stop"),
        }
    }
}
