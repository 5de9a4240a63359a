use crate::backend::CaptureBackend;
use crate::capture::CaptureSession;
use crate::error::SessionError;
use crate::packet::Packet;
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(test)]
mod tests;

/// Owns the current filter expression and the sequence of side effects a
/// change of expression triggers.
#[derive(Debug, Default, Clone)]
pub struct FilterController {
    expression: String,
}

impl FilterController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whitespace-only expressions count as no filter.
    pub fn is_active(&self) -> bool {
        !self.expression.trim().is_empty()
    }

    /// Validates `expression` with the backend and, once accepted, resets the
    /// capture state around it.
    ///
    /// A rejected expression leaves everything untouched. After acceptance the
    /// expression stays updated even if a later step fails; a restart failure
    /// takes precedence over a re-filter failure in the returned error.
    pub fn apply<B: CaptureBackend + ?Sized>(
        &mut self,
        expression: &str,
        capture: &mut CaptureSession,
        backend: &mut B,
    ) -> Result<(), SessionError> {
        backend.set_filter(expression).map_err(SessionError::Filter)?;

        let was_active = self.is_active();
        self.expression = expression.to_string();
        info!(
            expression,
            was_active,
            capturing = capture.is_active(),
            "Filter accepted"
        );

        // Taken before a restart clears the log it is drawn from.
        let snapshot = capture.unfiltered().snapshot();

        if !self.is_active() {
            capture.clear_filtered();
        }

        let restart = if capture.is_active() {
            restart_capture(capture, backend)
        } else {
            Ok(())
        };

        let refilter = if self.is_active() {
            self.refilter(snapshot, capture, &*backend)
        } else {
            Ok(())
        };

        if was_active != self.is_active() {
            capture.rebuild_indices();
        }

        restart.and(refilter)
    }

    fn refilter<B: CaptureBackend + ?Sized>(
        &self,
        snapshot: Vec<Arc<Packet>>,
        capture: &mut CaptureSession,
        backend: &B,
    ) -> Result<(), SessionError> {
        match backend.filter_packets(&snapshot, &self.expression) {
            Ok(packets) => {
                info!(
                    expression = %self.expression,
                    input = snapshot.len(),
                    matched = packets.len(),
                    "Re-filtered existing packets"
                );
                capture.replace_filtered(packets);
                Ok(())
            }
            Err(e) => {
                warn!(
                    expression = %self.expression,
                    error = %e,
                    "Re-filter failed; keeping previous filtered packets"
                );
                Err(SessionError::Refilter(e))
            }
        }
    }
}

/// Stop, drop the unfiltered log, start again under a fresh epoch. A failed
/// stop leaves the old capture running but no longer accepted.
fn restart_capture<B: CaptureBackend + ?Sized>(
    capture: &mut CaptureSession,
    backend: &mut B,
) -> Result<(), SessionError> {
    if let Err(e) = capture.stop(backend) {
        capture.retire_epoch();
        return Err(e);
    }
    capture.clear_unfiltered();
    capture.start(backend)
}
