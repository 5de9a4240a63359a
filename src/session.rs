use crate::backend::{CaptureBackend, CaptureEvent, CaptureEventKind};
use crate::capture::{CaptureSession, Ingest, PacketLog};
use crate::error::SessionError;
use crate::filter::FilterController;
use crate::group::{GroupIndex, GroupKey};
use crate::packet::Packet;
use crate::view::{DisplayMode, DrilledGroup, ViewCoordinator, ViewSource, Visible};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use tracing::{debug, info, trace, warn};


/// What one [`Session::poll`] drained from the backend channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub unfiltered: usize,
    pub filtered: usize,
    pub rejected: usize,
    /// Pushes from a stopped or superseded capture.
    pub dropped: usize,
    pub finished: bool,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub capturing: bool,
    pub filter_active: bool,
    pub unfiltered_packets: usize,
    pub filtered_packets: usize,
    pub unfiltered_groups: usize,
    pub filtered_groups: usize,
}

/// The single owner of all packet stream state.
///
/// Every mutation goes through `&mut self`, so a filter change or capture
/// transition always runs to completion before the next push is ingested.
pub struct Session<B: CaptureBackend> {
    backend: B,
    capture: CaptureSession,
    filter: FilterController,
    view: ViewCoordinator,
    events: Receiver<CaptureEvent>,
}

impl PollSummary {
    pub fn ingested(&self) -> usize {
        self.unfiltered + self.filtered
    }

    pub fn is_empty(&self) -> bool {
        self.ingested() == 0
            && self.rejected == 0
            && self.dropped == 0
            && !self.finished
            && self.failures.is_empty()
    }
}

impl<B: CaptureBackend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self::with_mode(backend, DisplayMode::Flat)
    }

    pub fn with_mode(backend: B, mode: DisplayMode) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            capture: CaptureSession::new(tx),
            filter: FilterController::new(),
            view: ViewCoordinator::new(mode),
            events: rx,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn start_capture(&mut self) -> Result<(), SessionError> {
        self.capture.start(&mut self.backend)
    }

    pub fn stop_capture(&mut self) -> Result<(), SessionError> {
        self.capture.stop(&mut self.backend)
    }

    pub fn toggle_capture(&mut self) -> Result<(), SessionError> {
        if self.capture.is_active() {
            self.stop_capture()
        } else {
            self.start_capture()
        }
    }

    pub fn apply_filter(&mut self, expression: &str) -> Result<(), SessionError> {
        self.filter
            .apply(expression, &mut self.capture, &mut self.backend)
    }

    /// Routes one packet by the current filter state. Bypasses the epoch
    /// check, so callers feeding packets directly own their ordering.
    pub fn ingest(&mut self, packet: Packet) -> Ingest {
        self.capture.ingest(packet, self.filter.is_active())
    }

    /// Drains every pending backend event without blocking.
    pub fn poll(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();
        while let Ok(event) = self.events.try_recv() {
            self.dispatch(event, &mut summary);
        }
        if !summary.is_empty() {
            trace!(?summary, "Drained capture events");
        }
        summary
    }

    fn dispatch(&mut self, event: CaptureEvent, summary: &mut PollSummary) {
        if !self.capture.accepts(event.epoch) {
            debug!(
                epoch = event.epoch,
                current = self.capture.epoch(),
                capturing = self.capture.is_active(),
                "Dropping event from inactive capture"
            );
            summary.dropped += 1;
            return;
        }

        match event.kind {
            CaptureEventKind::Packet(packet) => match self.ingest(packet) {
                Ingest::Unfiltered => summary.unfiltered += 1,
                Ingest::Filtered => summary.filtered += 1,
                Ingest::Rejected => summary.rejected += 1,
            },
            CaptureEventKind::Finished => {
                info!(epoch = event.epoch, "Capture source exhausted");
                summary.finished = true;
            }
            CaptureEventKind::Failed(message) => {
                warn!(epoch = event.epoch, error = %message, "Capture worker failed");
                summary.failures.push(message);
            }
        }
    }

    pub fn switch_mode(&mut self) -> DisplayMode {
        let mode = self.view.switch_mode();
        if mode == DisplayMode::Grouped {
            self.capture.rebuild_indices();
        }
        mode
    }

    pub fn drill_into(&mut self, key: &GroupKey) -> bool {
        let (log, index) = self.capture.authoritative(self.filter.is_active());
        self.view.drill_into(key, ViewSource { log, index })
    }

    pub fn reset_drill(&mut self) {
        self.view.reset_drill();
    }

    pub fn select_packet(&mut self, packet: &Arc<Packet>) -> bool {
        self.view.select_packet(packet)
    }

    pub fn visible(&self) -> Visible {
        self.view.visible(self.source())
    }

    fn source(&self) -> ViewSource<'_> {
        let (log, index) = self.capture.authoritative(self.filter.is_active());
        ViewSource { log, index }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_active()
    }

    pub fn filter_expression(&self) -> &str {
        self.filter.expression()
    }

    pub fn filter_active(&self) -> bool {
        self.filter.is_active()
    }

    pub fn mode(&self) -> DisplayMode {
        self.view.mode()
    }

    pub fn drilled_group(&self) -> Option<&DrilledGroup> {
        self.view.drilled()
    }

    pub fn selected_packet(&self) -> Option<&Arc<Packet>> {
        self.view.selected()
    }

    pub fn unfiltered(&self) -> &PacketLog {
        self.capture.unfiltered()
    }

    pub fn filtered(&self) -> &PacketLog {
        self.capture.filtered()
    }

    pub fn unfiltered_index(&self) -> &GroupIndex {
        self.capture.unfiltered_index()
    }

    pub fn filtered_index(&self) -> &GroupIndex {
        self.capture.filtered_index()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            capturing: self.capture.is_active(),
            filter_active: self.filter.is_active(),
            unfiltered_packets: self.capture.unfiltered().len(),
            filtered_packets: self.capture.filtered().len(),
            unfiltered_groups: self.capture.unfiltered_index().len(),
            filtered_groups: self.capture.filtered_index().len(),
        }
    }
}
