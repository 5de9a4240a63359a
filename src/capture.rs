use crate::backend::{CaptureBackend, CaptureEvent, PacketSink};
use crate::error::{CaptureAction, SessionError};
use crate::group::GroupIndex;
use crate::packet::Packet;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};

pub mod log;


pub use log::PacketLog;

/// Which log an ingested packet ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Unfiltered,
    Filtered,
    Rejected,
}

/// Capture on/off state plus the two live logs and their group indices.
///
/// Exactly one log is writable at a time, chosen per packet by whether a
/// filter is active. Each index is rebuilt inside the same call that mutates
/// its log.
#[derive(Debug)]
pub struct CaptureSession {
    active: bool,
    epoch: u64,
    events: Sender<CaptureEvent>,
    unfiltered: PacketLog,
    unfiltered_index: GroupIndex,
    filtered: PacketLog,
    filtered_index: GroupIndex,
}

impl CaptureSession {
    pub fn new(events: Sender<CaptureEvent>) -> Self {
        Self {
            active: false,
            epoch: 0,
            events,
            unfiltered: PacketLog::new(),
            unfiltered_index: GroupIndex::default(),
            filtered: PacketLog::new(),
            filtered_index: GroupIndex::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Opens a new capture epoch. The flag only flips once the backend
    /// confirms.
    pub fn start<B: CaptureBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<(), SessionError> {
        let epoch = self.epoch + 1;
        backend
            .start_capture(PacketSink::new(epoch, self.events.clone()))
            .map_err(SessionError::transition(CaptureAction::Start))?;
        self.epoch = epoch;
        self.active = true;
        info!(epoch, "Capture started");
        Ok(())
    }

    pub fn stop<B: CaptureBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), SessionError> {
        backend
            .stop_capture()
            .map_err(SessionError::transition(CaptureAction::Stop))?;
        self.active = false;
        info!(
            epoch = self.epoch,
            unfiltered = self.unfiltered.len(),
            filtered = self.filtered.len(),
            "Capture stopped"
        );
        Ok(())
    }

    /// Stops accepting pushes from the running capture without stopping it.
    /// Used when a restart could not stop the backend, so packets captured
    /// under the previous filter never reach a log built for the new one.
    pub fn retire_epoch(&mut self) {
        let retired = self.epoch;
        self.epoch += 1;
        warn!(retired, epoch = self.epoch, "Retired capture epoch");
    }

    /// Whether a push stamped with `epoch` belongs to the running capture.
    pub fn accepts(&self, epoch: u64) -> bool {
        self.active && epoch == self.epoch
    }

    pub fn ingest(&mut self, packet: Packet, filter_active: bool) -> Ingest {
        if packet.is_malformed() {
            warn!(
                number = packet.number,
                length = packet.length,
                "Dropping packet without a network layer"
            );
            return Ingest::Rejected;
        }

        let packet = Arc::new(packet);
        if filter_active {
            self.filtered.prepend(packet);
            self.filtered_index = GroupIndex::build(self.filtered.arena());
            Ingest::Filtered
        } else {
            self.unfiltered.prepend(packet);
            self.unfiltered_index = GroupIndex::build(self.unfiltered.arena());
            Ingest::Unfiltered
        }
    }

    pub fn clear_unfiltered(&mut self) {
        debug!(discarded = self.unfiltered.len(), "Clearing unfiltered log");
        self.unfiltered.clear();
        self.unfiltered_index = GroupIndex::default();
    }

    pub fn clear_filtered(&mut self) {
        debug!(discarded = self.filtered.len(), "Clearing filtered log");
        self.filtered.clear();
        self.filtered_index = GroupIndex::default();
    }

    /// Installs a bulk re-filter result, kept in the order it was given.
    pub fn replace_filtered(&mut self, packets: Vec<Arc<Packet>>) {
        self.filtered = PacketLog::from_newest_first(packets);
        self.filtered_index = GroupIndex::build(self.filtered.arena());
    }

    pub fn rebuild_indices(&mut self) {
        self.unfiltered_index = GroupIndex::build(self.unfiltered.arena());
        self.filtered_index = GroupIndex::build(self.filtered.arena());
    }

    pub fn unfiltered(&self) -> &PacketLog {
        &self.unfiltered
    }

    pub fn unfiltered_index(&self) -> &GroupIndex {
        &self.unfiltered_index
    }

    pub fn filtered(&self) -> &PacketLog {
        &self.filtered
    }

    pub fn filtered_index(&self) -> &GroupIndex {
        &self.filtered_index
    }

    /// The log/index pair the view should read from.
    pub fn authoritative(&self, filter_active: bool) -> (&PacketLog, &GroupIndex) {
        if filter_active {
            (&self.filtered, &self.filtered_index)
        } else {
            (&self.unfiltered, &self.unfiltered_index)
        }
    }
}
