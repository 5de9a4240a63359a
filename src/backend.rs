//! Boundary between the session core and whatever produces packets.
//!
//! The core only ever sees [`CaptureBackend`] and the [`PacketSink`] it hands
//! to the backend on every start. Pushes travel over an mpsc channel and are
//! stamped with the capture epoch the sink was created for, which lets the
//! session discard packets that belong to a capture it already stopped.

use crate::packet::Packet;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;

pub mod decoder;
pub mod expr;
pub mod replay;

#[cfg(test)]
mod tests;

pub use expr::{FilterExpr, FilterSyntaxError};
pub use replay::{ReplayBackend, ReplayOptions};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    InvalidFilter(#[from] FilterSyntaxError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("capture worker panicked")]
    WorkerPanicked,
}

/// Operations the session consumes from a capture engine.
pub trait CaptureBackend {
    /// Begins pushing packets through `sink` until [`stop_capture`] returns.
    ///
    /// [`stop_capture`]: CaptureBackend::stop_capture
    fn start_capture(&mut self, sink: PacketSink) -> Result<(), BackendError>;

    /// Once this returns `Ok`, the sink from the matching start is never
    /// pushed to again.
    fn stop_capture(&mut self) -> Result<(), BackendError>;

    /// Validates and stores `expression` for the next capture.
    fn set_filter(&mut self, expression: &str) -> Result<(), BackendError>;

    /// One-shot evaluation of `expression` over an existing snapshot.
    fn filter_packets(
        &self,
        packets: &[Arc<Packet>],
        expression: &str,
    ) -> Result<Vec<Arc<Packet>>, BackendError>;
}

#[derive(Debug)]
pub enum CaptureEventKind {
    Packet(Packet),
    Finished,
    Failed(String),
}

#[derive(Debug)]
pub struct CaptureEvent {
    pub epoch: u64,
    pub kind: CaptureEventKind,
}

#[derive(Debug, Clone)]
pub struct PacketSink {
    epoch: u64,
    tx: Sender<CaptureEvent>,
}

impl PacketSink {
    pub fn new(epoch: u64, tx: Sender<CaptureEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns false once the session side has hung up.
    pub fn push(&self, packet: Packet) -> bool {
        self.send(CaptureEventKind::Packet(packet))
    }

    pub fn finished(&self) -> bool {
        self.send(CaptureEventKind::Finished)
    }

    pub fn failed(&self, message: impl Into<String>) -> bool {
        self.send(CaptureEventKind::Failed(message.into()))
    }

    fn send(&self, kind: CaptureEventKind) -> bool {
        self.tx
            .send(CaptureEvent {
                epoch: self.epoch,
                kind,
            })
            .is_ok()
    }
}
