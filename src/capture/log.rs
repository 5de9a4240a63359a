use crate::packet::Packet;
use std::sync::Arc;

/// Append-only arena presented newest-first.
///
/// Packets are stored in arrival order so arena indices handed out to a
/// [`GroupIndex`](crate::group::GroupIndex) stay valid until the log is
/// cleared or replaced.
#[derive(Debug, Default, Clone)]
pub struct PacketLog {
    arena: Vec<Arc<Packet>>,
}

impl PacketLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a log whose newest-first view is exactly `packets`.
    pub fn from_newest_first(mut packets: Vec<Arc<Packet>>) -> Self {
        packets.reverse();
        Self { arena: packets }
    }

    /// Newest-first prepend; the arena itself only ever grows at the end.
    pub fn prepend(&mut self, packet: Arc<Packet>) {
        self.arena.push(packet);
    }

    pub fn clear(&mut self) {
        self.arena.clear();
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn arena(&self) -> &[Arc<Packet>] {
        &self.arena
    }

    pub fn newest_first(&self) -> impl ExactSizeIterator<Item = &Arc<Packet>> {
        self.arena.iter().rev()
    }

    pub fn snapshot(&self) -> Vec<Arc<Packet>> {
        self.newest_first().cloned().collect()
    }
}
