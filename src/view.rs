use crate::capture::PacketLog;
use crate::group::{GroupIndex, GroupKey, GroupSummary};
use crate::packet::Packet;
use std::sync::Arc;
use tracing::debug;


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    #[default]
    Flat,
    Grouped,
}

/// Snapshot of one group taken at drill time. It survives later log resets.
#[derive(Debug, Clone)]
pub struct DrilledGroup {
    pub key: GroupKey,
    pub packets: Vec<Arc<Packet>>,
}

#[derive(Debug, Clone)]
pub enum Visible {
    Packets(Vec<Arc<Packet>>),
    Groups(Vec<GroupSummary>),
}

/// Whichever log/index pair is authoritative for the current filter state.
#[derive(Debug, Clone, Copy)]
pub struct ViewSource<'a> {
    pub log: &'a PacketLog,
    pub index: &'a GroupIndex,
}

/// Display mode, drill-down and single-packet selection. Reads the capture
/// state, never mutates it.
#[derive(Debug, Default, Clone)]
pub struct ViewCoordinator {
    mode: DisplayMode,
    drilled: Option<DrilledGroup>,
    selected: Option<Arc<Packet>>,
}

impl ViewCoordinator {
    pub fn new(mode: DisplayMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn drilled(&self) -> Option<&DrilledGroup> {
        self.drilled.as_ref()
    }

    pub fn selected(&self) -> Option<&Arc<Packet>> {
        self.selected.as_ref()
    }

    pub fn switch_mode(&mut self) -> DisplayMode {
        self.mode = match self.mode {
            DisplayMode::Flat => DisplayMode::Grouped,
            DisplayMode::Grouped => DisplayMode::Flat,
        };
        self.drilled = None;
        self.selected = None;
        debug!(mode = ?self.mode, "Switched display mode");
        self.mode
    }

    /// Returns whether the drill-down changed. Unknown keys (and any drill in
    /// flat mode) leave the current state as it was.
    pub fn drill_into(&mut self, key: &GroupKey, source: ViewSource<'_>) -> bool {
        if self.mode != DisplayMode::Grouped {
            debug!(%key, "Ignoring drill-down outside grouped mode");
            return false;
        }
        match source.index.members(key, source.log.arena()) {
            Some(packets) => {
                debug!(%key, packets = packets.len(), "Drilled into group");
                self.drilled = Some(DrilledGroup { key: *key, packets });
                true
            }
            None => {
                debug!(%key, "Group no longer exists; ignoring drill-down");
                false
            }
        }
    }

    pub fn reset_drill(&mut self) {
        self.drilled = None;
    }

    /// Toggles the selection. Returns whether `packet` is selected afterwards.
    pub fn select_packet(&mut self, packet: &Arc<Packet>) -> bool {
        let already = self
            .selected
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, packet));
        self.selected = if already { None } else { Some(Arc::clone(packet)) };
        !already
    }

    pub fn visible(&self, source: ViewSource<'_>) -> Visible {
        match (self.mode, &self.drilled) {
            (DisplayMode::Flat, _) => Visible::Packets(source.log.snapshot()),
            (DisplayMode::Grouped, Some(group)) => Visible::Packets(group.packets.clone()),
            (DisplayMode::Grouped, None) => Visible::Groups(source.index.summaries()),
        }
    }
}
