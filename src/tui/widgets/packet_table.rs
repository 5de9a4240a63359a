use ratatui::{
    layout::Constraint,
    style::{Modifier, Style},
    widgets::{Cell, Row},
};
use std::sync::Arc;

use crate::group::{GroupKey, GroupSummary};
use crate::packet::Packet;
use crate::tui::theme::flexoki;
use crate::tui::to_color;
use crate::view::Visible;

/// What a table row points back to.
#[derive(Debug, Clone)]
pub enum RowTarget {
    Packet(Arc<Packet>),
    Group(GroupKey),
}

/// Rows for the current view, plus the target behind each row index.
pub struct VisibleTable {
    pub header: Row<'static>,
    pub rows: Vec<Row<'static>>,
    pub widths: Vec<Constraint>,
    pub targets: Vec<RowTarget>,
}

impl VisibleTable {
    pub fn build(visible: &Visible, selected: Option<&Arc<Packet>>) -> Self {
        match visible {
            Visible::Packets(packets) => Self::packets(packets, selected),
            Visible::Groups(groups) => Self::groups(groups),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn packets(packets: &[Arc<Packet>], selected: Option<&Arc<Packet>>) -> Self {
        let mut rows = Vec::with_capacity(packets.len());
        let mut targets = Vec::with_capacity(packets.len());

        for packet in packets {
            let (source, destination) = match packet.endpoints() {
                Some((src, dst)) => (src.to_string(), dst.to_string()),
                None => (String::new(), String::new()),
            };
            let (source_port, destination_port) = match packet.ports() {
                Some((sp, dp)) => (sp.to_string(), dp.to_string()),
                None => (String::new(), String::new()),
            };
            let mut row = Row::new(vec![
                Cell::from(packet.number.to_string()),
                Cell::from(format_timestamp(packet.timestamp)),
                Cell::from(source),
                Cell::from(source_port),
                Cell::from(destination),
                Cell::from(destination_port),
                Cell::from(packet.protocol_label()),
                Cell::from(packet.length.to_string()),
            ]);
            if selected.is_some_and(|s| Arc::ptr_eq(s, packet)) {
                row = row.style(
                    Style::default()
                        .fg(to_color(flexoki::CYAN_400))
                        .add_modifier(Modifier::BOLD),
                );
            }
            rows.push(row);
            targets.push(RowTarget::Packet(Arc::clone(packet)));
        }

        Self {
            header: header(&[
                "No.", "Timestamp", "Src IP", "Src Port", "Dst IP", "Dst Port", "Protocol", "Length",
            ]),
            rows,
            widths: vec![
                Constraint::Length(7),
                Constraint::Length(18),
                Constraint::Min(15),
                Constraint::Length(8),
                Constraint::Min(15),
                Constraint::Length(8),
                Constraint::Length(8),
                Constraint::Length(7),
            ],
            targets,
        }
    }

    fn groups(groups: &[GroupSummary]) -> Self {
        let rows = groups
            .iter()
            .map(|group| {
                Row::new(vec![
                    Cell::from(group.key.source.to_string()),
                    Cell::from(group.key.destination.to_string()),
                    Cell::from(group.packets.to_string()),
                ])
            })
            .collect();

        Self {
            header: header(&["Source", "Destination", "Packets"]),
            rows,
            widths: vec![Constraint::Min(20), Constraint::Min(20), Constraint::Length(10)],
            targets: groups.iter().map(|g| RowTarget::Group(g.key)).collect(),
        }
    }
}

fn header(titles: &[&'static str]) -> Row<'static> {
    Row::new(
        titles
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD))),
    )
    .height(1)
    .style(Style::default().bg(to_color(flexoki::BLUE_600)))
}

fn format_timestamp(timestamp: f64) -> String {
    format!("{:.6}", timestamp)
}
