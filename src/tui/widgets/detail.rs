use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};

use crate::packet::Packet;
use crate::tui::theme::flexoki;
use crate::tui::to_color;

const HEX_PREVIEW: usize = 32;

/// Layer-by-layer breakdown of one packet followed by a hex preview.
pub fn detail_lines(packet: &Packet) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for layer in packet.layer_fields() {
        lines.push(Line::from(Span::styled(
            layer.title,
            Style::default()
                .fg(to_color(flexoki::BLUE_400))
                .add_modifier(Modifier::BOLD),
        )));
        for (name, value) in layer.fields {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  {name}: "),
                    Style::default().fg(to_color(flexoki::BASE_500)),
                ),
                Span::raw(value),
            ]));
        }
    }

    let mut hex: String = packet
        .data
        .iter()
        .take(HEX_PREVIEW)
        .map(|b| format!("{b:02X} "))
        .collect();
    if packet.data.len() > HEX_PREVIEW {
        hex.push_str("...");
    }
    lines.push(Line::from(Span::styled(
        hex,
        Style::default().fg(to_color(flexoki::BASE_300)),
    )));
    lines
}
