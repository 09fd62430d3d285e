//! Live feed rendering: one line per update, local receipt time plus the
//! severity tag. Pure function of the current message list.

use crate::model::{Severity, UpdateMessage};
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

fn stamp(m: &UpdateMessage) -> String {
    let fmt = time::macros::format_description!("[hour]:[minute]:[second]");
    m.received_at
        .format(&fmt)
        .unwrap_or_else(|_| "--:--:--".into())
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Info => Style::default().fg(Color::Green),
        Severity::Error => Style::default().fg(Color::Red),
    }
}

pub fn render(
    f: &mut ratatui::Frame,
    area: Rect,
    messages: &[UpdateMessage],
    scroll_from_bottom: usize,
) {
    let visible = area.height.saturating_sub(2) as usize;
    let end = messages.len().saturating_sub(scroll_from_bottom);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = messages[start..end]
        .iter()
        .map(|m| {
            Line::from(vec![
                Span::styled(stamp(m), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::styled(format!("[{}]", m.severity.tag()), severity_style(m.severity)),
                Span::raw(" "),
                Span::raw(m.text.clone()),
            ])
        })
        .collect();

    let title = if messages.is_empty() {
        "Updates (waiting)".to_string()
    } else {
        format!("Updates ({})", messages.len())
    };
    let feed = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(feed, area);
}
