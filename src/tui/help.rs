use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

pub fn render(f: &mut ratatui::Frame, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Magenta));
    let lines = vec![
        Line::from("Keybinds:"),
        Line::from(vec![Span::raw("  "), key("Tab / Shift-Tab"), Span::raw("  move between form fields")]),
        Line::from(vec![Span::raw("  "), key("Enter"), Span::raw("            new line in the IDs field, submit elsewhere")]),
        Line::from(vec![Span::raw("  "), key("Ctrl-s"), Span::raw("           submit the form")]),
        Line::from(vec![Span::raw("  "), key("PgUp / PgDn"), Span::raw("      scroll the feed")]),
        Line::from(vec![Span::raw("  "), key("F1"), Span::raw("               toggle this help")]),
        Line::from(vec![Span::raw("  "), key("Esc / Ctrl-c"), Span::raw("     quit")]),
        Line::from(""),
        Line::from("Submitting starts a new processing run: the feed is cleared,"),
        Line::from("the previous session's channel is released, and updates for the"),
        Line::from("new session stream in as they arrive."),
    ];
    let help = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}
