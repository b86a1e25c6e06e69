//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::app::{App, Pane};
use super::compose;
use super::messages;
use super::sidebar;
use crate::chat::ToastLevel;

const SIDEBAR_WIDTH: u16 = 30;

/// Connection dot and color.
fn link_indicator(up: bool) -> (&'static str, Color) {
    if up {
        ("\u{25CF}", Color::Green)
    } else {
        ("\u{25CB}", Color::Red)
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);

    let [sidebar_area, content_area] =
        Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Fill(1)])
            .areas(main_area);

    sidebar::render(
        sidebar_area,
        frame.buffer_mut(),
        &app.sidebar,
        app.active_pane == Pane::Sidebar,
    );

    let [messages_area, compose_area] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
    ])
    .areas(content_area);

    messages::render(
        messages_area,
        frame.buffer_mut(),
        &app.messages,
        app.active_pane == Pane::Messages,
    );

    compose::render(
        compose_area,
        frame,
        &app.compose,
        app.active_name(),
        app.active_pane == Pane::Compose,
    );

    render_status(status_area, frame.buffer_mut(), app);
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = " Supervisor Chat";
    let (socket_symbol, socket_color) = link_indicator(app.socket_connected);
    let (push_symbol, push_color) = if app.pubsub_enabled {
        ("\u{25CF}", Color::Green)
    } else {
        ("-", Color::DarkGray)
    };
    let unread = app.sidebar.total_unread();

    let mut right = vec![
        Span::styled(
            format!(" {} socket ", socket_symbol),
            Style::default().fg(socket_color),
        ),
        Span::styled(
            format!(" {} push ", push_symbol),
            Style::default().fg(push_color),
        ),
    ];
    if unread > 0 {
        right.push(Span::styled(
            format!(" {} unread ", unread),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }
    right.push(Span::styled(
        format!(" {} ", app.coordinator),
        Style::default().fg(Color::Cyan),
    ));

    let right_width: usize = right.iter().map(|s| s.content.width()).sum();
    let padding = (area.width as usize).saturating_sub(title.len() + right_width);

    let mut spans = vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
    ];
    spans.extend(right);

    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    if let Some((ref toast, _)) = app.toast {
        let color = match toast.level {
            ToastLevel::Info => Color::Green,
            ToastLevel::Warning => Color::Yellow,
            ToastLevel::Error => Color::Red,
        };
        let line = Line::from(Span::styled(
            format!(" {} ", toast.text),
            Style::default().fg(color).bg(Color::DarkGray),
        ));
        Paragraph::new(line)
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let sep = Span::styled(" | ", Style::default().fg(Color::Gray));
    let hint = Style::default().fg(Color::Gray);
    let line = Line::from(vec![
        Span::styled(
            format!(" Tab: {} ", app.active_pane.as_str()),
            Style::default().fg(Color::Cyan),
        ),
        sep.clone(),
        Span::styled("Enter: open/send", hint),
        sep.clone(),
        Span::styled("PgUp/PgDn: scroll", hint),
        sep.clone(),
        Span::styled("r: reload", hint),
        sep,
        Span::styled("Esc: quit", hint),
    ]);
    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatUpdate, Toast};
    use ratatui::{backend::TestBackend, Terminal};

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buf = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buf.area.height {
            for x in 0..buf.area.width {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_header_and_hints() {
        let app = App::new("C1", false);
        let text = screen(&app);
        assert!(text.contains("Supervisor Chat"));
        assert!(text.contains("socket"));
        assert!(text.contains("C1"));
        assert!(text.contains("Esc: quit"));
    }

    #[test]
    fn test_toast_replaces_hints() {
        let mut app = App::new("C1", true);
        app.apply(ChatUpdate::Toast(Toast::warning("Sem conexão")));
        let text = screen(&app);
        assert!(text.contains("Sem conexão"));
        assert!(!text.contains("Esc: quit"));
    }
}
