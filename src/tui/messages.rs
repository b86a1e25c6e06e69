//! Messages pane: the active conversation as chat bubbles, newest at the
//! bottom.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::models::{DeliveryStatus, Message};

/// State for the messages pane.
#[derive(Default)]
pub struct MessagesState {
    /// Conversation header (contact name).
    pub header: String,
    /// Logged-in coordinator; decides bubble side.
    pub me: String,
    pub messages: Vec<Message>,
    /// Lines scrolled up from the bottom (0 = following newest).
    pub scroll_back: usize,
    /// A contact is selected but nothing has arrived for it yet.
    pub loading: bool,
}

impl MessagesState {
    /// Replace the conversation; any change jumps back to the newest message.
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        if messages != self.messages {
            self.scroll_back = 0;
        }
        self.messages = messages;
        self.loading = false;
    }

    /// Switch to a different conversation.
    pub fn open(&mut self, header: String) {
        self.header = header;
        self.messages.clear();
        self.scroll_back = 0;
        self.loading = true;
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }
}

/// Icon and style for a delivery status.
pub fn status_icon(status: DeliveryStatus) -> (&'static str, Style) {
    match status {
        DeliveryStatus::Sending => ("\u{2026}", Style::default().fg(Color::DarkGray)),
        DeliveryStatus::Sent => ("\u{2713}", Style::default().fg(Color::Gray)),
        DeliveryStatus::Delivered => ("\u{2713}\u{2713}", Style::default().fg(Color::Gray)),
        DeliveryStatus::Read => (
            "\u{2713}\u{2713}",
            Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
        ),
        DeliveryStatus::Failed => (
            "!",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn render(area: Rect, buf: &mut Buffer, state: &MessagesState, focused: bool) {
    let (border_style, border_type) = if focused {
        (Style::default().fg(Color::Yellow), BorderType::Double)
    } else {
        (Style::default().fg(Color::DarkGray), BorderType::Plain)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);
    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let header_area = Rect::new(inner.x, inner.y, inner.width, 1);
    let header = if state.header.is_empty() {
        "No conversation selected"
    } else {
        state.header.as_str()
    };
    Paragraph::new(Line::from(Span::styled(
        format!(" {} ", header),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    )))
    .style(Style::default().bg(Color::DarkGray))
    .render(header_area, buf);

    let body = Rect::new(
        inner.x,
        inner.y + 1,
        inner.width,
        inner.height.saturating_sub(1),
    );
    if body.height == 0 {
        return;
    }

    let lines = if state.messages.is_empty() {
        placeholder_lines(state)
    } else {
        build_message_lines(state, body.width as usize)
    };

    let visible = body.height as usize;
    let top = first_visible_line(lines.len(), visible, state.scroll_back);

    for (row, line) in lines.iter().skip(top).take(visible).enumerate() {
        let line_area = Rect::new(body.x, body.y + row as u16, body.width, 1);
        Paragraph::new(line.clone()).render(line_area, buf);
    }

    if lines.len() > visible {
        let x = body.x + body.width.saturating_sub(1);
        if top > 0 {
            let cell = &mut buf[(x, body.y)];
            cell.set_char('^');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
        if top + visible < lines.len() {
            let cell = &mut buf[(x, body.y + body.height - 1)];
            cell.set_char('v');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
    }
}

fn placeholder_lines(state: &MessagesState) -> Vec<Line<'static>> {
    let text = if state.header.is_empty() {
        "Pick a supervisor on the left to open the conversation."
    } else if state.loading {
        "Loading messages..."
    } else {
        "No messages yet. Say hello!"
    };
    vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", text),
            Style::default().fg(Color::DarkGray),
        )),
    ]
}

/// Index of the first line shown, given a scroll-back from the bottom.
fn first_visible_line(total: usize, visible: usize, scroll_back: usize) -> usize {
    let bottom = total.saturating_sub(visible);
    bottom.saturating_sub(scroll_back)
}

/// Lay out every message as a bubble; outgoing ones are right-aligned.
fn build_message_lines(state: &MessagesState, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let bubble_width = (width * 3 / 4).max(12).min(width.saturating_sub(1));

    for msg in &state.messages {
        if msg.is_empty {
            push_warning(&mut lines, msg, width);
            continue;
        }

        let outgoing = msg.is_from(&state.me);
        let time = msg
            .created_at
            .with_timezone(&chrono::Local)
            .format("%H:%M")
            .to_string();

        let body_style = if outgoing {
            Style::default().fg(Color::White).bg(Color::Rgb(0, 72, 96))
        } else {
            Style::default().fg(Color::White).bg(Color::Rgb(48, 48, 48))
        };

        let text_width = bubble_width.saturating_sub(2);
        let wrapped = wrap_text(&msg.content, text_width);
        let block_width = wrapped
            .iter()
            .map(|l| l.width())
            .max()
            .unwrap_or(0)
            .max(time.len() + 4)
            + 2;
        let indent = if outgoing {
            width.saturating_sub(block_width + 1)
        } else {
            1
        };

        for text in &wrapped {
            let pad = block_width.saturating_sub(text.width() + 1);
            lines.push(Line::from(vec![
                Span::raw(" ".repeat(indent)),
                Span::styled(format!(" {}{}", text, " ".repeat(pad)), body_style),
            ]));
        }

        // Footer: time, plus delivery status on our own messages.
        let mut footer = vec![Span::raw(" ".repeat(indent))];
        if outgoing {
            let (icon, icon_style) = status_icon(msg.status);
            let pad = block_width.saturating_sub(time.len() + icon.width() + 2);
            footer.push(Span::raw(" ".repeat(pad)));
            footer.push(Span::styled(
                format!("{} ", time),
                Style::default().fg(Color::DarkGray),
            ));
            footer.push(Span::styled(icon.to_string(), icon_style));
        } else {
            footer.push(Span::styled(
                format!(" {}", time),
                Style::default().fg(Color::DarkGray),
            ));
        }
        lines.push(Line::from(footer));
        lines.push(Line::from(""));
    }

    lines
}

fn push_warning(lines: &mut Vec<Line<'static>>, msg: &Message, width: usize) {
    let text = format!(" \u{26A0} {} ", msg.content);
    let indent = width.saturating_sub(text.width()) / 2;
    lines.push(Line::from(vec![
        Span::raw(" ".repeat(indent)),
        Span::styled(
            text,
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    ]));
    lines.push(Line::from(""));
}

/// Word-wrap by display width; explicit newlines are kept and overlong words
/// are split.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![];
    }
    let mut result = Vec::new();
    for line in text.lines() {
        let mut current = String::new();
        for word in line.split_whitespace() {
            let mut word = word.to_string();
            while word.width() > max_width {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                let mut head = String::new();
                let mut rest = String::new();
                for c in word.chars() {
                    if rest.is_empty() && head.width() + c.to_string().width() <= max_width {
                        head.push(c);
                    } else {
                        rest.push(c);
                    }
                }
                result.push(head);
                word = rest;
            }
            if current.is_empty() {
                current = word;
            } else if current.width() + 1 + word.width() <= max_width {
                current.push(' ');
                current.push_str(&word);
            } else {
                result.push(std::mem::replace(&mut current, word));
            }
        }
        result.push(current);
    }
    if result.is_empty() {
        result.push(String::new());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(buf: &Buffer) -> String {
        let area = buf.area;
        let mut out = String::new();
        for y in area.y..area.y + area.height {
            for x in area.x..area.x + area.width {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    fn state_with(messages: Vec<Message>) -> MessagesState {
        MessagesState {
            header: "Ana".to_string(),
            me: "C1".to_string(),
            messages,
            scroll_back: 0,
            loading: false,
        }
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("a b c", 3), vec!["a b", "c"]);
        assert_eq!(wrap_text("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(wrap_text("um\ndois", 10), vec!["um", "dois"]);
        assert_eq!(wrap_text("", 10), vec![""]);
        assert!(wrap_text("x", 0).is_empty());
    }

    #[test]
    fn test_status_icons() {
        assert_eq!(status_icon(DeliveryStatus::Sending).0, "\u{2026}");
        assert_eq!(status_icon(DeliveryStatus::Sent).0, "\u{2713}");
        assert_eq!(status_icon(DeliveryStatus::Delivered).0, "\u{2713}\u{2713}");
        let (read, read_style) = status_icon(DeliveryStatus::Read);
        assert_eq!(read, "\u{2713}\u{2713}");
        assert_eq!(read_style.fg, Some(Color::Blue));
        assert_eq!(status_icon(DeliveryStatus::Failed).0, "!");
    }

    #[test]
    fn test_first_visible_line_follows_bottom() {
        assert_eq!(first_visible_line(5, 10, 0), 0);
        assert_eq!(first_visible_line(30, 10, 0), 20);
        assert_eq!(first_visible_line(30, 10, 5), 15);
        assert_eq!(first_visible_line(30, 10, 100), 0);
    }

    #[test]
    fn test_newest_message_is_visible() {
        let messages: Vec<Message> = (0..20)
            .map(|i| {
                let mut m = Message::draft("S1", "C1", &format!("mensagem {}", i));
                m.created_at += chrono::Duration::seconds(i);
                m
            })
            .collect();
        let state = state_with(messages);
        let area = Rect::new(0, 0, 50, 12);
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &state, false);
        let text = text_of(&buf);
        assert!(text.contains("mensagem 19"));
        assert!(!text.contains("mensagem 0 "));
    }

    #[test]
    fn test_warning_bubble_and_own_status() {
        let mut mine = Message::draft("C1", "S1", "a caminho");
        mine.status = DeliveryStatus::Failed;
        let warning = Message::empty_warning("C1", "S1");
        let state = state_with(vec![mine, warning]);

        let area = Rect::new(0, 0, 60, 12);
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &state, true);
        let text = text_of(&buf);
        assert!(text.contains("a caminho"));
        assert!(text.contains("Mensagem vazia"));
        assert!(text.contains('!'));
    }

    #[test]
    fn test_mutation_scrolls_to_newest() {
        let first = vec![Message::draft("S1", "C1", "um")];
        let mut state = state_with(first.clone());
        state.scroll_up(8);

        state.set_messages(first.clone());
        assert_eq!(state.scroll_back, 8);

        let mut second = first;
        second.push(Message::draft("S1", "C1", "dois"));
        state.set_messages(second);
        assert_eq!(state.scroll_back, 0);
    }

    #[test]
    fn test_empty_conversation_placeholders() {
        let area = Rect::new(0, 0, 70, 6);

        let mut state = state_with(Vec::new());
        state.loading = true;
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &state, false);
        assert!(text_of(&buf).contains("Loading messages"));

        state.loading = false;
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &state, false);
        assert!(text_of(&buf).contains("No messages yet"));
    }
}
