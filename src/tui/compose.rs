//! Compose box: single-line input with a typing indicator.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
    Frame,
};
use unicode_width::UnicodeWidthChar;

/// State for the compose box.
#[derive(Default)]
pub struct ComposeState {
    /// Current input text.
    pub input: String,
    /// Cursor position (character offset into `input`).
    pub cursor_pos: usize,
}

impl ComposeState {
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    /// Delete the character before the cursor.
    pub fn backspace(&mut self) {
        if self.cursor_pos == 0 {
            return;
        }
        let end = self.char_to_byte(self.cursor_pos);
        let start = self.char_to_byte(self.cursor_pos - 1);
        self.input.drain(start..end);
        self.cursor_pos -= 1;
    }

    /// Delete the character under the cursor.
    pub fn delete(&mut self) {
        if self.cursor_pos < self.input.chars().count() {
            let start = self.char_to_byte(self.cursor_pos);
            let end = self.char_to_byte(self.cursor_pos + 1);
            self.input.drain(start..end);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor_pos = (self.cursor_pos + 1).min(self.input.chars().count());
    }

    pub fn move_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_pos = self.input.chars().count();
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    /// Take the raw input and clear the box.
    ///
    /// Blank input is returned as-is: the controller decides what an empty
    /// send means.
    pub fn take_input(&mut self) -> String {
        self.cursor_pos = 0;
        std::mem::take(&mut self.input)
    }

    /// The user has something typed but not yet sent.
    pub fn is_typing(&self) -> bool {
        !self.input.is_empty()
    }

    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Border, indicator line, input line, border.
pub const COMPOSE_HEIGHT: u16 = 4;

/// Render the compose box; sets the terminal cursor when focused.
pub fn render(
    area: Rect,
    frame: &mut Frame,
    state: &ComposeState,
    recipient: Option<&str>,
    focused: bool,
) {
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
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let indicator_area = Rect::new(inner.x, inner.y, inner.width, 1);
    render_indicator(indicator_area, frame.buffer_mut(), state, recipient);

    if inner.height < 2 {
        return;
    }
    let input_area = Rect::new(inner.x, inner.y + 1, inner.width, 1);
    let display = visible_window(&state.input, state.cursor_pos, input_area.width as usize);

    if state.input.is_empty() {
        let placeholder = match recipient {
            Some(name) => format!(" Message {}...", name),
            None => " Select a contact to start chatting".to_string(),
        };
        Paragraph::new(Line::from(Span::styled(
            placeholder,
            Style::default().fg(Color::DarkGray),
        )))
        .render(input_area, frame.buffer_mut());
    } else {
        Paragraph::new(Line::from(Span::styled(
            format!(" {}", display.visible),
            Style::default().fg(Color::White),
        )))
        .render(input_area, frame.buffer_mut());
    }

    if focused {
        frame.set_cursor_position((
            input_area.x + 1 + display.cursor_col as u16,
            input_area.y,
        ));
    }
}

fn render_indicator(area: Rect, buf: &mut Buffer, state: &ComposeState, recipient: Option<&str>) {
    let line = if state.is_typing() {
        Line::from(Span::styled(
            " typing...",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::ITALIC),
        ))
    } else if recipient.is_some() {
        Line::from(Span::styled(
            " Enter: send  Ctrl-U: clear",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from("")
    };
    Paragraph::new(line).render(area, buf);
}

/// Slice of the input that fits the box, and the cursor column inside it.
struct Window {
    visible: String,
    cursor_col: usize,
}

/// Scroll horizontally so the cursor stays visible, measuring display width.
fn visible_window(input: &str, cursor_pos: usize, width: usize) -> Window {
    // One column of left margin.
    let avail = width.saturating_sub(1);
    if avail == 0 {
        return Window {
            visible: String::new(),
            cursor_col: 0,
        };
    }

    let chars: Vec<(char, usize)> = input
        .chars()
        .map(|c| (c, c.width().unwrap_or(0)))
        .collect();
    let cursor_pos = cursor_pos.min(chars.len());

    // Walk left from the cursor until the window is full.
    let mut start = cursor_pos;
    let mut used = 1; // room for the cursor cell itself
    while start > 0 && used + chars[start - 1].1 <= avail {
        start -= 1;
        used += chars[start].1;
    }
    // Cursor near the beginning: show from the start instead.
    let prefix_width: usize = chars[..cursor_pos].iter().map(|(_, w)| w).sum();
    if prefix_width < avail {
        start = 0;
    }

    let mut visible = String::new();
    let mut cols = 0;
    for &(c, w) in &chars[start..] {
        if cols + w > avail {
            break;
        }
        visible.push(c);
        cols += w;
    }
    let cursor_col = chars[start..cursor_pos].iter().map(|(_, w)| w).sum();

    Window {
        visible,
        cursor_col,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(text: &str) -> ComposeState {
        let mut state = ComposeState::default();
        for c in text.chars() {
            state.insert_char(c);
        }
        state
    }

    #[test]
    fn test_editing_multibyte_input() {
        let mut state = typed("olá");
        state.move_left();
        state.backspace();
        assert_eq!(state.input, "oá");
        state.move_home();
        state.delete();
        assert_eq!(state.input, "á");
        state.move_end();
        state.insert_char('!');
        assert_eq!(state.input, "á!");
        assert_eq!(state.cursor_pos, 2);
    }

    #[test]
    fn test_take_input_returns_blank_text_too() {
        let mut state = typed("   ");
        assert!(state.is_typing());
        assert_eq!(state.take_input(), "   ");
        assert!(state.input.is_empty());
        assert!(!state.is_typing());
        assert_eq!(state.cursor_pos, 0);

        let mut state = typed("bom dia");
        assert!(state.is_typing());
        assert_eq!(state.take_input(), "bom dia");
    }

    #[test]
    fn test_visible_window_follows_cursor() {
        let short = visible_window("abc", 3, 20);
        assert_eq!(short.visible, "abc");
        assert_eq!(short.cursor_col, 3);

        let long = "abcdefghijklmnopqrstuvwxyz";
        let w = visible_window(long, 26, 11);
        assert!(w.visible.ends_with('z'));
        assert!(w.cursor_col <= 10);

        let head = visible_window(long, 0, 11);
        assert!(head.visible.starts_with('a'));
        assert_eq!(head.cursor_col, 0);
    }
}
