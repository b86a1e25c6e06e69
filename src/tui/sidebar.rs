//! Sidebar widget: the coordinator's contacts with presence, unread badge and
//! last-message preview.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::models::{Contact, Presence};

/// Rows per contact: name line + preview line.
const ROWS_PER_CONTACT: usize = 2;
const SKELETON_ROWS: usize = 4;

/// Sidebar state: the roster as last published plus navigation.
#[derive(Default)]
pub struct SidebarState {
    pub contacts: Vec<Contact>,
    /// Index of the highlighted contact.
    pub selected: usize,
    /// Contact whose conversation is open.
    pub active: Option<String>,
    pub loading: bool,
}

impl SidebarState {
    /// Replace the roster, keeping the highlight on the same contact.
    pub fn update(&mut self, contacts: Vec<Contact>, loading: bool) {
        let highlighted = self.selected_contact_id();
        self.contacts = contacts;
        self.loading = loading;
        self.selected = highlighted
            .and_then(|id| self.contacts.iter().position(|c| c.id == id))
            .unwrap_or(0);
        self.clamp_selection();
    }

    pub fn selected_contact_id(&self) -> Option<String> {
        self.contacts.get(self.selected).map(|c| c.id.clone())
    }

    pub fn contact_name(&self, id: &str) -> Option<&str> {
        self.contacts
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        if self.selected + 1 < self.contacts.len() {
            self.selected += 1;
        }
    }

    fn clamp_selection(&mut self) {
        if self.selected >= self.contacts.len() {
            self.selected = self.contacts.len().saturating_sub(1);
        }
    }

    pub fn total_unread(&self) -> u32 {
        self.contacts.iter().map(|c| c.unread).sum()
    }
}

/// Presence dot color.
pub fn presence_color(presence: Presence) -> Color {
    match presence {
        Presence::Online => Color::Green,
        Presence::Away => Color::Yellow,
        Presence::Busy => Color::Red,
        Presence::Offline => Color::DarkGray,
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn render(area: Rect, buf: &mut Buffer, state: &SidebarState, focused: bool) {
    let (border_style, border_type) = if focused {
        (Style::default().fg(Color::Yellow), BorderType::Double)
    } else {
        (Style::default().fg(Color::DarkGray), BorderType::Plain)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style)
        .title(Span::styled(
            " Supervisors ",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    if state.contacts.is_empty() {
        let lines = if state.loading {
            skeleton_lines(inner.width as usize)
        } else {
            empty_lines()
        };
        Paragraph::new(lines).render(inner, buf);
        return;
    }

    let visible = (inner.height as usize / ROWS_PER_CONTACT).max(1);
    let offset = compute_scroll_offset(state.selected, visible, state.contacts.len());

    for (slot, idx) in (offset..state.contacts.len()).take(visible).enumerate() {
        let y = inner.y + (slot * ROWS_PER_CONTACT) as u16;
        if y >= inner.y + inner.height {
            break;
        }
        let contact = &state.contacts[idx];
        let selected = idx == state.selected;
        let active = state.active.as_deref() == Some(contact.id.as_str());

        render_name_row(
            buf,
            Rect::new(inner.x, y, inner.width, 1),
            contact,
            selected,
            active,
        );
        if y + 1 < inner.y + inner.height {
            render_preview_row(buf, Rect::new(inner.x, y + 1, inner.width, 1), contact);
        }
    }
}

/// Placeholder bars shown while the first load is in flight.
fn skeleton_lines(width: usize) -> Vec<Line<'static>> {
    let bar = width.saturating_sub(4).min(18);
    let style = Style::default().fg(Color::DarkGray);
    (0..SKELETON_ROWS)
        .flat_map(|i| {
            let name_len = bar.saturating_sub(i % 3 * 3);
            [
                Line::from(Span::styled(
                    format!("  \u{2591}\u{2591} {}", "\u{2591}".repeat(name_len)),
                    style,
                )),
                Line::from(Span::styled(
                    format!("     {}", "\u{2591}".repeat(bar / 2)),
                    style,
                )),
            ]
        })
        .collect()
}

fn empty_lines() -> Vec<Line<'static>> {
    vec![
        Line::from(""),
        Line::from(Span::styled(
            " No supervisors linked",
            Style::default().fg(Color::Gray),
        )),
        Line::from(Span::styled(
            " to this coordinator.",
            Style::default().fg(Color::Gray),
        )),
    ]
}

/// Scroll offset (in contacts) that keeps the selection visible.
fn compute_scroll_offset(selected: usize, visible: usize, total: usize) -> usize {
    if total <= visible || selected < visible {
        return 0;
    }
    selected
        .saturating_sub(visible - 1)
        .min(total.saturating_sub(visible))
}

fn render_name_row(buf: &mut Buffer, area: Rect, contact: &Contact, selected: bool, active: bool) {
    let base = if selected {
        Style::default().fg(Color::White).bg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Gray)
    };
    let name_style = if contact.unread > 0 || active {
        base.add_modifier(Modifier::BOLD).fg(Color::White)
    } else {
        base
    };

    let cursor = if selected { "\u{25BA}" } else { " " };
    let badge = if contact.unread > 0 {
        format!(" {} ", contact.unread.min(99))
    } else {
        String::new()
    };

    let width = area.width as usize;
    let fixed = 3 + badge.chars().count();
    let name: String = contact
        .name
        .chars()
        .take(width.saturating_sub(fixed))
        .collect();
    let pad = width.saturating_sub(fixed + name.chars().count());

    let line = Line::from(vec![
        Span::styled(cursor.to_string(), base),
        Span::styled(
            "\u{25CF}".to_string(),
            base.fg(presence_color(contact.presence)),
        ),
        Span::styled(" ".to_string(), base),
        Span::styled(name, name_style),
        Span::styled(" ".repeat(pad), base),
        Span::styled(
            badge,
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    ]);
    Paragraph::new(line).render(area, buf);
}

fn render_preview_row(buf: &mut Buffer, area: Rect, contact: &Contact) {
    let width = (area.width as usize).saturating_sub(3);
    let text = contact.last_message.as_deref().unwrap_or("");
    let flat = text.replace('\n', " ");
    let preview: String = if flat.chars().count() > width {
        let mut cut: String = flat.chars().take(width.saturating_sub(1)).collect();
        cut.push('\u{2026}');
        cut
    } else {
        flat
    };
    let line = Line::from(Span::styled(
        format!("   {}", preview),
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    ));
    Paragraph::new(line).render(area, buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<Contact> {
        vec![
            Contact::new("1", "Ana"),
            Contact::new("2", "Bruno"),
            Contact::new("3", "Carla"),
        ]
    }

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

    #[test]
    fn test_update_keeps_highlighted_contact() {
        let mut state = SidebarState::default();
        state.update(roster(), false);
        state.move_down();
        state.move_down();
        assert_eq!(state.selected_contact_id().as_deref(), Some("3"));

        let mut reordered = roster();
        reordered.reverse();
        state.update(reordered, false);
        assert_eq!(state.selected_contact_id().as_deref(), Some("3"));
        assert_eq!(state.selected, 0);

        state.update(vec![Contact::new("9", "Zeca")], false);
        assert_eq!(state.selected, 0);
        state.update(Vec::new(), false);
        assert_eq!(state.selected_contact_id(), None);
    }

    #[test]
    fn test_navigation_bounds() {
        let mut state = SidebarState::default();
        state.update(roster(), false);
        state.move_up();
        assert_eq!(state.selected, 0);
        for _ in 0..5 {
            state.move_down();
        }
        assert_eq!(state.selected, 2);
    }

    #[test]
    fn test_scroll_offset() {
        assert_eq!(compute_scroll_offset(0, 5, 3), 0);
        assert_eq!(compute_scroll_offset(4, 5, 10), 0);
        assert_eq!(compute_scroll_offset(7, 5, 10), 3);
        assert_eq!(compute_scroll_offset(9, 5, 10), 5);
    }

    #[test]
    fn test_loading_and_empty_render_differently() {
        let area = Rect::new(0, 0, 28, 12);

        let mut loading = SidebarState::default();
        loading.loading = true;
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &loading, false);
        let skeleton = text_of(&buf);
        assert!(skeleton.contains('\u{2591}'));
        assert!(!skeleton.contains("No supervisors"));

        let empty = SidebarState::default();
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &empty, false);
        let text = text_of(&buf);
        assert!(text.contains("No supervisors"));
        assert!(!text.contains('\u{2591}'));
    }

    #[test]
    fn test_row_shows_badge_and_preview() {
        let mut ana = Contact::new("1", "Ana");
        ana.unread = 3;
        ana.last_message = Some("chegando no ponto".to_string());
        let mut state = SidebarState::default();
        state.update(vec![ana], false);

        let area = Rect::new(0, 0, 30, 6);
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &state, true);
        let text = text_of(&buf);
        assert!(text.contains("Ana"));
        assert!(text.contains(" 3 "));
        assert!(text.contains("chegando no ponto"));
        assert_eq!(state.total_unread(), 3);
    }

    #[test]
    fn test_presence_colors() {
        assert_eq!(presence_color(Presence::Online), Color::Green);
        assert_eq!(presence_color(Presence::Away), Color::Yellow);
        assert_eq!(presence_color(Presence::Busy), Color::Red);
        assert_eq!(presence_color(Presence::Offline), Color::DarkGray);
    }
}
