//! TUI application state and main event loop

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use super::compose::ComposeState;
use super::messages::MessagesState;
use super::sidebar::SidebarState;
use super::ui;
use crate::api::client::ApiClient;
use crate::chat::{run_events, ChatController, ChatSettings, ChatUpdate, SendError, Toast};
use crate::config::Config;
use crate::realtime::{PubSubClient, SocketClient};

/// How long a toast stays in the status bar.
const TOAST_TTL: Duration = Duration::from_secs(4);
const TICK: Duration = Duration::from_millis(250);
const PAGE_LINES: usize = 10;

/// Active pane in the TUI
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Pane {
    #[default]
    Sidebar,
    Messages,
    Compose,
}

impl Pane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pane::Sidebar => "contacts",
            Pane::Messages => "messages",
            Pane::Compose => "compose",
        }
    }

    fn next(self) -> Self {
        match self {
            Pane::Sidebar => Pane::Messages,
            Pane::Messages => Pane::Compose,
            Pane::Compose => Pane::Sidebar,
        }
    }

    fn previous(self) -> Self {
        match self {
            Pane::Sidebar => Pane::Compose,
            Pane::Messages => Pane::Sidebar,
            Pane::Compose => Pane::Messages,
        }
    }
}

/// Work the key handler asks the controller to do.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    SelectContact(String),
    Send(String),
    ReloadContacts,
}

/// Application state
pub struct App {
    pub should_exit: bool,
    pub coordinator: String,
    pub socket_connected: bool,
    pub pubsub_enabled: bool,
    pub active_pane: Pane,
    pub sidebar: SidebarState,
    pub messages: MessagesState,
    pub compose: ComposeState,
    /// Current toast and when it expires.
    pub toast: Option<(Toast, Instant)>,
}

impl App {
    pub fn new(coordinator: &str, pubsub_enabled: bool) -> Self {
        Self {
            should_exit: false,
            coordinator: coordinator.to_string(),
            socket_connected: false,
            pubsub_enabled,
            active_pane: Pane::default(),
            sidebar: SidebarState {
                loading: true,
                ..SidebarState::default()
            },
            messages: MessagesState {
                me: coordinator.to_string(),
                ..MessagesState::default()
            },
            compose: ComposeState::default(),
            toast: None,
        }
    }

    /// Name of the contact whose conversation is open.
    pub fn active_name(&self) -> Option<&str> {
        let id = self.sidebar.active.as_deref()?;
        Some(self.sidebar.contact_name(id).unwrap_or(id))
    }

    fn show_toast(&mut self, toast: Toast) {
        self.toast = Some((toast, Instant::now() + TOAST_TTL));
    }

    pub fn expire_toast(&mut self, now: Instant) {
        if matches!(self.toast, Some((_, until)) if until <= now) {
            self.toast = None;
        }
    }

    /// Fold a controller update into the view state.
    pub fn apply(&mut self, update: ChatUpdate) {
        match update {
            ChatUpdate::Contacts { contacts, loading } => {
                self.sidebar.update(contacts, loading);
                if let Some(name) = self.active_name().map(String::from) {
                    self.messages.header = name;
                }
            }
            ChatUpdate::Conversation {
                contact_id,
                messages,
                loading,
            } => {
                if contact_id != self.sidebar.active {
                    self.sidebar.active = contact_id;
                    let header = self.active_name().unwrap_or_default().to_string();
                    self.messages.open(header);
                }
                self.messages.set_messages(messages);
                self.messages.loading = loading;
            }
            ChatUpdate::Toast(toast) => self.show_toast(toast),
            ChatUpdate::Transport { socket_connected } => {
                self.socket_connected = socket_connected;
            }
        }
    }

    /// Handle a key press; returns controller work to start, if any.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => {
                self.should_exit = true;
                return None;
            }
            KeyCode::Esc => {
                self.should_exit = true;
                return None;
            }
            KeyCode::Tab => {
                self.active_pane = self.active_pane.next();
                return None;
            }
            KeyCode::BackTab => {
                self.active_pane = self.active_pane.previous();
                return None;
            }
            KeyCode::PageUp => {
                self.messages.scroll_up(PAGE_LINES);
                return None;
            }
            KeyCode::PageDown => {
                self.messages.scroll_down(PAGE_LINES);
                return None;
            }
            _ => {}
        }

        match self.active_pane {
            Pane::Sidebar => match key.code {
                KeyCode::Up | KeyCode::Char('k') => self.sidebar.move_up(),
                KeyCode::Down | KeyCode::Char('j') => self.sidebar.move_down(),
                KeyCode::Char('r') => return Some(Action::ReloadContacts),
                KeyCode::Enter => {
                    let id = self.sidebar.selected_contact_id()?;
                    self.active_pane = Pane::Compose;
                    return Some(Action::SelectContact(id));
                }
                _ => {}
            },
            Pane::Messages => match key.code {
                KeyCode::Up | KeyCode::Char('k') => self.messages.scroll_up(1),
                KeyCode::Down | KeyCode::Char('j') => self.messages.scroll_down(1),
                KeyCode::End => self.messages.scroll_back = 0,
                _ => {}
            },
            Pane::Compose => match key.code {
                KeyCode::Enter => {
                    // Without a recipient the draft stays put; the controller explains why.
                    if self.sidebar.active.is_none() {
                        return Some(Action::Send(self.compose.input.clone()));
                    }
                    self.messages.scroll_back = 0;
                    return Some(Action::Send(self.compose.take_input()));
                }
                KeyCode::Char('u') if ctrl => self.compose.clear(),
                KeyCode::Char(c) if !ctrl => self.compose.insert_char(c),
                KeyCode::Backspace => self.compose.backspace(),
                KeyCode::Delete => self.compose.delete(),
                KeyCode::Left => self.compose.move_left(),
                KeyCode::Right => self.compose.move_right(),
                KeyCode::Home => self.compose.move_home(),
                KeyCode::End => self.compose.move_end(),
                _ => {}
            },
        }
        None
    }
}

/// Start controller work without blocking the draw loop.
fn dispatch(controller: &ChatController, action: Action) {
    let controller = controller.clone();
    match action {
        Action::SelectContact(id) => {
            tokio::spawn(async move { controller.select_contact(&id).await });
        }
        Action::Send(text) => {
            tokio::spawn(async move {
                match controller.send_message(&text).await {
                    Ok(_) | Err(SendError::Empty) => {}
                    Err(e) => tracing::debug!("Send not completed: {}", e),
                }
            });
        }
        Action::ReloadContacts => {
            tokio::spawn(async move { controller.load_contacts().await });
        }
    }
}

/// Run the TUI until the user quits.
///
/// The socket and pub/sub connections live exactly as long as this call.
pub async fn run(config: Config) -> Result<()> {
    let session = config.session()?;
    let api = Arc::new(ApiClient::new(&config)?);

    let (socket_tx, socket_rx) = mpsc::unbounded_channel();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let socket = Arc::new(SocketClient::spawn(&config.socket_url, socket_tx)?);
    let pubsub = PubSubClient::spawn(&config.pubsub, notify_tx)?;

    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let controller = ChatController::new(
        api,
        socket.clone(),
        session.clone(),
        ChatSettings::from_config(&config),
        updates_tx,
    );
    let intake = tokio::spawn(run_events(
        controller.clone(),
        socket_rx,
        notify_rx,
        socket.connected(),
    ));
    dispatch(&controller, Action::ReloadContacts);

    let mut app = App::new(&session.coordinator_id, pubsub.is_some());

    // ratatui::init installs a panic hook that restores the terminal.
    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, &mut app, &controller, updates_rx).await;
    ratatui::restore();

    controller.shutdown().await;
    socket.close().await;
    if let Some(pubsub) = pubsub {
        pubsub.close().await;
    }
    intake.abort();
    let _ = intake.await;

    result
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    app: &mut App,
    controller: &ChatController,
    mut updates: mpsc::UnboundedReceiver<ChatUpdate>,
) -> Result<()> {
    let mut input = EventStream::new();
    let mut tick = time::interval(TICK);

    while !app.should_exit {
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            event = input.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if let Some(action) = app.handle_key(key) {
                        dispatch(controller, action);
                    }
                }
                // Resize and the rest: redrawn on the next pass.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("Failed to read terminal input"),
                None => break,
            },
            update = updates.recv() => {
                let Some(update) = update else { break };
                app.apply(update);
                while let Ok(update) = updates.try_recv() {
                    app.apply(update);
                }
            }
            _ = tick.tick() => app.expire_toast(Instant::now()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, Message};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app_with_contacts() -> App {
        let mut app = App::new("C1", false);
        app.apply(ChatUpdate::Contacts {
            contacts: vec![Contact::new("S1", "Ana"), Contact::new("S2", "Bruno")],
            loading: false,
        });
        app
    }

    #[test]
    fn test_select_then_send_flow() {
        let mut app = app_with_contacts();
        assert_eq!(app.handle_key(key(KeyCode::Down)), None);
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            Some(Action::SelectContact("S2".to_string()))
        );
        assert_eq!(app.active_pane, Pane::Compose);

        app.apply(ChatUpdate::Conversation {
            contact_id: Some("S2".to_string()),
            messages: Vec::new(),
            loading: true,
        });
        assert_eq!(app.messages.header, "Bruno");
        assert!(app.messages.loading);

        for c in "oi".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert!(app.compose.is_typing());
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            Some(Action::Send("oi".to_string()))
        );
        assert!(!app.compose.is_typing());
    }

    #[test]
    fn test_blank_send_still_reaches_controller() {
        let mut app = app_with_contacts();
        app.apply(ChatUpdate::Conversation {
            contact_id: Some("S1".to_string()),
            messages: vec![Message::draft("S1", "C1", "bom dia")],
            loading: false,
        });
        app.active_pane = Pane::Compose;
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            Some(Action::Send(" ".to_string()))
        );
    }

    #[test]
    fn test_send_without_contact_keeps_draft() {
        let mut app = app_with_contacts();
        app.active_pane = Pane::Compose;
        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            Some(Action::Send("x".to_string()))
        );
        assert_eq!(app.compose.input, "x");

        app.compose.clear();
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            Some(Action::Send(" ".to_string()))
        );
    }

    #[test]
    fn test_tab_cycles_and_escape_quits() {
        let mut app = App::new("C1", false);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.active_pane, Pane::Messages);
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.active_pane, Pane::Sidebar);
        app.handle_key(key(KeyCode::BackTab));
        assert_eq!(app.active_pane, Pane::Compose);

        app.handle_key(key(KeyCode::Esc));
        assert!(app.should_exit);

        let mut app = App::new("C1", false);
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_exit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toast_expires() {
        let mut app = App::new("C1", false);
        app.apply(ChatUpdate::Toast(Toast::info("Nova mensagem recebida")));
        app.expire_toast(Instant::now() + Duration::from_secs(3));
        assert!(app.toast.is_some());
        app.expire_toast(Instant::now() + TOAST_TTL);
        assert!(app.toast.is_none());
    }

    #[test]
    fn test_transport_update() {
        let mut app = App::new("C1", true);
        app.apply(ChatUpdate::Transport {
            socket_connected: true,
        });
        assert!(app.socket_connected);
    }
}
