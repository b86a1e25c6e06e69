//! The chat state controller.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::poller::Poller;
use super::reconcile::{self, ReconcilePolicy};
use super::roster;
use super::{ChatApi, ChatUpdate, MessageFanout, SendError, Session, Toast};
use crate::config::Config;
use crate::models::{Contact, DeliveryStatus, Message};

/// How long the empty-message warning bubble stays visible.
const EMPTY_WARNING_TTL: Duration = Duration::from_millis(3000);

/// Tunables taken from configuration.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub poll_interval: Duration,
    pub contacts_page_size: u32,
    pub messages_page_size: u32,
    pub policy: ReconcilePolicy,
    pub warning_ttl: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ChatSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            contacts_page_size: config.contacts_page_size,
            messages_page_size: config.messages_page_size,
            policy: config.reconcile,
            warning_ttl: EMPTY_WARNING_TTL,
        }
    }
}

#[derive(Default)]
struct ChatState {
    contacts: Vec<Contact>,
    contacts_loading: bool,
    active: Option<String>,
    conversation: Vec<Message>,
    /// The active conversation has been fetched at least once.
    conversation_loaded: bool,
    /// Transient validation bubble, shown after the conversation.
    warning: Option<Message>,
    /// Raised by a pub/sub notification until its toast is published.
    new_message: bool,
}

struct Inner {
    api: Arc<dyn ChatApi>,
    fanout: Arc<dyn MessageFanout>,
    session: Session,
    settings: ChatSettings,
    state: Mutex<ChatState>,
    poller: Poller,
    warning_timer: Mutex<Option<JoinHandle<()>>>,
    updates: mpsc::UnboundedSender<ChatUpdate>,
}

/// Handle to the controller; clones share the same state.
#[derive(Clone)]
pub struct ChatController {
    inner: Arc<Inner>,
}

impl ChatController {
    pub fn new(
        api: Arc<dyn ChatApi>,
        fanout: Arc<dyn MessageFanout>,
        session: Session,
        settings: ChatSettings,
        updates: mpsc::UnboundedSender<ChatUpdate>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                fanout,
                session,
                settings,
                state: Mutex::new(ChatState::default()),
                poller: Poller::default(),
                warning_timer: Mutex::new(None),
                updates,
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut guard = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn me(&self) -> &str {
        &self.inner.session.coordinator_id
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    // -- Snapshots ----------------------------------------------------------

    pub fn contacts(&self) -> Vec<Contact> {
        self.with_state(|s| s.contacts.clone())
    }

    pub fn is_loading_contacts(&self) -> bool {
        self.with_state(|s| s.contacts_loading)
    }

    pub fn active_contact(&self) -> Option<String> {
        self.with_state(|s| s.active.clone())
    }

    /// The conversation as displayed, including the warning bubble if shown.
    pub fn conversation(&self) -> Vec<Message> {
        self.with_state(|s| {
            let mut view = s.conversation.clone();
            view.extend(s.warning.clone());
            view
        })
    }

    pub fn has_new_message_flag(&self) -> bool {
        self.with_state(|s| s.new_message)
    }

    /// Number of conversation refresh tasks alive (0 or 1).
    pub fn active_pollers(&self) -> usize {
        self.inner.poller.active()
    }

    // -- Publishing ---------------------------------------------------------

    fn publish(&self, update: ChatUpdate) {
        if self.inner.updates.send(update).is_err() {
            tracing::debug!("Update channel closed -- update dropped");
        }
    }

    fn publish_contacts(&self) {
        let (contacts, loading) = self.with_state(|s| (s.contacts.clone(), s.contacts_loading));
        self.publish(ChatUpdate::Contacts { contacts, loading });
    }

    /// Snapshot and send under one lock so concurrent selects and fetches
    /// cannot pair one contact with another's messages or publish out of order.
    fn publish_conversation(&self) {
        self.with_state(|s| {
            let mut messages = s.conversation.clone();
            messages.extend(s.warning.clone());
            let loading = s.active.is_some() && !s.conversation_loaded;
            self.publish(ChatUpdate::Conversation {
                contact_id: s.active.clone(),
                messages,
                loading,
            });
        });
    }

    fn toast(&self, toast: Toast) {
        self.publish(ChatUpdate::Toast(toast));
    }

    pub fn set_transport_status(&self, socket_connected: bool) {
        self.publish(ChatUpdate::Transport { socket_connected });
    }

    // -- Operations ---------------------------------------------------------

    /// Fetch all accounts and keep those linked to this coordinator.
    pub async fn load_contacts(&self) {
        self.with_state(|s| s.contacts_loading = true);
        self.publish_contacts();

        let size = self.inner.settings.contacts_page_size;
        match self.inner.api.list_users(size).await {
            Ok(users) => {
                let mut contacts = roster::for_coordinator(users, self.me());
                tracing::info!("Loaded {} contacts", contacts.len());
                self.with_state(|s| {
                    roster::carry_over(&s.contacts, &mut contacts);
                    s.contacts = contacts;
                });
            }
            Err(e) => {
                tracing::warn!("Failed to load contacts: {:#}", e);
                self.toast(Toast::error("Não foi possível carregar os supervisores"));
            }
        }

        self.with_state(|s| s.contacts_loading = false);
        self.publish_contacts();
    }

    /// Make `contact_id` the active conversation and (re)start its refresh.
    pub async fn select_contact(&self, contact_id: &str) {
        tracing::debug!("Selecting contact {}", contact_id);
        self.with_state(|s| {
            s.active = Some(contact_id.to_string());
            s.conversation.clear();
            s.conversation_loaded = false;
            s.warning = None;
            if let Some(c) = s.contacts.iter_mut().find(|c| c.id == contact_id) {
                c.unread = 0;
            }
        });
        self.publish_contacts();
        self.publish_conversation();

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .poller
            .restart(self.inner.settings.poll_interval, move || {
                let weak = weak.clone();
                async move {
                    if let Some(controller) = ChatController::from_weak(&weak) {
                        controller.fetch_messages().await;
                    }
                }
            })
            .await;
    }

    /// Fetch both directions for the active contact and fold them in.
    pub async fn fetch_messages(&self) {
        let Some(contact_id) = self.active_contact() else {
            return;
        };

        let size = self.inner.settings.messages_page_size;
        let fetched = match self
            .inner
            .api
            .fetch_conversation(self.me(), &contact_id, size)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Failed to fetch messages for {}: {:#}", contact_id, e);
                self.toast(Toast::error("Não foi possível carregar as mensagens"));
                return;
            }
        };

        let policy = self.inner.settings.policy;
        let me = self.me().to_string();
        let applied = self.with_state(|s| {
            if s.active.as_deref() != Some(contact_id.as_str()) {
                return false;
            }
            let mut merged = reconcile::reconcile(policy, &s.conversation, fetched);
            reconcile::mark_read(&mut merged, &me);
            if let Some(last) = merged.last() {
                if let Some(c) = s.contacts.iter_mut().find(|c| c.id == contact_id) {
                    roster::set_preview(c, last);
                }
            }
            s.conversation = merged;
            s.conversation_loaded = true;
            true
        });

        if applied {
            self.publish_conversation();
        } else {
            tracing::debug!("Dropping stale fetch for {}", contact_id);
        }
    }

    /// Validate, persist and fan out a message to the active contact.
    pub async fn send_message(&self, text: &str) -> Result<Message, SendError> {
        let text = text.trim();
        if text.is_empty() {
            self.show_empty_warning();
            return Err(SendError::Empty);
        }

        let Some(contact_id) = self.active_contact() else {
            self.toast(Toast::info("Selecione um supervisor para enviar"));
            return Err(SendError::NoContactSelected);
        };

        if !self.inner.fanout.is_connected() {
            tracing::warn!("Send blocked: socket transport is not connected");
            self.toast(Toast::warning("Sem conexão em tempo real; mensagem não enviada"));
            return Err(SendError::TransportDisconnected);
        }

        let me = self.me().to_string();
        let draft = Message::draft(&me, &contact_id, text);
        let local_id = draft.id.clone();
        self.with_state(|s| s.conversation.push(draft));
        self.publish_conversation();

        let stored = match self.inner.api.send_message(&me, &contact_id, text).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to send message to {}: {:#}", contact_id, e);
                self.update_message(&local_id, |m| {
                    m.status.advance(DeliveryStatus::Failed);
                });
                self.publish_conversation();
                self.toast(Toast::error("Falha ao enviar mensagem"));
                return Err(SendError::Api(e));
            }
        };

        self.confirm_sent(&local_id, &contact_id, &stored);
        self.publish_conversation();

        let mut result = stored.clone();
        result.status.advance(DeliveryStatus::Sent);
        match self.inner.fanout.emit_message(&stored).await {
            Ok(()) => {
                self.update_message(&stored.id, |m| {
                    m.status.advance(DeliveryStatus::Delivered);
                });
                result.status.advance(DeliveryStatus::Delivered);
                self.publish_conversation();
            }
            Err(e) => {
                tracing::warn!("Socket fan-out failed for {}: {:#}", stored.id, e);
                self.toast(Toast::warning("Mensagem salva, mas o destinatário não foi notificado"));
            }
        }

        Ok(result)
    }

    /// Swap the optimistic draft for the persisted copy.
    fn confirm_sent(&self, local_id: &str, contact_id: &str, stored: &Message) {
        self.with_state(|s| {
            if s.active.as_deref() != Some(contact_id) {
                return;
            }
            let already_fetched = s.conversation.iter().any(|m| m.id == stored.id);
            match s.conversation.iter().position(|m| m.id == local_id) {
                Some(idx) if already_fetched => {
                    s.conversation.remove(idx);
                }
                Some(idx) => {
                    let m = &mut s.conversation[idx];
                    m.id = stored.id.clone();
                    m.content = stored.content.clone();
                    m.created_at = stored.created_at;
                    m.status.advance(DeliveryStatus::Sent);
                }
                None if !already_fetched => {
                    let mut confirmed = stored.clone();
                    confirmed.status = DeliveryStatus::Sent;
                    s.conversation.push(confirmed);
                }
                None => {}
            }
            if let Some(m) = s.conversation.iter_mut().find(|m| m.id == stored.id) {
                m.status.advance(DeliveryStatus::Sent);
            }
            crate::models::sort_chronologically(&mut s.conversation);
            if let Some(c) = s.contacts.iter_mut().find(|c| c.id == contact_id) {
                roster::set_preview(c, stored);
            }
        });
    }

    fn update_message(&self, id: &str, f: impl FnOnce(&mut Message)) {
        self.with_state(|s| {
            if let Some(m) = s.conversation.iter_mut().find(|m| m.id == id) {
                f(m);
            }
        });
    }

    fn show_empty_warning(&self) {
        let receiver = self.active_contact().unwrap_or_default();
        let warning = Message::empty_warning(self.me(), &receiver);
        let warning_id = warning.id.clone();
        self.with_state(|s| s.warning = Some(warning));
        self.publish_conversation();

        let weak = Arc::downgrade(&self.inner);
        let ttl = self.inner.settings.warning_ttl;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(controller) = ChatController::from_weak(&weak) {
                controller.clear_warning(&warning_id);
            }
        });

        let mut slot = self
            .inner
            .warning_timer
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(timer) {
            previous.abort();
        }
    }

    fn clear_warning(&self, warning_id: &str) {
        let cleared = self.with_state(|s| {
            if s.warning.as_ref().map(|w| w.id.as_str()) == Some(warning_id) {
                s.warning = None;
                true
            } else {
                false
            }
        });
        if cleared {
            self.publish_conversation();
        }
    }

    /// Content-free pub/sub signal: raise the flag, toast once, lower it.
    pub fn on_notification(&self) {
        let raised = self.with_state(|s| !std::mem::replace(&mut s.new_message, true));
        if raised {
            self.toast(Toast::info("Nova mensagem recebida"));
        }
        self.with_state(|s| s.new_message = false);
    }

    /// A message pushed over the socket.
    pub fn on_socket_message(&self, message: Message) {
        let me = self.me().to_string();
        if message.sender_id != me && message.receiver_id != me {
            tracing::debug!("Ignoring socket message {} for another user", message.id);
            return;
        }
        let counterpart = if message.sender_id == me {
            message.receiver_id.clone()
        } else {
            message.sender_id.clone()
        };

        let in_active = self.with_state(|s| {
            let in_active = s.active.as_deref() == Some(counterpart.as_str());
            if let Some(c) = s.contacts.iter_mut().find(|c| c.id == counterpart) {
                roster::set_preview(c, &message);
                if !in_active && message.sender_id != me {
                    c.unread += 1;
                }
            }
            if in_active {
                reconcile::upsert(&mut s.conversation, message);
                reconcile::mark_read(&mut s.conversation, &me);
            }
            in_active
        });

        self.publish_contacts();
        if in_active {
            self.publish_conversation();
        }
    }

    /// Release the refresh task and pending timers.
    pub async fn shutdown(&self) {
        self.inner.poller.stop().await;
        let timer = self
            .inner
            .warning_timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(timer) = timer {
            timer.abort();
        }
        tracing::debug!("Chat controller shut down");
    }
}
