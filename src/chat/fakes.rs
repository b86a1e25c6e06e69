//! Recording fakes of the controller's seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::{ChatApi, MessageFanout};
use crate::models::{Contact, DeliveryStatus, Message};

#[derive(Default)]
pub struct FakeApi {
    users: Mutex<Option<Vec<Contact>>>,
    scripted: Mutex<VecDeque<(Duration, Vec<Message>)>>,
    fetches: Mutex<Vec<String>>,
    sends: Mutex<Vec<(String, String, String)>>,
    fail_send: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeApi {
    pub fn message(id: &str, secs: i64, sender: &str, receiver: &str) -> Message {
        Message {
            id: id.to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            content: id.to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            status: DeliveryStatus::Delivered,
            is_empty: false,
        }
    }

    pub fn set_users(&self, users: Vec<Contact>) {
        *self.users.lock().unwrap() = Some(users);
    }

    pub fn fail_users(&self) {
        *self.users.lock().unwrap() = None;
    }

    pub fn fail_sends(&self) {
        self.fail_send.store(true, Ordering::SeqCst);
    }

    /// Queue the result (and latency) of the next conversation fetch.
    pub fn script_fetch(&self, delay: Duration, messages: Vec<Message>) {
        self.scripted.lock().unwrap().push_back((delay, messages));
    }

    pub fn fetches_for(&self, contact_id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == contact_id)
            .count()
    }

    pub fn send_calls(&self) -> usize {
        self.sends.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_users(&self, _size: u32) -> Result<Vec<Contact>> {
        match self.users.lock().unwrap().clone() {
            Some(users) => Ok(users),
            None => bail!("HTTP 500 for /user"),
        }
    }

    async fn fetch_conversation(&self, _me: &str, other: &str, _size: u32) -> Result<Vec<Message>> {
        self.fetches.lock().unwrap().push(other.to_string());
        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some((delay, messages)) => {
                tokio::time::sleep(delay).await;
                Ok(messages)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn send_message(&self, sender: &str, receiver: &str, text: &str) -> Result<Message> {
        self.sends
            .lock()
            .unwrap()
            .push((sender.to_string(), receiver.to_string(), text.to_string()));
        if self.fail_send.load(Ordering::SeqCst) {
            bail!("HTTP 502 for /chat/send");
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = Message::draft(sender, receiver, text);
        stored.id = format!("srv-{}", n);
        stored.status = DeliveryStatus::Sent;
        Ok(stored)
    }
}

pub struct FakeFanout {
    pub connected: AtomicBool,
    pub fail: AtomicBool,
    emitted: Mutex<Vec<Message>>,
}

impl FakeFanout {
    pub fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            emitted: Mutex::new(Vec::new()),
        }
    }

    pub fn emitted(&self) -> Vec<Message> {
        self.emitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageFanout for FakeFanout {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit_message(&self, message: &Message) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("socket write failed");
        }
        self.emitted.lock().unwrap().push(message.clone());
        Ok(())
    }
}
