//! Mount-scoped intake of push events.

use tokio::sync::{mpsc, watch};

use super::ChatController;
use crate::realtime::{Notification, SocketEvent};

/// Feed socket events, notifications and connectivity into the controller.
///
/// Returns when both event sources have closed.
pub async fn run_events(
    controller: ChatController,
    mut socket_rx: mpsc::UnboundedReceiver<SocketEvent>,
    mut notify_rx: mpsc::UnboundedReceiver<Notification>,
    mut connected: watch::Receiver<bool>,
) {
    let mut socket_open = true;
    let mut notify_open = true;
    let mut watch_open = true;
    controller.set_transport_status(*connected.borrow());

    while socket_open || notify_open {
        tokio::select! {
            event = socket_rx.recv(), if socket_open => match event {
                Some(SocketEvent::Message(message)) => controller.on_socket_message(message),
                Some(SocketEvent::Other { name }) => {
                    tracing::debug!("Unhandled socket event '{}'", name);
                }
                None => socket_open = false,
            },
            note = notify_rx.recv(), if notify_open => match note {
                Some(Notification { channel, event }) => {
                    tracing::debug!("Notification {} on {}", event, channel);
                    controller.on_notification();
                }
                None => notify_open = false,
            },
            changed = connected.changed(), if watch_open => match changed {
                Ok(()) => {
                    let up = *connected.borrow_and_update();
                    controller.set_transport_status(up);
                }
                Err(_) => watch_open = false,
            },
        }
    }
    tracing::debug!("Push event intake finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::fakes::{FakeApi, FakeFanout};
    use crate::chat::{ChatSettings, ChatUpdate, Session};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_events_reach_controller() {
        let (tx, mut updates) = mpsc::unbounded_channel();
        let controller = ChatController::new(
            Arc::new(FakeApi::default()),
            Arc::new(FakeFanout::connected()),
            Session {
                coordinator_id: "C1".to_string(),
            },
            ChatSettings::default(),
            tx,
        );
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (conn_tx, conn_rx) = watch::channel(false);

        let task = tokio::spawn(run_events(controller.clone(), socket_rx, notify_rx, conn_rx));

        conn_tx.send(true).unwrap();
        notify_tx
            .send(Notification {
                channel: "chat".to_string(),
                event: "newMessage".to_string(),
            })
            .unwrap();
        socket_tx
            .send(SocketEvent::Message(FakeApi::message("m1", 1, "S1", "C1")))
            .unwrap();
        drop(socket_tx);
        drop(notify_tx);
        task.await.unwrap();

        let mut saw_toast = false;
        let mut saw_connected = false;
        while let Ok(update) = updates.try_recv() {
            match update {
                ChatUpdate::Toast(_) => saw_toast = true,
                ChatUpdate::Transport {
                    socket_connected: true,
                } => saw_connected = true,
                _ => {}
            }
        }
        assert!(saw_toast);
        assert!(saw_connected);
    }
}
