//! Folding fetched and pushed messages into the local conversation.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{sort_chronologically, DeliveryStatus, Message};

/// How a fetch result is combined with what is already displayed.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilePolicy {
    /// Union by message id; local messages the server has not returned yet stay.
    #[default]
    Merge,
    /// The fetch result becomes the conversation; the last response to resolve wins.
    Replace,
}

/// Combine `current` with a freshly fetched list.
///
/// Statuses never regress: a message known locally keeps the more advanced
/// of its local and fetched status under either policy.
pub fn reconcile(policy: ReconcilePolicy, current: &[Message], fetched: Vec<Message>) -> Vec<Message> {
    let known: HashMap<&str, DeliveryStatus> =
        current.iter().map(|m| (m.id.as_str(), m.status)).collect();

    let mut result: Vec<Message> = fetched
        .into_iter()
        .map(|mut m| {
            if let Some(&local) = known.get(m.id.as_str()) {
                m.status = local.most_advanced(m.status);
            }
            m
        })
        .collect();

    if policy == ReconcilePolicy::Merge {
        let fetched_ids: HashSet<String> = result.iter().map(|m| m.id.clone()).collect();
        result.extend(
            current
                .iter()
                .filter(|m| !m.is_empty && !fetched_ids.contains(&m.id))
                .cloned(),
        );
    }

    sort_chronologically(&mut result);
    result
}

/// Insert or update a single message (socket push).
pub fn upsert(conversation: &mut Vec<Message>, incoming: Message) {
    match conversation.iter_mut().find(|m| m.id == incoming.id) {
        Some(existing) => {
            let status = existing.status.most_advanced(incoming.status);
            *existing = incoming;
            existing.status = status;
        }
        None => conversation.push(incoming),
    }
    sort_chronologically(conversation);
}

/// Mark outgoing messages as read once the counterpart has replied after them.
pub fn mark_read(conversation: &mut [Message], me: &str) {
    let latest_reply = conversation
        .iter()
        .filter(|m| !m.is_from(me) && !m.is_empty)
        .map(|m| m.created_at)
        .max();
    let Some(latest_reply) = latest_reply else {
        return;
    };
    for m in conversation.iter_mut() {
        let confirmed = matches!(m.status, DeliveryStatus::Sent | DeliveryStatus::Delivered);
        if m.is_from(me) && confirmed && m.created_at <= latest_reply {
            m.status.advance(DeliveryStatus::Read);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, secs: i64, sender: &str, status: DeliveryStatus) -> Message {
        let receiver = if sender == "C1" { "S1" } else { "C1" };
        let mut m = Message::draft(sender, receiver, id);
        m.id = id.to_string();
        m.created_at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        m.status = status;
        m
    }

    fn ids(list: &[Message]) -> Vec<&str> {
        list.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_replace_drops_unechoed_local_messages() {
        let current = vec![
            msg("a", 1, "C1", DeliveryStatus::Delivered),
            msg("local", 3, "C1", DeliveryStatus::Sending),
        ];
        let fetched = vec![
            msg("a", 1, "C1", DeliveryStatus::Delivered),
            msg("b", 2, "S1", DeliveryStatus::Delivered),
        ];
        let result = reconcile(ReconcilePolicy::Replace, &current, fetched);
        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[test]
    fn test_merge_keeps_local_messages_in_order() {
        let current = vec![
            msg("a", 1, "C1", DeliveryStatus::Delivered),
            msg("local", 3, "C1", DeliveryStatus::Sending),
        ];
        let fetched = vec![
            msg("b", 2, "S1", DeliveryStatus::Delivered),
            msg("c", 4, "S1", DeliveryStatus::Delivered),
        ];
        let result = reconcile(ReconcilePolicy::Merge, &current, fetched);
        assert_eq!(ids(&result), vec!["a", "b", "local", "c"]);
    }

    #[test]
    fn test_status_is_not_regressed_by_fetch() {
        let current = vec![msg("a", 1, "C1", DeliveryStatus::Read)];
        let fetched = vec![msg("a", 1, "C1", DeliveryStatus::Delivered)];
        for policy in [ReconcilePolicy::Merge, ReconcilePolicy::Replace] {
            let result = reconcile(policy, &current, fetched.clone());
            assert_eq!(result[0].status, DeliveryStatus::Read, "{:?}", policy);
        }
    }

    #[test]
    fn test_warning_bubbles_are_not_merged() {
        let mut warning = msg("w", 0, "C1", DeliveryStatus::Failed);
        warning.is_empty = true;
        let result = reconcile(ReconcilePolicy::Merge, &[warning], vec![]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let mut conv = vec![msg("a", 1, "C1", DeliveryStatus::Delivered)];
        let mut echo = msg("a", 1, "C1", DeliveryStatus::Sent);
        echo.content = "edited".to_string();
        upsert(&mut conv, echo);
        upsert(&mut conv, msg("z", 0, "S1", DeliveryStatus::Delivered));
        assert_eq!(ids(&conv), vec!["z", "a"]);
        assert_eq!(conv[1].content, "edited");
        assert_eq!(conv[1].status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_mark_read_after_reply() {
        let mut conv = vec![
            msg("a", 1, "C1", DeliveryStatus::Delivered),
            msg("b", 2, "S1", DeliveryStatus::Delivered),
            msg("c", 3, "C1", DeliveryStatus::Sent),
            msg("d", 4, "C1", DeliveryStatus::Sending),
        ];
        mark_read(&mut conv, "C1");
        assert_eq!(conv[0].status, DeliveryStatus::Read);
        assert_eq!(conv[1].status, DeliveryStatus::Delivered);
        assert_eq!(conv[2].status, DeliveryStatus::Sent);
        assert_eq!(conv[3].status, DeliveryStatus::Sending);
    }
}
