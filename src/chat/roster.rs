//! Contact roster scoping and bookkeeping.

use crate::models::{Contact, Message};

/// Keep only the contacts linked to `coordinator_id`.
pub fn for_coordinator(users: Vec<Contact>, coordinator_id: &str) -> Vec<Contact> {
    users
        .into_iter()
        .filter(|c| c.coordinator_id.as_deref() == Some(coordinator_id))
        .collect()
}

/// Carry client-side fields (unread, last message) over a reload.
pub fn carry_over(previous: &[Contact], fresh: &mut [Contact]) {
    for contact in fresh.iter_mut() {
        if let Some(old) = previous.iter().find(|c| c.id == contact.id) {
            contact.unread = old.unread;
            if contact.last_message.is_none() {
                contact.last_message = old.last_message.clone();
                contact.last_message_at = old.last_message_at;
            }
        }
    }
}

/// Record `message` as the latest preview for `contact`.
pub fn set_preview(contact: &mut Contact, message: &Message) {
    let newer = contact
        .last_message_at
        .map_or(true, |at| message.created_at >= at);
    if newer {
        contact.last_message = Some(message.content.clone());
        contact.last_message_at = Some(message.created_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_matching_coordinator() {
        let users = vec![
            Contact::new("1", "Ana").with_coordinator("C1"),
            Contact::new("2", "Bruno").with_coordinator("C2"),
            Contact::new("3", "Carla").with_coordinator("C1"),
            Contact::new("4", "Davi"),
        ];
        let contacts = for_coordinator(users, "C1");
        let names: Vec<&str> = contacts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Carla"]);
    }

    #[test]
    fn test_carry_over_keeps_unread() {
        let mut old = Contact::new("1", "Ana");
        old.unread = 3;
        old.last_message = Some("oi".to_string());
        let mut fresh = vec![Contact::new("1", "Ana Maria"), Contact::new("2", "Bia")];
        carry_over(&[old], &mut fresh);
        assert_eq!(fresh[0].unread, 3);
        assert_eq!(fresh[0].name, "Ana Maria");
        assert_eq!(fresh[0].last_message.as_deref(), Some("oi"));
        assert_eq!(fresh[1].unread, 0);
    }

    #[test]
    fn test_preview_ignores_older_messages() {
        let mut contact = Contact::new("1", "Ana");
        let newer = Message::draft("1", "C1", "novo");
        let mut older = Message::draft("1", "C1", "velho");
        older.created_at = newer.created_at - chrono::Duration::minutes(1);
        set_preview(&mut contact, &newer);
        set_preview(&mut contact, &older);
        assert_eq!(contact.last_message.as_deref(), Some("novo"));
    }
}
