//! Id helpers shared by every message-producing call site: the Message
//! Layer's `send`, and the janitor's system-authored deadlock alert.

use uuid::Uuid;

/// A fresh globally-unique message id, used as the primary key of the
/// `messages` table (spec §3 "Message").
pub fn new_msg_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// First 8 hex characters of `msg_id`, used as the short correlation
/// id `send()` reports back to the caller (spec §4.D: "Return a short
/// correlation id (first 8 hex of one `msg_id`)").
pub fn short_id(msg_id: &str) -> &str {
    &msg_id[..8.min(msg_id.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_msg_id_is_hex() {
        let id = new_msg_id();
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn new_msg_ids_are_distinct() {
        assert_ne!(new_msg_id(), new_msg_id());
    }

    #[test]
    fn short_id_takes_first_eight_chars() {
        let id = new_msg_id();
        assert_eq!(short_id(&id), &id[..8]);
        assert_eq!(short_id(&id).len(), 8);
    }
}
