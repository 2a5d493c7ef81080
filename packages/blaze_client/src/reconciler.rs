//! Ordered conversation log with append-or-replace reconciliation.
//!
//! Inbound messages are keyed by `msg_id`. A message already in the log is
//! replaced wholesale at its original position; a new one is appended. This
//! is how a streamed assistant turn moves from `progress` to `success` without
//! duplicating or reordering entries.

use std::collections::HashMap;

use crate::types::ChatMessage;

/// What `reconcile` did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// New `msg_id`; appended at this index.
    Appended(usize),
    /// Known `msg_id`; the entry at this index was replaced.
    Replaced(usize),
}

impl Reconciled {
    pub fn index(&self) -> usize {
        match self {
            Self::Appended(i) | Self::Replaced(i) => *i,
        }
    }
}

/// The displayed message sequence, insertion order significant.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    // Entries are never removed individually, so positions never shift.
    positions: HashMap<String, usize>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an inbound message into the log. Never fails.
    pub fn reconcile(&mut self, incoming: ChatMessage) -> Reconciled {
        if let Some(&index) = self.positions.get(&incoming.msg_id) {
            self.messages[index] = incoming;
            return Reconciled::Replaced(index);
        }

        let index = self.messages.len();
        self.positions.insert(incoming.msg_id.clone(), index);
        self.messages.push(incoming);
        Reconciled::Appended(index)
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.positions.clear();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn get(&self, msg_id: &str) -> Option<&ChatMessage> {
        self.positions.get(msg_id).map(|&i| &self.messages[i])
    }

    pub fn position(&self, msg_id: &str) -> Option<usize> {
        self.positions.get(msg_id).copied()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }
}
