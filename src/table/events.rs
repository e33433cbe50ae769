//! Mutation notifications
//!
//! Subscribers receive one `TableEvent` per successful insert, update or
//! delete, in mutation order. Delivery is synchronous with the mutation;
//! disconnected receivers are dropped on the next send.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::document::Document;

/// A committed-in-memory mutation
#[derive(Debug, Clone, PartialEq)]
pub enum TableEvent {
    Inserted(Document),
    Updated { before: Document, after: Document },
    Deleted { id: String },
}

impl TableEvent {
    /// Id of the affected record
    pub fn id(&self) -> Option<&str> {
        match self {
            TableEvent::Inserted(doc) => doc.id(),
            TableEvent::Updated { after, .. } => after.id(),
            TableEvent::Deleted { id } => Some(id),
        }
    }
}

/// Fan-out to subscribed channels
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<Sender<TableEvent>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&mut self) -> Receiver<TableEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders.push(tx);
        rx
    }

    pub(crate) fn notify(&mut self, event: TableEvent) {
        if self.senders.is_empty() {
            return;
        }
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notify_reaches_every_subscriber() {
        let mut subscribers = Subscribers::default();
        let a = subscribers.subscribe();
        let b = subscribers.subscribe();

        subscribers.notify(TableEvent::Deleted { id: "x".to_string() });

        assert_eq!(a.try_recv().unwrap().id(), Some("x"));
        assert_eq!(b.try_recv().unwrap().id(), Some("x"));
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let mut subscribers = Subscribers::default();
        let rx = subscribers.subscribe();
        drop(rx);

        let doc = Document::from_value(json!({"_id": "1"})).unwrap();
        subscribers.notify(TableEvent::Inserted(doc));
        assert_eq!(subscribers.len(), 0);
    }
}
