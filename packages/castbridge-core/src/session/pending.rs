use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;

use super::{SessionError, SessionResult};

/// Correlation table for in-flight sends, keyed by caller-supplied message id.
///
/// Every registered entry is resolved exactly once: by [`resolve`] when the
/// write completes, or by [`reject_all`] on teardown, whichever comes first.
///
/// [`resolve`]: PendingRequests::resolve
/// [`reject_all`]: PendingRequests::reject_all
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: DashMap<String, oneshot::Sender<SessionResult<()>>>,
}

impl PendingRequests {
    pub fn register(&self, message_id: &str) -> SessionResult<oneshot::Receiver<SessionResult<()>>> {
        match self.entries.entry(message_id.to_string()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateMessageId(message_id.to_string())),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Resolves one entry. Returns `false` when it was already resolved.
    pub fn resolve(&self, message_id: &str, result: SessionResult<()>) -> bool {
        match self.entries.remove(message_id) {
            Some((_, tx)) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Rejects every outstanding entry with `error`. Returns how many were rejected.
    pub fn reject_all(&self, error: SessionError) -> usize {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.resolve(id, Err(error.clone())))
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
