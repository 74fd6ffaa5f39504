use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PqError;
use crate::session::{ClientId, Session};

/// The SessionTable maps client identities to their private sessions.
///
/// ## Locking
/// One short critical section guards structural changes (attach, detach,
/// snapshot). It is a leaf lock: it is never held while a session lock is
/// taken or while a queue operation runs. Each session carries its own lock
/// so concurrent calls from one client stay serialized.
pub struct SessionTable {
    sessions: Mutex<HashMap<ClientId, Arc<Mutex<Session>>>>,
}

/// A reference to one live session, usable after the table lock is released.
#[derive(Clone)]
pub struct SessionHandle {
    client_id: ClientId,
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Runs `f` with exclusive access to the session.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.inner.lock();
        f(&mut session)
    }
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an empty session for `client_id`.
    pub fn attach(&self, client_id: ClientId) -> Result<(), PqError> {
        let mut sessions = self.sessions.lock();
        match sessions.entry(client_id) {
            Entry::Occupied(_) => Err(PqError::AlreadyAttached),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(Session::new(client_id))));
                Ok(())
            }
        }
    }

    /// Removes the session for `client_id`, releasing its queue.
    /// Returns whether a session existed; a missing one is not an error.
    pub fn detach(&self, client_id: ClientId) -> bool {
        let removed = self.sessions.lock().remove(&client_id);
        // The session (and its queue) is dropped here, outside the table lock.
        removed.is_some()
    }

    pub fn lookup(&self, client_id: ClientId) -> Result<SessionHandle, PqError> {
        let sessions = self.sessions.lock();
        let inner = sessions.get(&client_id).ok_or(PqError::NotAttached)?;
        Ok(SessionHandle {
            client_id,
            inner: Arc::clone(inner),
        })
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.sessions.lock().contains_key(&client_id)
    }

    /// Visits a snapshot of the live identities, taken in one critical section.
    pub fn foreach_debug(&self, mut visitor: impl FnMut(ClientId)) {
        let mut snapshot: Vec<ClientId> = self.sessions.lock().keys().copied().collect();
        snapshot.sort_unstable();
        for client_id in snapshot {
            visitor(client_id);
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detaches every session and returns how many there were.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.sessions.lock().drain().collect();
        drained.len()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
