// Process-wide set of live socket connections.
//
// One mutex guards the whole map; add, remove, and iteration hold it for
// their full duration. Connection ids are never reused, so a removed entry
// cannot come back under a racing re-join.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use super::protocol::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Routing tags fixed at join time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTags {
    pub group: String,
    /// User the connection observes as: the user itself, or for a service
    /// the mailbox it shadows.
    pub viewer: Option<Uuid>,
    pub shadow_target: Option<Uuid>,
    pub identity_kind: &'static str,
}

pub struct RegisteredConnection {
    tags: ConnectionTags,
    outbound: mpsc::Sender<Frame>,
}

impl RegisteredConnection {
    pub fn tags(&self) -> &ConnectionTags {
        &self.tags
    }

    /// Never waits: a full or closed queue is reported back to the caller.
    pub fn enqueue(&self, frame: Frame) -> Result<(), TrySendError<Frame>> {
        self.outbound.try_send(frame)
    }
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<ConnectionId, RegisteredConnection>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    /// Adds a connection; it stays registered until the returned guard drops.
    pub fn register(&self, tags: ConnectionTags, outbound: mpsc::Sender<Frame>) -> Registration {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(connection_id = %id, group = %tags.group, "registering connection");
        self.lock().insert(id, RegisteredConnection { tags, outbound });

        Registration { id, registry: self.clone() }
    }

    /// Returns false when the id was not (or no longer) registered.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Visits every live connection under the lock. The visitor must not
    /// call back into the registry.
    pub fn for_each(&self, mut visit: impl FnMut(ConnectionId, &RegisteredConnection)) {
        let connections = self.lock();
        for (id, connection) in connections.iter() {
            visit(*id, connection);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn group_len(&self, group: &str) -> usize {
        self.lock().values().filter(|connection| connection.tags.group == group).count()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, RegisteredConnection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a connection registered; removal happens exactly once, on drop.
pub struct Registration {
    id: ConnectionId,
    registry: ConnectionRegistry,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.remove(self.id) {
            debug!(connection_id = %self.id, "connection deregistered");
        }
    }
}

#[cfg(test)]
pub(crate) fn tags(group: &str, viewer: Option<Uuid>, shadow_target: Option<Uuid>) -> ConnectionTags {
    ConnectionTags {
        group: group.to_string(),
        viewer,
        shadow_target,
        identity_kind: "user",
    }
}

#[cfg(test)]
mod tests {
    use super::{tags, ConnectionRegistry};
    use crate::ws::protocol::{Frame, FrameKind};
    use std::{sync::Arc, thread};
    use tokio::sync::mpsc::{self, error::TryRecvError};

    #[test]
    fn registration_guard_removes_on_drop() {
        let registry = ConnectionRegistry::default();
        let (sender, _receiver) = mpsc::channel(4);

        let registration = registry.register(tags("chat_a", None, None), sender);
        let id = registration.id();
        assert!(registry.contains(id));
        assert_eq!(registry.group_len("chat_a"), 1);

        drop(registration);

        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn explicit_remove_and_guard_drop_remove_once() {
        let registry = ConnectionRegistry::default();
        let (sender, _receiver) = mpsc::channel(4);
        let registration = registry.register(tags("chat_a", None, None), sender);

        assert!(registry.remove(registration.id()));
        assert!(!registry.remove(registration.id()));
        drop(registration);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn ids_are_never_reused() {
        let registry = ConnectionRegistry::default();
        let (sender, _receiver) = mpsc::channel(4);

        let first = registry.register(tags("chat_a", None, None), sender.clone()).id();
        let second = registry.register(tags("chat_a", None, None), sender).id();

        assert_ne!(first, second);
    }

    #[test]
    fn removed_connection_is_not_visited_and_its_queue_closes() {
        let registry = ConnectionRegistry::default();
        let (sender, mut receiver) = mpsc::channel(4);
        let registration = registry.register(tags("chat_a", None, None), sender);
        drop(registration);

        let mut visited = 0;
        registry.for_each(|_, connection| {
            visited += 1;
            let _ = connection.enqueue(Frame::new(FrameKind::Text, "late"));
        });

        assert_eq!(visited, 0);
        assert_eq!(receiver.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn racing_rejoin_does_not_resurrect_a_removed_handle() {
        let registry = ConnectionRegistry::default();
        let (stale_sender, mut stale_receiver) = mpsc::channel(64);
        let stale = registry.register(tags("chat_a", None, None), stale_sender);
        let stale_id = stale.id();

        let rejoiner = {
            let registry = registry.clone();
            thread::spawn(move || {
                let mut kept = Vec::new();
                for _ in 0..32 {
                    let (sender, receiver) = mpsc::channel(64);
                    kept.push((registry.register(tags("chat_a", None, None), sender), receiver));
                }
                kept
            })
        };
        drop(stale);

        let frame = Frame::new(FrameKind::Text, Arc::<str>::from("after-remove"));
        registry.for_each(|id, connection| {
            assert_ne!(id, stale_id);
            let _ = connection.enqueue(frame.clone());
        });

        let rejoined = rejoiner.join().expect("rejoin thread should finish");
        assert!(!registry.contains(stale_id));
        assert_eq!(stale_receiver.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(registry.group_len("chat_a"), rejoined.len());
    }
}
