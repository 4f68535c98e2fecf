use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::foundation::core::ServiceId;
use crate::service::service::WeakService;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    ServiceChanged,
    PropertyChanged,
    ProducerChanged,
    PlaylistNext,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    ServiceChanged,
    PropertyChanged(String),
    ProducerChanged,
    /// Playback is about to leave the given clip.
    PlaylistNext(usize),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ServiceChanged => EventKind::ServiceChanged,
            Self::PropertyChanged(_) => EventKind::PropertyChanged,
            Self::ProducerChanged => EventKind::ProducerChanged,
            Self::PlaylistNext(_) => EventKind::PlaylistNext,
        }
    }
}

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registered {
    id: ListenerId,
    owner: Option<ServiceId>,
    kind: EventKind,
    callback: Listener,
}

#[derive(Default)]
struct Hub {
    listeners: Vec<Registered>,
    blocked: u32,
}

/// Listener hub owned by one service.
#[derive(Default)]
pub struct Events {
    hub: Mutex<Hub>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn listen(
        &self,
        owner: Option<ServiceId>,
        kind: EventKind,
        callback: impl Fn(&Event) + Send + Sync + 'static,
    ) -> ListenerId {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = ListenerId(NEXT.fetch_add(1, Ordering::Relaxed));
        self.hub().listeners.push(Registered {
            id,
            owner,
            kind,
            callback: Arc::new(callback),
        });
        id
    }

    pub fn disconnect(&self, id: ListenerId) {
        let removed: Vec<Registered> = {
            let mut hub = self.hub();
            let (gone, keep) = std::mem::take(&mut hub.listeners)
                .into_iter()
                .partition(|r| r.id == id);
            hub.listeners = keep;
            gone
        };
        drop(removed);
    }

    /// Drop every listener registered on behalf of `owner`.
    pub fn disconnect_owner(&self, owner: ServiceId) {
        let removed: Vec<Registered> = {
            let mut hub = self.hub();
            let (gone, keep) = std::mem::take(&mut hub.listeners)
                .into_iter()
                .partition(|r| r.owner == Some(owner));
            hub.listeners = keep;
            gone
        };
        drop(removed);
    }

    pub fn listener_count(&self) -> usize {
        self.hub().listeners.len()
    }

    /// Suppress delivery until the matching [`Events::unblock`]. Calls nest.
    pub fn block(&self) {
        self.hub().blocked += 1;
    }

    pub fn unblock(&self) {
        let mut hub = self.hub();
        hub.blocked = hub.blocked.saturating_sub(1);
    }

    pub fn is_blocked(&self) -> bool {
        self.hub().blocked > 0
    }

    /// Block delivery for the lifetime of the returned guard.
    pub fn blocked(&self) -> BlockGuard<'_> {
        self.block();
        BlockGuard { events: self }
    }

    /// Deliver `event` to the matching listeners. Callbacks run without the hub lock.
    pub fn fire(&self, event: &Event) {
        let callbacks: Vec<Listener> = {
            let hub = self.hub();
            if hub.blocked > 0 {
                return;
            }
            let kind = event.kind();
            hub.listeners
                .iter()
                .filter(|r| r.kind == kind)
                .map(|r| Arc::clone(&r.callback))
                .collect()
        };
        for callback in callbacks {
            callback(event);
        }
    }
}

pub struct BlockGuard<'a> {
    events: &'a Events,
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        self.events.unblock();
    }
}

/// Listener registration that disconnects itself when dropped.
pub struct Subscription {
    source: WeakService,
    id: ListenerId,
}

impl Subscription {
    pub(crate) fn new(source: WeakService, id: ListenerId) -> Self {
        Self { source, id }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            source.events().disconnect(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/properties/events.rs"]
mod tests;
