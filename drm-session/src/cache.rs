use crate::{
    DrmError,
    session::{KeyState, SessionFactory, SessionHandle},
};
use drm_cenc::{ContentKeyId, SystemId};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Bounded set of sessions keyed by content key id, plus the record of the
/// last key that failed.
///
/// The lock is held for bookkeeping only. Sessions leaving the cache are
/// closed after it is released, so a slow CDM never blocks other tracks.
pub struct SessionCache {
    capacity: usize,
    failed_key_window: Duration,
    factory: Arc<dyn SessionFactory>,
    inner: Mutex<CacheInner>,
    resolved: Condvar,
}

#[derive(Default)]
struct CacheInner {
    slots: Vec<SessionSlot>,
    next_id: u64,
    failed: Option<FailedKey>,
    /// Failures of abandoned slots, kept until every waiter has read them.
    outcomes: Vec<FailedCreation>,
}

struct SessionSlot {
    id: u64,
    key: ContentKeyId,
    init_data: Arc<[u8]>,
    session: SessionHandle,
    created_at: Instant,
    /// Set until the creator completes or abandons its ticket.
    pending: bool,
    /// Lookups blocked on this slot while it is pending.
    waiters: usize,
}

struct FailedCreation {
    id: u64,
    error: DrmError,
    waiters: usize,
}

struct FailedKey {
    key: ContentKeyId,
    code: i32,
    recorded_at: Instant,
}

impl CacheInner {
    fn position(&self, key: &ContentKeyId) -> Option<usize> {
        self.slots.iter().position(|x| &x.key == key)
    }

    fn remove(&mut self, id: u64) -> Option<SessionSlot> {
        let index = self.slots.iter().position(|x| x.id == id)?;
        Some(self.slots.remove(index))
    }

    /// Remove slot `id`, leaving `error` behind for its waiters.
    fn abandon(&mut self, id: u64, error: DrmError) -> bool {
        let Some(slot) = self.remove(id) else {
            return false;
        };

        if slot.pending && slot.waiters > 0 {
            self.outcomes.push(FailedCreation {
                id,
                error,
                waiters: slot.waiters,
            });
        }

        true
    }

    fn take_outcome(&mut self, id: u64) -> Option<DrmError> {
        let index = self.outcomes.iter().position(|x| x.id == id)?;
        let outcome = &mut self.outcomes[index];
        outcome.waiters -= 1;

        if outcome.waiters == 0 {
            Some(self.outcomes.remove(index).error)
        } else {
            Some(outcome.error.clone())
        }
    }

    fn oldest_resolved(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, x)| !x.pending)
            .min_by_key(|(_, x)| (x.created_at, x.id))
            .map(|(i, _)| i)
    }
}

pub enum Lookup<'a> {
    /// Usable session already negotiated for the key.
    Cached(SessionHandle),
    /// New session, not generated yet. The caller negotiates the license and
    /// then completes the ticket.
    Created(CreationTicket<'a>),
}

impl SessionCache {
    pub fn new(
        capacity: usize,
        failed_key_window: Duration,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            capacity: capacity.max(1),
            failed_key_window,
            factory,
            inner: Mutex::new(CacheInner::default()),
            resolved: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a slot, resolved or still being negotiated, exists for `key`.
    pub fn contains(&self, key: &ContentKeyId) -> bool {
        self.inner.lock().position(key).is_some()
    }

    /// Return the ready session of `key` or reserve a slot for a new one.
    ///
    /// A caller asking for a key another thread is negotiating waits until
    /// that negotiation ends, and shares its error if it fails. A full cache
    /// evicts its oldest resolved slot and waits when every slot is still
    /// being negotiated.
    pub fn lookup_or_create(
        &self,
        key: &ContentKeyId,
        system: SystemId,
        init_data: &[u8],
    ) -> Result<Lookup<'_>, DrmError> {
        let mut stale = Vec::new();
        let mut inner = self.inner.lock();

        let result = loop {
            if let Some(index) = inner.position(key) {
                let slot = &mut inner.slots[index];
                let (id, pending, state) = (slot.id, slot.pending, slot.session.state());

                if pending {
                    debug!("key {key} is being negotiated, waiting");
                    slot.waiters += 1;
                    self.resolved.wait(&mut inner);

                    if let Some(slot) = inner.slots.iter_mut().find(|x| x.id == id) {
                        slot.waiters -= 1;
                    } else if let Some(error) = inner.take_outcome(id) {
                        debug!("negotiation of key {key} failed in another track");
                        break Err(error);
                    }

                    continue;
                }

                if state == KeyState::Ready {
                    debug!("reusing cached session of key {key}");
                    break Ok(Lookup::Cached(inner.slots[index].session.clone()));
                }

                debug!("dropping cached session of key {key} in state {state:?}");
                stale.push(inner.slots.remove(index).session);
            }

            if let Some(failed) = inner.failed.as_ref().filter(|x| &x.key == key) {
                if failed.recorded_at.elapsed() < self.failed_key_window {
                    warn!(
                        "key {key} failed {:?} ago with status {}, not retrying",
                        failed.recorded_at.elapsed(),
                        failed.code
                    );
                    break Err(DrmError::RecentFailureSuppressed {
                        key: key.clone(),
                        code: failed.code,
                    });
                }
            }

            if inner.slots.len() >= self.capacity {
                let Some(index) = inner.oldest_resolved() else {
                    debug!("every session slot is being negotiated, waiting");
                    self.resolved.wait(&mut inner);
                    continue;
                };

                let slot = inner.slots.remove(index);
                info!(
                    "session cache full, evicting key {} ({} bytes of init data)",
                    slot.key,
                    slot.init_data.len()
                );
                stale.push(slot.session);
            }

            let session = match self.factory.create(system) {
                Ok(x) => x,
                Err(e) => break Err(e),
            };

            let id = inner.next_id;
            inner.next_id += 1;

            let init_data = Arc::<[u8]>::from(init_data);
            inner.slots.push(SessionSlot {
                id,
                key: key.clone(),
                init_data: init_data.clone(),
                session: session.clone(),
                created_at: Instant::now(),
                pending: true,
                waiters: 0,
            });

            debug!("new {system} session for key {key}");
            break Ok(Lookup::Created(CreationTicket {
                cache: self,
                id,
                key: key.clone(),
                init_data,
                session,
                outcome: None,
                completed: false,
            }));
        };

        drop(inner);

        for session in stale {
            session.close();
        }

        result
    }

    /// Remember that `key` failed. It is refused for the failed key window
    /// unless a later negotiation of it succeeds.
    pub fn record_failure(&self, key: &ContentKeyId, code: i32) {
        warn!("recording failure {code} for key {key}");
        self.inner.lock().failed = Some(FailedKey {
            key: key.clone(),
            code,
            recorded_at: Instant::now(),
        });
    }

    /// Close every session and forget the failed key. Lookups waiting on a
    /// negotiation get [`DrmError::SessionClosed`].
    pub fn clear(&self) {
        let slots = {
            let mut inner = self.inner.lock();
            inner.failed = None;

            let slots = std::mem::take(&mut inner.slots);
            for slot in slots.iter().filter(|x| x.pending && x.waiters > 0) {
                inner.outcomes.push(FailedCreation {
                    id: slot.id,
                    error: DrmError::SessionClosed,
                    waiters: slot.waiters,
                });
            }

            slots
        };
        self.resolved.notify_all();

        if !slots.is_empty() {
            info!("closing {} cached session(s)", slots.len());
        }

        for slot in slots {
            slot.session.close();
        }
    }
}

/// Reservation of a cache slot by the thread negotiating its session.
///
/// Dropping it without [`CreationTicket::complete`] gives the slot up and
/// closes the session. Lookups waiting on the slot then fail with the error
/// passed to [`CreationTicket::fail`], or [`DrmError::SessionClosed`].
pub struct CreationTicket<'a> {
    cache: &'a SessionCache,
    id: u64,
    key: ContentKeyId,
    init_data: Arc<[u8]>,
    session: SessionHandle,
    outcome: Option<DrmError>,
    completed: bool,
}

impl CreationTicket<'_> {
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn key(&self) -> &ContentKeyId {
        &self.key
    }

    pub fn init_data(&self) -> &[u8] {
        &self.init_data
    }

    /// Publish the session to other lookups of the key.
    pub fn complete(mut self) -> SessionHandle {
        {
            let mut inner = self.cache.inner.lock();

            if let Some(slot) = inner.slots.iter_mut().find(|x| x.id == self.id) {
                slot.pending = false;
            }

            if inner.failed.as_ref().is_some_and(|x| x.key == self.key) {
                inner.failed = None;
            }
        }

        self.completed = true;
        self.cache.resolved.notify_all();
        self.session.clone()
    }

    /// Give the slot up, handing `error` to the lookups waiting on it.
    pub fn fail(mut self, error: DrmError) {
        self.outcome = Some(error);
    }
}

impl Drop for CreationTicket<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        let error = self.outcome.take().unwrap_or(DrmError::SessionClosed);
        let removed = self.cache.inner.lock().abandon(self.id, error);
        self.cache.resolved.notify_all();

        if removed {
            debug!("abandoning session of key {}", self.key);
        }

        self.session.close();
    }
}
