//! In-memory session contexts keyed by session id.
//!
//! Entries expire after an idle period and the map is capped; when full, the
//! least recently used session is dropped. Idle time is measured on a
//! `quanta` monotonic clock.

use std::collections::HashMap;
use std::time::Duration;

use docspace::SessionContext;
use parking_lot::Mutex;
use quanta::{Clock, Instant};
use tracing::debug;

use crate::auth::Caller;

pub const DEFAULT_IDLE: Duration = Duration::from_secs(3600);
pub const DEFAULT_CAPACITY: usize = 10_000;

struct Slot {
    ctx: SessionContext,
    last_seen: Instant,
}

pub struct SessionStore {
    clock: Clock,
    idle: Duration,
    capacity: usize,
    sessions: Mutex<HashMap<String, Slot>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE, DEFAULT_CAPACITY)
    }
}

impl SessionStore {
    pub fn new(idle: Duration, capacity: usize) -> Self {
        Self::with_clock(Clock::new(), idle, capacity)
    }

    pub fn with_clock(clock: Clock, idle: Duration, capacity: usize) -> Self {
        Self {
            clock,
            idle,
            capacity: capacity.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The caller's context; fresh (cursors at the root) for a new or
    /// expired session, or one previously bound to a different principal.
    pub fn checkout(&self, caller: &Caller) -> SessionContext {
        let now = self.clock.now();
        let mut guard = self.sessions.lock();
        if guard
            .get(&caller.session)
            .is_some_and(|slot| self.is_stale(slot, now))
        {
            debug!(session = %caller.session, "session expired");
            guard.remove(&caller.session);
            return SessionContext::new(caller.principal);
        }
        match guard.get(&caller.session) {
            Some(slot) if slot.ctx.principal == caller.principal => slot.ctx.clone(),
            Some(_) => {
                debug!(session = %caller.session, "principal changed; resetting session");
                SessionContext::new(caller.principal)
            }
            None => SessionContext::new(caller.principal),
        }
    }

    pub fn store(&self, session: &str, ctx: SessionContext) {
        let now = self.clock.now();
        let mut guard = self.sessions.lock();
        guard.insert(session.to_string(), Slot { ctx, last_seen: now });

        if guard.len() > self.capacity {
            guard.retain(|_, slot| !self.is_stale(slot, now));
        }
        while guard.len() > self.capacity {
            let Some(oldest) = guard
                .iter()
                .min_by_key(|(_, slot)| slot.last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!(session = %oldest, "session evicted at capacity");
            guard.remove(&oldest);
        }
    }

    /// Drop every session idle past the limit; returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut guard = self.sessions.lock();
        let before = guard.len();
        guard.retain(|_, slot| !self.is_stale(slot, now));
        before - guard.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    fn is_stale(&self, slot: &Slot, now: Instant) -> bool {
        now.saturating_duration_since(slot.last_seen) > self.idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docspace::Principal;

    fn caller(user_id: i64, session: &str) -> Caller {
        Caller {
            principal: Principal { user_id, level: 2 },
            session: session.to_string(),
        }
    }

    #[test]
    fn test_checkout_store_round_trip() {
        let store = SessionStore::default();
        let alice = caller(1, "s1");
        let mut ctx = store.checkout(&alice);
        ctx.received = "/inbox/".parse().unwrap();
        store.store(&alice.session, ctx);

        assert_eq!(store.checkout(&alice).received.to_string(), "/inbox/");
        assert!(store.checkout(&caller(1, "s2")).received.is_root());
    }

    #[test]
    fn test_session_reuse_by_other_principal_starts_fresh() {
        let store = SessionStore::default();
        let mut ctx = store.checkout(&caller(1, "shared"));
        ctx.generated = "/out/".parse().unwrap();
        store.store("shared", ctx);

        let other = store.checkout(&caller(2, "shared"));
        assert_eq!(other.principal.user_id, 2);
        assert!(other.generated.is_root());
    }

    #[test]
    fn test_idle_sessions_expire() {
        let (clock, mock) = Clock::mock();
        let store = SessionStore::with_clock(clock, Duration::from_secs(60), 100);
        let alice = caller(1, "s1");
        let mut ctx = store.checkout(&alice);
        ctx.received = "/inbox/".parse().unwrap();
        store.store(&alice.session, ctx);
        store.store("s2", SessionContext::new(caller(2, "s2").principal));

        mock.increment(Duration::from_secs(30));
        assert_eq!(store.checkout(&alice).received.to_string(), "/inbox/");
        store.store(&alice.session, store.checkout(&alice));

        mock.increment(Duration::from_secs(45));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);

        mock.increment(Duration::from_secs(61));
        assert!(store.checkout(&alice).received.is_root());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let (clock, mock) = Clock::mock();
        let store = SessionStore::with_clock(clock, Duration::from_secs(3600), 2);
        for (i, id) in ["a", "b", "c"].into_iter().enumerate() {
            mock.increment(Duration::from_secs(1));
            let mut ctx = SessionContext::new(caller(i as i64, id).principal);
            ctx.generated = "/kept/".parse().unwrap();
            store.store(id, ctx);
        }

        assert_eq!(store.len(), 2);
        assert!(store.checkout(&caller(0, "a")).generated.is_root());
        assert_eq!(store.checkout(&caller(2, "c")).generated.to_string(), "/kept/");
    }
}
