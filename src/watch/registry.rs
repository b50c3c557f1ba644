//! The watched set: which allocations currently have a live stream worker.
//!
//! This is the only shared mutable state in the watch loop. The poller claims
//! entries, the owning worker releases them; both paths are lock-protected,
//! O(1), and never held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Concurrency-safe set of allocation IDs with exactly-once claim semantics.
///
/// An ID being present means exactly one live stream worker owns it. Released
/// IDs stay unclaimable for a cooldown window so an allocation whose stream
/// just ended is not immediately re-watched while the backend still lists it
/// as running.
#[derive(Debug)]
pub struct WatchedSet {
    inner: Mutex<Inner>,
    cooldown: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    active: HashSet<String>,
    released: HashMap<String, Instant>,
}

impl WatchedSet {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            cooldown,
        }
    }

    /// Atomically claims `id`. Returns false if another worker already owns
    /// it or it was released within the cooldown window.
    pub fn try_claim(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().expect("watched set lock poisoned");
        if inner.active.contains(id) {
            return false;
        }
        if let Some(released_at) = inner.released.get(id) {
            if released_at.elapsed() < self.cooldown {
                return false;
            }
        }
        inner.released.remove(id);
        inner.active.insert(id.to_string())
    }

    /// Removes `id` unconditionally. Idempotent.
    pub fn release(&self, id: &str) {
        let mut inner = self.inner.lock().expect("watched set lock poisoned");
        if inner.active.remove(id) && !self.cooldown.is_zero() {
            inner.released.insert(id.to_string(), Instant::now());
        }
        let cooldown = self.cooldown;
        inner.released.retain(|_, at| at.elapsed() < cooldown);
    }

    /// True if `id` is currently owned by a worker.
    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .lock()
            .expect("watched set lock poisoned")
            .active
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("watched set lock poisoned")
            .active
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_cooldown() -> WatchedSet {
        WatchedSet::new(Duration::ZERO)
    }

    #[test]
    fn claim_is_exclusive() {
        let set = no_cooldown();
        assert!(set.try_claim("a1"));
        assert!(!set.try_claim("a1"));
        assert!(set.contains("a1"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn release_frees_the_slot() {
        let set = no_cooldown();
        assert!(set.try_claim("a1"));
        set.release("a1");
        assert!(!set.contains("a1"));
        assert!(set.try_claim("a1"));
    }

    #[test]
    fn release_is_idempotent() {
        let set = no_cooldown();
        set.release("never-claimed");
        assert!(set.try_claim("never-claimed"));
        set.release("never-claimed");
        set.release("never-claimed");
        assert!(set.is_empty());
    }

    #[test]
    fn independent_ids_do_not_interfere() {
        let set = no_cooldown();
        assert!(set.try_claim("a1"));
        assert!(set.try_claim("a2"));
        set.release("a1");
        assert!(!set.contains("a1"));
        assert!(set.contains("a2"));
    }

    #[test]
    fn cooldown_blocks_immediate_reclaim() {
        let set = WatchedSet::new(Duration::from_millis(50));
        assert!(set.try_claim("a1"));
        set.release("a1");
        assert!(!set.try_claim("a1"));

        std::thread::sleep(Duration::from_millis(60));
        assert!(set.try_claim("a1"));
    }

    #[test]
    fn zero_cooldown_allows_immediate_reclaim() {
        let set = no_cooldown();
        assert!(set.try_claim("a1"));
        set.release("a1");
        assert!(set.try_claim("a1"));
    }

    #[test]
    fn concurrent_claims_grant_exactly_one() {
        use std::sync::Arc;

        let set = Arc::new(no_cooldown());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || set.try_claim("a1"))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(wins, 1);
    }
}
