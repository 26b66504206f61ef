use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

/// Ancestor groups resolved for one subject.
#[derive(Debug, Clone)]
struct CachedRoles {
    roles: HashSet<String>,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CachedRoles>,
    // Insertion order, oldest first.
    order: VecDeque<String>,
}

/// Bounded cache of ancestor sets keyed by subject entity reference.
///
/// Eviction is FIFO on insertion order, not LRU: reading an entry does not
/// refresh it. Entries older than `max_age` are reported by
/// [`RoleCache::should_update`] but still returned by [`RoleCache::get`]; the
/// caller decides whether to recompute.
#[derive(Debug)]
pub struct RoleCache {
    state: Mutex<CacheState>,
    max_entries: usize,
    max_age: Duration,
}

impl Default for RoleCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ENTRIES, Self::DEFAULT_MAX_AGE)
    }
}

impl RoleCache {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

    /// A zero `max_entries` or `max_age` falls back to the default.
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_entries: if max_entries == 0 {
                Self::DEFAULT_MAX_ENTRIES
            } else {
                max_entries
            },
            max_age: if max_age.is_zero() {
                Self::DEFAULT_MAX_AGE
            } else {
                max_age
            },
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn get(&self, key: &str) -> Option<HashSet<String>> {
        self.state.lock().entries.get(key).map(|e| e.roles.clone())
    }

    /// Stores `roles` under `key`, evicting the oldest entry when a new key
    /// would exceed capacity. Re-putting a key moves it to the back.
    pub fn put(&self, key: &str, roles: HashSet<String>) {
        let mut state = self.state.lock();

        if state.entries.contains_key(key) {
            state.order.retain(|k| k != key);
        } else if state.entries.len() >= self.max_entries {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                debug!("Evicted role cache entry: key={}", oldest);
            }
        }

        state.entries.insert(
            key.to_string(),
            CachedRoles {
                roles,
                inserted_at: Instant::now(),
            },
        );
        state.order.push_back(key.to_string());
    }

    /// True when `key` is cached and older than `max_age`.
    pub fn should_update(&self, key: &str) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|e| e.inserted_at.elapsed() > self.max_age)
            .unwrap_or(false)
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.remove(key).is_some();
        if removed {
            state.order.retain(|k| k != key);
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
