use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::domain::{Caller, ChildId, ParentId, ProviderId, WorkshopId};

/// Ownership claims a caller may satisfy. An access check passes when the
/// caller satisfies at least one claim of the list (or is an admin).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessClaim {
    Parent {
        parent_id: ParentId,
        child_id: Option<ChildId>,
    },
    Provider {
        provider_id: ProviderId,
    },
    Employee {
        provider_id: ProviderId,
    },
    EmployeeWorkshop {
        provider_id: ProviderId,
        workshop_id: WorkshopId,
    },
}

/// Collaborator answering "does this caller own the referenced
/// parent/provider/workshop?". Denial is fatal for the current call.
pub trait RightsChecker: Send + Sync {
    fn user_has_rights(&self, caller: &Caller, claims: &[AccessClaim]) -> bool;
}

/// Short-lived cache for identity lookups, keyed lookups resolved at most
/// once per TTL. A zero TTL turns the cache into a pass-through, which is
/// what tests use.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().expect("cache mutex poisoned");
        entries.get(key).and_then(|(stored_at, value)| {
            if stored_at.elapsed() < self.ttl {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    pub fn get_or_insert_with(&self, key: K, resolve: impl FnOnce() -> V) -> V {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        if let Some((stored_at, value)) = entries.get(&key) {
            if stored_at.elapsed() < self.ttl {
                return value.clone();
            }
        }
        let value = resolve();
        entries.insert(key, (Instant::now(), value.clone()));
        value
    }

    pub fn invalidate(&self, key: &K) {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .remove(key);
    }
}
