//! In-memory stores.
//!
//! `ViewStore`: generated aggregate views keyed by policy and post.
//! `CanonicalSlot`: the last fetched canonical post set of one content source.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use lru::LruCache;
use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard};

use crate::domain::entities::{AggregateView, Post};

use super::config::StoreConfig;
use super::keys::ViewKey;
use super::lock::{read_guard, write_guard};

const VIEW_STORE: &str = "cache::store::views";
const CANONICAL_SLOT: &str = "cache::store::canonical";

/// How a stored view came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewOrigin {
    /// Generated ahead of any request.
    Precomputed,
    /// Generated while serving a request.
    OnDemand,
}

#[derive(Debug, Clone)]
pub struct StoredView {
    pub view: Arc<AggregateView>,
    pub generated_at: OffsetDateTime,
    pub origin: ViewOrigin,
}

/// Process-wide store of generated views.
///
/// Entries are replaced whole; a reader sees either the previous view or the
/// new one. Regeneration of a single key is serialised through
/// [`ViewStore::regeneration_lock`].
pub struct ViewStore {
    entries: RwLock<LruCache<ViewKey, StoredView>>,
    regenerating: DashMap<ViewKey, Arc<Mutex<()>>>,
}

impl ViewStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.store_limit_non_zero())),
            regenerating: DashMap::new(),
        }
    }

    pub fn get(&self, key: &ViewKey) -> Option<StoredView> {
        write_guard(&self.entries, VIEW_STORE, "get").get(key).cloned()
    }

    pub fn contains(&self, key: &ViewKey) -> bool {
        read_guard(&self.entries, VIEW_STORE, "contains").contains(key)
    }

    /// Store a view, returning the key evicted to make room, if any.
    pub fn put(&self, key: ViewKey, stored: StoredView) -> Option<ViewKey> {
        let evicted = write_guard(&self.entries, VIEW_STORE, "put")
            .push(key, stored)
            .map(|(evicted, _)| evicted)
            .filter(|evicted| *evicted != key);
        if evicted.is_some() {
            counter!("freshline_view_store_evicted_total").increment(1);
        }
        evicted
    }

    pub fn remove(&self, key: &ViewKey) -> Option<StoredView> {
        write_guard(&self.entries, VIEW_STORE, "remove").pop(key)
    }

    pub fn len(&self) -> usize {
        read_guard(&self.entries, VIEW_STORE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A handle on the mutex serialising regeneration of `key`.
    ///
    /// Every caller asking for the same key while a handle is outstanding
    /// shares one mutex. Dropping the last handle, including through a
    /// cancelled future, forgets the mutex.
    pub fn regeneration_lock(&self, key: ViewKey) -> RegenerationLock<'_> {
        let mutex = self.regenerating.entry(key).or_default().clone();
        RegenerationLock {
            store: self,
            key,
            mutex,
        }
    }

    /// Keys with a regeneration handle outstanding.
    pub fn regenerations_in_flight(&self) -> usize {
        self.regenerating.len()
    }
}

/// Shared regeneration mutex for one key, released on drop.
pub struct RegenerationLock<'a> {
    store: &'a ViewStore,
    key: ViewKey,
    mutex: Arc<Mutex<()>>,
}

impl RegenerationLock<'_> {
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().await
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.mutex.try_lock().ok()
    }

    pub fn shares_mutex_with(&self, other: &RegenerationLock<'_>) -> bool {
        Arc::ptr_eq(&self.mutex, &other.mutex)
    }
}

impl Drop for RegenerationLock<'_> {
    fn drop(&mut self) {
        // The map holds one reference and this handle the other.
        self.store.regenerating.remove_if(&self.key, |_, mutex| {
            Arc::ptr_eq(mutex, &self.mutex) && Arc::strong_count(mutex) == 2
        });
    }
}

/// The canonical post set of one content source with its fetch time.
#[derive(Default)]
pub struct CanonicalSlot {
    entry: RwLock<Option<(Arc<Vec<Post>>, OffsetDateTime)>>,
}

impl CanonicalSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<(Arc<Vec<Post>>, OffsetDateTime)> {
        read_guard(&self.entry, CANONICAL_SLOT, "get").clone()
    }

    /// Replace the stored set. Concurrent refreshes overwrite each other.
    pub fn set(&self, posts: Arc<Vec<Post>>, fetched_at: OffsetDateTime) {
        *write_guard(&self.entry, CANONICAL_SLOT, "set") = Some((posts, fetched_at));
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use time::macros::datetime;

    use super::*;
    use crate::domain::entities::{
        Address, AuxiliaryCounts, Company, Geo, PostStats, User,
    };
    use crate::domain::policy::PolicyId;

    fn sample_view(post_id: u32) -> Arc<AggregateView> {
        let post = Post {
            id: post_id,
            title: format!("post {post_id}"),
            body: "one two three".to_string(),
            author_id: 1,
        };
        Arc::new(AggregateView {
            stats: PostStats::compute(&post, 0),
            post,
            author: User {
                id: 1,
                name: "Leanne Graham".to_string(),
                username: "Bret".to_string(),
                email: "Sincere@april.biz".to_string(),
                address: Address {
                    street: "Kulas Light".to_string(),
                    suite: "Apt. 556".to_string(),
                    city: "Gwenborough".to_string(),
                    zipcode: "92998-3874".to_string(),
                    geo: Geo {
                        lat: "-37.3159".to_string(),
                        lng: "81.1496".to_string(),
                    },
                },
                phone: "1-770-736-8031 x56442".to_string(),
                website: "hildegard.org".to_string(),
                company: Company {
                    name: "Romaguera-Crona".to_string(),
                    catch_phrase: "Multi-layered client-server neural-net".to_string(),
                    bs: "harness real-time e-markets".to_string(),
                },
            },
            comments: Vec::new(),
            related_posts: Vec::new(),
            auxiliary: AuxiliaryCounts {
                photos: 0,
                albums: 0,
                todos: 0,
            },
        })
    }

    fn stored(post_id: u32) -> StoredView {
        StoredView {
            view: sample_view(post_id),
            generated_at: datetime!(2024-03-01 8:00 UTC),
            origin: ViewOrigin::OnDemand,
        }
    }

    #[test]
    fn view_roundtrip_and_remove() {
        let store = ViewStore::new(&StoreConfig::default());
        let key = ViewKey::new(PolicyId::Periodic, 7);

        assert!(store.get(&key).is_none());
        assert!(store.put(key, stored(7)).is_none());
        assert_eq!(store.get(&key).map(|entry| entry.view.post.id), Some(7));
        assert!(store.contains(&key));
        assert!(!store.contains(&ViewKey::new(PolicyId::ControlFlow, 7)));

        assert!(store.remove(&key).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn replacing_a_key_is_not_an_eviction() {
        let store = ViewStore::new(&StoreConfig::default());
        let key = ViewKey::new(PolicyId::Periodic, 1);
        store.put(key, stored(1));
        assert!(store.put(key, stored(1)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lru_eviction_respects_limit() {
        let config = StoreConfig {
            store_limit: 2,
            ..StoreConfig::default()
        };
        let store = ViewStore::new(&config);
        let first = ViewKey::new(PolicyId::Periodic, 1);
        let second = ViewKey::new(PolicyId::Periodic, 2);
        let third = ViewKey::new(PolicyId::Periodic, 3);

        store.put(first, stored(1));
        store.put(second, stored(2));
        // Touch `first` so `second` becomes least recently used.
        store.get(&first);

        assert_eq!(store.put(third, stored(3)), Some(second));
        assert!(store.contains(&first));
        assert!(store.contains(&third));
    }

    #[tokio::test]
    async fn regeneration_lock_is_shared_per_key() {
        let store = ViewStore::new(&StoreConfig::default());
        let key = ViewKey::new(PolicyId::Periodic, 1);

        let first = store.regeneration_lock(key);
        let second = store.regeneration_lock(key);
        assert!(first.shares_mutex_with(&second));

        let other = store.regeneration_lock(ViewKey::new(PolicyId::Periodic, 2));
        assert!(!first.shares_mutex_with(&other));
        drop(other);
        assert_eq!(store.regenerations_in_flight(), 1);

        let guard = first.lock().await;
        assert!(second.try_lock().is_none());
        drop(guard);

        // `second` still holds the mutex.
        drop(first);
        assert_eq!(store.regenerations_in_flight(), 1);
        let third = store.regeneration_lock(key);
        assert!(third.shares_mutex_with(&second));

        drop(second);
        drop(third);
        assert_eq!(store.regenerations_in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_its_handle() {
        let store = ViewStore::new(&StoreConfig::default());
        let key = ViewKey::new(PolicyId::ControlFlow, 4);

        let holder = store.regeneration_lock(key);
        let guard = holder.lock().await;

        let mut waiter = Box::pin(async {
            let handle = store.regeneration_lock(key);
            let _guard = handle.lock().await;
        });
        assert!(futures::poll!(waiter.as_mut()).is_pending());

        drop(guard);
        drop(holder);
        assert_eq!(store.regenerations_in_flight(), 1);

        drop(waiter);
        assert_eq!(store.regenerations_in_flight(), 0);
    }

    #[test]
    fn canonical_slot_last_write_wins() {
        let slot = CanonicalSlot::new();
        assert!(slot.get().is_none());

        let early = datetime!(2024-03-01 8:00 UTC);
        let late = datetime!(2024-03-01 8:01 UTC);
        slot.set(Arc::new(Vec::new()), early);
        slot.set(Arc::new(vec![sample_view(3).post.clone()]), late);

        let (posts, fetched_at) = slot.get().expect("slot filled");
        assert_eq!(posts.len(), 1);
        assert_eq!(fetched_at, late);
    }

    #[test]
    fn view_store_recovers_from_poisoned_lock() {
        let store = ViewStore::new(&StoreConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.write().expect("entries lock should be acquired");
            panic!("poison view store lock");
        }));

        let key = ViewKey::new(PolicyId::AlternateSource, 5);
        store.put(key, stored(5));
        assert!(store.get(&key).is_some());
    }
}
