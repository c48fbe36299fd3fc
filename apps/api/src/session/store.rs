//! Session Store — in-memory session table, lazily populated from the resume store.
//!
//! Layout:
//! - `slots` maps a session id to a per-id `OnceCell`. The table mutex is held only
//!   long enough to look up or insert a slot, never across an `.await`.
//! - The `OnceCell` single-flights the backing load: concurrent misses for the same id
//!   wait on one load, while misses for other ids proceed independently.
//! - A load that fails leaves no slot behind, so the table never holds empty sessions.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::resume_store::ResumeStore;
use crate::session::{ResumeMetadata, Session, SessionError};

type Slot = Arc<OnceCell<Arc<Session>>>;

pub struct SessionStore {
    backing: Arc<dyn ResumeStore>,
    window_capacity: usize,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionStore {
    pub fn new(backing: Arc<dyn ResumeStore>, window_capacity: usize) -> Self {
        Self {
            backing,
            window_capacity,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // The guarded map is never left half-updated, so a poisoned lock is still usable.
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached session without consulting the resume store.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.lock_slots().get(id)?.get().cloned()?;
        session.touch();
        Some(session)
    }

    /// Returns the cached session, loading it from the resume store on a miss.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        let guard = SlotGuard {
            store: self,
            id,
            slot: self.lock_slots().entry(id.to_string()).or_default().clone(),
        };

        let session = guard.slot.get_or_try_init(|| self.load(id)).await?.clone();
        session.touch();
        Ok(session)
    }

    async fn load(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        debug!("Session {id} not cached, loading from resume store");

        let record = self.backing.find_by_user_id(id).await.map_err(|e| {
            warn!("Resume store lookup failed for {id}: {e}");
            SessionError::StoreUnavailable(e)
        })?;

        let record = record.ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        if record.raw_text.trim().is_empty() {
            warn!("Resume for {id} exists but is empty; refusing to open a session");
            return Err(SessionError::NotFound(id.to_string()));
        }

        info!("Loaded session {id} from resume store");
        Ok(Arc::new(Session::new(
            id.to_string(),
            record.raw_text,
            ResumeMetadata::default(),
            self.window_capacity,
        )))
    }

    /// Opens a session for directly supplied resume text and returns its id.
    pub fn create(
        &self,
        resume_text: impl Into<String>,
        metadata: Option<ResumeMetadata>,
    ) -> Result<String, SessionError> {
        let resume_text = resume_text.into();
        if resume_text.trim().is_empty() {
            return Err(SessionError::InvalidResume);
        }

        let mut slots = self.lock_slots();
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if let Entry::Vacant(entry) = slots.entry(candidate.clone()) {
                let session = Session::new(
                    candidate.clone(),
                    resume_text,
                    metadata.unwrap_or_default(),
                    self.window_capacity,
                );
                entry.insert(Arc::new(OnceCell::from(Arc::new(session))));
                break candidate;
            }
        };

        info!("Created session {id}");
        Ok(id)
    }

    /// Replaces the metadata of a cached session.
    pub async fn set_metadata(
        &self,
        id: &str,
        metadata: ResumeMetadata,
    ) -> Result<(), SessionError> {
        let session = self
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.replace_metadata(metadata).await;
        debug!("Updated metadata for session {id}");
        Ok(())
    }

    /// Records a completed turn in a cached session's window.
    pub async fn append_turn(
        &self,
        id: &str,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<(), SessionError> {
        let session = self
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let evicted = session.push_turn(question.into(), answer.into()).await;
        if evicted > 0 {
            debug!("Session {id} window full, evicted {evicted} oldest turn(s)");
        }
        Ok(())
    }

    /// Removes a live session. A load still in flight for `id` is left alone.
    pub fn remove(&self, id: &str) -> bool {
        let mut slots = self.lock_slots();
        let removed = slots.get(id).is_some_and(|slot| slot.initialized());
        if removed {
            slots.remove(id);
        }
        drop(slots);
        if removed {
            info!("Removed session {id}");
        }
        removed
    }

    /// Number of live sessions. Loads still in flight are not counted.
    pub fn len(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of live sessions, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock_slots()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drops sessions idle for longer than `max_idle`. Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|max_idle| Utc::now().checked_sub_signed(max_idle))
        else {
            return 0;
        };

        let mut slots = self.lock_slots();
        let before = slots.len();
        slots.retain(|_, slot| match slot.get() {
            Some(session) => session.last_active_at() >= cutoff,
            // An empty slot nobody is loading into is a leftover; drop it too.
            None => Arc::strong_count(slot) > 1,
        });
        let evicted = before - slots.len();
        drop(slots);

        if evicted > 0 {
            info!("Evicted {evicted} idle session(s)");
        }
        evicted
    }

    /// Drops every session. Called on shutdown.
    pub fn clear(&self) {
        let mut slots = self.lock_slots();
        let count = slots.len();
        slots.clear();
        info!("Cleared {count} session slot(s)");
    }
}

/// Held by every `get_or_create` caller for the lifetime of its lookup. When the
/// last holder of a still-empty slot goes away (failed load or dropped future),
/// the slot is taken out of the table.
struct SlotGuard<'a> {
    store: &'a SessionStore,
    id: &'a str,
    slot: Slot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        // Swapped for a fresh, unshared cell so the real reference is released below.
        let slot = std::mem::take(&mut self.slot);
        let mut slots = self.store.lock_slots();
        // Slots are only cloned under the table lock and this clone is released
        // under it too, so the count is settled here: the table plus this guard.
        let abandoned = slots.get(self.id).is_some_and(|current| {
            Arc::ptr_eq(current, &slot) && !current.initialized() && Arc::strong_count(&slot) == 2
        });
        if abandoned {
            slots.remove(self.id);
            debug!("Discarded empty slot for {}", self.id);
        }
        drop(slot);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::resume_store::{InMemoryResumeStore, ResumeRecord, StoreError};
    use crate::session::Turn;

    /// Counts loads and holds each one open long enough for callers to pile up.
    struct CountingStore {
        inner: InMemoryResumeStore,
        loads: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl ResumeStore for CountingStore {
        async fn find_by_user_id(
            &self,
            user_id: &str,
        ) -> Result<Option<ResumeRecord>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.find_by_user_id(user_id).await
        }
    }

    /// Blocks lookups of "slow" until the test releases the gate.
    struct GatedStore {
        gate: Semaphore,
    }

    #[async_trait]
    impl ResumeStore for GatedStore {
        async fn find_by_user_id(
            &self,
            user_id: &str,
        ) -> Result<Option<ResumeRecord>, StoreError> {
            if user_id == "slow" {
                let _permit = self.gate.acquire().await.expect("gate closed");
            }
            Ok(Some(ResumeRecord {
                raw_text: format!("resume of {user_id}"),
            }))
        }
    }

    /// Fails the first lookup after a short delay, then serves normally.
    struct FlakyStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResumeStore for FlakyStore {
        async fn find_by_user_id(
            &self,
            _user_id: &str,
        ) -> Result<Option<ResumeRecord>, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if call == 0 {
                Err(StoreError::Unavailable("connection reset".to_string()))
            } else {
                Ok(Some(ResumeRecord {
                    raw_text: "Rust engineer".to_string(),
                }))
            }
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ResumeStore for BrokenStore {
        async fn find_by_user_id(
            &self,
            _user_id: &str,
        ) -> Result<Option<ResumeRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn empty_store(capacity: usize) -> SessionStore {
        SessionStore::new(Arc::new(InMemoryResumeStore::new()), capacity)
    }

    #[tokio::test]
    async fn test_create_then_append_scenario() {
        let store = empty_store(2);
        let id = store.create("10 years Go experience...", None).unwrap();

        let session = store.get_or_create(&id).await.unwrap();
        assert_eq!(session.resume_text(), "10 years Go experience...");

        store
            .append_turn(&id, "What languages?", "Go and Rust")
            .await
            .unwrap();
        assert_eq!(
            session.history().await,
            vec![Turn::new("What languages?", "Go and Rust")]
        );

        store.append_turn(&id, "Years?", "Ten").await.unwrap();
        store.append_turn(&id, "Location?", "Remote").await.unwrap();
        assert_eq!(
            session.history().await,
            vec![Turn::new("Years?", "Ten"), Turn::new("Location?", "Remote")]
        );
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let backing = InMemoryResumeStore::new().with_resume("u1", "Rust engineer");
        let store = SessionStore::new(Arc::new(backing), 2);

        let first = store.get_or_create("u1").await.unwrap();
        let second = store.get_or_create("u1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        store.append_turn("u1", "q", "a").await.unwrap();
        assert_eq!(second.history().await.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_load_once() {
        let backing = Arc::new(CountingStore {
            inner: InMemoryResumeStore::new().with_resume("u1", "Rust engineer"),
            loads: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let store = Arc::new(SessionStore::new(backing.clone(), 2));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get_or_create("u1").await })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(backing.loads.load(Ordering::SeqCst), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_load_does_not_block_other_ids() {
        let backing = Arc::new(GatedStore {
            gate: Semaphore::new(0),
        });
        let store = Arc::new(SessionStore::new(backing.clone(), 2));

        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_create("slow").await })
        };
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(Duration::from_secs(2), store.get_or_create("fast"))
            .await
            .expect("unrelated id was blocked by a slow load")
            .unwrap();
        assert_eq!(fast.resume_text(), "resume of fast");

        backing.gate.add_permits(1);
        let slow = slow.await.unwrap().unwrap();
        assert_eq!(slow.resume_text(), "resume of slow");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_hands_over_to_waiting_caller() {
        let backing = Arc::new(FlakyStore {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(SessionStore::new(backing.clone(), 2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get_or_create("u1").await })
            })
            .collect();

        let mut loaded = Vec::new();
        let mut failed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(session) => loaded.push(session),
                Err(SessionError::StoreUnavailable(_)) => failed += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(failed, 1);
        assert_eq!(loaded.len(), 1);
        assert_eq!(backing.calls.load(Ordering::SeqCst), 2);

        assert_eq!(store.len(), 1);
        assert!(Arc::ptr_eq(&store.get("u1").unwrap(), &loaded[0]));
        store.append_turn("u1", "q", "a").await.unwrap();
        assert_eq!(loaded[0].history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_load_leaves_no_slot_behind() {
        let backing = Arc::new(GatedStore {
            gate: Semaphore::new(0),
        });
        let store = Arc::new(SessionStore::new(backing, 2));

        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_create("slow").await })
        };
        tokio::task::yield_now().await;
        assert!(store.lock_slots().contains_key("slow"));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(!store.lock_slots().contains_key("slow"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_remove_leaves_in_flight_load_alone() {
        let backing = Arc::new(GatedStore {
            gate: Semaphore::new(0),
        });
        let store = Arc::new(SessionStore::new(backing.clone(), 2));

        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_create("slow").await })
        };
        tokio::task::yield_now().await;

        assert!(!store.remove("slow"));

        backing.gate.add_permits(1);
        let session = task.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&store.get("slow").unwrap(), &session));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_id_is_not_found_and_table_unchanged() {
        let store = empty_store(2);
        store.create("existing resume", None).unwrap();
        let before = store.len();

        let err = store.get_or_create("missing-id").await.unwrap_err();

        assert!(matches!(err, SessionError::NotFound(ref id) if id == "missing-id"));
        assert_eq!(store.len(), before);
        assert!(store.lock_slots().get("missing-id").is_none());
    }

    #[tokio::test]
    async fn test_blank_backing_resume_is_not_found() {
        let backing = InMemoryResumeStore::new().with_resume("u1", "   \n");
        let store = SessionStore::new(Arc::new(backing), 2);

        let err = store.get_or_create("u1").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced_distinctly() {
        let store = SessionStore::new(Arc::new(BrokenStore), 2);

        let err = store.get_or_create("u1").await.unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_mutations_on_unknown_id_fail_without_side_effects() {
        let backing = InMemoryResumeStore::new().with_resume("u1", "Rust engineer");
        let store = SessionStore::new(Arc::new(backing), 2);

        let err = store
            .set_metadata("u1", ResumeMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));

        let err = store.append_turn("nope", "q", "a").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_metadata_replaces() {
        let store = empty_store(2);
        let first = ResumeMetadata {
            name: Some("Ada".to_string()),
            ..Default::default()
        };
        let id = store.create("resume", Some(first.clone())).unwrap();
        let session = store.get(&id).unwrap();
        assert_eq!(session.metadata().await, first);

        let second = ResumeMetadata {
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        };
        store.set_metadata(&id, second.clone()).await.unwrap();
        assert_eq!(session.metadata().await, second);
    }

    #[test]
    fn test_create_rejects_blank_resume() {
        let store = empty_store(2);
        assert!(matches!(
            store.create("  ", None),
            Err(SessionError::InvalidResume)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_ids_are_unique() {
        let store = empty_store(2);
        let ids: std::collections::HashSet<_> = (0..100)
            .map(|_| store.create("resume", None).unwrap())
            .collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(store.ids().len(), 100);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = empty_store(2);
        let a = store.create("resume a", None).unwrap();
        store.create("resume b", None).unwrap();

        assert!(store.remove(&a));
        assert!(!store.remove(&a));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_evict_idle() {
        let store = empty_store(2);
        let stale = store.create("stale", None).unwrap();
        let fresh = store.create("fresh", None).unwrap();

        let session = store.lock_slots()[&stale].get().unwrap().clone();
        session.last_active_ms.store(
            (Utc::now() - chrono::Duration::hours(2)).timestamp_millis(),
            Ordering::Relaxed,
        );

        assert_eq!(store.evict_idle(Duration::from_secs(3600)), 1);
        assert_eq!(store.ids(), vec![fresh]);
    }

    #[test]
    fn test_evict_idle_drops_abandoned_empty_slots() {
        let store = empty_store(2);
        let in_flight = Slot::default();
        store
            .lock_slots()
            .insert("abandoned".to_string(), Slot::default());
        store
            .lock_slots()
            .insert("loading".to_string(), in_flight.clone());

        assert_eq!(store.evict_idle(Duration::from_secs(3600)), 1);

        let slots = store.lock_slots();
        assert!(!slots.contains_key("abandoned"));
        assert!(slots.contains_key("loading"));
    }
}
