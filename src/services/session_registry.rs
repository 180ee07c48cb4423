//! Device id -> session map
//!
//! Mutations for one device id are serialized through a per-device async
//! mutex, so two concurrent start requests for the same camera can never both
//! see "not registered". Different devices never contend beyond the brief
//! map lookups.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use super::session::Session;

/// Result of `get_or_create`
pub enum SessionLookup {
    Existing(Arc<Session>),
    Created(Arc<Session>),
}

impl SessionLookup {
    pub fn session(&self) -> &Arc<Session> {
        match self {
            Self::Existing(session) | Self::Created(session) => session,
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    device_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live session for `device_id`, or run `create` and register its result.
    ///
    /// An existing live session is touched and returned without calling `create`.
    /// A session that is already on its way down is awaited first, so a restart right
    /// after a stop gets a fresh transcoder instead of a dying one.
    pub async fn get_or_create<F, Fut, E>(&self, device_id: &str, create: F) -> Result<SessionLookup, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Session>, E>>,
    {
        let device_lock = self.device_lock(device_id);
        let guard = loop {
            let guard = device_lock.lock().await;
            match self.get(device_id) {
                Some(existing) if existing.state().is_live() => {
                    existing.touch();
                    return Ok(SessionLookup::Existing(existing));
                }
                Some(dying) => {
                    drop(guard);
                    debug!(device_id, "Waiting for previous session to finish");
                    dying.wait_finished().await;
                }
                None => break guard,
            }
        };

        let session = match create().await {
            Ok(session) => session,
            Err(e) => {
                drop(guard);
                drop(device_lock);
                self.prune_device_lock(device_id);
                return Err(e);
            }
        };
        self.write_sessions()
            .insert(device_id.to_string(), session.clone());
        drop(guard);
        debug!(device_id, session_id = %session.id(), "Registered session");
        Ok(SessionLookup::Created(session))
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }

    /// Drop `session` only if it is still the one registered for its device.
    pub async fn remove_session(&self, session: &Session) -> bool {
        let device_id = session.device_id();
        let device_lock = self.device_lock(device_id);
        let removed = {
            let _guard = device_lock.lock().await;
            let mut sessions = self.write_sessions();
            match sessions.get(device_id) {
                Some(current) if current.id() == session.id() => {
                    sessions.remove(device_id);
                    true
                }
                _ => false,
            }
        };
        drop(device_lock);
        self.prune_device_lock(device_id);
        if removed {
            debug!(device_id, session_id = %session.id(), "Deregistered session");
        }
        removed
    }

    pub fn list_all(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.device_id().cmp(b.device_id()));
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_sessions(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn device_lock(&self, device_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.device_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(device_id.to_string())
            .or_default()
            .clone()
    }

    /// Forget the per-device mutex once nobody holds or waits on it.
    fn prune_device_lock(&self, device_id: &str) {
        let mut locks = self
            .device_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(device_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle && self.get(device_id).is_none() {
            locks.remove(device_id);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::sleeping_session;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    #[serial]
    async fn concurrent_creates_for_one_device_spawn_once() {
        let registry = Arc::new(SessionRegistry::new());
        let creations = Arc::new(AtomicUsize::new(0));
        let (session, _dir) = sleeping_session("cam-a").await;
        let session = Arc::new(session);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let creations = creations.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_create("cam-a", || async move {
                        creations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, ()>(session)
                    })
                    .await
                    .map(|lookup| matches!(lookup, SessionLookup::Created(_)))
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(creations.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        session.process().terminate(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    #[serial]
    async fn failed_create_registers_nothing() {
        let registry = SessionRegistry::new();
        let result = registry
            .get_or_create("cam-b", || async { Err::<Arc<Session>, _>("boom") })
            .await;
        assert!(matches!(result, Err("boom")));
        assert!(registry.get("cam-b").is_none());
        assert!(registry.is_empty());
        assert!(registry.device_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn remove_session_ignores_a_newer_registration() {
        let registry = SessionRegistry::new();
        let (old, _old_dir) = sleeping_session("cam-c").await;
        let (new, _new_dir) = sleeping_session("cam-c").await;
        let new = Arc::new(new);

        let lookup = registry
            .get_or_create("cam-c", || {
                let new = new.clone();
                async move { Ok::<_, ()>(new) }
            })
            .await
            .unwrap();
        assert!(matches!(lookup, SessionLookup::Created(_)));

        assert!(!registry.remove_session(&old).await);
        assert!(registry.get("cam-c").is_some());
        assert!(registry.remove_session(&new).await);
        assert!(registry.get("cam-c").is_none());

        old.process().terminate(Duration::from_secs(1)).await;
        new.process().terminate(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    #[serial]
    async fn list_all_is_sorted_by_device() {
        let registry = SessionRegistry::new();
        let mut owned = Vec::new();
        for id in ["cam-z", "cam-m", "cam-a"] {
            let (session, dir) = sleeping_session(id).await;
            let session = Arc::new(session);
            registry
                .get_or_create(id, || {
                    let session = session.clone();
                    async move { Ok::<_, ()>(session) }
                })
                .await
                .unwrap();
            owned.push((session, dir));
        }

        let ids: Vec<_> = registry
            .list_all()
            .iter()
            .map(|s| s.device_id().to_string())
            .collect();
        assert_eq!(ids, vec!["cam-a", "cam-m", "cam-z"]);

        let middle = owned[1].0.clone();
        assert!(registry.remove_session(&middle).await);
        assert!(!registry.remove_session(&middle).await);
        assert_eq!(registry.len(), 2);
        assert!(!registry.device_locks.lock().unwrap().contains_key("cam-m"));
        for (session, _dir) in owned {
            session.process().terminate(Duration::from_secs(1)).await;
        }
    }
}
