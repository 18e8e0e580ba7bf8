//! Application state: configuration, the exercise generator, and the session registry.
//!
//! Each session sits behind its own `tokio::sync::Mutex`, held for the full duration of
//! an operation (including the external generator call), so two requests against the
//! same session never interleave. Different sessions proceed independently and each
//! gets a private artifact directory under the configured root.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::ExerciseType;
use crate::generator::{ExerciseGenerator, GeneratorClient};
use crate::session::SessionManager;

pub type SessionHandle = Arc<Mutex<SessionManager>>;

#[derive(Default)]
struct Registry {
    by_id: HashMap<Uuid, SessionHandle>,
    /// Creation order, oldest first; used for eviction.
    order: VecDeque<Uuid>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub generator: Arc<dyn ExerciseGenerator>,
    sessions: Arc<RwLock<Registry>>,
}

impl AppState {
    /// Build state from config with the process-backed generator.
    #[instrument(level = "info", skip_all)]
    pub fn new(config: AppConfig) -> Self {
        let client = GeneratorClient::from_config(&config);
        info!(
            target: "circuit_tutor",
            generator = %client.program.display(),
            mode = %client.mode,
            rasterizer = client.rasterizer.as_deref().unwrap_or("(disabled)"),
            timeout_ms = config.generator.timeout_ms,
            artifact_root = %config.generator.artifact_root.display(),
            "Generator configured"
        );
        Self::with_generator(config, Arc::new(client))
    }

    pub fn with_generator(config: AppConfig, generator: Arc<dyn ExerciseGenerator>) -> Self {
        Self {
            config: Arc::new(config),
            generator,
            sessions: Arc::new(RwLock::new(Registry::default())),
        }
    }

    /// Register a new, empty session. Evicts the oldest sessions beyond `max_sessions`.
    #[instrument(level = "info", skip(self))]
    pub async fn create_session(&self, kind: Option<ExerciseType>) -> (Uuid, SessionHandle) {
        let id = Uuid::new_v4();
        let kind = kind.unwrap_or(self.config.session.default_exercise_type);
        let dir = self.config.generator.artifact_root.join(id.to_string());
        let session = SessionManager::new(id, kind, self.generator.clone(), dir, self.config.generator.timeout());
        let handle = Arc::new(Mutex::new(session));

        let evicted = {
            let mut reg = self.sessions.write().await;
            reg.by_id.insert(id, handle.clone());
            reg.order.push_back(id);
            let mut evicted = Vec::new();
            while reg.order.len() > self.config.session.max_sessions.max(1) {
                if let Some(old) = reg.order.pop_front() {
                    if let Some(h) = reg.by_id.remove(&old) {
                        evicted.push((old, h));
                    }
                }
            }
            evicted
        };
        for (old, h) in evicted {
            warn!(target: "session", session = %old, "Evicting oldest session");
            discard(h).await;
        }

        info!(target: "session", session = %id, %kind, "Session created");
        (id, handle)
    }

    pub async fn session(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.by_id.get(&id).cloned()
    }

    /// Look up and lock a session. `None` when it is unknown, or when it was evicted or
    /// removed while this caller waited for the lock.
    pub async fn lock_session(&self, id: Uuid) -> Option<OwnedMutexGuard<SessionManager>> {
        let handle = self.session(id).await?;
        let guard = handle.lock_owned().await;
        if guard.is_closed() {
            return None;
        }
        Some(guard)
    }

    /// Drop a session and its artifact directory. Returns false if it was unknown.
    #[instrument(level = "info", skip(self))]
    pub async fn remove_session(&self, id: Uuid) -> bool {
        let handle = {
            let mut reg = self.sessions.write().await;
            reg.order.retain(|s| *s != id);
            reg.by_id.remove(&id)
        };
        match handle {
            Some(h) => {
                discard(h).await;
                info!(target: "session", session = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.by_id.len()
    }
}

/// Waits for any in-flight operation, closes the session, then deletes its artifacts.
/// Closing under the lock keeps late holders of the handle from recreating the directory.
async fn discard(handle: SessionHandle) {
    let mut session = handle.lock().await;
    session.close();
    let dir = session.artifact_dir().to_path_buf();
    drop(session);
    if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(target: "session", dir = %dir.display(), error = %e, "Failed to remove artifact directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(max_sessions: usize, root: &std::path::Path) -> AppState {
        let mut config = AppConfig::default();
        config.session.max_sessions = max_sessions;
        config.generator.artifact_root = root.to_path_buf();
        AppState::new(config)
    }

    #[tokio::test]
    async fn eviction_closes_oldest_session() {
        let root = tempfile::tempdir().unwrap();
        let state = state(2, root.path());
        let (first, early_handle) = state.create_session(None).await;
        std::fs::create_dir_all(root.path().join(first.to_string())).unwrap();
        let (second, _) = state.create_session(None).await;
        let (third, _) = state.create_session(Some(ExerciseType::Ac)).await;

        assert_eq!(state.session_count().await, 2);
        assert!(state.session(first).await.is_none());
        assert!(state.lock_session(first).await.is_none());
        assert!(state.lock_session(second).await.is_some());
        assert_eq!(state.lock_session(third).await.unwrap().exercise_type(), ExerciseType::Ac);

        // A handle cloned before eviction sees the session as closed.
        assert!(early_handle.lock().await.is_closed());
        assert!(!root.path().join(first.to_string()).exists());
    }

    #[tokio::test]
    async fn removed_session_is_closed() {
        let root = tempfile::tempdir().unwrap();
        let state = state(8, root.path());
        let (id, handle) = state.create_session(None).await;

        assert!(state.remove_session(id).await);
        assert!(!state.remove_session(id).await);
        assert!(handle.lock().await.is_closed());
        assert!(state.lock_session(id).await.is_none());
    }
}
