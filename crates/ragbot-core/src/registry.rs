//! Process-wide model registry: one optional global model plus a bounded
//! per-session map, with serialized lazy initialization.

use lru::LruCache;
use ragbot_session::HistoryStore;
use ragbot_types::{ChatbotError, Credential, ModelHandle, ModelLoader, SessionId};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

/// Readiness of a session as observed by the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotReady,
    Initializing,
    Ready,
}

/// Bounds on the per-session map.
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    pub max_sessions: usize,
    /// Entries unused for longer than this are treated as absent.
    pub idle_ttl: Duration,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            idle_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

struct SessionEntry {
    model: Arc<ModelHandle>,
    last_used: Instant,
}

/// Maps sessions to initialized models.
///
/// The global slot is set at most once and never cleared; once it holds a
/// model every session is ready. Builds run under a single init lock, so
/// concurrent inits for the same session produce one build.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    history: Arc<dyn HistoryStore>,
    global: OnceLock<Arc<ModelHandle>>,
    init_lock: tokio::sync::Mutex<()>,
    sessions: Mutex<LruCache<SessionId, SessionEntry>>,
    initializing: Mutex<HashMap<SessionId, usize>>,
    idle_ttl: Duration,
}

impl ModelRegistry {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        history: Arc<dyn HistoryStore>,
        limits: RegistryLimits,
    ) -> Self {
        let capacity = NonZeroUsize::new(limits.max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            loader,
            history,
            global: OnceLock::new(),
            init_lock: tokio::sync::Mutex::new(()),
            sessions: Mutex::new(LruCache::new(capacity)),
            initializing: Mutex::new(HashMap::new()),
            idle_ttl: limits.idle_ttl,
        }
    }

    /// Build the shared model for `credential` unless one already exists.
    pub async fn ensure_global(&self, credential: &Credential) -> Result<(), ChatbotError> {
        if self.global.get().is_some() {
            return Ok(());
        }

        let _guard = self.init_lock.lock().await;
        if self.global.get().is_some() {
            return Ok(());
        }

        tracing::info!(
            "Building global retriever (key {})",
            credential.short_fingerprint()
        );
        let model = self.loader.load(credential).await.map_err(|e| {
            tracing::error!("Global retriever build failed: {e}");
            ChatbotError::Build(e)
        })?;
        // Only reachable with the init lock held, so the slot is still empty.
        let _ = self.global.set(Arc::new(model));
        tracing::info!("Global retriever ready");
        Ok(())
    }

    /// Whether the shared model is serving every session.
    pub fn is_global_ready(&self) -> bool {
        self.global.get().is_some()
    }

    /// Build a model for one session and publish it, replacing any entry the
    /// session had for a different credential.
    pub async fn init_session(
        &self,
        session: &SessionId,
        credential: Option<Credential>,
    ) -> Result<(), ChatbotError> {
        if self.is_global_ready() {
            return Err(ChatbotError::AlreadyInitialized);
        }
        let credential = credential.ok_or(ChatbotError::MissingCredential)?;
        let fingerprint = credential.fingerprint();

        let _marker = InitMarker::new(&self.initializing, session);
        let _guard = self.init_lock.lock().await;

        if self.is_global_ready() {
            return Err(ChatbotError::AlreadyInitialized);
        }
        if self.live_entry_matches(session, &fingerprint) {
            tracing::debug!("Session {session} already initialized with this key, skipping build");
            return Ok(());
        }

        tracing::info!(
            "Building retriever for session {session} (key {})",
            credential.short_fingerprint()
        );
        let model = self.loader.load(&credential).await.map_err(|e| {
            tracing::error!("Retriever build for session {session} failed: {e}");
            ChatbotError::Build(e)
        })?;

        let entry = SessionEntry {
            model: Arc::new(model),
            last_used: Instant::now(),
        };
        if let Some((evicted, _)) = self.sessions().push(session.clone(), entry) {
            if &evicted != session {
                tracing::debug!("Session map full, evicted {evicted}");
            }
        }
        tracing::info!("Session {session} initialized");
        Ok(())
    }

    /// Current readiness of `session`. Does not touch recency.
    pub fn get_state(&self, session: &SessionId) -> SessionState {
        if self.is_global_ready() {
            return SessionState::Ready;
        }
        let ready = self
            .sessions()
            .peek(session)
            .is_some_and(|entry| entry.last_used.elapsed() < self.idle_ttl);
        if ready {
            return SessionState::Ready;
        }
        let initializing = lock(&self.initializing).contains_key(session);
        if initializing {
            SessionState::Initializing
        } else {
            SessionState::NotReady
        }
    }

    /// The model serving `session`: the global one if set, else the
    /// session's own entry. Expired entries are evicted here.
    pub fn lookup(&self, session: &SessionId) -> Option<Arc<ModelHandle>> {
        if let Some(global) = self.global.get() {
            return Some(Arc::clone(global));
        }

        let mut sessions = self.sessions();
        let entry = sessions.get_mut(session)?;
        if entry.last_used.elapsed() >= self.idle_ttl {
            sessions.pop(session);
            tracing::debug!("Session {session} idle past TTL, evicted");
            return None;
        }
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.model))
    }

    /// Erase the stored conversation of `session`. The model mapping stays.
    pub async fn clear_session_history(&self, session: &SessionId) -> Result<(), ChatbotError> {
        self.history.clear(session).await.map_err(|e| {
            tracing::error!("Failed to delete chat history for session {session}: {e}");
            ChatbotError::History(e.to_string())
        })
    }

    /// Number of live per-session entries.
    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    fn live_entry_matches(&self, session: &SessionId, fingerprint: &str) -> bool {
        self.sessions().peek(session).is_some_and(|entry| {
            entry.model.fingerprint == fingerprint && entry.last_used.elapsed() < self.idle_ttl
        })
    }

    fn sessions(&self) -> MutexGuard<'_, LruCache<SessionId, SessionEntry>> {
        lock(&self.sessions)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a session as initializing for as long as it lives.
struct InitMarker<'a> {
    set: &'a Mutex<HashMap<SessionId, usize>>,
    session: SessionId,
}

impl<'a> InitMarker<'a> {
    fn new(set: &'a Mutex<HashMap<SessionId, usize>>, session: &SessionId) -> Self {
        *lock(set).entry(session.clone()).or_insert(0) += 1;
        Self {
            set,
            session: session.clone(),
        }
    }
}

impl Drop for InitMarker<'_> {
    fn drop(&mut self) {
        let mut set = lock(self.set);
        if let Some(count) = set.get_mut(&self.session) {
            *count -= 1;
            if *count == 0 {
                set.remove(&self.session);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragbot_session::MemoryHistoryStore;
    use ragbot_types::{
        ApiError, BoxFuture, ChatMessage, ChatModel, DocumentChunk, RetrievalError, Retriever,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopRetriever;

    impl Retriever for NoopRetriever {
        fn retrieve<'a>(
            &'a self,
            _query: &'a str,
        ) -> BoxFuture<'a, Result<Vec<DocumentChunk>, RetrievalError>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    struct EchoModel;

    impl ChatModel for EchoModel {
        fn complete<'a>(
            &'a self,
            _messages: &'a [ChatMessage],
        ) -> BoxFuture<'a, Result<String, ApiError>> {
            Box::pin(async { Ok("echo".to_string()) })
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        builds: AtomicUsize,
        fail: bool,
    }

    impl ModelLoader for CountingLoader {
        fn load<'a>(
            &'a self,
            credential: &'a Credential,
        ) -> BoxFuture<'a, Result<ModelHandle, RetrievalError>> {
            Box::pin(async move {
                self.builds.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(RetrievalError::EmptyCorpus {
                        dir: "./retrieval".into(),
                    });
                }
                Ok(ModelHandle {
                    retriever: Arc::new(NoopRetriever),
                    llm: Arc::new(EchoModel),
                    fingerprint: credential.fingerprint(),
                })
            })
        }
    }

    fn registry_with(loader: Arc<CountingLoader>, limits: RegistryLimits) -> ModelRegistry {
        ModelRegistry::new(loader, Arc::new(MemoryHistoryStore::new()), limits)
    }

    #[tokio::test]
    async fn init_makes_session_ready() {
        let loader = Arc::new(CountingLoader::default());
        let registry = registry_with(loader.clone(), RegistryLimits::default());
        let session = SessionId::from("10.0.0.1");

        assert_eq!(registry.get_state(&session), SessionState::NotReady);
        registry
            .init_session(&session, Some(Credential::new("k1")))
            .await
            .unwrap();

        assert_eq!(registry.get_state(&session), SessionState::Ready);
        assert!(registry.lookup(&session).is_some());
        assert!(registry.lookup(&SessionId::from("other")).is_none());
        assert_eq!(loader.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_credential_without_global() {
        let registry = registry_with(Arc::default(), RegistryLimits::default());
        let err = registry
            .init_session(&SessionId::from("s"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatbotError::MissingCredential));
    }

    #[tokio::test]
    async fn global_takes_precedence() {
        let loader = Arc::new(CountingLoader::default());
        let registry = registry_with(loader.clone(), RegistryLimits::default());
        registry.ensure_global(&Credential::new("shared")).await.unwrap();
        registry.ensure_global(&Credential::new("shared")).await.unwrap();

        let unseen = SessionId::from("never-seen");
        assert_eq!(registry.get_state(&unseen), SessionState::Ready);
        assert!(registry.lookup(&unseen).is_some());
        let err = registry
            .init_session(&unseen, Some(Credential::new("k1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatbotError::AlreadyInitialized));
        assert_eq!(loader.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_build_leaves_session_uninitialized() {
        let loader = Arc::new(CountingLoader {
            fail: true,
            ..CountingLoader::default()
        });
        let registry = registry_with(loader, RegistryLimits::default());
        let session = SessionId::from("s");

        let err = registry
            .init_session(&session, Some(Credential::new("k1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatbotError::Build(_)));
        assert_eq!(registry.get_state(&session), SessionState::NotReady);
    }

    #[tokio::test]
    async fn reinit_with_new_key_rebuilds() {
        let loader = Arc::new(CountingLoader::default());
        let registry = registry_with(loader.clone(), RegistryLimits::default());
        let session = SessionId::from("s");

        registry.init_session(&session, Some(Credential::new("k1"))).await.unwrap();
        registry.init_session(&session, Some(Credential::new("k1"))).await.unwrap();
        assert_eq!(loader.builds.load(Ordering::SeqCst), 1);

        registry.init_session(&session, Some(Credential::new("k2"))).await.unwrap();
        assert_eq!(loader.builds.load(Ordering::SeqCst), 2);
        assert_eq!(
            registry.lookup(&session).unwrap().fingerprint,
            Credential::new("k2").fingerprint()
        );
    }

    #[tokio::test]
    async fn least_recently_used_session_is_evicted() {
        let registry = registry_with(
            Arc::default(),
            RegistryLimits {
                max_sessions: 2,
                ..RegistryLimits::default()
            },
        );
        let (a, b, c) = (SessionId::from("a"), SessionId::from("b"), SessionId::from("c"));
        registry.init_session(&a, Some(Credential::new("k"))).await.unwrap();
        registry.init_session(&b, Some(Credential::new("k"))).await.unwrap();
        assert!(registry.lookup(&a).is_some());
        registry.init_session(&c, Some(Credential::new("k"))).await.unwrap();

        assert_eq!(registry.session_count(), 2);
        assert_eq!(registry.get_state(&a), SessionState::Ready);
        assert_eq!(registry.get_state(&b), SessionState::NotReady);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let registry = registry_with(
            Arc::default(),
            RegistryLimits {
                max_sessions: 8,
                idle_ttl: Duration::ZERO,
            },
        );
        let session = SessionId::from("s");
        registry.init_session(&session, Some(Credential::new("k"))).await.unwrap();

        assert_eq!(registry.get_state(&session), SessionState::NotReady);
        assert!(registry.lookup(&session).is_none());
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn marker_counts_overlapping_inits() {
        let set = Mutex::new(HashMap::new());
        let session = SessionId::from("s");
        let first = InitMarker::new(&set, &session);
        let second = InitMarker::new(&set, &session);
        drop(first);
        assert!(lock(&set).contains_key(&session));
        drop(second);
        assert!(lock(&set).is_empty());
    }
}
