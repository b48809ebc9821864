use crate::embeddings::EmbeddingProvider;
use crate::error::ChatError;
use crate::generation::GenerationProvider;
use crate::models::{SourceDocument, Turn};
use crate::orchestrator::ChatCoordinator;
use crate::session::Conversation;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_SESSION_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_ID)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Bounds on how many sessions are kept and for how long an idle one survives.
/// `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryLimits {
    pub max_sessions: Option<usize>,
    pub idle_ttl: Option<Duration>,
}

impl RegistryLimits {
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.max_sessions == Some(0) {
            return Err(ChatError::InvalidConfig(
                "max_sessions must be greater than zero".to_string(),
            ));
        }
        if self.idle_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ChatError::InvalidConfig(
                "idle session ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

struct Slot {
    conversation: Arc<Mutex<Conversation>>,
    last_used: Instant,
}

impl Slot {
    fn empty() -> Self {
        Self {
            conversation: Arc::new(Mutex::new(Conversation::new())),
            last_used: Instant::now(),
        }
    }
}

/// Independent conversations keyed by [`SessionId`], sharing one coordinator.
///
/// Operations on the same session are serialized by a per-session lock held for the whole
/// ingest or ask; different sessions only share the brief map lookup.
pub struct SessionRegistry<E, G>
where
    E: EmbeddingProvider,
    G: GenerationProvider,
{
    coordinator: Arc<ChatCoordinator<E, G>>,
    sessions: Mutex<HashMap<SessionId, Slot>>,
    limits: RegistryLimits,
}

impl<E, G> SessionRegistry<E, G>
where
    E: EmbeddingProvider,
    G: GenerationProvider,
{
    pub fn new(coordinator: ChatCoordinator<E, G>, limits: RegistryLimits) -> Result<Self, ChatError> {
        limits.validate()?;

        Ok(Self {
            coordinator: Arc::new(coordinator),
            sessions: Mutex::new(HashMap::new()),
            limits,
        })
    }

    pub fn coordinator(&self) -> &ChatCoordinator<E, G> {
        &self.coordinator
    }

    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    /// Replaces the session's documents, creating the session if needed. Returns the chunk count.
    pub async fn ingest(&self, id: &SessionId, documents: Vec<SourceDocument>) -> Result<usize, ChatError> {
        let conversation = self.checkout_or_create(id).await;
        let mut guard = conversation.lock().await;

        let result = guard.ingest(&self.coordinator, documents).await;
        let mut sessions = self.sessions.lock().await;

        match &result {
            Ok(_) => {
                // Evicted or cleaned up while this ingest waited: the new index must stay reachable.
                if !sessions.contains_key(id) {
                    sessions.insert(
                        id.clone(),
                        Slot {
                            conversation: Arc::clone(&conversation),
                            last_used: Instant::now(),
                        },
                    );
                    debug!(session = %id, "reinstated session after ingest");
                }
            }
            // A session that never became ready shouldn't hold a registry place, unless another
            // caller is queued on it (the map holds one reference, this call the other).
            Err(_) if !guard.is_ready() && Arc::strong_count(&conversation) == 2 => {
                if sessions
                    .get(id)
                    .is_some_and(|slot| Arc::ptr_eq(&slot.conversation, &conversation))
                {
                    sessions.remove(id);
                }
            }
            Err(_) => {}
        }

        result
    }

    pub async fn ask(&self, id: &SessionId, question: &str) -> Result<String, ChatError> {
        let conversation = self.checkout(id).await.ok_or(ChatError::NoSession)?;
        let mut guard = conversation.lock().await;
        guard.ask(&self.coordinator, question).await
    }

    /// Snapshot of the session's turns; unknown sessions have none.
    pub async fn history(&self, id: &SessionId) -> Vec<Turn> {
        match self.checkout(id).await {
            Some(conversation) => conversation.lock().await.history().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn is_ready(&self, id: &SessionId) -> bool {
        match self.checkout(id).await {
            Some(conversation) => conversation.lock().await.is_ready(),
            None => false,
        }
    }

    pub async fn remove(&self, id: &SessionId) -> bool {
        let removed = self.sessions.lock().await.remove(id).is_some();
        if removed {
            info!(session = %id, "removed session");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        self.sweep(&mut sessions);
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops sessions idle for longer than the configured TTL, returning how many went.
    pub async fn evict_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        self.sweep(&mut sessions)
    }

    async fn checkout(&self, id: &SessionId) -> Option<Arc<Mutex<Conversation>>> {
        let mut sessions = self.sessions.lock().await;
        self.sweep(&mut sessions);

        sessions.get_mut(id).map(|slot| {
            slot.last_used = Instant::now();
            Arc::clone(&slot.conversation)
        })
    }

    async fn checkout_or_create(&self, id: &SessionId) -> Arc<Mutex<Conversation>> {
        let mut sessions = self.sessions.lock().await;
        self.sweep(&mut sessions);

        if !sessions.contains_key(id) {
            if let Some(max) = self.limits.max_sessions {
                while sessions.len() >= max {
                    let Some(oldest) = least_recently_used(&sessions) else {
                        break;
                    };
                    sessions.remove(&oldest);
                    info!(session = %oldest, "evicted least recently used session");
                }
            }
            debug!(session = %id, "created session");
        }

        let slot = sessions.entry(id.clone()).or_insert_with(Slot::empty);
        slot.last_used = Instant::now();
        Arc::clone(&slot.conversation)
    }

    fn sweep(&self, sessions: &mut HashMap<SessionId, Slot>) -> usize {
        let Some(ttl) = self.limits.idle_ttl else {
            return 0;
        };

        let before = sessions.len();
        sessions.retain(|_, slot| slot.last_used.elapsed() < ttl);
        let expired = before - sessions.len();

        if expired > 0 {
            info!(expired, "evicted idle sessions");
        }
        expired
    }
}

fn least_recently_used(sessions: &HashMap<SessionId, Slot>) -> Option<SessionId> {
    sessions
        .iter()
        .min_by_key(|(_, slot)| slot.last_used)
        .map(|(id, _)| id.clone())
}
