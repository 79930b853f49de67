use crate::gateway::SyncGateway;
use crate::predictor::ModelStatus;
use crate::session::Session;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use uuid::Uuid;

pub const SESSION_IDLE_LIMIT: Duration = Duration::from_secs(12 * 60 * 60);
pub const MAX_SESSIONS: usize = 10_000;

struct Entry {
    session: Session,
    last_seen: Instant,
}

/// Sessions keyed by cookie id. Idle entries expire, and the oldest entry is
/// evicted once `capacity` is reached.
struct SessionTable {
    entries: HashMap<Uuid, Entry>,
    idle_limit: Duration,
    capacity: usize,
}

impl SessionTable {
    fn is_live(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.last_seen) < self.idle_limit
    }

    fn get(&mut self, id: &Uuid) -> Option<&Session> {
        let now = Instant::now();
        let entry = self.entries.get(id)?;
        if !self.is_live(entry, now) {
            self.entries.remove(id);
            return None;
        }
        let entry = self.entries.get_mut(id)?;
        entry.last_seen = now;
        Some(&entry.session)
    }

    fn get_or_insert(&mut self, id: Uuid) -> &mut Session {
        let now = Instant::now();
        let live = self
            .entries
            .get(&id)
            .is_some_and(|entry| self.is_live(entry, now));
        if !live {
            self.entries.remove(&id);
            self.prune(now);
        }
        let entry = self.entries.entry(id).or_insert_with(|| Entry {
            session: Session::default(),
            last_seen: now,
        });
        entry.last_seen = now;
        &mut entry.session
    }

    fn prune(&mut self, now: Instant) {
        let idle_limit = self.idle_limit;
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_seen) < idle_limit);
        while !self.entries.is_empty() && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                self.entries.remove(&id);
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub model: ModelStatus,
    pub gateway: SyncGateway,
    sessions: Arc<Mutex<SessionTable>>,
}

impl AppState {
    pub fn new(model: ModelStatus, gateway: SyncGateway) -> Self {
        Self::with_limits(model, gateway, SESSION_IDLE_LIMIT, MAX_SESSIONS)
    }

    pub fn with_limits(
        model: ModelStatus,
        gateway: SyncGateway,
        idle_limit: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            model,
            gateway,
            sessions: Arc::new(Mutex::new(SessionTable {
                entries: HashMap::new(),
                idle_limit,
                capacity,
            })),
        }
    }

    /// Runs `f` against the caller's session, creating it on first use. The
    /// map stays locked only while `f` runs.
    pub async fn with_session<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.sessions.lock().await;
        f(sessions.get_or_insert(id))
    }

    /// Read-only access. An unknown or expired id sees a fresh session that is
    /// not stored.
    pub async fn peek_session<R>(&self, id: Uuid, f: impl FnOnce(&Session) -> R) -> R {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&id) {
            Some(session) => f(session),
            None => f(&Session::default()),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{NavAction, Screen};
    use std::path::Path;

    fn model() -> ModelStatus {
        ModelStatus::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("models/alignment_model.json"))
    }

    async fn start(state: &AppState, id: Uuid) {
        state
            .with_session(id, |session| session.navigate(NavAction::Start, &state.model))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn peeking_never_stores() {
        let state = AppState::new(model(), SyncGateway::disconnected());
        let screen = state
            .peek_session(Uuid::new_v4(), |session| session.screen())
            .await;
        assert_eq!(screen, Screen::Home);
        assert_eq!(state.session_count().await, 0);

        let id = Uuid::new_v4();
        start(&state, id).await;
        assert_eq!(state.peek_session(id, |s| s.screen()).await, Screen::Dashboard);
        assert_eq!(state.session_count().await, 1);
    }

    #[tokio::test]
    async fn oldest_session_is_evicted_at_capacity() {
        let state =
            AppState::with_limits(model(), SyncGateway::disconnected(), SESSION_IDLE_LIMIT, 2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            start(&state, *id).await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(state.session_count().await, 2);
        assert_eq!(state.peek_session(ids[0], |s| s.screen()).await, Screen::Home);
        assert_eq!(state.peek_session(ids[2], |s| s.screen()).await, Screen::Dashboard);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let state = AppState::with_limits(model(), SyncGateway::disconnected(), Duration::ZERO, 10);
        let first = Uuid::new_v4();
        start(&state, first).await;
        start(&state, Uuid::new_v4()).await;

        assert_eq!(state.session_count().await, 1);
        assert_eq!(state.peek_session(first, |s| s.screen()).await, Screen::Home);
    }
}
