use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::codec::Response;
use crate::error::SessionError;
use crate::session::{BoardSnapshot, GameSession, PlayerId, SessionId};

pub type SharedSession = Arc<Mutex<GameSession>>;

#[derive(Default)]
struct Sessions {
    by_id: HashMap<SessionId, SharedSession>,
    by_player: HashMap<PlayerId, SessionId>,
}

impl Sessions {
    fn remove(&mut self, id: SessionId) -> Option<SharedSession> {
        let removed = self.by_id.remove(&id);
        self.by_player.retain(|_, held| *held != id);
        removed
    }
}

/// Owns every live game.
///
/// The id map sits behind its own lock, taken only briefly to create,
/// resolve or drop sessions. Each session has a separate mutex, so moves in
/// one game never wait on another game. Lock order is always map first,
/// then session; nothing takes the map lock while holding a session.
/// Hooks passed to the `*_with` methods run under the session lock and
/// must not call back into the registry.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<Sessions>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seats `white` and `black` in a new game.
    ///
    /// Fails with [`SessionError::AlreadyInSession`] if either player still
    /// has a game in progress, or if both ids are the same player.
    pub fn create_session(
        &self,
        white: PlayerId,
        black: PlayerId,
    ) -> Result<SessionId, SessionError> {
        if white == black {
            return Err(SessionError::AlreadyInSession { player: white });
        }
        let mut sessions = self.write();

        for player in [&white, &black] {
            let Some(&held) = sessions.by_player.get(player) else {
                continue;
            };
            let active = match sessions.by_id.get(&held) {
                Some(session) => match session.lock() {
                    Ok(game) => !game.status().is_terminal(),
                    Err(_) => false,
                },
                None => false,
            };
            if active {
                return Err(SessionError::AlreadyInSession {
                    player: player.clone(),
                });
            }
        }

        let mut id = SessionId::random();
        while sessions.by_id.contains_key(&id) {
            id = SessionId::random();
        }

        let game = GameSession::new(id, white.clone(), black.clone());
        sessions.by_id.insert(id, Arc::new(Mutex::new(game)));
        sessions.by_player.insert(white.clone(), id);
        sessions.by_player.insert(black.clone(), id);

        tracing::info!(session = %id, %white, %black, "session created");
        Ok(id)
    }

    pub fn get_session(&self, id: SessionId) -> Result<SharedSession, SessionError> {
        self.read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// The session `player` is seated in, if any.
    pub fn session_of(&self, player: &PlayerId) -> Option<SessionId> {
        self.read().by_player.get(player).copied()
    }

    /// Removes a finished session. Closing an unknown id is a no-op; closing
    /// a game still in progress fails with [`SessionError::SessionActive`].
    pub fn close_session(&self, id: SessionId) -> Result<(), SessionError> {
        let mut sessions = self.write();
        let Some(session) = sessions.by_id.get(&id) else {
            return Ok(());
        };
        let finished = match session.lock() {
            Ok(game) => game.status().is_terminal(),
            Err(_) => true,
        };
        if !finished {
            return Err(SessionError::SessionActive(id));
        }
        sessions.remove(id);
        tracing::info!(session = %id, "session closed");
        Ok(())
    }

    /// Forces a session to `Aborted` and removes it, whatever its state.
    pub fn abort_session(&self, id: SessionId) {
        let removed = self.write().remove(id);
        if let Some(session) = removed {
            if let Ok(mut game) = session.lock() {
                game.abort();
            }
            tracing::info!(session = %id, "session aborted");
        }
    }

    /// Runs one move as a critical section on its session.
    pub fn submit_move(
        &self,
        id: SessionId,
        player: &PlayerId,
        move_text: &str,
    ) -> Result<BoardSnapshot, SessionError> {
        self.submit_move_with(id, player, move_text, BoardSnapshot::clone)
    }

    /// Like [`SessionRegistry::submit_move`], but runs `on_accept` on the new
    /// state before the session is unlocked. Whatever `on_accept` does for
    /// one session happens in the order the moves were accepted.
    pub fn submit_move_with<T, F>(
        &self,
        id: SessionId,
        player: &PlayerId,
        move_text: &str,
        on_accept: F,
    ) -> Result<T, SessionError>
    where
        F: FnOnce(&BoardSnapshot) -> T,
    {
        let session = self.get_session(id)?;
        let mut game = self.lock(id, &session)?;
        match game.submit_move(player, move_text) {
            Ok(snapshot) => Ok(on_accept(&snapshot)),
            Err(err) => {
                tracing::debug!(session = %id, %player, move_text, error = %err, "move rejected");
                Err(err)
            }
        }
    }

    /// Entry point for the transport: one text frame in, one response out.
    pub fn handle_text(&self, id: SessionId, player: &PlayerId, text: &str) -> Response {
        self.submit_move(id, player, text).into()
    }

    /// Attaches an endpoint for `player` and returns the current state.
    pub fn connect(&self, id: SessionId, player: &PlayerId) -> Result<BoardSnapshot, SessionError> {
        self.connect_with(id, player, BoardSnapshot::clone)
    }

    /// Like [`SessionRegistry::connect`], but runs `on_connect` on the
    /// current state before the session is unlocked, so nothing accepted
    /// after that state can be missed by it.
    pub fn connect_with<T, F>(
        &self,
        id: SessionId,
        player: &PlayerId,
        on_connect: F,
    ) -> Result<T, SessionError>
    where
        F: FnOnce(&BoardSnapshot) -> T,
    {
        let session = self.get_session(id)?;
        let mut game = self.lock(id, &session)?;
        if !game.attach(player) {
            return Err(SessionError::UnknownPlayer {
                player: player.clone(),
            });
        }
        tracing::info!(session = %id, %player, "player connected");
        Ok(on_connect(&game.snapshot()))
    }

    /// Detaches one of `player`'s endpoints. The game carries on until both
    /// players have no endpoint left, at which point it is aborted and
    /// removed.
    pub fn disconnect(&self, id: SessionId, player: &PlayerId) {
        let Ok(session) = self.get_session(id) else {
            return;
        };
        let abandoned = match self.lock(id, &session) {
            Ok(mut game) => {
                game.detach(player);
                if game.abandoned() {
                    game.abort();
                    true
                } else {
                    false
                }
            }
            Err(_) => return,
        };
        tracing::info!(session = %id, %player, "player disconnected");
        if abandoned {
            self.write().remove(id);
            tracing::info!(session = %id, "both players left, session removed");
        }
    }

    /// Aborts and removes every session without activity for `max_idle`
    /// as of `now`. Returns the ids removed.
    pub fn reap_idle(&self, now: Instant, max_idle: Duration) -> Vec<SessionId> {
        let candidates: Vec<(SessionId, SharedSession)> = self
            .read()
            .by_id
            .iter()
            .map(|(id, session)| (*id, Arc::clone(session)))
            .collect();

        let mut expired = Vec::new();
        for (id, session) in candidates {
            let idle = match session.lock() {
                Ok(mut game) => {
                    let idle = now.saturating_duration_since(game.last_activity()) >= max_idle;
                    if idle {
                        game.abort();
                    }
                    idle
                }
                Err(_) => true,
            };
            if idle {
                expired.push(id);
            }
        }

        if !expired.is_empty() {
            let mut sessions = self.write();
            for id in &expired {
                sessions.remove(*id);
            }
            tracing::info!(count = expired.len(), "reaped idle sessions");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_id.is_empty()
    }

    /// Locks one session. A poisoned session is dropped from the registry
    /// and reported as an internal error; other sessions are unaffected.
    fn lock<'a>(
        &self,
        id: SessionId,
        session: &'a SharedSession,
    ) -> Result<MutexGuard<'a, GameSession>, SessionError> {
        match session.lock() {
            Ok(game) => Ok(game),
            Err(poisoned) => {
                drop(poisoned);
                self.write().remove(id);
                tracing::warn!(session = %id, "session lock poisoned, session dropped");
                Err(SessionError::Internal(format!("session {id} is unusable")))
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Sessions> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Sessions> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
