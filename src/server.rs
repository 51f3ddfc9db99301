use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response as HttpResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::codec::{self, Response};
use crate::config::GatewayConfig;
use crate::error::{ParseError, SessionError};
use crate::registry::SessionRegistry;
use crate::session::{PlayerId, SessionId};

/// Buffered updates per session before a slow endpoint starts lagging.
const UPDATE_BUFFER: usize = 64;

/// The peer went away while we were writing to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// A duplex text stream to one player.
///
/// `recv_text` must be cancel safe: the gateway races it against updates
/// from the opponent.
#[async_trait]
pub trait Connection: Send {
    /// The next text frame, or `None` once the peer is gone.
    async fn recv_text(&mut self) -> Option<String>;

    async fn send_text(&mut self, text: String) -> Result<(), ConnectionClosed>;
}

#[async_trait]
impl Connection for WebSocket {
    async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.recv().await? {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(Message::Binary(_)) => {
                    tracing::debug!("ignoring binary frame");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), ConnectionClosed> {
        self.send(Message::Text(text))
            .await
            .map_err(|_| ConnectionClosed)
    }
}

/// Query string of `/ws/chess`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectParams {
    pub session: SessionId,
    pub player: PlayerId,
}

/// Encoded updates of one session, in the order its moves were accepted.
type Channels = HashMap<SessionId, broadcast::Sender<Arc<str>>>;

/// Binds the session core to WebSocket endpoints: one task per connection,
/// every accepted move fanned out to all endpoints of its session.
pub struct Gateway {
    registry: Arc<SessionRegistry>,
    config: GatewayConfig,
    channels: Mutex<Channels>,
}

impl Gateway {
    pub fn new(registry: Arc<SessionRegistry>, config: GatewayConfig) -> Arc<Self> {
        Arc::new(Gateway {
            registry,
            config,
            channels: Mutex::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Routes served by the gateway. Sessions are created elsewhere, through
    /// the registry.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/ws/chess", get(upgrade))
            .with_state(Arc::clone(self))
    }

    /// Listens on the configured address until the server fails. The idle
    /// reaper runs for as long as the server does.
    pub async fn serve(self: Arc<Self>) -> io::Result<()> {
        let addr = self.config.bind_addr;
        let builder = axum::Server::try_bind(&addr)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        tracing::info!(%addr, "gateway listening");

        let reaper = self.spawn_reaper();
        let result = builder
            .serve(self.router().into_make_service())
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        reaper.abort();
        result
    }

    /// Periodically aborts sessions idle for longer than the configured timeout.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(gateway.config.reap_interval);
            loop {
                ticker.tick().await;
                gateway.reap_once(Instant::now());
            }
        })
    }

    /// One reaper pass as of `now`.
    pub fn reap_once(&self, now: Instant) -> Vec<SessionId> {
        let reaped = self.registry.reap_idle(now, self.config.idle_timeout);
        if !reaped.is_empty() {
            self.channels().retain(|id, _| !reaped.contains(id));
        }
        reaped
    }

    /// Serves one player's endpoint until either side hangs up.
    ///
    /// Updates, the mover's own included, arrive through the session's
    /// channel. Only errors are answered directly.
    #[tracing::instrument(skip_all, fields(%session, %player))]
    pub async fn serve_connection<C: Connection>(
        self: Arc<Self>,
        session: SessionId,
        player: PlayerId,
        mut conn: C,
    ) {
        // Subscribing under the session lock: every later update is queued,
        // none earlier than the snapshot is.
        let attached = self.registry.connect_with(session, &player, |snapshot| {
            (codec::encode(&Response::from(snapshot.clone())), self.subscribe(session))
        });
        let (hello, mut updates) = match attached {
            Ok(attached) => attached,
            Err(err) => {
                tracing::info!(error = %err, "refusing connection");
                let _ = conn.send_text(codec::encode(&err.into())).await;
                return;
            }
        };

        if conn.send_text(hello).await.is_ok() {
            loop {
                tokio::select! {
                    frame = conn.recv_text() => {
                        let Some(text) = frame else { break };
                        if let Some(error) = self.handle_frame(session, &player, &text) {
                            if conn.send_text(error).await.is_err() {
                                break;
                            }
                        }
                    }
                    update = updates.recv() => match update {
                        Ok(text) => {
                            if conn.send_text(text.to_string()).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "endpoint lagging behind session updates");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }

        drop(updates);
        self.release(session);
        self.registry.disconnect(session, &player);
    }

    /// Plays one frame. Accepted moves are published before the session is
    /// unlocked; rejections come back as an encoded error for the sender.
    fn handle_frame(&self, session: SessionId, player: &PlayerId, text: &str) -> Option<String> {
        let len = text.chars().count();
        let result = if len > self.config.max_frame_len {
            Err(SessionError::from(ParseError::Length { len }))
        } else {
            self.registry.submit_move_with(session, player, text, |snapshot| {
                self.publish(session, &codec::encode(&Response::from(snapshot.clone())));
            })
        };
        result.err().map(|err| codec::encode(&err.into()))
    }

    fn subscribe(&self, session: SessionId) -> broadcast::Receiver<Arc<str>> {
        self.channels()
            .entry(session)
            .or_insert_with(|| broadcast::channel(UPDATE_BUFFER).0)
            .subscribe()
    }

    /// Forgets the session's channel once no endpoint listens to it.
    fn release(&self, session: SessionId) {
        let mut channels = self.channels();
        if channels
            .get(&session)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&session);
        }
    }

    fn publish(&self, session: SessionId, text: &str) {
        if let Some(sender) = self.channels().get(&session) {
            // No receivers just means nobody is attached.
            let _ = sender.send(Arc::from(text));
        }
    }

    fn channels(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn upgrade(
    State(gateway): State<Arc<Gateway>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> HttpResponse {
    ws.on_upgrade(move |socket| gateway.serve_connection(params.session, params.player, socket))
}
