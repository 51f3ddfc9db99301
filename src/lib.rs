//! Authoritative two-player chess sessions.
//!
//! The crate is split into a synchronous core and an optional transport:
//!
//! 1. [`Board`] is a plain value; [`movegen`] and [`rules`] are pure functions over it.
//! 2. [`GameSession`] owns one game and accepts moves through [`GameSession::submit_move`].
//! 3. [`SessionRegistry`] owns every session and serializes moves per session,
//!    so two endpoints of the same game never interleave their updates.
//! 4. [`codec`] turns move text into requests and results into JSON replies.
//!
//! With the `server` feature, `server::Gateway` serves `/ws/chess` over WebSocket,
//! forwarding each text frame to the registry and fanning every accepted move
//! out to all endpoints of its session.
//!
//! ## Example
//! ```
//! use chess_gateway::{PlayerId, SessionRegistry, Status};
//!
//! let registry = SessionRegistry::new();
//! let (white, black) = (PlayerId::new("w"), PlayerId::new("b"));
//! let id = registry.create_session(white.clone(), black.clone()).unwrap();
//!
//! for (player, text) in [(&white, "f2f3"), (&black, "e7e5"), (&white, "g2g4"), (&black, "d8h4")] {
//!     registry.submit_move(id, player, text).unwrap();
//! }
//! let game = registry.get_session(id).unwrap();
//! assert!(matches!(game.lock().unwrap().status(), Status::Checkmate { .. }));
//! ```

pub mod board;
pub mod chess_serde;
pub mod codec;
pub mod config;
pub mod error;
pub mod movegen;
pub mod registry;
pub mod rules;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod types;

pub use board::{Board, CastlingRights};
pub use codec::{parse_move, MoveRequest, Response};
pub use config::GatewayConfig;
pub use error::{ConfigError, FenError, ParseError, RuleError, SessionError};
pub use movegen::{legal_moves, pseudo_legal_moves, Move, MoveFlags};
pub use registry::SessionRegistry;
pub use rules::{apply, classify, is_in_check, DrawReason, Status};
pub use session::{BoardSnapshot, GameSession, PlayerId, SessionId};
pub use types::{Color, Piece, PieceKind, Square};
