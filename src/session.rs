use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::codec::parse_move;
use crate::error::SessionError;
use crate::movegen::Move;
use crate::rules::{self, Status};
use crate::types::Color;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// A random id small enough to survive a round trip through a JavaScript number.
    pub fn random() -> Self {
        SessionId(rand::random::<u64>() >> 11)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque player identity handed to us by whoever seats the players.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The state after a move, as returned to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub session: SessionId,
    pub board: Board,
    pub status: Status,
    pub last_move: Option<Move>,
}

#[derive(Debug)]
struct Seat {
    player: PlayerId,
    /// Endpoints currently attached for this player.
    endpoints: usize,
    /// Whether any endpoint ever attached.
    seen: bool,
}

impl Seat {
    fn new(player: PlayerId) -> Self {
        Seat {
            player,
            endpoints: 0,
            seen: false,
        }
    }
}

/// One game between two seated players.
///
/// The only way to change the position is [`GameSession::submit_move`];
/// a rejected request leaves the session exactly as it was.
#[derive(Debug)]
pub struct GameSession {
    id: SessionId,
    board: Board,
    /// Every position of the game, starting position first, current last.
    history: Vec<Board>,
    moves: Vec<Move>,
    white: Seat,
    black: Seat,
    status: Status,
    last_activity: Instant,
}

impl GameSession {
    /// A fresh game from the standard position; `white` moves first.
    pub fn new(id: SessionId, white: PlayerId, black: PlayerId) -> Self {
        Self::from_board(id, white, black, Board::standard())
    }

    /// A game that starts from an arbitrary position.
    pub fn from_board(id: SessionId, white: PlayerId, black: PlayerId, board: Board) -> Self {
        let status = rules::classify(&board, &[board]);
        GameSession {
            id,
            board,
            history: vec![board],
            moves: Vec::new(),
            white: Seat::new(white),
            black: Seat::new(black),
            status,
            last_activity: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn history(&self) -> &[Board] {
        &self.history
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn player(&self, color: Color) -> &PlayerId {
        &self.seat(color).player
    }

    pub fn color_of(&self, player: &PlayerId) -> Option<Color> {
        if &self.white.player == player {
            Some(Color::White)
        } else if &self.black.player == player {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            session: self.id,
            board: self.board,
            status: self.status,
            last_move: self.moves.last().copied(),
        }
    }

    /// Validates and plays one move for `player`.
    pub fn submit_move(
        &mut self,
        player: &PlayerId,
        move_text: &str,
    ) -> Result<BoardSnapshot, SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::GameOver);
        }
        let color = self
            .color_of(player)
            .ok_or_else(|| SessionError::UnknownPlayer {
                player: player.clone(),
            })?;
        if color != self.board.side_to_move() {
            return Err(SessionError::NotYourTurn {
                player: player.clone(),
            });
        }

        let request = parse_move(move_text)?;
        let mv = rules::resolve(&self.board, &request)?;
        let next = rules::apply_move(&self.board, &mv);

        if !next.kings_are_sane() || next.side_to_move() == self.board.side_to_move() {
            self.status = Status::Aborted;
            tracing::warn!(
                session = %self.id,
                fen = %next.to_fen(),
                "move produced an impossible position, aborting session"
            );
            return Err(SessionError::Internal(format!(
                "{mv} produced an impossible position"
            )));
        }

        self.board = next;
        self.history.push(next);
        self.moves.push(mv);
        self.status = rules::classify(&self.board, &self.history);
        self.last_activity = Instant::now();

        tracing::debug!(
            session = %self.id,
            %player,
            uci = %mv,
            status = %self.status,
            "move accepted"
        );
        Ok(self.snapshot())
    }

    /// Forces the game into the terminal `Aborted` state.
    /// A game that already ended keeps its result.
    pub fn abort(&mut self) {
        if !self.status.is_terminal() {
            self.status = Status::Aborted;
        }
    }

    /// Records one more endpoint for `player`. Returns false for players
    /// not seated here.
    pub fn attach(&mut self, player: &PlayerId) -> bool {
        let Some(color) = self.color_of(player) else {
            return false;
        };
        let seat = self.seat_mut(color);
        seat.endpoints += 1;
        seat.seen = true;
        self.last_activity = Instant::now();
        true
    }

    /// Records that one of `player`'s endpoints went away.
    pub fn detach(&mut self, player: &PlayerId) -> bool {
        let Some(color) = self.color_of(player) else {
            return false;
        };
        let seat = self.seat_mut(color);
        seat.endpoints = seat.endpoints.saturating_sub(1);
        self.last_activity = Instant::now();
        true
    }

    pub fn is_connected(&self, color: Color) -> bool {
        self.seat(color).endpoints > 0
    }

    /// True once both players have attached at some point and neither has
    /// an endpoint left.
    pub fn abandoned(&self) -> bool {
        [&self.white, &self.black]
            .iter()
            .all(|seat| seat.seen && seat.endpoints == 0)
    }

    fn seat(&self, color: Color) -> &Seat {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn seat_mut(&mut self, color: Color) -> &mut Seat {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }
}
