use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::{ParseError, SessionError};
use crate::movegen::Move;
use crate::rules::Status;
use crate::session::{BoardSnapshot, SessionId};
use crate::types::{Color, Piece, PieceKind, Square};

/// A move as submitted by a player: squares and an optional promotion
/// letter. Capture, castling and en passant are worked out by the rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

impl From<Move> for MoveRequest {
    fn from(mv: Move) -> Self {
        MoveRequest {
            from: mv.from,
            to: mv.to,
            promotion: mv.promotion,
        }
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promotion {
            write!(f, "{}", kind.letter())?;
        }
        Ok(())
    }
}

impl std::str::FromStr for MoveRequest {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_move(s)
    }
}

/// Decodes `<file><rank><file><rank>[promotion]`, e.g. `e2e4` or `e7e8q`.
///
/// Surrounding whitespace is ignored and the promotion letter is
/// case-insensitive. `p` and `k` decode so the rules can reject them as
/// promotions rather than as unreadable text.
pub fn parse_move(text: &str) -> Result<MoveRequest, ParseError> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.len() != 4 && chars.len() != 5 {
        return Err(ParseError::Length { len: chars.len() });
    }

    let square = |file: char, rank: char| {
        if !('a'..='h').contains(&file) {
            return Err(ParseError::File { found: file });
        }
        Square::from_chars(file, rank).ok_or(ParseError::Rank { found: rank })
    };
    let from = square(chars[0], chars[1])?;
    let to = square(chars[2], chars[3])?;

    let promotion = match chars.get(4) {
        None => None,
        Some(&c) => Some(PieceKind::from_letter(c).ok_or(ParseError::Promotion { found: c })?),
    };

    Ok(MoveRequest {
        from,
        to,
        promotion,
    })
}

/// A successful move, as sent back to the players.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoardUpdate {
    pub session: SessionId,

    /// Occupied squares only, keyed by algebraic name.
    pub board: BTreeMap<Square, Piece>,

    pub status: Status,

    pub side_to_move: Color,

    /// The full position, clocks and rights included.
    #[serde(rename = "fen", with = "crate::chess_serde::fen_serde")]
    pub position: Board,

    /// The move that produced this position, promotion letter resolved.
    pub last_move: Option<MoveRequest>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

/// One reply to one request. Transport framing is left to the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Update(BoardUpdate),
    Error(ErrorReport),
}

impl From<BoardSnapshot> for Response {
    fn from(snapshot: BoardSnapshot) -> Self {
        Response::Update(BoardUpdate {
            session: snapshot.session,
            board: snapshot.board.occupied().collect(),
            status: snapshot.status,
            side_to_move: snapshot.board.side_to_move(),
            position: snapshot.board,
            last_move: snapshot.last_move.map(MoveRequest::from),
        })
    }
}

impl From<SessionError> for Response {
    fn from(err: SessionError) -> Self {
        let message = match &err {
            // Details of internal failures stay in the logs.
            SessionError::Internal(_) => {
                "the session was aborted after an internal error".to_string()
            }
            other => other.to_string(),
        };
        Response::Error(ErrorReport {
            kind: err.kind().to_string(),
            message,
        })
    }
}

impl From<Result<BoardSnapshot, SessionError>> for Response {
    fn from(result: Result<BoardSnapshot, SessionError>) -> Self {
        match result {
            Ok(snapshot) => snapshot.into(),
            Err(err) => err.into(),
        }
    }
}

const ENCODING_FAILED: &str =
    r#"{"type":"error","kind":"internal_error","message":"response encoding failed"}"#;

/// Serializes a response to the JSON text handed to the transport.
pub fn encode(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "failed to encode response");
        ENCODING_FAILED.to_string()
    })
}

pub fn decode(text: &str) -> Result<Response, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;
    use crate::session::PlayerId;

    fn sq(s: &str) -> Square {
        Square::parse(s).unwrap()
    }

    #[test]
    fn parses_plain_and_promotion_moves() {
        let mv = parse_move("e2e4").unwrap();
        assert_eq!((mv.from, mv.to, mv.promotion), (sq("e2"), sq("e4"), None));

        let mv = parse_move("e7e8Q").unwrap();
        assert_eq!(mv.promotion, Some(PieceKind::Queen));
        assert_eq!(mv.to_string(), "e7e8q");

        assert_eq!(parse_move(" g1f3\n").unwrap().to_string(), "g1f3");
        assert_eq!(
            parse_move("a7a8k").unwrap().promotion,
            Some(PieceKind::King)
        );
    }

    #[test]
    fn rejects_malformed_text() {
        assert_eq!(parse_move("e2e"), Err(ParseError::Length { len: 3 }));
        assert_eq!(parse_move("e2e4qq"), Err(ParseError::Length { len: 6 }));
        assert_eq!(parse_move("i2e4"), Err(ParseError::File { found: 'i' }));
        assert_eq!(parse_move("E2e4"), Err(ParseError::File { found: 'E' }));
        assert_eq!(parse_move("e9e4"), Err(ParseError::Rank { found: '9' }));
        assert_eq!(parse_move("e2e0"), Err(ParseError::Rank { found: '0' }));
        assert_eq!(parse_move("e7e8x"), Err(ParseError::Promotion { found: 'x' }));
        assert_eq!(parse_move("é2e4"), Err(ParseError::File { found: 'é' }));
    }

    #[test]
    fn update_shape() {
        let snapshot = BoardSnapshot {
            session: SessionId(7),
            board: Board::standard(),
            status: Status::InProgress,
            last_move: None,
        };
        let text = encode(&snapshot.into());
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["session"], 7);
        assert_eq!(value["board"]["e1"], "K");
        assert_eq!(value["board"]["d8"], "q");
        assert!(value["board"].get("e4").is_none());
        assert_eq!(value["status"]["state"], "in_progress");
        assert_eq!(value["side_to_move"], "white");
        assert_eq!(value["fen"], crate::board::STARTING_FEN);
        assert!(value["last_move"].is_null());

        let back = decode(&text).unwrap();
        let Response::Update(update) = back else {
            panic!("expected update");
        };
        assert_eq!(update.position, Board::standard());
        assert_eq!(update.board.len(), 32);
    }

    #[test]
    fn terminal_status_shape() {
        let status = Status::Checkmate {
            winner: Color::Black,
        };
        let value = serde_json::to_value(status).unwrap();
        assert_eq!(value, serde_json::json!({"state": "checkmate", "winner": "black"}));
    }

    #[test]
    fn error_shape() {
        let err = SessionError::NotYourTurn {
            player: PlayerId::new("bob"),
        };
        let value: serde_json::Value = serde_json::from_str(&encode(&err.into())).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "error",
                "kind": "not_your_turn",
                "message": "it is not bob's turn"
            })
        );

        let illegal: Response = SessionError::from(RuleError::IllegalMove {
            uci: "e2e5".into(),
        })
        .into();
        let Response::Error(report) = illegal else {
            panic!("expected error");
        };
        assert_eq!(report.kind, "illegal_move");
        assert_eq!(report.message, "illegal move e2e5");
    }

    #[test]
    fn internal_errors_hide_details() {
        let response: Response = SessionError::Internal("king vanished on e1".into()).into();
        let Response::Error(report) = response else {
            panic!("expected error");
        };
        assert_eq!(report.kind, "internal_error");
        assert!(!report.message.contains("e1"));
    }
}
