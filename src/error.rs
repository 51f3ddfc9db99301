use crate::session::{PlayerId, SessionId};
use crate::types::PieceKind;

/// Malformed move text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("move text must be 4 or 5 characters, got {len}")]
    Length { len: usize },

    #[error("invalid file character {found:?}, expected a-h")]
    File { found: char },

    #[error("invalid rank character {found:?}, expected 1-8")]
    Rank { found: char },

    #[error("invalid promotion character {found:?}, expected one of nbrq")]
    Promotion { found: char },
}

/// A FEN string that does not describe a usable position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    #[error("FEN must have 6 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid piece placement: {0}")]
    Placement(String),

    #[error("invalid side to move {0:?}")]
    SideToMove(String),

    #[error("invalid castling field {0:?}")]
    Castling(String),

    #[error("invalid en passant field {0:?}")]
    EnPassant(String),

    #[error("invalid move counter {0:?}")]
    Counter(String),

    #[error("each side needs exactly one king")]
    Kings,
}

/// A move that the rules do not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("illegal move {uci}")]
    IllegalMove { uci: String },

    #[error("cannot promote to {kind}")]
    InvalidPromotion { kind: PieceKind },
}

/// Everything that can go wrong handling one request against a session.
///
/// None of these are fatal to the process, and none of them leave the
/// session in a modified state except [`SessionError::Internal`], which
/// aborts the affected session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("it is not {player}'s turn")]
    NotYourTurn { player: PlayerId },

    #[error("the game is already over")]
    GameOver,

    #[error("{player} is not seated in this session")]
    UnknownPlayer { player: PlayerId },

    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("{player} already has an active session")]
    AlreadyInSession { player: PlayerId },

    #[error("session {0} is still in progress")]
    SessionActive(SessionId),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Stable identifier reported to clients in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Parse(_) => "parse_error",
            SessionError::Rule(RuleError::IllegalMove { .. }) => "illegal_move",
            SessionError::Rule(RuleError::InvalidPromotion { .. }) => "invalid_promotion",
            SessionError::NotYourTurn { .. } => "not_your_turn",
            SessionError::GameOver => "game_over",
            SessionError::UnknownPlayer { .. } => "unknown_player",
            SessionError::NotFound(_) => "not_found",
            SessionError::AlreadyInSession { .. } => "already_in_session",
            SessionError::SessionActive(_) => "session_active",
            SessionError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },

    #[error("environment variable {name} has invalid value {value:?}")]
    Env { name: &'static str, value: String },
}
