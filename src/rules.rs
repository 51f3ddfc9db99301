use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::{Board, CastlingRights};
use crate::codec::MoveRequest;
use crate::error::RuleError;
use crate::movegen::{self, Move};
use crate::types::{Color, Piece, PieceKind, Square};

/// Why a game ended in a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    FiftyMove,
    Repetition,
}

/// Where a game stands. Every variant except `InProgress` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    InProgress,
    Checkmate { winner: Color },
    Stalemate,
    Draw { reason: DrawReason },
    Aborted,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::InProgress)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::InProgress => write!(f, "in progress"),
            Status::Checkmate { winner } => write!(f, "checkmate, {winner} wins"),
            Status::Stalemate => write!(f, "stalemate"),
            Status::Draw {
                reason: DrawReason::FiftyMove,
            } => write!(f, "draw by the fifty-move rule"),
            Status::Draw {
                reason: DrawReason::Repetition,
            } => write!(f, "draw by threefold repetition"),
            Status::Aborted => write!(f, "aborted"),
        }
    }
}

/// Finds the legal move of the side to move that `request` describes.
///
/// A promoting move without a promotion letter promotes to a queen. A
/// promotion letter naming a pawn or king, or any letter on a move that
/// does not promote, is rejected as an invalid promotion.
pub fn resolve(board: &Board, request: &MoveRequest) -> Result<Move, RuleError> {
    if let Some(kind) = request.promotion {
        if !kind.is_promotion_target() {
            return Err(RuleError::InvalidPromotion { kind });
        }
    }

    let candidates: Vec<Move> = movegen::legal_moves(board, board.side_to_move())
        .into_iter()
        .filter(|mv| mv.from == request.from && mv.to == request.to)
        .collect();
    let first = candidates.first().copied().ok_or_else(|| RuleError::IllegalMove {
        uci: request.to_string(),
    })?;

    if first.promotion.is_none() {
        return match request.promotion {
            Some(kind) => Err(RuleError::InvalidPromotion { kind }),
            None => Ok(first),
        };
    }

    let wanted = request.promotion.unwrap_or(PieceKind::Queen);
    candidates
        .into_iter()
        .find(|mv| mv.promotion == Some(wanted))
        .ok_or(RuleError::InvalidPromotion { kind: wanted })
}

/// Validates `request` against the side to move and returns the resulting
/// board. `board` itself is never modified.
pub fn apply(board: &Board, request: &MoveRequest) -> Result<Board, RuleError> {
    let mv = resolve(board, request)?;
    Ok(apply_move(board, &mv))
}

/// Plays a move produced by the generator for `board` without checking it.
///
/// A move whose origin square is empty leaves the board as it was.
pub fn apply_move(board: &Board, mv: &Move) -> Board {
    let Some(piece) = board.piece_at(mv.from) else {
        return *board;
    };
    let color = piece.color;
    let captured = board.piece_at(mv.to).is_some() || mv.is_en_passant();

    let mut next = board.place(mv.from, None);
    if mv.is_en_passant() {
        if let Some(passed) = mv.to.offset(0, -color.forward()) {
            next = next.place(passed, None);
        }
    }
    let landed = mv
        .promotion
        .map_or(piece, |kind| Piece::new(kind, color));
    next = next.place(mv.to, Some(landed));

    if mv.is_castle() {
        let rank = color.back_rank();
        let (rook_from, rook_to) = if mv.to.file() == 6 {
            (Square::at(7, rank), Square::at(5, rank))
        } else {
            (Square::at(0, rank), Square::at(3, rank))
        };
        let rook = next.piece_at(rook_from);
        next = next.place(rook_from, None).place(rook_to, rook);
    }

    let mut rights = board.castling_rights();
    if piece.kind == PieceKind::King {
        rights.remove(CastlingRights::both(color));
    }
    rights.remove(CastlingRights::for_rook_home(mv.from));
    rights.remove(CastlingRights::for_rook_home(mv.to));

    let en_passant = if piece.kind == PieceKind::Pawn
        && (mv.to.rank() as i8 - mv.from.rank() as i8).abs() == 2
    {
        mv.from.offset(0, color.forward())
    } else {
        None
    };

    let halfmove_clock = if piece.kind == PieceKind::Pawn || captured {
        0
    } else {
        board.halfmove_clock().saturating_add(1)
    };
    let fullmove_number = match color {
        Color::White => board.fullmove_number(),
        Color::Black => board.fullmove_number().saturating_add(1),
    };

    next.with_castling_rights(rights)
        .with_en_passant(en_passant)
        .with_clocks(halfmove_clock, fullmove_number)
        .with_side_to_move(!color)
}

/// True if `color`'s king is attacked. A side without a king is never in check.
pub fn is_in_check(board: &Board, color: Color) -> bool {
    board
        .king_square(color)
        .map_or(false, |king| movegen::is_square_attacked(board, king, !color))
}

/// Status of the game after the move that produced `board`.
///
/// `history` holds every position of the game so far, `board` included.
pub fn classify(board: &Board, history: &[Board]) -> Status {
    let to_move = board.side_to_move();
    if movegen::legal_moves(board, to_move).is_empty() {
        return if is_in_check(board, to_move) {
            Status::Checkmate { winner: !to_move }
        } else {
            Status::Stalemate
        };
    }
    if board.halfmove_clock() >= 100 {
        return Status::Draw {
            reason: DrawReason::FiftyMove,
        };
    }
    let seen = history.iter().filter(|b| b.same_position(board)).count();
    if seen >= 3 {
        return Status::Draw {
            reason: DrawReason::Repetition,
        };
    }
    Status::InProgress
}
