use std::fmt;

use bitflags::bitflags;

use crate::board::{Board, CastlingRights};
use crate::rules;
use crate::types::{Color, Piece, PieceKind, Square};

bitflags! {
    #[derive(Default)]
    pub struct MoveFlags: u8 {
        const CAPTURE = 1 << 0;
        const CASTLE = 1 << 1;
        const EN_PASSANT = 1 << 2;
        const DOUBLE_PUSH = 1 << 3;
    }
}

/// A fully described move, as produced by the generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
    pub flags: MoveFlags,
}

impl Move {
    pub fn new(from: Square, to: Square) -> Move {
        Move {
            from,
            to,
            promotion: None,
            flags: MoveFlags::empty(),
        }
    }

    pub fn is_capture(&self) -> bool {
        self.flags.contains(MoveFlags::CAPTURE)
    }

    pub fn is_castle(&self) -> bool {
        self.flags.contains(MoveFlags::CASTLE)
    }

    pub fn is_en_passant(&self) -> bool {
        self.flags.contains(MoveFlags::EN_PASSANT)
    }

    /// Coordinate notation, e.g. `e7e8q`.
    pub fn to_uci(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promotion {
            write!(f, "{}", kind.letter())?;
        }
        Ok(())
    }
}

const KNIGHT_DELTAS: [(i8, i8); 8] = [
    (-2, -1),
    (-2, 1),
    (-1, -2),
    (-1, 2),
    (1, -2),
    (1, 2),
    (2, -1),
    (2, 1),
];

const KING_DELTAS: [(i8, i8); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

const ROOK_DIRS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_DIRS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

fn slide_dirs(kind: PieceKind) -> &'static [(i8, i8)] {
    const QUEEN_DIRS: [(i8, i8); 8] = [
        (1, 0),
        (-1, 0),
        (0, 1),
        (0, -1),
        (1, 1),
        (1, -1),
        (-1, 1),
        (-1, -1),
    ];
    match kind {
        PieceKind::Rook => &ROOK_DIRS,
        PieceKind::Bishop => &BISHOP_DIRS,
        PieceKind::Queen => &QUEEN_DIRS,
        _ => &[],
    }
}

/// Moves that follow each piece's movement rules but may leave the mover's
/// own king in check.
pub fn pseudo_legal_moves(board: &Board, color: Color) -> Vec<Move> {
    let mut moves = Vec::with_capacity(48);
    for (from, piece) in board.pieces(color) {
        match piece.kind {
            PieceKind::Pawn => pawn_moves(board, from, color, &mut moves),
            PieceKind::Knight => step_moves(board, from, color, &KNIGHT_DELTAS, &mut moves),
            PieceKind::King => {
                step_moves(board, from, color, &KING_DELTAS, &mut moves);
                castling_moves(board, from, color, &mut moves);
            }
            PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen => {
                slide_moves(board, from, color, slide_dirs(piece.kind), &mut moves)
            }
        }
    }
    moves
}

/// Pseudo-legal moves that do not leave `color`'s king attacked.
pub fn legal_moves(board: &Board, color: Color) -> Vec<Move> {
    pseudo_legal_moves(board, color)
        .into_iter()
        .filter(|mv| !rules::is_in_check(&rules::apply_move(board, mv), color))
        .collect()
}

/// True if any piece of color `by` attacks `target`.
pub fn is_square_attacked(board: &Board, target: Square, by: Color) -> bool {
    // A pawn of `by` attacks from one rank behind the target, relative to its direction.
    for df in [-1, 1] {
        if let Some(sq) = target.offset(df, -by.forward()) {
            if board.piece_at(sq) == Some(Piece::new(PieceKind::Pawn, by)) {
                return true;
            }
        }
    }

    let hits = |deltas: &[(i8, i8)], kind: PieceKind| {
        deltas.iter().any(|&(df, dr)| {
            target
                .offset(df, dr)
                .and_then(|sq| board.piece_at(sq))
                .map_or(false, |p| p == Piece::new(kind, by))
        })
    };
    if hits(&KNIGHT_DELTAS, PieceKind::Knight) || hits(&KING_DELTAS, PieceKind::King) {
        return true;
    }

    let ray_hits = |dirs: &[(i8, i8)], kind: PieceKind| {
        dirs.iter().any(|&(df, dr)| {
            let mut cur = target;
            while let Some(next) = cur.offset(df, dr) {
                if let Some(p) = board.piece_at(next) {
                    return p.color == by && (p.kind == kind || p.kind == PieceKind::Queen);
                }
                cur = next;
            }
            false
        })
    };
    ray_hits(&ROOK_DIRS, PieceKind::Rook) || ray_hits(&BISHOP_DIRS, PieceKind::Bishop)
}

fn push_pawn_move(from: Square, to: Square, flags: MoveFlags, moves: &mut Vec<Move>) {
    if to.rank() == 0 || to.rank() == 7 {
        for kind in PieceKind::PROMOTIONS {
            moves.push(Move {
                from,
                to,
                promotion: Some(kind),
                flags,
            });
        }
    } else {
        moves.push(Move {
            from,
            to,
            promotion: None,
            flags,
        });
    }
}

fn pawn_moves(board: &Board, from: Square, color: Color, moves: &mut Vec<Move>) {
    let dir = color.forward();
    let start_rank = match color {
        Color::White => 1,
        Color::Black => 6,
    };

    if let Some(one) = from.offset(0, dir) {
        if board.piece_at(one).is_none() {
            push_pawn_move(from, one, MoveFlags::empty(), moves);
            if from.rank() == start_rank {
                if let Some(two) = from.offset(0, 2 * dir) {
                    if board.piece_at(two).is_none() {
                        moves.push(Move {
                            from,
                            to: two,
                            promotion: None,
                            flags: MoveFlags::DOUBLE_PUSH,
                        });
                    }
                }
            }
        }
    }

    for df in [-1, 1] {
        let Some(to) = from.offset(df, dir) else {
            continue;
        };
        match board.piece_at(to) {
            Some(target) if target.color != color => {
                push_pawn_move(from, to, MoveFlags::CAPTURE, moves)
            }
            None if board.en_passant() == Some(to) => {
                // The passed pawn must actually be there, otherwise the target is stale.
                let passed = to.offset(0, -dir).and_then(|sq| board.piece_at(sq));
                if passed == Some(Piece::new(PieceKind::Pawn, !color)) {
                    moves.push(Move {
                        from,
                        to,
                        promotion: None,
                        flags: MoveFlags::CAPTURE | MoveFlags::EN_PASSANT,
                    });
                }
            }
            _ => {}
        }
    }
}

fn step_moves(
    board: &Board,
    from: Square,
    color: Color,
    deltas: &[(i8, i8)],
    moves: &mut Vec<Move>,
) {
    for &(df, dr) in deltas {
        let Some(to) = from.offset(df, dr) else {
            continue;
        };
        match board.piece_at(to) {
            None => moves.push(Move::new(from, to)),
            Some(p) if p.color != color => moves.push(Move {
                flags: MoveFlags::CAPTURE,
                ..Move::new(from, to)
            }),
            Some(_) => {}
        }
    }
}

fn slide_moves(
    board: &Board,
    from: Square,
    color: Color,
    dirs: &[(i8, i8)],
    moves: &mut Vec<Move>,
) {
    for &(df, dr) in dirs {
        let mut cur = from;
        while let Some(to) = cur.offset(df, dr) {
            match board.piece_at(to) {
                None => moves.push(Move::new(from, to)),
                Some(p) => {
                    if p.color != color {
                        moves.push(Move {
                            flags: MoveFlags::CAPTURE,
                            ..Move::new(from, to)
                        });
                    }
                    break;
                }
            }
            cur = to;
        }
    }
}

/// Castling is generated only when the right is still held, king and rook
/// stand on their home squares, everything between them is empty and the
/// king neither starts in, crosses, nor lands on an attacked square.
fn castling_moves(board: &Board, from: Square, color: Color, moves: &mut Vec<Move>) {
    let rank = color.back_rank();
    if from != Square::at(4, rank) {
        return;
    }
    let rights = board.castling_rights();
    let rook = Some(Piece::new(PieceKind::Rook, color));

    // (right, rook file, squares that must be empty, squares the king crosses, king target file)
    let sides: [(CastlingRights, u8, &[u8], [u8; 2], u8); 2] = [
        (CastlingRights::king_side(color), 7, &[5, 6], [5, 6], 6),
        (CastlingRights::queen_side(color), 0, &[1, 2, 3], [3, 2], 2),
    ];
    for (right, rook_file, between, crossed, target_file) in sides {
        if !rights.contains(right) || board.piece_at(Square::at(rook_file, rank)) != rook {
            continue;
        }
        if between
            .iter()
            .any(|&f| board.piece_at(Square::at(f, rank)).is_some())
        {
            continue;
        }
        if is_square_attacked(board, from, !color)
            || crossed
                .iter()
                .any(|&f| is_square_attacked(board, Square::at(f, rank), !color))
        {
            continue;
        }
        moves.push(Move {
            flags: MoveFlags::CASTLE,
            ..Move::new(from, Square::at(target_file, rank))
        });
    }
}

/// Number of leaf nodes of the legal move tree at `depth`.
pub fn perft(board: &Board, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let moves = legal_moves(board, board.side_to_move());
    if depth == 1 {
        return moves.len() as u64;
    }
    moves
        .iter()
        .map(|mv| perft(&rules::apply_move(board, mv), depth - 1))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::parse(s).unwrap()
    }

    fn has(moves: &[Move], uci: &str) -> bool {
        moves.iter().any(|m| m.to_uci() == uci)
    }

    #[test]
    fn start_position_has_twenty_moves() {
        let board = Board::standard();
        assert_eq!(legal_moves(&board, Color::White).len(), 20);
        assert_eq!(legal_moves(&board, Color::Black).len(), 20);
    }

    #[test]
    fn perft_start_position() {
        let board = Board::standard();
        assert_eq!(perft(&board, 1), 20);
        assert_eq!(perft(&board, 2), 400);
        assert_eq!(perft(&board, 3), 8902);
    }

    #[test]
    fn perft_kiwipete() {
        let board = Board::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        assert_eq!(perft(&board, 1), 48);
        assert_eq!(perft(&board, 2), 2039);
    }

    #[test]
    fn perft_position_three() {
        // Heavy on en passant and discovered checks along the rank.
        let board = Board::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1").unwrap();
        assert_eq!(perft(&board, 1), 14);
        assert_eq!(perft(&board, 2), 191);
        assert_eq!(perft(&board, 3), 2812);
    }

    #[test]
    fn sliders_stop_at_first_piece() {
        let board = Board::from_fen("4k3/8/8/8/R2p4/8/8/4K3 w - - 0 1").unwrap();
        let moves = pseudo_legal_moves(&board, Color::White);
        assert!(has(&moves, "a4d4"));
        assert!(!has(&moves, "a4e4"));
        let capture = moves.iter().find(|m| m.to_uci() == "a4d4").unwrap();
        assert!(capture.is_capture());
    }

    #[test]
    fn promotions_expand_to_four_kinds() {
        let board = Board::from_fen("4k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let moves = legal_moves(&board, Color::White);
        for uci in ["a7a8q", "a7a8r", "a7a8b", "a7a8n"] {
            assert!(has(&moves, uci), "missing {uci}");
        }
        assert!(!has(&moves, "a7a8"));
    }

    #[test]
    fn en_passant_requires_matching_target() {
        let with_target = Board::from_fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2").unwrap();
        let moves = legal_moves(&with_target, Color::White);
        let ep = moves.iter().find(|m| m.to_uci() == "e5d6").unwrap();
        assert!(ep.is_en_passant() && ep.is_capture());

        let without = with_target.with_en_passant(None);
        assert!(!has(&legal_moves(&without, Color::White), "e5d6"));
    }

    #[test]
    fn castling_blocked_by_attack_on_crossed_square() {
        let board = Board::from_fen("4k3/8/8/8/8/8/5r2/R3K2R w KQ - 0 1").unwrap();
        let moves = legal_moves(&board, Color::White);
        assert!(!has(&moves, "e1g1"));
        assert!(has(&moves, "e1c1"));
    }

    #[test]
    fn castling_needs_empty_squares_and_rights() {
        let board = Board::from_fen("4k3/8/8/8/8/8/8/RN2K2R w KQ - 0 1").unwrap();
        let moves = legal_moves(&board, Color::White);
        assert!(has(&moves, "e1g1"));
        assert!(!has(&moves, "e1c1"));

        let no_rights = board.with_castling_rights(CastlingRights::empty());
        assert!(!has(&legal_moves(&no_rights, Color::White), "e1g1"));
    }

    #[test]
    fn pinned_piece_cannot_leave_line() {
        let board = Board::from_fen("4k3/4r3/8/8/8/8/4N3/4K3 w - - 0 1").unwrap();
        let moves = legal_moves(&board, Color::White);
        assert!(moves.iter().all(|m| m.from != sq("e2")));
    }

    #[test]
    fn attack_detection() {
        let board = Board::standard();
        assert!(is_square_attacked(&board, sq("f3"), Color::White));
        assert!(is_square_attacked(&board, sq("d6"), Color::Black));
        assert!(!is_square_attacked(&board, sq("e4"), Color::White));
        assert!(!is_square_attacked(&board, sq("e5"), Color::Black));
    }
}
