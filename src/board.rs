use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::FenError;
use crate::types::{Color, Piece, PieceKind, Square};

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

bitflags! {
    #[derive(Default)]
    pub struct CastlingRights: u8 {
        const WHITE_KING_SIDE = 1 << 0;
        const WHITE_QUEEN_SIDE = 1 << 1;
        const BLACK_KING_SIDE = 1 << 2;
        const BLACK_QUEEN_SIDE = 1 << 3;
    }
}

impl CastlingRights {
    pub fn king_side(color: Color) -> CastlingRights {
        match color {
            Color::White => CastlingRights::WHITE_KING_SIDE,
            Color::Black => CastlingRights::BLACK_KING_SIDE,
        }
    }

    pub fn queen_side(color: Color) -> CastlingRights {
        match color {
            Color::White => CastlingRights::WHITE_QUEEN_SIDE,
            Color::Black => CastlingRights::BLACK_QUEEN_SIDE,
        }
    }

    pub fn both(color: Color) -> CastlingRights {
        CastlingRights::king_side(color) | CastlingRights::queen_side(color)
    }

    /// The right lost when a rook leaves or is captured on `square`.
    pub fn for_rook_home(square: Square) -> CastlingRights {
        match (square.file(), square.rank()) {
            (0, 0) => CastlingRights::WHITE_QUEEN_SIDE,
            (7, 0) => CastlingRights::WHITE_KING_SIDE,
            (0, 7) => CastlingRights::BLACK_QUEEN_SIDE,
            (7, 7) => CastlingRights::BLACK_KING_SIDE,
            _ => CastlingRights::empty(),
        }
    }
}

/// Position equality for repetition counting: placement, side to move and
/// castling rights. Clocks and the en passant target are not part of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PositionKey {
    squares: [Option<Piece>; 64],
    side_to_move: Color,
    castling: CastlingRights,
}

/// A chess position. Never mutated once handed out: every operation that
/// changes it returns a new value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    squares: [Option<Piece>; 64],
    side_to_move: Color,
    castling: CastlingRights,
    en_passant: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
}

impl Default for Board {
    fn default() -> Self {
        Board::standard()
    }
}

impl Board {
    /// A board with no pieces, White to move and no castling rights.
    pub fn empty() -> Board {
        Board {
            squares: [None; 64],
            side_to_move: Color::White,
            castling: CastlingRights::empty(),
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    /// The standard starting position.
    pub fn standard() -> Board {
        const BACK: [PieceKind; 8] = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];
        let mut board = Board::empty();
        for (file, kind) in BACK.iter().enumerate() {
            let file = file as u8;
            board.squares[Square::at(file, 0).index()] = Some(Piece::new(*kind, Color::White));
            board.squares[Square::at(file, 1).index()] =
                Some(Piece::new(PieceKind::Pawn, Color::White));
            board.squares[Square::at(file, 6).index()] =
                Some(Piece::new(PieceKind::Pawn, Color::Black));
            board.squares[Square::at(file, 7).index()] = Some(Piece::new(*kind, Color::Black));
        }
        board.castling = CastlingRights::all();
        board
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.squares[square.index()]
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn castling_rights(&self) -> CastlingRights {
        self.castling
    }

    pub fn en_passant(&self) -> Option<Square> {
        self.en_passant
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    /// Returns a copy with `square` set to `piece`. Nothing else changes.
    pub fn place(&self, square: Square, piece: Option<Piece>) -> Board {
        let mut next = *self;
        next.squares[square.index()] = piece;
        next
    }

    pub fn with_side_to_move(&self, color: Color) -> Board {
        Board {
            side_to_move: color,
            ..*self
        }
    }

    pub fn with_castling_rights(&self, castling: CastlingRights) -> Board {
        Board { castling, ..*self }
    }

    pub fn with_en_passant(&self, en_passant: Option<Square>) -> Board {
        Board { en_passant, ..*self }
    }

    pub fn with_clocks(&self, halfmove_clock: u32, fullmove_number: u32) -> Board {
        Board {
            halfmove_clock,
            fullmove_number,
            ..*self
        }
    }

    /// Occupied squares paired with what stands on them, a1 first.
    pub fn occupied(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(move |sq| self.piece_at(sq).map(|p| (sq, p)))
    }

    pub fn pieces(&self, color: Color) -> impl Iterator<Item = (Square, Piece)> + '_ {
        self.occupied().filter(move |(_, p)| p.color == color)
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.pieces(color)
            .find(|(_, p)| p.kind == PieceKind::King)
            .map(|(sq, _)| sq)
    }

    /// True when each side has exactly one king.
    pub fn kings_are_sane(&self) -> bool {
        [Color::White, Color::Black].iter().all(|&color| {
            self.pieces(color)
                .filter(|(_, p)| p.kind == PieceKind::King)
                .count()
                == 1
        })
    }

    pub fn position_key(&self) -> PositionKey {
        PositionKey {
            squares: self.squares,
            side_to_move: self.side_to_move,
            castling: self.castling,
        }
    }

    pub fn same_position(&self, other: &Board) -> bool {
        self.position_key() == other.position_key()
    }

    pub fn from_fen(fen: &str) -> Result<Board, FenError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(FenError::FieldCount(fields.len()));
        }

        let mut board = Board::empty();
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(FenError::Placement(format!(
                "expected 8 ranks, got {}",
                ranks.len()
            )));
        }
        for (i, row) in ranks.iter().enumerate() {
            let rank = 7 - i as u8;
            let mut file = 0u8;
            for c in row.chars() {
                if let Some(skip) = c.to_digit(10) {
                    if skip == 0 || skip > 8 {
                        return Err(FenError::Placement(format!("bad empty count {c}")));
                    }
                    file += skip as u8;
                } else {
                    let piece = Piece::from_char(c)
                        .ok_or_else(|| FenError::Placement(format!("unknown piece {c:?}")))?;
                    let square = Square::new(file, rank).ok_or_else(|| {
                        FenError::Placement(format!("rank {} overflows", rank + 1))
                    })?;
                    board.squares[square.index()] = Some(piece);
                    file += 1;
                }
                if file > 8 {
                    return Err(FenError::Placement(format!("rank {} overflows", rank + 1)));
                }
            }
            if file != 8 {
                return Err(FenError::Placement(format!(
                    "rank {} has {file} files",
                    rank + 1
                )));
            }
        }

        board.side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::SideToMove(other.to_string())),
        };

        if fields[2] != "-" {
            for c in fields[2].chars() {
                let right = match c {
                    'K' => CastlingRights::WHITE_KING_SIDE,
                    'Q' => CastlingRights::WHITE_QUEEN_SIDE,
                    'k' => CastlingRights::BLACK_KING_SIDE,
                    'q' => CastlingRights::BLACK_QUEEN_SIDE,
                    _ => return Err(FenError::Castling(fields[2].to_string())),
                };
                board.castling |= right;
            }
        }

        board.en_passant = match fields[3] {
            "-" => None,
            text => {
                let square =
                    Square::parse(text).ok_or_else(|| FenError::EnPassant(text.to_string()))?;
                if square.rank() != 2 && square.rank() != 5 {
                    return Err(FenError::EnPassant(text.to_string()));
                }
                Some(square)
            }
        };

        board.halfmove_clock = fields[4]
            .parse()
            .map_err(|_| FenError::Counter(fields[4].to_string()))?;
        board.fullmove_number = fields[5]
            .parse()
            .map_err(|_| FenError::Counter(fields[5].to_string()))?;

        if !board.kings_are_sane() {
            return Err(FenError::Kings);
        }
        Ok(board)
    }

    pub fn to_fen(&self) -> String {
        let mut out = String::new();
        for rank in (0..8u8).rev() {
            let mut empty = 0;
            for file in 0..8u8 {
                match self.piece_at(Square::at(file, rank)) {
                    Some(piece) => {
                        if empty > 0 {
                            out.push_str(&empty.to_string());
                            empty = 0;
                        }
                        out.push(piece.to_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push_str(&empty.to_string());
            }
            if rank > 0 {
                out.push('/');
            }
        }

        out.push(' ');
        out.push(match self.side_to_move {
            Color::White => 'w',
            Color::Black => 'b',
        });

        out.push(' ');
        if self.castling.is_empty() {
            out.push('-');
        } else {
            for (right, c) in [
                (CastlingRights::WHITE_KING_SIDE, 'K'),
                (CastlingRights::WHITE_QUEEN_SIDE, 'Q'),
                (CastlingRights::BLACK_KING_SIDE, 'k'),
                (CastlingRights::BLACK_QUEEN_SIDE, 'q'),
            ] {
                if self.castling.contains(right) {
                    out.push(c);
                }
            }
        }

        out.push(' ');
        match self.en_passant {
            Some(sq) => out.push_str(&sq.to_string()),
            None => out.push('-'),
        }

        out.push_str(&format!(
            " {} {}",
            self.halfmove_clock, self.fullmove_number
        ));
        out
    }
}

impl FromStr for Board {
    type Err = FenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Board::from_fen(s)
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({})", self.to_fen())
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8u8).rev() {
            write!(f, "{} ", rank + 1)?;
            for file in 0..8u8 {
                let c = self
                    .piece_at(Square::at(file, rank))
                    .map_or('.', Piece::to_char);
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        write!(f, "  abcdefgh")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::parse(s).unwrap()
    }

    #[test]
    fn standard_position_matches_fen() {
        let board = Board::standard();
        assert_eq!(board.to_fen(), STARTING_FEN);
        assert_eq!(Board::from_fen(STARTING_FEN).unwrap(), board);
        assert_eq!(board.occupied().count(), 32);
        assert_eq!(board.king_square(Color::White), Some(sq("e1")));
        assert_eq!(board.king_square(Color::Black), Some(sq("e8")));
    }

    #[test]
    fn place_leaves_original_untouched() {
        let board = Board::standard();
        let next = board.place(sq("e2"), None);
        assert!(board.piece_at(sq("e2")).is_some());
        assert!(next.piece_at(sq("e2")).is_none());
        assert_eq!(next.side_to_move(), board.side_to_move());
    }

    #[test]
    fn position_key_ignores_clocks() {
        let board = Board::standard();
        let later = board.with_clocks(12, 30).with_en_passant(Some(sq("e3")));
        assert!(board.same_position(&later));
        assert_ne!(board, later);
        assert!(!board.same_position(&board.with_side_to_move(Color::Black)));
        assert!(!board.same_position(&board.with_castling_rights(CastlingRights::empty())));
    }

    #[test]
    fn fen_roundtrip_kiwipete() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        assert_eq!(Board::from_fen(fen).unwrap().to_fen(), fen);
        let fen = "8/8/8/3pP3/8/8/8/4K2k w - d6 0 3";
        let board: Board = fen.parse().unwrap();
        assert_eq!(board.en_passant(), Some(sq("d6")));
        assert_eq!(board.to_fen(), fen);
    }

    #[test]
    fn fen_rejects_garbage() {
        assert_eq!(Board::from_fen("8/8/8 w - - 0"), Err(FenError::FieldCount(5)));
        assert!(matches!(
            Board::from_fen("8/8/8/8/8/8/8/9 w - - 0 1"),
            Err(FenError::Placement(_))
        ));
        assert!(matches!(
            Board::from_fen("8/8/8/8/8/8/8/8 x - - 0 1"),
            Err(FenError::SideToMove(_))
        ));
        assert_eq!(
            Board::from_fen("8/8/8/8/8/8/8/8 w - - 0 1"),
            Err(FenError::Kings)
        );
        assert!(matches!(
            Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - e4 0 1"),
            Err(FenError::EnPassant(_))
        ));
    }
}
