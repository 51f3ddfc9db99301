//! Text forms used on the wire: squares as `e4`, pieces as FEN letters,
//! moves in coordinate notation and positions as FEN.

use serde::{
    de::{Error, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::codec::{parse_move, MoveRequest};
use crate::types::{Piece, Square};

impl Serialize for Square {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Square, D::Error> {
        struct SquareVisitor {}
        impl<'de> Visitor<'de> for SquareVisitor {
            type Value = Square;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "a square such as \"e4\"")
            }
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Square::parse(v).ok_or_else(|| Error::custom(format!("invalid square {v:?}")))
            }
        }
        d.deserialize_str(SquareVisitor {})
    }
}

impl Serialize for Piece {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let mut buf = [0u8; 4];
        ser.serialize_str(self.to_char().encode_utf8(&mut buf))
    }
}

impl<'de> Deserialize<'de> for Piece {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Piece, D::Error> {
        struct PieceVisitor {}
        impl<'de> Visitor<'de> for PieceVisitor {
            type Value = Piece;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "a piece letter in the FEN format")
            }
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Piece::from_char(c)
                        .ok_or_else(|| Error::custom(format!("unknown piece letter {c:?}"))),
                    _ => Err(Error::custom("a piece is a single letter")),
                }
            }
        }
        d.deserialize_str(PieceVisitor {})
    }
}

impl Serialize for MoveRequest {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MoveRequest {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<MoveRequest, D::Error> {
        struct MoveVisitor {}
        impl<'de> Visitor<'de> for MoveVisitor {
            type Value = MoveRequest;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "a move in coordinate notation")
            }
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                parse_move(v).map_err(|e| Error::custom(format!("error in parsing move: {e}")))
            }
        }
        d.deserialize_str(MoveVisitor {})
    }
}

pub mod fen_serde {
    use serde::{
        de::{Error, Visitor},
        Deserializer, Serializer,
    };

    use crate::board::Board;

    pub fn serialize<S: Serializer>(b: &Board, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&b.to_fen())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Board, D::Error> {
        struct BoardVisitor {}
        impl<'de> Visitor<'de> for BoardVisitor {
            type Value = Board;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "a game state in the FEN format")
            }
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Board::from_fen(v)
                    .map_err(|e| Error::custom(format!("error in parsing FEN: {e}")))
            }
            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Board::standard())
            }
        }
        d.deserialize_string(BoardVisitor {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, PieceKind};

    #[test]
    fn square_and_piece_text() {
        let sq: Square = serde_json::from_str("\"h8\"").unwrap();
        assert_eq!(sq, Square::new(7, 7).unwrap());
        assert!(serde_json::from_str::<Square>("\"z1\"").is_err());

        let piece = Piece::new(PieceKind::Bishop, Color::Black);
        assert_eq!(serde_json::to_string(&piece).unwrap(), "\"b\"");
        assert!(serde_json::from_str::<Piece>("\"bb\"").is_err());
    }

    #[test]
    fn move_text() {
        let mv: MoveRequest = serde_json::from_str("\"b7b8n\"").unwrap();
        assert_eq!(mv.promotion, Some(PieceKind::Knight));
        assert_eq!(serde_json::to_string(&mv).unwrap(), "\"b7b8n\"");
        assert!(serde_json::from_str::<MoveRequest>("\"b7\"").is_err());
    }
}
