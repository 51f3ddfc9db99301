//! Random games cross-checked move by move against shakmaty.

use std::collections::BTreeSet;

use chess_gateway::{classify, is_in_check, legal_moves, rules, Board, Status};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use shakmaty::{fen::Fen, CastlingMode, Chess, Position};

fn reference_moves(board: &Board) -> Option<BTreeSet<String>> {
    let fen: Fen = board.to_fen().parse().ok()?;
    let pos: Chess = fen.into_position(CastlingMode::Standard).ok()?;
    Some(
        pos.legal_moves()
            .iter()
            .map(|m| m.to_uci(CastlingMode::Standard).to_string())
            .collect(),
    )
}

#[test]
fn random_playouts_match_reference() {
    let mut rng = StdRng::seed_from_u64(0x5eed_c0de);
    let mut compared = 0usize;

    for _game in 0..24 {
        let mut board = Board::standard();
        let mut history = vec![board];

        for _ply in 0..160 {
            let moves = legal_moves(&board, board.side_to_move());
            let ours: BTreeSet<String> = moves.iter().map(|m| m.to_uci()).collect();
            assert_eq!(ours.len(), moves.len(), "duplicate moves in {}", board.to_fen());

            if let Some(theirs) = reference_moves(&board) {
                assert_eq!(ours, theirs, "move sets differ in {}", board.to_fen());
                compared += 1;
            }

            let status = classify(&board, &history);
            if moves.is_empty() {
                let expected = if is_in_check(&board, board.side_to_move()) {
                    Status::Checkmate {
                        winner: !board.side_to_move(),
                    }
                } else {
                    Status::Stalemate
                };
                assert_eq!(status, expected);
            }
            if status.is_terminal() {
                break;
            }

            let mv = moves.choose(&mut rng).copied().unwrap();
            board = rules::apply_move(&board, &mv);
            history.push(board);
        }
    }

    assert!(compared > 1000, "only {compared} positions compared");
}
