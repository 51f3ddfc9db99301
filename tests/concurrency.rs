use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chess_gateway::{Color, PlayerId, SessionError, SessionRegistry, Status};

/// An opening in which no move can be replayed later by accident: every
/// origin square is either left empty or refilled by a piece that cannot
/// make the same jump.
const SCRIPT: [&str; 12] = [
    "e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "f8c5", "c2c3", "g8f6", "d2d3", "d7d6", "e1g1", "e8g8",
];

#[test]
fn racing_endpoints_never_corrupt_history() {
    const THREADS_PER_SIDE: usize = 4;

    let registry = Arc::new(SessionRegistry::new());
    let white = PlayerId::new("white");
    let black = PlayerId::new("black");
    let id = registry.create_session(white.clone(), black.clone()).unwrap();
    let accepted = AtomicUsize::new(0);

    thread::scope(|scope| {
        for i in 0..THREADS_PER_SIDE * 2 {
            let (player, color) = if i % 2 == 0 {
                (&white, Color::White)
            } else {
                (&black, Color::Black)
            };
            let registry = &registry;
            let accepted = &accepted;
            scope.spawn(move || loop {
                let ply = {
                    let session = registry.get_session(id).unwrap();
                    let game = session.lock().unwrap();
                    game.moves().len()
                };
                if ply >= SCRIPT.len() {
                    break;
                }
                let mine = (ply % 2 == 0) == (color == Color::White);
                if !mine {
                    thread::yield_now();
                    continue;
                }
                match registry.submit_move(id, player, SCRIPT[ply]) {
                    Ok(_) => {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(SessionError::NotYourTurn { .. }) | Err(SessionError::Rule(_)) => {}
                    Err(other) => panic!("unexpected error {other}"),
                }
            });
        }
    });

    assert_eq!(accepted.load(Ordering::SeqCst), SCRIPT.len());

    let session = registry.get_session(id).unwrap();
    let game = session.lock().unwrap();
    assert_eq!(game.status(), Status::InProgress);
    assert_eq!(game.history().len(), SCRIPT.len() + 1);
    let played: Vec<String> = game.moves().iter().map(|m| m.to_uci()).collect();
    assert_eq!(played, SCRIPT);
    for pair in game.history().windows(2) {
        assert_ne!(pair[0].side_to_move(), pair[1].side_to_move());
    }
}

#[test]
fn sessions_progress_independently() {
    let registry = Arc::new(SessionRegistry::new());
    let games: Vec<_> = (0..8)
        .map(|i| {
            let white = PlayerId::new(format!("w{i}"));
            let black = PlayerId::new(format!("b{i}"));
            let id = registry.create_session(white.clone(), black.clone()).unwrap();
            (id, white, black)
        })
        .collect();

    thread::scope(|scope| {
        for (id, white, black) in &games {
            let registry = &registry;
            scope.spawn(move || {
                for (ply, text) in SCRIPT.iter().enumerate() {
                    let player = if ply % 2 == 0 { white } else { black };
                    registry.submit_move(*id, player, text).unwrap();
                }
            });
        }
    });

    for (id, _, _) in &games {
        let session = registry.get_session(*id).unwrap();
        assert_eq!(session.lock().unwrap().history().len(), SCRIPT.len() + 1);
    }
}
