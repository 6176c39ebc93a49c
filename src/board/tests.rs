use super::*;
use crate::chess::{Position, Square, STARTING_FEN};
use std::sync::Arc;

fn sq(name: &str) -> Square {
    name.parse().unwrap()
}

/// Occupancy of the board after moving whatever stands on `from` to `to`
fn after_move(base: &Snapshot, from: &str, to: &str) -> Snapshot {
    let mut next = base.clone();
    let piece = next.remove(sq(from)).unwrap();
    next.insert(sq(to), piece);
    next
}

fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(item) = rx.try_recv() {
        messages.extend(item.into_messages());
    }
    messages
}

#[test]
fn test_create_assigns_ids_from_one() {
    let registry = BoardRegistry::new(1);
    let boards = registry.create(3, STARTING_FEN).unwrap();

    assert_eq!(registry.ids(), vec![1, 2, 3]);
    for (id, board) in boards.iter() {
        assert_eq!(board.id(), *id);
        assert_eq!(board.initial_fen(), STARTING_FEN);
        assert_eq!(board.current_fen(), STARTING_FEN);
        assert_eq!(board.history_len(), 0);
        assert_eq!(board.subscriber_count(), 0);
    }
}

#[test]
fn test_create_rejects_bad_configuration() {
    let registry = BoardRegistry::new(1);

    assert!(matches!(
        registry.create(0, STARTING_FEN),
        Err(BoardError::InvalidConfiguration { .. })
    ));
    assert!(matches!(
        registry.create(2, "rnbqkbnr/pppppppp/9/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
        Err(BoardError::InvalidConfiguration { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_lookup_unknown_board() {
    let registry = BoardRegistry::new(1);
    registry.create(2, STARTING_FEN).unwrap();

    assert!(registry.lookup(2).is_ok());
    assert_eq!(
        registry.lookup(3).unwrap_err(),
        BoardError::NotFound { board_id: 3 }
    );
    assert_eq!(
        registry.lookup(0).unwrap_err(),
        BoardError::NotFound { board_id: 0 }
    );
}

#[test]
fn test_e2e4_scenario_leaves_other_board_untouched() {
    let registry = BoardRegistry::new(1);
    registry.create(2, STARTING_FEN).unwrap();
    let board1 = registry.lookup(1).unwrap();
    let board2 = registry.lookup(2).unwrap();

    let snapshot = after_move(&board1.last_occupancy(), "e2", "e4");
    let reconciled = board1.reconcile(snapshot.clone());

    assert_eq!(
        reconciled.outcome.emitted().map(|mv| mv.uci()),
        Some("e2e4".to_string())
    );
    assert_eq!(reconciled.history_len, 1);
    assert_eq!(board1.move_texts(), vec!["e2e4"]);
    assert_eq!(
        board1.current_fen(),
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
    );
    assert_eq!(board1.last_occupancy(), snapshot);

    assert_eq!(board2.history_len(), 0);
    assert_eq!(board2.current_fen(), STARTING_FEN);
    assert_eq!(
        board2.last_occupancy(),
        Position::parse(STARTING_FEN).unwrap().occupancy()
    );
}

#[test]
fn test_same_snapshot_twice_is_idempotent() {
    let board = Board::new(1, STARTING_FEN, 1).unwrap();
    let snapshot = after_move(&board.last_occupancy(), "g1", "f3");

    assert!(board.reconcile(snapshot.clone()).outcome.emitted().is_some());
    let fen = board.current_fen();

    let second = board.reconcile(snapshot);
    assert!(matches!(second.outcome, ReconcileOutcome::NoChange));
    assert_eq!(board.history_len(), 1);
    assert_eq!(board.current_fen(), fen);
}

#[test]
fn test_ambiguous_frame_keeps_baseline() {
    let board = Board::new(1, STARTING_FEN, 1).unwrap();
    let baseline = board.last_occupancy();
    let mut garbled = after_move(&baseline, "e2", "e4");
    garbled.remove(sq("h7"));
    garbled.remove(sq("b1"));

    let reconciled = board.reconcile(garbled);
    assert!(matches!(
        reconciled.outcome,
        ReconcileOutcome::Pending { clean: false, .. }
    ));
    assert_eq!(board.last_occupancy(), baseline);
    assert_eq!(board.history_len(), 0);
    assert!(board.status().pending);

    assert!(matches!(
        board.reconcile(baseline).outcome,
        ReconcileOutcome::Reverted
    ));
    assert!(!board.status().pending);
}

#[test]
fn test_replay_consistency_over_a_game() {
    let board = Board::new(1, STARTING_FEN, 1).unwrap();
    let plies = [
        ("e2", "e4"),
        ("e7", "e5"),
        ("g1", "f3"),
        ("b8", "c6"),
        ("f1", "c4"),
        ("g8", "f6"),
    ];

    for (from, to) in plies {
        let next = after_move(&board.last_occupancy(), from, to);
        assert!(board.reconcile(next).outcome.emitted().is_some());
    }

    // Castling is read from four squares changing at once
    let mut castled = after_move(&board.last_occupancy(), "e1", "g1");
    castled = after_move(&castled, "h1", "f1");
    assert_eq!(
        board
            .reconcile(castled)
            .outcome
            .emitted()
            .map(|mv| mv.uci()),
        Some("e1g1".to_string())
    );

    let mut replayed = board.initial_position().clone();
    for mv in board.history() {
        replayed.apply(&mv);
    }
    assert_eq!(replayed, board.current_position());
    assert_eq!(replayed.occupancy(), board.last_occupancy());
    assert_eq!(
        board.current_fen(),
        "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQ1RK1 b kq - 5 4"
    );
}

#[test]
fn test_subscriber_after_move_gets_replay_then_live() {
    let board = Board::new(1, STARTING_FEN, 1).unwrap();
    board.reconcile(after_move(&board.last_occupancy(), "e2", "e4"));

    let (tx, mut rx) = mpsc::channel(8);
    assert!(board.attach(ClientId::new(), ChannelKind::Moves, tx));
    assert_eq!(drain(&mut rx), vec!["e2e4"]);

    // Nothing more until the next real move
    board.reconcile(board.last_occupancy());
    assert!(drain(&mut rx).is_empty());

    board.reconcile(after_move(&board.last_occupancy(), "e7", "e5"));
    assert_eq!(drain(&mut rx), vec!["e7e5"]);
}

#[test]
fn test_empty_history_sends_nothing_on_subscribe() {
    let board = Board::new(1, STARTING_FEN, 1).unwrap();
    let (tx, mut rx) = mpsc::channel(1);
    assert!(board.attach(ClientId::new(), ChannelKind::Moves, tx));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_fen_channel_always_sends_initial_position() {
    let board = Board::new(1, STARTING_FEN, 1).unwrap();
    board.reconcile(after_move(&board.last_occupancy(), "d2", "d4"));
    board.reconcile(after_move(&board.last_occupancy(), "d7", "d5"));

    let (tx, mut rx) = mpsc::channel(4);
    assert!(board.attach(ClientId::new(), ChannelKind::Fen, tx));
    assert_eq!(drain(&mut rx), vec![format!("FEN:{}", STARTING_FEN)]);

    // Moves are not pushed to the FEN channel
    board.reconcile(after_move(&board.last_occupancy(), "c2", "c4"));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_fen_channel_keeps_fen_text_verbatim() {
    let placement = "8/8/8/8/8/8/4P3/4K2k";
    let board = Board::new(1, placement, 1).unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    board.attach(ClientId::new(), ChannelKind::Fen, tx);
    assert_eq!(drain(&mut rx), vec![format!("FEN:{}", placement)]);
}

#[test]
fn test_closed_client_removed_on_fanout() {
    let board = Board::new(1, STARTING_FEN, 1).unwrap();
    let gone = ClientId::new();
    let (tx_gone, rx_gone) = mpsc::channel(4);
    let (tx_live, mut rx_live) = mpsc::channel(4);

    board.attach(gone, ChannelKind::Moves, tx_gone);
    board.attach(ClientId::new(), ChannelKind::Moves, tx_live);
    drop(rx_gone);

    let reconciled = board.reconcile(after_move(&board.last_occupancy(), "e2", "e4"));
    assert_eq!(reconciled.fanout.delivered, 1);
    assert_eq!(reconciled.fanout.dropped, vec![gone]);
    assert_eq!(board.subscriber_count(), 1);
    assert_eq!(drain(&mut rx_live), vec!["e2e4"]);
}

#[test]
fn test_detach_is_idempotent() {
    let board = Board::new(1, STARTING_FEN, 1).unwrap();
    let client = ClientId::new();
    let (tx, _rx) = mpsc::channel(4);

    board.attach(client, ChannelKind::Moves, tx);
    assert!(board.detach(client));
    assert!(!board.detach(client));
    assert!(!board.detach(ClientId::new()));
}

#[test]
fn test_reset_all_sends_reset_and_swaps_boards() {
    let registry = BoardRegistry::new(1);
    registry.create(2, STARTING_FEN).unwrap();
    let old = registry.lookup(1).unwrap();
    old.reconcile(after_move(&old.last_occupancy(), "e2", "e4"));

    let (tx, mut rx) = mpsc::channel(4);
    old.attach(ClientId::new(), ChannelKind::Moves, tx);
    drain(&mut rx);

    let fen = "4k3/8/8/8/8/8/8/4K3 w - - 0 1";
    registry.reset_all(fen).unwrap();

    assert_eq!(drain(&mut rx), vec![RESET_MESSAGE]);
    assert!(rx.try_recv().is_err());
    assert_eq!(old.subscriber_count(), 0);

    let fresh = registry.lookup(1).unwrap();
    assert!(!Arc::ptr_eq(&old, &fresh));
    assert_eq!(fresh.initial_fen(), fen);
    assert_eq!(fresh.history_len(), 0);
    assert_eq!(registry.ids(), vec![1, 2]);
}

#[test]
fn test_reconcile_with_saturated_clocks_keeps_board_usable() {
    let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 4294967295 1";
    let board = Board::new(1, fen, 1).unwrap();

    let knight = after_move(&board.last_occupancy(), "g1", "f3");
    let reconciled = board.reconcile(knight.clone());
    assert_eq!(reconciled.outcome.emitted().map(|mv| mv.uci()), Some("g1f3".to_string()));
    assert_eq!(board.last_occupancy(), knight);

    let reply = after_move(&knight, "g8", "f6");
    board.reconcile(reply);
    assert_eq!(board.move_texts(), vec!["g1f3", "g8f6"]);
    assert!(board.current_fen().ends_with(" 4294967295 2"));
}

#[test]
fn test_displaced_board_refuses_late_subscribers() {
    let registry = BoardRegistry::new(1);
    registry.create(1, STARTING_FEN).unwrap();
    let stale = registry.lookup(1).unwrap();

    registry.reset_board(1).unwrap();
    assert!(stale.is_closed());

    let (tx, mut rx) = mpsc::channel(4);
    assert!(!stale.attach(ClientId::new(), ChannelKind::Moves, tx));
    assert_eq!(stale.subscriber_count(), 0);
    // The refused client's queue is released, not left open
    assert!(matches!(
        rx.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));

    let fresh = registry.lookup(1).unwrap();
    assert!(!fresh.is_closed());
    let (tx, _rx) = mpsc::channel(4);
    assert!(fresh.attach(ClientId::new(), ChannelKind::Moves, tx));
}

#[test]
fn test_reset_board_keeps_other_boards() {
    let registry = BoardRegistry::new(1);
    registry.create(2, STARTING_FEN).unwrap();
    let board1 = registry.lookup(1).unwrap();
    let board2 = registry.lookup(2).unwrap();
    board1.reconcile(after_move(&board1.last_occupancy(), "e2", "e4"));
    board2.reconcile(after_move(&board2.last_occupancy(), "d2", "d4"));

    let fresh = registry.reset_board(1).unwrap();
    assert_eq!(fresh.history_len(), 0);
    assert_eq!(fresh.initial_fen(), STARTING_FEN);

    let still_two = registry.lookup(2).unwrap();
    assert!(Arc::ptr_eq(&board2, &still_two));
    assert_eq!(still_two.move_texts(), vec!["d2d4"]);

    assert!(matches!(
        registry.reset_board(5),
        Err(BoardError::NotFound { board_id: 5 })
    ));
}

#[test]
fn test_snapshot_survives_swap() {
    let registry = BoardRegistry::new(1);
    registry.create(3, STARTING_FEN).unwrap();
    let before = registry.snapshot();

    registry.create(1, STARTING_FEN).unwrap();
    assert_eq!(before.len(), 3);
    assert_eq!(registry.len(), 1);

    registry.clear();
    assert!(registry.is_empty());
}

#[test]
fn test_status_reports_history_and_subscribers() {
    let board = Board::new(4, STARTING_FEN, 1).unwrap();
    board.reconcile(after_move(&board.last_occupancy(), "e2", "e4"));
    let (tx_moves, _rx_moves) = mpsc::channel(4);
    let (tx_fen, _rx_fen) = mpsc::channel(4);
    board.attach(ClientId::new(), ChannelKind::Moves, tx_moves);
    board.attach(ClientId::new(), ChannelKind::Fen, tx_fen);

    let status = board.status();
    assert_eq!(status.id, 4);
    assert_eq!(status.moves, vec!["e2e4"]);
    assert_eq!(status.move_subscribers, 1);
    assert_eq!(status.fen_subscribers, 1);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["initial_fen"], STARTING_FEN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribe_sees_every_move_once() {
    let board = Arc::new(Board::new(1, STARTING_FEN, 1).unwrap());
    // Knights shuffle back and forth: 40 plies, each a clean single move
    let shuffle = [("g1", "f3"), ("g8", "f6"), ("f3", "g1"), ("f6", "g8")];

    let writer = {
        let board = Arc::clone(&board);
        tokio::task::spawn_blocking(move || {
            for i in 0..40 {
                let (from, to) = shuffle[i % shuffle.len()];
                let next = after_move(&board.last_occupancy(), from, to);
                board.reconcile(next);
            }
        })
    };

    let mut receivers = Vec::new();
    for _ in 0..20 {
        let (tx, rx) = mpsc::channel(128);
        board.attach(ClientId::new(), ChannelKind::Moves, tx);
        receivers.push(rx);
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
    let history = board.move_texts();
    assert_eq!(history.len(), 40);

    for mut rx in receivers {
        assert_eq!(drain(&mut rx), history);
    }
}
