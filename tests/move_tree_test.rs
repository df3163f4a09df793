//! Integration tests: move tree recording, navigation and import.

mod common;

use std::sync::Arc;

use chess_core::pgn::parse_pgn;
use chess_core::{MoveTree, NavigationOutcome, RulesAdapter, StandardRules, TreeError};
use common::{mv, new_tree, RUY_LOPEZ_PGN, RUY_LOPEZ_UCI};

#[test]
fn test_replay_matches_cursor_position_along_game() {
    let rules = StandardRules;
    let mut tree = new_tree();
    let mut expected = rules.starting_position();

    for uci in RUY_LOPEZ_UCI {
        expected = rules.apply(&expected, &mv(uci)).unwrap();
        tree.record_move(mv(uci)).unwrap();

        let cursor = tree.cursor();
        assert_eq!(tree.replay_position(cursor).unwrap(), expected);
        assert_eq!(tree.position_at(cursor).unwrap(), expected);
    }
    tree.check_invariants().unwrap();
}

#[test]
fn test_jump_then_back_twice() {
    let game = parse_pgn(RUY_LOPEZ_PGN).unwrap();
    assert_eq!(game.main_line_len(), 10);
    let mut tree = MoveTree::import_from_linear_game(Arc::new(StandardRules), &game).unwrap();

    let main_line = tree.main_line();
    assert_eq!(main_line.len(), 10);
    tree.jump_to(main_line[4]).unwrap();
    assert_eq!(tree.cursor_node().ply(), 5);

    tree.navigate_back();
    tree.navigate_back();
    assert_eq!(tree.cursor(), main_line[2]);
    assert_eq!(tree.cursor_node().ply(), 3);

    let rules = StandardRules;
    let mut replayed = rules.starting_position();
    for uci in &RUY_LOPEZ_UCI[..3] {
        replayed = rules.apply(&replayed, &mv(uci)).unwrap();
    }
    assert_eq!(tree.current_position().fen(), replayed.fen());
    assert_eq!(
        replayed.fen(),
        "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
    );
}

#[test]
fn test_back_forward_round_trip_on_main_line() {
    let mut tree = new_tree();
    for uci in RUY_LOPEZ_UCI {
        tree.record_move(mv(uci)).unwrap();
    }
    let ids = tree.main_line();
    for id in &ids[..ids.len() - 1] {
        tree.jump_to(*id).unwrap();
        assert!(matches!(tree.navigate_back(), NavigationOutcome::Moved(_)));
        assert_eq!(tree.navigate_forward(), NavigationOutcome::Moved(*id));
    }
}

#[test]
fn test_duplicate_recording_yields_single_child() {
    let mut tree = new_tree();
    tree.record_move(mv("e2e4")).unwrap();
    let e5 = tree.record_move(mv("e7e5")).unwrap();
    tree.navigate_back();
    let again = tree.record_move(mv("e7e5")).unwrap();

    assert!(!again.created);
    assert_eq!(again.id, e5.id);
    let e4 = tree.main_line()[0];
    assert_eq!(tree.node(e4).unwrap().children().len(), 1);
}

#[test]
fn test_ids_from_discarded_tree_are_rejected() {
    let game = parse_pgn(RUY_LOPEZ_PGN).unwrap();
    let old = MoveTree::import_from_linear_game(Arc::new(StandardRules), &game).unwrap();
    let stale = old.main_line()[3];
    drop(old);

    let mut fresh = MoveTree::import_from_linear_game(Arc::new(StandardRules), &game).unwrap();
    assert_eq!(fresh.jump_to(stale), Err(TreeError::UnknownNode(stale)));
}

#[test]
fn test_import_with_setup_position() {
    let pgn = r#"[Event "Endgame"]
[SetUp "1"]
[FEN "4k3/8/8/8/8/8/4P3/4K3 b - - 0 40"]
[Result "*"]

40... Kd7 41. e4 Ke6 *
"#;
    let game = parse_pgn(pgn).unwrap();
    let tree = MoveTree::import_from_linear_game(Arc::new(StandardRules), &game).unwrap();

    assert_eq!(tree.main_line().len(), 3);
    assert_eq!(tree.move_number_at_ply(1), 40);
    assert_eq!(tree.move_number_at_ply(2), 41);
}
