#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chess_core::{MoveRecord, MoveTree, StandardRules};
use event_hub::{Event, EventHub, EventKind, Handler};

/// Ten plies of the Ruy Lopez, Morphy defence.
pub const RUY_LOPEZ_PGN: &str = r#"[Event "Test"]
[Site "?"]
[White "White"]
[Black "Black"]
[Result "*"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 5. O-O Be7 *
"#;

pub const RUY_LOPEZ_UCI: [&str; 10] = [
    "e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6", "b5a4", "g8f6", "e1g1", "f8e7",
];

pub fn new_tree() -> MoveTree {
    MoveTree::new_game(Arc::new(StandardRules), None)
}

pub fn mv(uci: &str) -> MoveRecord {
    MoveRecord::from_uci(uci).unwrap()
}

/// Generate a unique suffix based on timestamp to avoid collisions.
pub fn unique_suffix() -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}", ts % 1_000_000_000)
}

/// Fresh directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ilmarinen-{tag}-{}", unique_suffix()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Register a listener on every event kind that records what it saw.
pub fn event_log(hub: &EventHub) -> Arc<Mutex<Vec<Event>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handlers = EventKind::ALL.into_iter().map(|kind| {
        let log = log.clone();
        (
            kind,
            Handler::sync(move |event| {
                log.lock().unwrap().push(event.clone());
                Ok(())
            }),
        )
    });
    hub.register("test-log", handlers);
    log
}

pub fn kinds(log: &Arc<Mutex<Vec<Event>>>) -> Vec<EventKind> {
    log.lock().unwrap().iter().map(Event::kind).collect()
}
