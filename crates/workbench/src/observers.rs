//! Built-in hub listeners standing in for the notation list and the board.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chess_core::RenderedNotation;
use event_hub::{Event, EventHub, EventKind, Handler};

use crate::error::SessionError;
use crate::session::GameSession;

/// Tracks whether the rendered move list is out of date.
#[derive(Clone, Debug, Default)]
pub struct NotationView {
    stale: Arc<AtomicBool>,
    renders: Arc<AtomicUsize>,
}

impl NotationView {
    pub const LISTENER: &'static str = "notation-view";

    pub fn attach(hub: &EventHub) -> Self {
        let view = Self::default();
        let mark = |view: &NotationView| {
            let stale = view.stale.clone();
            Handler::sync(move |_| {
                stale.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        hub.register(
            Self::LISTENER,
            [
                (EventKind::MoveRecorded, mark(&view)),
                (EventKind::GameLoaded, mark(&view)),
                (EventKind::TreeNodeCreated, mark(&view)),
            ],
        );
        view
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    /// Re-render from the session and clear the stale flag.
    pub fn refresh(&self, session: &GameSession) -> Result<RenderedNotation, SessionError> {
        let rendered = session.render()?;
        self.stale.store(false, Ordering::SeqCst);
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(rendered)
    }
}

#[derive(Debug, Default)]
struct MirrorState {
    fen: Option<String>,
    updates: usize,
}

/// Keeps the latest position the board would display.
#[derive(Clone, Debug, Default)]
pub struct BoardMirror {
    state: Arc<Mutex<MirrorState>>,
}

impl BoardMirror {
    pub const LISTENER: &'static str = "board-mirror";

    pub fn attach(hub: &EventHub) -> Self {
        let mirror = Self::default();
        let state = mirror.state.clone();
        hub.register(
            Self::LISTENER,
            [(
                EventKind::PositionChanged,
                Handler::sync(move |event| {
                    if let Event::PositionChanged { position } = event {
                        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                        state.fen = Some(position.fen());
                        state.updates += 1;
                    }
                    Ok(())
                }),
            )],
        );
        mirror
    }

    pub fn fen(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fen
            .clone()
    }

    pub fn updates(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).updates
    }
}

#[cfg(test)]
mod tests {
    use chess_core::StandardRules;

    use super::*;
    use crate::session::Navigation;

    #[test]
    fn test_observers_follow_session() {
        let hub = EventHub::new();
        let view = NotationView::attach(&hub);
        let board = BoardMirror::attach(&hub);
        let mut session = GameSession::new(hub, Arc::new(StandardRules), None);

        assert!(!view.is_stale());
        session.apply_uci("e2e4").unwrap();
        assert!(view.is_stale());
        assert_eq!(board.fen(), Some(session.current_fen()));

        let rendered = view.refresh(&session).unwrap();
        assert_eq!(rendered.to_text(), "1. e4");
        assert!(!view.is_stale());

        // navigation alone leaves the move list valid
        session.navigate(Navigation::Back).unwrap();
        assert!(!view.is_stale());
        assert_eq!(board.updates(), 2);
    }
}
