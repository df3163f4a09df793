//! GameSession: the one entry point that mutates the move tree.
//!
//! Every mutation first changes the tree, then publishes the matching events
//! through the hub. A rejected operation publishes nothing.

use std::sync::Arc;

use chess_core::{
    GameHeaders, MoveRecord, MoveTree, NavigationOutcome, NodeId, NotationRenderer, ParsedGame,
    Position, Recorded, RenderedNotation, RulesAdapter, TreeError,
};
use event_hub::{Delivery, Event, EventHub, Identifier};
use tracing::{debug, info};

use crate::error::SessionError;

/// Where to move the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Back,
    Forward,
    /// Root of the tree.
    Start,
    /// End of the main continuation from the cursor.
    End,
    Jump(NodeId),
}

pub struct GameSession {
    tree: MoveTree,
    hub: EventHub,
    rules: Arc<dyn RulesAdapter>,
    renderer: NotationRenderer,
}

impl GameSession {
    /// Session on a fresh game. Nothing is published until the first operation.
    pub fn new(hub: EventHub, rules: Arc<dyn RulesAdapter>, start: Option<Position>) -> Self {
        let tree = MoveTree::new_game(rules.clone(), start);
        Self {
            tree,
            hub,
            rules,
            renderer: NotationRenderer::new(),
        }
    }

    pub fn tree(&self) -> &MoveTree {
        &self.tree
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn rules(&self) -> &Arc<dyn RulesAdapter> {
        &self.rules
    }

    pub fn cursor(&self) -> NodeId {
        self.tree.cursor()
    }

    pub fn current_position(&self) -> Position {
        self.tree.current_position()
    }

    pub fn current_fen(&self) -> String {
        self.rules.to_fen(&self.tree.current_position())
    }

    pub fn render(&self) -> Result<RenderedNotation, SessionError> {
        Ok(self.renderer.render(&self.tree)?)
    }

    fn position_changed(&self) -> Event {
        Event::PositionChanged {
            position: self.tree.current_position(),
        }
    }

    fn deliver(&self, events: Vec<Event>) {
        for event in events {
            self.hub.publish(event);
        }
    }

    async fn deliver_async(&self, events: Vec<Event>) {
        for event in events {
            self.hub.publish_async(event).await;
        }
    }

    fn record(&mut self, mv: MoveRecord) -> Result<(Recorded, Vec<Event>), SessionError> {
        let recorded = self.tree.record_move(mv)?;
        let node = self.tree.node(recorded.id)?;
        let mv = node
            .move_record()
            .cloned()
            .ok_or(TreeError::RootNode)?;

        let mut events = Vec::with_capacity(3);
        if recorded.created {
            events.push(Event::TreeNodeCreated {
                node_id: recorded.id,
            });
        }
        events.push(Event::MoveRecorded { mv });
        events.push(self.position_changed());
        Ok((recorded, events))
    }

    /// Record a move at the cursor and publish `TreeNodeCreated` (new nodes
    /// only), `MoveRecorded` and `PositionChanged`, in that order.
    pub fn apply_move(&mut self, mv: MoveRecord) -> Result<Recorded, SessionError> {
        let (recorded, events) = self.record(mv)?;
        self.deliver(events);
        Ok(recorded)
    }

    pub async fn apply_move_async(&mut self, mv: MoveRecord) -> Result<Recorded, SessionError> {
        let (recorded, events) = self.record(mv)?;
        self.deliver_async(events).await;
        Ok(recorded)
    }

    pub fn apply_uci(&mut self, uci: &str) -> Result<Recorded, SessionError> {
        let mv = MoveRecord::from_uci(uci)?;
        self.apply_move(mv)
    }

    pub fn apply_san(&mut self, san: &str) -> Result<Recorded, SessionError> {
        let mv = self.rules.parse_san(&self.tree.current_position(), san)?;
        self.apply_move(mv)
    }

    fn move_cursor(&mut self, target: Navigation) -> Result<NavigationOutcome, SessionError> {
        let outcome = match target {
            Navigation::Back => self.tree.navigate_back(),
            Navigation::Forward => self.tree.navigate_forward(),
            Navigation::Start => {
                let root = self.tree.root();
                if self.tree.cursor() == root {
                    NavigationOutcome::AlreadyAtStart
                } else {
                    NavigationOutcome::Moved(self.tree.jump_to(root)?)
                }
            }
            Navigation::End => {
                let mut last = None;
                while let NavigationOutcome::Moved(id) = self.tree.navigate_forward() {
                    last = Some(id);
                }
                last.map_or(NavigationOutcome::AlreadyAtEnd, NavigationOutcome::Moved)
            }
            Navigation::Jump(id) => NavigationOutcome::Moved(self.tree.jump_to(id)?),
        };
        debug!(?target, ?outcome, "Navigated");
        Ok(outcome)
    }

    /// Move the cursor and publish `PositionChanged` if it actually moved.
    pub fn navigate(&mut self, target: Navigation) -> Result<NavigationOutcome, SessionError> {
        let outcome = self.move_cursor(target)?;
        if outcome.moved().is_some() {
            self.hub.publish(self.position_changed());
        }
        Ok(outcome)
    }

    pub async fn navigate_async(
        &mut self,
        target: Navigation,
    ) -> Result<NavigationOutcome, SessionError> {
        let outcome = self.move_cursor(target)?;
        if outcome.moved().is_some() {
            self.hub.publish_async(self.position_changed()).await;
        }
        Ok(outcome)
    }

    fn replace_tree(&mut self, tree: MoveTree) -> Vec<Event> {
        self.tree = tree;
        vec![Event::GameLoaded, self.position_changed()]
    }

    /// Replace the current game. The old tree stays in place if the import fails.
    pub fn load_game(&mut self, game: &ParsedGame) -> Result<(), SessionError> {
        let tree = MoveTree::import_from_linear_game(self.rules.clone(), game)?;
        let events = self.replace_tree(tree);
        self.deliver(events);
        Ok(())
    }

    pub async fn load_game_async(&mut self, game: &ParsedGame) -> Result<(), SessionError> {
        let tree = MoveTree::import_from_linear_game(self.rules.clone(), game)?;
        let events = self.replace_tree(tree);
        self.deliver_async(events).await;
        Ok(())
    }

    /// Start over from `start` (standard start when `None`).
    pub fn new_game(&mut self, start: Option<Position>) {
        let tree = MoveTree::new_game(self.rules.clone(), start);
        info!(fen = %self.rules.to_fen(&tree.current_position()), "New game");
        let events = self.replace_tree(tree);
        self.deliver(events);
    }

    /// Ask search listeners to look up the current position in `corpus`.
    pub fn request_search(&self, corpus: Identifier) -> Delivery {
        info!(corpus = %corpus, "Search requested");
        self.hub.publish(Event::SearchRequested {
            position: self.tree.current_position(),
            corpus,
        })
    }

    /// Remove a variation. Publishes `PositionChanged` if the cursor was inside it.
    pub fn prune(&mut self, id: NodeId) -> Result<usize, SessionError> {
        let before = self.tree.cursor();
        let removed = self.tree.prune(id)?;
        if self.tree.cursor() != before {
            self.hub.publish(self.position_changed());
        }
        Ok(removed)
    }

    pub fn promote_variation(&mut self, id: NodeId) -> Result<(), SessionError> {
        Ok(self.tree.promote_variation(id)?)
    }

    pub fn set_comment(&mut self, id: NodeId, comment: Option<String>) -> Result<(), SessionError> {
        Ok(self.tree.set_comment(id, comment)?)
    }

    pub fn headers_mut(&mut self) -> &mut GameHeaders {
        self.tree.headers_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chess_core::StandardRules;
    use event_hub::{EventKind, Handler};

    use super::*;

    fn session_with_log() -> (GameSession, Arc<Mutex<Vec<EventKind>>>) {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let handler = move || {
            let sink = sink.clone();
            Handler::sync(move |event| {
                sink.lock().unwrap().push(event.kind());
                Ok(())
            })
        };
        hub.register(
            "log",
            EventKind::ALL.into_iter().map(|kind| (kind, handler())),
        );
        let session = GameSession::new(hub, Arc::new(StandardRules), None);
        (session, log)
    }

    #[test]
    fn test_apply_move_event_order() {
        let (mut session, log) = session_with_log();
        session.apply_uci("e2e4").unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                EventKind::TreeNodeCreated,
                EventKind::MoveRecorded,
                EventKind::PositionChanged
            ]
        );
    }

    #[test]
    fn test_following_existing_line_creates_no_node() {
        let (mut session, log) = session_with_log();
        session.apply_uci("e2e4").unwrap();
        session.navigate(Navigation::Back).unwrap();
        log.lock().unwrap().clear();

        let recorded = session.apply_uci("e2e4").unwrap();
        assert!(!recorded.created);
        assert_eq!(
            *log.lock().unwrap(),
            vec![EventKind::MoveRecorded, EventKind::PositionChanged]
        );
    }

    #[test]
    fn test_illegal_move_publishes_nothing() {
        let (mut session, log) = session_with_log();
        let err = session.apply_uci("e2e5").unwrap_err();
        assert!(err.is_illegal_move());
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(session.cursor(), session.tree().root());
    }

    #[test]
    fn test_noop_navigation_publishes_nothing() {
        let (mut session, log) = session_with_log();
        let outcome = session.navigate(Navigation::Back).unwrap();
        assert_eq!(outcome, NavigationOutcome::AlreadyAtStart);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_start_and_end() {
        let (mut session, _log) = session_with_log();
        for uci in ["e2e4", "e7e5", "g1f3"] {
            session.apply_uci(uci).unwrap();
        }
        let leaf = session.cursor();

        session.navigate(Navigation::Start).unwrap();
        assert_eq!(session.cursor(), session.tree().root());
        assert_eq!(
            session.navigate(Navigation::End).unwrap(),
            NavigationOutcome::Moved(leaf)
        );
        assert_eq!(
            session.navigate(Navigation::End).unwrap(),
            NavigationOutcome::AlreadyAtEnd
        );
    }

    #[test]
    fn test_failed_load_keeps_previous_game() {
        let (mut session, log) = session_with_log();
        session.apply_uci("d2d4").unwrap();
        let before = session.current_fen();
        log.lock().unwrap().clear();

        let bad = ParsedGame::from_san_moves(Default::default(), &["e4", "Ke7", "Kd6"]);
        assert!(session.load_game(&bad).is_err());
        assert_eq!(session.current_fen(), before);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_load_game_events() {
        let (mut session, log) = session_with_log();
        let game = ParsedGame::from_san_moves(Default::default(), &["e4", "e5"]);
        session.load_game(&game).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![EventKind::GameLoaded, EventKind::PositionChanged]
        );
        assert_eq!(session.cursor(), session.tree().root());
        assert_eq!(session.tree().main_line().len(), 2);
    }

    #[tokio::test]
    async fn test_async_variants_deliver() {
        let (mut session, log) = session_with_log();
        session
            .apply_move_async(MoveRecord::from_uci("e2e4").unwrap())
            .await
            .unwrap();
        session.navigate_async(Navigation::Back).await.unwrap();
        assert_eq!(log.lock().unwrap().len(), 4);
    }
}
