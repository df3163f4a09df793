//! Branching game record: main line plus variations, with a cursor.
//!
//! Nodes live in an arena owned by the tree. Parent links are plain ids into
//! that arena, so the tree has a single owner and pruning a subtree is just
//! clearing its slots. Ids carry the id of the tree that minted them, which
//! makes ids from a discarded tree fail lookup instead of aliasing.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shakmaty::Color;
use tracing::{debug, info};

use crate::error::TreeError;
use crate::game_data::{GameHeaders, ParsedGame, ParsedMove};
use crate::rules::{MoveRecord, Position, RulesAdapter};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable node identifier, `"<tree>:<index>"` in text form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeId {
    tree: u64,
    index: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tree, self.index)
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tree, index) = s
            .split_once(':')
            .ok_or_else(|| format!("malformed node id '{s}'"))?;
        Ok(Self {
            tree: tree.parse().map_err(|_| format!("malformed node id '{s}'"))?,
            index: index.parse().map_err(|_| format!("malformed node id '{s}'"))?,
        })
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for NodeId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A vertex of the move tree.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    mv: Option<MoveRecord>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    ply: u32,
    nags: Vec<u8>,
    starting_comment: Option<String>,
    // History above a node never changes, so the derived position is cached.
    position: Position,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The move leading into this node; `None` for the root.
    pub fn move_record(&self) -> Option<&MoveRecord> {
        self.mv.as_ref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Index 0 is the main line continuation, the rest are variations in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn main_child(&self) -> Option<NodeId> {
        self.children.first().copied()
    }

    pub fn ply(&self) -> u32 {
        self.ply
    }

    pub fn nags(&self) -> &[u8] {
        &self.nags
    }

    pub fn comment(&self) -> Option<&str> {
        self.mv.as_ref().and_then(|m| m.comment.as_deref())
    }

    /// Comment shown ahead of this move when it opens a line.
    pub fn starting_comment(&self) -> Option<&str> {
        self.starting_comment.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Result of recording a move: the node the cursor landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    pub id: NodeId,
    /// `false` when an existing child with the same move was followed.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Moved(NodeId),
    AlreadyAtStart,
    AlreadyAtEnd,
}

impl NavigationOutcome {
    pub fn moved(&self) -> Option<NodeId> {
        match self {
            NavigationOutcome::Moved(id) => Some(*id),
            _ => None,
        }
    }
}

pub struct MoveTree {
    tree_id: u64,
    rules: Arc<dyn RulesAdapter>,
    nodes: Vec<Option<Node>>,
    cursor: NodeId,
    headers: GameHeaders,
}

impl fmt::Debug for MoveTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveTree")
            .field("tree_id", &self.tree_id)
            .field("nodes", &self.node_count())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl MoveTree {
    /// Fresh tree rooted at `starting_position` (standard start when `None`). Cursor = root.
    pub fn new_game(rules: Arc<dyn RulesAdapter>, starting_position: Option<Position>) -> Self {
        let tree_id = NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed);
        let position = starting_position.unwrap_or_else(|| rules.starting_position());
        let root_id = NodeId {
            tree: tree_id,
            index: 0,
        };
        let root = Node {
            id: root_id,
            mv: None,
            parent: None,
            children: Vec::new(),
            ply: 0,
            nags: Vec::new(),
            starting_comment: None,
            position,
        };

        Self {
            tree_id,
            rules,
            nodes: vec![Some(root)],
            cursor: root_id,
            headers: GameHeaders::seven_tag_roster(),
        }
    }

    /// Build a tree from an imported game, replaying every SAN through the rules.
    ///
    /// Either the whole game imports or an error is returned; the cursor of the
    /// new tree is the root.
    pub fn import_from_linear_game(
        rules: Arc<dyn RulesAdapter>,
        game: &ParsedGame,
    ) -> Result<Self, TreeError> {
        let start = match game.start_fen() {
            Some(fen) => Some(rules.parse_fen(fen).map_err(|e| TreeError::Import {
                ply: 0,
                reason: e.to_string(),
            })?),
            None => None,
        };

        let mut tree = Self::new_game(rules, start);
        tree.headers = game.headers.clone();
        let root = tree.root();
        tree.import_line(root, &game.moves)?;

        info!(
            white = game.headers.white(),
            black = game.headers.black(),
            nodes = tree.node_count(),
            "Imported game"
        );
        Ok(tree)
    }

    fn import_line(&mut self, parent: NodeId, line: &[ParsedMove]) -> Result<(), TreeError> {
        let mut current = parent;
        for parsed in line {
            let position = self.position_at(current)?;
            let ply = self.node(current)?.ply + 1;

            let mut mv = self
                .rules
                .parse_san(&position, &parsed.san)
                .map_err(|e| TreeError::Import {
                    ply,
                    reason: e.to_string(),
                })?;
            mv.comment = parsed.comment.clone();

            let recorded = self.attach(current, mv)?;
            if recorded.created {
                let node = self.node_mut(recorded.id)?;
                node.nags = parsed.nags.clone();
                node.starting_comment = parsed.starting_comment.clone();
            }

            for variation in &parsed.variations {
                self.import_line(current, variation)?;
            }
            current = recorded.id;
        }
        Ok(())
    }

    pub fn rules(&self) -> &Arc<dyn RulesAdapter> {
        &self.rules
    }

    pub fn headers(&self) -> &GameHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut GameHeaders {
        &mut self.headers
    }

    pub fn root(&self) -> NodeId {
        NodeId {
            tree: self.tree_id,
            index: 0,
        }
    }

    pub fn cursor(&self) -> NodeId {
        self.cursor
    }

    pub fn cursor_node(&self) -> &Node {
        // The cursor is only ever set to live nodes.
        self.nodes[self.cursor.index as usize]
            .as_ref()
            .unwrap_or_else(|| unreachable!("cursor points at a pruned node"))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        if id.tree != self.tree_id {
            return Err(TreeError::UnknownNode(id));
        }
        self.nodes
            .get(id.index as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(TreeError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        if id.tree != self.tree_id {
            return Err(TreeError::UnknownNode(id));
        }
        self.nodes
            .get_mut(id.index as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(TreeError::UnknownNode(id))
    }

    /// Live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Record `mv` at the cursor, following an existing child with the same move
    /// or appending a new variation. The cursor moves to the resulting node.
    pub fn record_move(&mut self, mv: MoveRecord) -> Result<Recorded, TreeError> {
        let recorded = self.attach(self.cursor, mv)?;
        self.cursor = recorded.id;
        Ok(recorded)
    }

    fn attach(&mut self, parent: NodeId, mv: MoveRecord) -> Result<Recorded, TreeError> {
        let parent_node = self.node(parent)?;

        if let Some(existing) = parent_node
            .children
            .iter()
            .copied()
            .find(|child| {
                self.node(*child)
                    .ok()
                    .and_then(|n| n.mv.as_ref())
                    .is_some_and(|m| m.same_move(&mv))
            })
        {
            debug!(node = %existing, mv = %mv, "Following existing line");
            return Ok(Recorded {
                id: existing,
                created: false,
            });
        }

        let position = self.rules.apply(&parent_node.position, &mv)?;
        let ply = parent_node.ply + 1;
        let id = NodeId {
            tree: self.tree_id,
            index: self.nodes.len() as u32,
        };
        let is_variation = !parent_node.children.is_empty();

        self.nodes.push(Some(Node {
            id,
            mv: Some(mv),
            parent: Some(parent),
            children: Vec::new(),
            ply,
            nags: Vec::new(),
            starting_comment: None,
            position,
        }));
        self.node_mut(parent)?.children.push(id);

        debug!(node = %id, ply, variation = is_variation, "Created node");
        Ok(Recorded { id, created: true })
    }

    pub fn navigate_back(&mut self) -> NavigationOutcome {
        match self.cursor_node().parent {
            Some(parent) => {
                self.cursor = parent;
                NavigationOutcome::Moved(parent)
            }
            None => {
                debug!("Already at start");
                NavigationOutcome::AlreadyAtStart
            }
        }
    }

    /// Follow the main line child of the cursor.
    pub fn navigate_forward(&mut self) -> NavigationOutcome {
        match self.cursor_node().main_child() {
            Some(child) => {
                self.cursor = child;
                NavigationOutcome::Moved(child)
            }
            None => {
                debug!("Already at end of line");
                NavigationOutcome::AlreadyAtEnd
            }
        }
    }

    pub fn jump_to(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        self.node(id)?;
        self.cursor = id;
        Ok(id)
    }

    pub fn position_at(&self, id: NodeId) -> Result<Position, TreeError> {
        Ok(self.node(id)?.position.clone())
    }

    pub fn current_position(&self) -> Position {
        self.cursor_node().position.clone()
    }

    /// Recompute the position at `id` by replaying moves from the root, bypassing the cache.
    pub fn replay_position(&self, id: NodeId) -> Result<Position, TreeError> {
        let path = self.path_to(id)?;
        let mut position = self.position_at(self.root())?;
        for step in path.iter().skip(1) {
            let mv = self
                .node(*step)?
                .mv
                .as_ref()
                .ok_or_else(|| {
                    TreeError::CorruptTree(format!("non-root node {step} has no move"))
                })?;
            position = self.rules.apply(&position, mv).map_err(|e| {
                TreeError::CorruptTree(format!("replay failed at {step}: {e}"))
            })?;
        }
        Ok(position)
    }

    /// Ids from the root down to `id`, both included.
    pub fn path_to(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut path = vec![id];
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            path.push(parent);
            current = self.node(parent)?;
        }
        path.reverse();
        Ok(path)
    }

    /// Nodes along `children[0]` from the root, root excluded.
    pub fn main_line(&self) -> Vec<NodeId> {
        let mut line = Vec::new();
        let mut current = self.node(self.root()).ok();
        while let Some(child) = current.and_then(|n| n.main_child()) {
            line.push(child);
            current = self.node(child).ok();
        }
        line
    }

    /// Side that played the move leading into a node at `ply`.
    pub fn mover_at_ply(&self, ply: u32) -> Color {
        if (ply + self.root_offset()) % 2 == 1 {
            Color::White
        } else {
            Color::Black
        }
    }

    /// Full-move number of the move leading into a node at `ply` (ply >= 1).
    pub fn move_number_at_ply(&self, ply: u32) -> u32 {
        let root_fullmoves = self.root_fullmoves();
        root_fullmoves + (ply.saturating_sub(1) + self.root_offset()) / 2
    }

    // 0 when the root has White to move, 1 when Black does.
    fn root_offset(&self) -> u32 {
        self.node(self.root())
            .map(|root| u32::from(root.position.turn() == Color::Black))
            .unwrap_or(0)
    }

    fn root_fullmoves(&self) -> u32 {
        self.node(self.root())
            .map(|root| root.position.fullmoves())
            .unwrap_or(1)
    }

    /// Remove a subtree. Returns the number of nodes removed.
    pub fn prune(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let parent = self.node(id)?.parent.ok_or(TreeError::RootNode)?;

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let node = self.node(next)?;
            stack.extend(node.children.iter().copied());
            removed.push(next);
        }

        let cursor_inside = removed.contains(&self.cursor);
        for gone in &removed {
            self.nodes[gone.index as usize] = None;
        }
        self.node_mut(parent)?.children.retain(|child| *child != id);

        if cursor_inside {
            self.cursor = parent;
        }
        info!(node = %id, removed = removed.len(), "Pruned variation");
        Ok(removed.len())
    }

    /// Make `id` the main line continuation of its parent.
    pub fn promote_variation(&mut self, id: NodeId) -> Result<(), TreeError> {
        let parent = self.node(id)?.parent.ok_or(TreeError::RootNode)?;
        let siblings = &mut self.node_mut(parent)?.children;
        siblings.retain(|child| *child != id);
        siblings.insert(0, id);
        Ok(())
    }

    pub fn set_comment(&mut self, id: NodeId, comment: Option<String>) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        match node.mv.as_mut() {
            Some(mv) => {
                mv.comment = comment;
                Ok(())
            }
            None => Err(TreeError::RootNode),
        }
    }

    pub fn set_starting_comment(
        &mut self,
        id: NodeId,
        comment: Option<String>,
    ) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        if node.is_root() {
            return Err(TreeError::RootNode);
        }
        node.starting_comment = comment;
        Ok(())
    }

    /// Verify structural invariants; any violation is reported as a corrupt tree.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        let root = self.node(self.root())?;
        if root.ply != 0 || root.mv.is_some() || root.parent.is_some() {
            return Err(TreeError::CorruptTree("malformed root".into()));
        }
        self.node(self.cursor)
            .map_err(|_| TreeError::CorruptTree(format!("dangling cursor {}", self.cursor)))?;

        for node in self.nodes.iter().flatten() {
            for child in &node.children {
                let child_node = self.node(*child).map_err(|_| {
                    TreeError::CorruptTree(format!("{} lists missing child {child}", node.id))
                })?;
                if child_node.parent != Some(node.id) {
                    return Err(TreeError::CorruptTree(format!(
                        "{child} does not point back to {}",
                        node.id
                    )));
                }
                if child_node.ply != node.ply + 1 {
                    return Err(TreeError::CorruptTree(format!("bad ply at {child}")));
                }
            }
        }
        Ok(())
    }
}
