//! Chess game record core: rules adapter, branching move tree, notation
//! rendering and PGN import.

pub mod error;
pub mod game_data;
pub mod move_tree;
pub mod notation;
pub mod pgn;
pub mod rules;

pub use error::{RulesError, TreeError};
pub use game_data::{GameHeaders, ParsedGame, ParsedMove};
pub use move_tree::{MoveTree, NavigationOutcome, Node, NodeId, Recorded};
pub use notation::{Line, LineItem, MoveToken, NotationRenderer, RenderedNotation, Side};
pub use rules::{
    normalize_fen, MoveRecord, Position, RulesAdapter, StandardRules, ValidityStatus,
    STANDARD_START_FEN,
};
pub use shakmaty;
