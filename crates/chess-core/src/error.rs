//! Error types for rules, tree and import operations

use thiserror::Error;

use crate::move_tree::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Illegal move {uci} in position {fen}")]
    IllegalMove { uci: String, fen: String },

    #[error("Illegal SAN {san} in position {fen}")]
    IllegalSan { san: String, fen: String },

    #[error("Invalid SAN: {0}")]
    InvalidSan(String),

    #[error("Invalid UCI move: {0}")]
    InvalidUci(String),

    #[error("Invalid FEN: {0}")]
    InvalidFen(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Illegal move {uci} in position {fen}")]
    IllegalMove { uci: String, fen: String },

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Corrupt move tree: {0}")]
    CorruptTree(String),

    #[error("The root node cannot be pruned or promoted")]
    RootNode,

    #[error("Import failed at ply {ply}: {reason}")]
    Import { ply: u32, reason: String },
}

impl From<RulesError> for TreeError {
    fn from(e: RulesError) -> Self {
        match e {
            RulesError::IllegalMove { uci, fen } => TreeError::IllegalMove { uci, fen },
            other => TreeError::CorruptTree(other.to_string()),
        }
    }
}
