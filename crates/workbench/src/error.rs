//! Workbench error types

use std::io;
use std::path::PathBuf;

use chess_core::pgn::ImportError;
use chess_core::{RulesError, TreeError};
use event_hub::HubError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Game not found: #{0}")]
    GameNotFound(usize),
}

impl SessionError {
    pub fn is_illegal_move(&self) -> bool {
        matches!(
            self,
            SessionError::Tree(TreeError::IllegalMove { .. })
                | SessionError::Rules(RulesError::IllegalMove { .. })
                | SessionError::Rules(RulesError::IllegalSan { .. })
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Invalid corpus pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("No PGN files found at {0}")]
    NoCorpus(PathBuf),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Search task failed: {0}")]
    Task(String),
}
