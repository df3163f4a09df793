//! Workbench configuration from environment variables

use std::env;
use std::path::PathBuf;

use chess_core::{Position, RulesAdapter};

use crate::error::ConfigError;

pub const DEFAULT_SEARCH_HISTORY: &str = "data/search_history.json";
pub const DEFAULT_SEARCH_LIMIT: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkbenchConfig {
    /// Starting position for new games (standard start when unset)
    pub start_fen: Option<String>,

    /// JSON file the search history is persisted to
    pub search_history_path: PathBuf,

    /// Default corpus for position searches: a PGN file or a directory of them
    pub corpus: Option<PathBuf>,

    /// Max hits kept per search
    pub search_limit: usize,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            start_fen: None,
            search_history_path: PathBuf::from(DEFAULT_SEARCH_HISTORY),
            corpus: None,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl WorkbenchConfig {
    /// Load configuration from environment variables.
    pub fn from_env(rules: &dyn RulesAdapter) -> Result<Self, ConfigError> {
        Self::from_lookup(rules, |key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(rules: &dyn RulesAdapter, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let start_fen = lookup("ILMARINEN_START_FEN").filter(|v| !v.trim().is_empty());
        if let Some(fen) = &start_fen {
            if let Err(e) = rules.parse_fen(fen) {
                return Err(ConfigError::InvalidValue {
                    var: "ILMARINEN_START_FEN",
                    value: fen.clone(),
                    reason: e.to_string(),
                });
            }
        }

        let search_history_path = lookup("ILMARINEN_SEARCH_HISTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SEARCH_HISTORY));

        let corpus = lookup("ILMARINEN_CORPUS").map(PathBuf::from);

        let search_limit = match lookup("ILMARINEN_SEARCH_LIMIT") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "ILMARINEN_SEARCH_LIMIT",
                        value,
                        reason: "expected a positive integer".to_string(),
                    })
                }
            },
            None => DEFAULT_SEARCH_LIMIT,
        };

        Ok(Self {
            start_fen,
            search_history_path,
            corpus,
            search_limit,
        })
    }

    /// Starting position for new games, if one is configured.
    pub fn start_position(&self, rules: &dyn RulesAdapter) -> Option<Position> {
        self.start_fen
            .as_deref()
            .and_then(|fen| rules.parse_fen(fen).ok())
    }
}
