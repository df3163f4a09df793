use serde::{Deserialize, Serialize};

/// Free-form tag pairs in insertion order (players, event, site, date, result, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameHeaders {
    tags: Vec<(String, String)>,
}

impl GameHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers for a fresh game: the PGN seven tag roster with placeholder values.
    pub fn seven_tag_roster() -> Self {
        let mut headers = Self::new();
        headers.set("Event", "?");
        headers.set("Site", "?");
        headers.set("Date", "????.??.??");
        headers.set("Round", "?");
        headers.set("White", "?");
        headers.set("Black", "?");
        headers.set("Result", "*");
        headers
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value of an existing tag or append a new one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn white(&self) -> &str {
        self.get("White").unwrap_or("?")
    }

    pub fn black(&self) -> &str {
        self.get("Black").unwrap_or("?")
    }

    pub fn event(&self) -> &str {
        self.get("Event").unwrap_or("?")
    }

    pub fn result(&self) -> &str {
        self.get("Result").unwrap_or("*")
    }
}

/// One ply as read from movetext, before it has been checked against a board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMove {
    pub san: String,
    pub comment: Option<String>,
    /// Comment written ahead of this move, only kept on the first move of a line.
    pub starting_comment: Option<String>,
    pub nags: Vec<u8>,
    /// Alternatives to this move, each a line starting in the same position.
    pub variations: Vec<Vec<ParsedMove>>,
}

impl ParsedMove {
    pub fn new(san: impl Into<String>) -> Self {
        Self {
            san: san.into(),
            ..Self::default()
        }
    }
}

/// A game as supplied by the import collaborator: headers + (possibly branching) moves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedGame {
    pub headers: GameHeaders,
    pub moves: Vec<ParsedMove>,
}

impl ParsedGame {
    /// Build a linear game from SAN tokens.
    pub fn from_san_moves<S: AsRef<str>>(headers: GameHeaders, moves: &[S]) -> Self {
        Self {
            headers,
            moves: moves.iter().map(|s| ParsedMove::new(s.as_ref())).collect(),
        }
    }

    /// Starting FEN for set-up positions, if the game declares one.
    pub fn start_fen(&self) -> Option<&str> {
        if self.headers.get("SetUp") == Some("0") {
            return None;
        }
        self.headers.get("FEN")
    }

    /// Number of plies on the main line.
    pub fn main_line_len(&self) -> usize {
        self.moves.len()
    }
}
