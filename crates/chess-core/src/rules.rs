//! Rules adapter: the only place that talks to shakmaty.
//!
//! Everything above this module (move tree, notation, session) treats a
//! [`Position`] as an immutable value and a [`MoveRecord`] as plain data.
//! Legality, move application, SAN and FEN are delegated here.

use std::fmt;
use std::str::FromStr;

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Role, Square};

use crate::error::RulesError;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Board state as handed out by the rules adapter.
///
/// Cloning is cheap enough to pass positions around by value; nothing in the
/// crate mutates one in place.
#[derive(Clone, Debug, Default)]
pub struct Position {
    chess: Chess,
}

impl Position {
    pub fn from_chess(chess: Chess) -> Self {
        Self { chess }
    }

    pub fn as_chess(&self) -> &Chess {
        &self.chess
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.chess, EnPassantMode::Legal).to_string()
    }

    pub fn turn(&self) -> Color {
        shakmaty::Position::turn(&self.chess)
    }

    pub fn fullmoves(&self) -> u32 {
        shakmaty::Position::fullmoves(&self.chess).get()
    }

    pub fn is_check(&self) -> bool {
        shakmaty::Position::is_check(&self.chess)
    }

    pub fn is_checkmate(&self) -> bool {
        shakmaty::Position::is_checkmate(&self.chess)
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.fen() == other.fen()
    }
}

impl Eq for Position {}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen())
    }
}

/// A single ply: from-square, to-square, optional promotion, optional comment.
///
/// Castling is recorded king-wise (`e1g1`), the way UCI spells it. Two records
/// describe the same move when from, to and promotion agree; the comment is
/// annotation only.
#[derive(Clone, Debug)]
pub struct MoveRecord {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
    pub comment: Option<String>,
}

impl MoveRecord {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
            comment: None,
        }
    }

    pub fn with_promotion(mut self, role: Role) -> Self {
        self.promotion = Some(role);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Parse long algebraic / UCI text such as `e2e4` or `e7e8q`.
    pub fn from_uci(text: &str) -> Result<Self, RulesError> {
        match text.trim().parse::<UciMove>() {
            Ok(UciMove::Normal {
                from,
                to,
                promotion,
            }) => Ok(Self {
                from,
                to,
                promotion,
                comment: None,
            }),
            _ => Err(RulesError::InvalidUci(text.to_string())),
        }
    }

    pub fn uci(&self) -> String {
        self.to_uci_move().to_string()
    }

    /// Same move, ignoring annotation.
    pub fn same_move(&self, other: &MoveRecord) -> bool {
        self.from == other.from && self.to == other.to && self.promotion == other.promotion
    }

    fn to_uci_move(&self) -> UciMove {
        UciMove::Normal {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }

    fn from_move(mv: &Move) -> Option<Self> {
        match mv.to_uci(CastlingMode::Standard) {
            UciMove::Normal {
                from,
                to,
                promotion,
            } => Some(Self {
                from,
                to,
                promotion,
                comment: None,
            }),
            _ => None,
        }
    }
}

impl PartialEq for MoveRecord {
    fn eq(&self, other: &Self) -> bool {
        self.same_move(other)
    }
}

impl Eq for MoveRecord {}

impl fmt::Display for MoveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uci_move())
    }
}

impl FromStr for MoveRecord {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uci(s)
    }
}

/// Outcome of checking a free-form board setup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidityStatus {
    Valid,
    Invalid(String),
}

impl ValidityStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidityStatus::Valid)
    }
}

/// Contract the core consumes from a chess rules implementation.
pub trait RulesAdapter: Send + Sync {
    fn starting_position(&self) -> Position;

    fn legal_moves(&self, position: &Position) -> Vec<MoveRecord>;

    /// Play `mv` on a copy of `position`. Fails if the move is not legal there.
    fn apply(&self, position: &Position, mv: &MoveRecord) -> Result<Position, RulesError>;

    /// SAN text including the check / mate suffix.
    fn to_san(&self, position: &Position, mv: &MoveRecord) -> Result<String, RulesError>;

    fn parse_san(&self, position: &Position, san: &str) -> Result<MoveRecord, RulesError>;

    fn parse_fen(&self, text: &str) -> Result<Position, RulesError>;

    fn to_fen(&self, position: &Position) -> String {
        position.fen()
    }

    fn validate(&self, fen: &str) -> ValidityStatus {
        match self.parse_fen(fen) {
            Ok(_) => ValidityStatus::Valid,
            Err(e) => ValidityStatus::Invalid(e.to_string()),
        }
    }

    fn is_legal(&self, position: &Position, mv: &MoveRecord) -> bool {
        self.legal_moves(position).iter().any(|m| m.same_move(mv))
    }
}

/// Standard chess through shakmaty.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardRules;

impl StandardRules {
    fn resolve(&self, position: &Position, mv: &MoveRecord) -> Result<Move, RulesError> {
        mv.to_uci_move()
            .to_move(position.as_chess())
            .map_err(|_| RulesError::IllegalMove {
                uci: mv.uci(),
                fen: position.fen(),
            })
    }
}

impl RulesAdapter for StandardRules {
    fn starting_position(&self) -> Position {
        Position::default()
    }

    fn legal_moves(&self, position: &Position) -> Vec<MoveRecord> {
        shakmaty::Position::legal_moves(position.as_chess())
            .iter()
            .filter_map(MoveRecord::from_move)
            .collect()
    }

    fn apply(&self, position: &Position, mv: &MoveRecord) -> Result<Position, RulesError> {
        let legal = self.resolve(position, mv)?;
        let next = shakmaty::Position::play(position.as_chess().clone(), legal).map_err(|_| {
            RulesError::IllegalMove {
                uci: mv.uci(),
                fen: position.fen(),
            }
        })?;
        Ok(Position::from_chess(next))
    }

    fn to_san(&self, position: &Position, mv: &MoveRecord) -> Result<String, RulesError> {
        let legal = self.resolve(position, mv)?;
        let mut san = San::from_move(position.as_chess(), legal).to_string();

        let after = self.apply(position, mv)?;
        if after.is_checkmate() {
            san.push('#');
        } else if after.is_check() {
            san.push('+');
        }
        Ok(san)
    }

    fn parse_san(&self, position: &Position, san: &str) -> Result<MoveRecord, RulesError> {
        let parsed: San = san
            .trim_end_matches(['+', '#', '!', '?'])
            .parse()
            .map_err(|_| RulesError::InvalidSan(san.to_string()))?;
        let mv = parsed
            .to_move(position.as_chess())
            .map_err(|_| RulesError::IllegalSan {
                san: san.to_string(),
                fen: position.fen(),
            })?;
        MoveRecord::from_move(&mv).ok_or_else(|| RulesError::InvalidSan(san.to_string()))
    }

    fn parse_fen(&self, text: &str) -> Result<Position, RulesError> {
        let fen: Fen = text
            .trim()
            .parse()
            .map_err(|e| RulesError::InvalidFen(format!("{text}: {e}")))?;
        let chess: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidFen(format!("{text}: {e}")))?;
        Ok(Position::from_chess(chess))
    }
}

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}
