//! Closed set of events and their argument schemas.
//!
//! Producers either build an [`Event`] directly (the schema holds by
//! construction) or publish a kind plus named arguments, which are checked
//! against [`EventKind::schema`] before any handler runs.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chess_core::{MoveRecord, NodeId, Position};
use serde::{Deserialize, Serialize};

use crate::error::HubError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    MoveRecorded,
    PositionChanged,
    GameLoaded,
    TreeNodeCreated,
    SearchRequested,
    SearchCompleted,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::MoveRecorded,
        EventKind::PositionChanged,
        EventKind::GameLoaded,
        EventKind::TreeNodeCreated,
        EventKind::SearchRequested,
        EventKind::SearchCompleted,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::MoveRecorded => "MoveRecorded",
            EventKind::PositionChanged => "PositionChanged",
            EventKind::GameLoaded => "GameLoaded",
            EventKind::TreeNodeCreated => "TreeNodeCreated",
            EventKind::SearchRequested => "SearchRequested",
            EventKind::SearchCompleted => "SearchCompleted",
        }
    }

    /// Argument names and types every publication of this kind must carry.
    pub fn schema(&self) -> &'static [(&'static str, ArgType)] {
        match self {
            EventKind::MoveRecorded => &[("move", ArgType::Move)],
            EventKind::PositionChanged => &[("position", ArgType::Position)],
            EventKind::GameLoaded => &[],
            EventKind::TreeNodeCreated => &[("node_id", ArgType::NodeId)],
            EventKind::SearchRequested => &[
                ("position", ArgType::Position),
                ("corpus", ArgType::Identifier),
            ],
            EventKind::SearchCompleted => &[("result_ref", ArgType::Identifier)],
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| HubError::UnknownEventKind(s.to_string()))
    }
}

/// Opaque reference to something outside the core: a corpus, a result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Move,
    Position,
    NodeId,
    Identifier,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgType::Move => "move",
            ArgType::Position => "position",
            ArgType::NodeId => "node id",
            ArgType::Identifier => "identifier",
        };
        f.write_str(name)
    }
}

/// A named argument value for dynamic publication.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Move(MoveRecord),
    Position(Position),
    NodeId(NodeId),
    Identifier(Identifier),
}

impl ArgValue {
    pub fn arg_type(&self) -> ArgType {
        match self {
            ArgValue::Move(_) => ArgType::Move,
            ArgValue::Position(_) => ArgType::Position,
            ArgValue::NodeId(_) => ArgType::NodeId,
            ArgValue::Identifier(_) => ArgType::Identifier,
        }
    }
}

impl From<MoveRecord> for ArgValue {
    fn from(value: MoveRecord) -> Self {
        ArgValue::Move(value)
    }
}

impl From<Position> for ArgValue {
    fn from(value: Position) -> Self {
        ArgValue::Position(value)
    }
}

impl From<NodeId> for ArgValue {
    fn from(value: NodeId) -> Self {
        ArgValue::NodeId(value)
    }
}

impl From<Identifier> for ArgValue {
    fn from(value: Identifier) -> Self {
        ArgValue::Identifier(value)
    }
}

/// A validated event, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    MoveRecorded { mv: MoveRecord },
    PositionChanged { position: Position },
    GameLoaded,
    TreeNodeCreated { node_id: NodeId },
    SearchRequested { position: Position, corpus: Identifier },
    SearchCompleted { result_ref: Identifier },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MoveRecorded { .. } => EventKind::MoveRecorded,
            Event::PositionChanged { .. } => EventKind::PositionChanged,
            Event::GameLoaded => EventKind::GameLoaded,
            Event::TreeNodeCreated { .. } => EventKind::TreeNodeCreated,
            Event::SearchRequested { .. } => EventKind::SearchRequested,
            Event::SearchCompleted { .. } => EventKind::SearchCompleted,
        }
    }

    /// Build an event from named arguments, rejecting unknown names,
    /// duplicates, missing arguments and type mismatches. Nothing is coerced.
    pub fn from_args<S, I>(kind: EventKind, args: I) -> Result<Self, HubError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, ArgValue)>,
    {
        let schema = kind.schema();
        let violation = |reason: String| HubError::SchemaViolation { kind, reason };

        let mut slots: HashMap<&'static str, ArgValue> = HashMap::new();
        for (name, value) in args {
            let name = name.into();
            let (slot, expected) = schema
                .iter()
                .find(|(n, _)| *n == name)
                .copied()
                .ok_or_else(|| violation(format!("unexpected argument '{name}'")))?;
            if value.arg_type() != expected {
                return Err(violation(format!(
                    "argument '{name}' expects {expected}, got {}",
                    value.arg_type()
                )));
            }
            if slots.insert(slot, value).is_some() {
                return Err(violation(format!("argument '{name}' given twice")));
            }
        }
        if let Some((missing, _)) = schema.iter().find(|(n, _)| !slots.contains_key(n)) {
            return Err(violation(format!("missing argument '{missing}'")));
        }

        let mut take = |name: &str| {
            slots
                .remove(name)
                .ok_or_else(|| violation(format!("missing argument '{name}'")))
        };
        let event = match kind {
            EventKind::MoveRecorded => match take("move")? {
                ArgValue::Move(mv) => Event::MoveRecorded { mv },
                other => return Err(mismatch(kind, "move", &other)),
            },
            EventKind::PositionChanged => match take("position")? {
                ArgValue::Position(position) => Event::PositionChanged { position },
                other => return Err(mismatch(kind, "position", &other)),
            },
            EventKind::GameLoaded => Event::GameLoaded,
            EventKind::TreeNodeCreated => match take("node_id")? {
                ArgValue::NodeId(node_id) => Event::TreeNodeCreated { node_id },
                other => return Err(mismatch(kind, "node_id", &other)),
            },
            EventKind::SearchRequested => {
                let position = match take("position")? {
                    ArgValue::Position(position) => position,
                    other => return Err(mismatch(kind, "position", &other)),
                };
                let corpus = match take("corpus")? {
                    ArgValue::Identifier(corpus) => corpus,
                    other => return Err(mismatch(kind, "corpus", &other)),
                };
                Event::SearchRequested { position, corpus }
            }
            EventKind::SearchCompleted => match take("result_ref")? {
                ArgValue::Identifier(result_ref) => Event::SearchCompleted { result_ref },
                other => return Err(mismatch(kind, "result_ref", &other)),
            },
        };
        Ok(event)
    }
}

fn mismatch(kind: EventKind, name: &str, value: &ArgValue) -> HubError {
    HubError::SchemaViolation {
        kind,
        reason: format!("argument '{name}' has type {}", value.arg_type()),
    }
}
