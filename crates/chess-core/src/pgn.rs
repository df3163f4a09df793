//! PGN import: turns movetext into [`ParsedGame`] values, one game at a time.
//!
//! Only syntax is checked here. Moves stay as SAN text until the move tree
//! replays them against a board.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::LazyLock;

use pgn_reader::{Nag, RawComment, RawTag, Reader, SanPlus, Skip, Visitor};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::game_data::{GameHeaders, ParsedGame, ParsedMove};

static CLOCK_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[%(clk|emt|eval)\s+[^\]]*\]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed game #{game}: {reason}")]
    Malformed { game: usize, reason: String },
}

/// Movetext being assembled: a stack of open lines, innermost last.
struct MovetextState {
    headers: GameHeaders,
    lines: Vec<Vec<ParsedMove>>,
    // Comment seen before the first move of the innermost line.
    leading_comment: Option<String>,
    error: Option<String>,
}

impl MovetextState {
    fn current_line(&mut self) -> &mut Vec<ParsedMove> {
        if self.lines.is_empty() {
            self.lines.push(Vec::new());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }
}

/// Collects one game per `read_game` call.
#[derive(Default)]
struct GameCollector {
    games_seen: usize,
}

impl Visitor for GameCollector {
    type Tags = GameHeaders;
    type Movetext = MovetextState;
    type Output = Result<ParsedGame, ImportError>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, GameHeaders> {
        self.games_seen += 1;
        ControlFlow::Continue(GameHeaders::new())
    }

    fn tag(
        &mut self,
        tags: &mut GameHeaders,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let name = String::from_utf8_lossy(name).into_owned();
        tags.set(name, value.decode_utf8_lossy().into_owned());
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: GameHeaders) -> ControlFlow<Self::Output, MovetextState> {
        ControlFlow::Continue(MovetextState {
            headers: tags,
            lines: vec![Vec::new()],
            leading_comment: None,
            error: None,
        })
    }

    fn san(&mut self, state: &mut MovetextState, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        let mut parsed = ParsedMove::new(san_plus.san.to_string());
        parsed.starting_comment = state.leading_comment.take();
        state.current_line().push(parsed);
        ControlFlow::Continue(())
    }

    fn nag(&mut self, state: &mut MovetextState, nag: Nag) -> ControlFlow<Self::Output> {
        if let Some(last) = state.current_line().last_mut() {
            last.nags.push(nag.0);
        }
        ControlFlow::Continue(())
    }

    fn comment(
        &mut self,
        state: &mut MovetextState,
        comment: RawComment<'_>,
    ) -> ControlFlow<Self::Output> {
        let text = clean_comment(&String::from_utf8_lossy(comment.as_bytes()));
        if text.is_empty() {
            return ControlFlow::Continue(());
        }
        let slot = match state.lines.last_mut().and_then(|line| line.last_mut()) {
            Some(last) => &mut last.comment,
            None => &mut state.leading_comment,
        };
        *slot = Some(match slot.take() {
            Some(existing) => format!("{existing} {text}"),
            None => text,
        });
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, state: &mut MovetextState) -> ControlFlow<Self::Output, Skip> {
        drop_leading_comment(state);
        state.lines.push(Vec::new());
        ControlFlow::Continue(Skip(false))
    }

    fn end_variation(&mut self, state: &mut MovetextState) -> ControlFlow<Self::Output> {
        if state.lines.len() < 2 {
            state.error = Some("unbalanced variation".to_string());
            return ControlFlow::Continue(());
        }
        drop_leading_comment(state);
        let variation = state.lines.pop().unwrap_or_default();
        if variation.is_empty() {
            return ControlFlow::Continue(());
        }
        match state.current_line().last_mut() {
            Some(varied) => varied.variations.push(variation),
            None => state.error = Some("variation before any move".to_string()),
        }
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, mut state: MovetextState) -> Self::Output {
        if let Some(reason) = state.error {
            return Err(ImportError::Malformed {
                game: self.games_seen,
                reason,
            });
        }
        if state.lines.len() != 1 {
            return Err(ImportError::Malformed {
                game: self.games_seen,
                reason: "unterminated variation".to_string(),
            });
        }
        Ok(ParsedGame {
            headers: state.headers,
            moves: state.lines.pop().unwrap_or_default(),
        })
    }
}

// A leading comment only survives if a move follows it in the same line.
fn drop_leading_comment(state: &mut MovetextState) {
    if let Some(text) = state.leading_comment.take() {
        debug!(comment = %text, "Dropping comment with no move after it");
    }
}

/// Strip clock/eval commands and collapse whitespace.
fn clean_comment(raw: &str) -> String {
    let stripped = CLOCK_COMMAND.replace_all(raw, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Lazy sequence of games read from a PGN stream.
pub struct GameSource<R: Read> {
    reader: Reader<R>,
    collector: GameCollector,
    done: bool,
}

impl<R: Read> GameSource<R> {
    /// Number of games started so far, including the one that failed if any.
    pub fn games_read(&self) -> usize {
        self.collector.games_seen
    }
}

impl<R: Read> Iterator for GameSource<R> {
    type Item = Result<ParsedGame, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_game(&mut self.collector) {
            Ok(Some(game)) => Some(game),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(ImportError::Io(e)))
            }
        }
    }
}

pub fn read_games<R: Read>(reader: R) -> GameSource<R> {
    GameSource {
        reader: Reader::new(reader),
        collector: GameCollector::default(),
        done: false,
    }
}

pub fn open_pgn_file(path: impl AsRef<Path>) -> Result<GameSource<BufReader<File>>, ImportError> {
    let file = File::open(path.as_ref())?;
    Ok(read_games(BufReader::new(file)))
}

/// Parse the first game of a PGN string.
pub fn parse_pgn(text: &str) -> Result<ParsedGame, ImportError> {
    read_games(text.as_bytes())
        .next()
        .unwrap_or_else(|| {
            Err(ImportError::Malformed {
                game: 1,
                reason: "no game found".to_string(),
            })
        })
}
