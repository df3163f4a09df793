//! Position search over a PGN corpus, with a persisted history of results.
//!
//! The service listens for `SearchRequested`, scans the corpus on a blocking
//! worker thread and announces the stored result with `SearchCompleted`.
//! Starting a new search cancels the one still running.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use anyhow::Context;
use chess_core::pgn::{open_pgn_file, ImportError};
use chess_core::{normalize_fen, ParsedGame, Position, RulesAdapter};
use chrono::{DateTime, Utc};
use event_hub::{Event, EventHub, EventKind, Handler, Identifier};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::WorkbenchConfig;
pub use crate::error::SearchError;

static SEARCH_SEQ: AtomicU64 = AtomicU64::new(1);

/// Stop signal shared between the requester and a running scan.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: String,
    /// 1-based index of the game within its file
    pub game: usize,
    pub white: String,
    pub black: String,
    pub event: String,
    pub result: String,
    /// First ply at which the position occurs
    pub ply: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub id: String,
    pub requested_at: DateTime<Utc>,
    pub fen: String,
    pub corpus: String,
    pub games_scanned: usize,
    pub hits: Vec<SearchHit>,
    /// Hit limit reached before the corpus was exhausted
    pub truncated: bool,
}

/// Result of one scan, before it is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub games_scanned: usize,
    pub hits: Vec<SearchHit>,
    pub truncated: bool,
    pub cancelled: bool,
}

/// Search results persisted as a JSON array.
#[derive(Debug, Clone)]
pub struct SearchHistory {
    path: PathBuf,
    records: Vec<SearchRecord>,
}

impl SearchHistory {
    /// Load from `path`; a missing file is an empty history.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let path = path.into();
        let records = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), records = records.len(), "Loaded search history");
        Ok(Self { path, records })
    }

    pub fn save(&self) -> Result<(), SearchError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn push(&mut self, record: SearchRecord) {
        self.records.push(record);
    }

    pub fn get(&self, id: &str) -> Option<&SearchRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn records(&self) -> &[SearchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// PGN files making up a corpus: the file itself, or `*.pgn` inside a directory.
pub fn corpus_files(corpus: &Path) -> Result<Vec<PathBuf>, SearchError> {
    let files = if corpus.is_dir() {
        let pattern = format!("{}/*.pgn", corpus.display());
        let mut files: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(|p| p.ok()).collect();
        files.sort();
        files
    } else if corpus.is_file() {
        vec![corpus.to_path_buf()]
    } else {
        Vec::new()
    };

    if files.is_empty() {
        return Err(SearchError::NoCorpus(corpus.to_path_buf()));
    }
    Ok(files)
}

/// First ply of the main line at which `target` (normalized FEN) occurs.
fn find_position(game: &ParsedGame, target: &str, rules: &dyn RulesAdapter) -> Option<u32> {
    let mut position = match game.start_fen() {
        Some(fen) => rules.parse_fen(fen).ok()?,
        None => rules.starting_position(),
    };
    if normalize_fen(&rules.to_fen(&position)) == target {
        return Some(0);
    }

    for (index, parsed) in game.moves.iter().enumerate() {
        let mv = match rules.parse_san(&position, &parsed.san) {
            Ok(mv) => mv,
            Err(e) => {
                debug!(san = %parsed.san, error = %e, "Stopping replay at unplayable move");
                return None;
            }
        };
        position = rules.apply(&position, &mv).ok()?;
        if normalize_fen(&rules.to_fen(&position)) == target {
            return Some(index as u32 + 1);
        }
    }
    None
}

/// Scan every game's main line for the position `fen`, ignoring move counters.
pub fn scan_corpus(
    corpus: &Path,
    fen: &str,
    limit: usize,
    rules: &dyn RulesAdapter,
    cancel: &CancelFlag,
) -> Result<ScanOutcome, SearchError> {
    let target = normalize_fen(fen);
    let mut outcome = ScanOutcome::default();

    'files: for file in corpus_files(corpus)? {
        let label = file.display().to_string();
        for (index, game) in open_pgn_file(&file)?.enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break 'files;
            }

            let game = match game {
                Ok(game) => game,
                Err(ImportError::Io(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(file = %label, error = %e, "Skipping malformed game");
                    continue;
                }
            };
            outcome.games_scanned += 1;

            if let Some(ply) = find_position(&game, &target, rules) {
                outcome.hits.push(SearchHit {
                    file: label.clone(),
                    game: index + 1,
                    white: game.headers.white().to_string(),
                    black: game.headers.black().to_string(),
                    event: game.headers.event().to_string(),
                    result: game.headers.result().to_string(),
                    ply,
                });
                if outcome.hits.len() >= limit {
                    outcome.truncated = true;
                    break 'files;
                }
            }
        }
    }
    Ok(outcome)
}

fn next_search_id() -> String {
    format!(
        "search-{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S"),
        SEARCH_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

struct ServiceInner {
    hub: EventHub,
    rules: Arc<dyn RulesAdapter>,
    history: Mutex<SearchHistory>,
    limit: usize,
    default_corpus: Option<PathBuf>,
    running: Mutex<Option<CancelFlag>>,
}

/// Background position search wired to the hub.
#[derive(Clone)]
pub struct SearchService {
    inner: Arc<ServiceInner>,
}

impl SearchService {
    pub const LISTENER: &'static str = "position-search";

    pub fn new(
        hub: EventHub,
        rules: Arc<dyn RulesAdapter>,
        history: SearchHistory,
        config: &WorkbenchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                hub,
                rules,
                history: Mutex::new(history),
                limit: config.search_limit,
                default_corpus: config.corpus.clone(),
                running: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to `SearchRequested`. Each request runs on the current tokio runtime.
    pub fn attach(&self) {
        // Weak so the hub's handler table does not keep the service alive.
        let weak: Weak<ServiceInner> = Arc::downgrade(&self.inner);
        self.inner.hub.register(
            Self::LISTENER,
            [(
                EventKind::SearchRequested,
                Handler::sync(move |event| {
                    let Some(inner) = weak.upgrade() else {
                        return Ok(());
                    };
                    if let Event::SearchRequested { position, corpus } = event {
                        SearchService { inner }.spawn(position.clone(), corpus.clone())?;
                    }
                    Ok(())
                }),
            )],
        );
    }

    fn spawn(&self, position: Position, corpus: Identifier) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("position search needs a tokio runtime")?;
        let cancel = self.begin();
        let service = self.clone();
        runtime.spawn(async move {
            match service.run(position, corpus.clone(), cancel).await {
                Ok(Some(record)) => {
                    info!(id = %record.id, hits = record.hits.len(), "Search finished")
                }
                Ok(None) => info!(corpus = %corpus, "Search cancelled"),
                Err(e) => error!(corpus = %corpus, error = %e, "Search failed"),
            }
        });
        Ok(())
    }

    /// Cancel whatever is running and hand out the flag for a new search.
    fn begin(&self) -> CancelFlag {
        let flag = CancelFlag::new();
        let mut running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = running.replace(flag.clone()) {
            previous.cancel();
        }
        flag
    }

    pub fn cancel_running(&self) {
        if let Some(flag) = self
            .inner
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            flag.cancel();
        }
    }

    fn resolve_corpus(&self, corpus: &Identifier) -> Result<PathBuf, SearchError> {
        if !corpus.as_str().is_empty() {
            return Ok(PathBuf::from(corpus.as_str()));
        }
        self.inner
            .default_corpus
            .clone()
            .ok_or_else(|| SearchError::NoCorpus(PathBuf::new()))
    }

    /// Run one search to completion, store it and publish `SearchCompleted`.
    /// Returns `None` when the search was cancelled; nothing is stored then.
    pub async fn run(
        &self,
        position: Position,
        corpus: Identifier,
        cancel: CancelFlag,
    ) -> Result<Option<SearchRecord>, SearchError> {
        let requested_at = Utc::now();
        let path = self.resolve_corpus(&corpus)?;
        let fen = self.inner.rules.to_fen(&position);
        info!(corpus = %path.display(), fen = %fen, "Starting position search");

        let rules = self.inner.rules.clone();
        let limit = self.inner.limit;
        let scan_path = path.clone();
        let scan_fen = fen.clone();
        let scan_cancel = cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            scan_corpus(&scan_path, &scan_fen, limit, rules.as_ref(), &scan_cancel)
        })
        .await
        .map_err(|e| SearchError::Task(e.to_string()))??;

        // The scan only polls between games, so a late cancel lands here.
        if outcome.cancelled || cancel.is_cancelled() {
            info!(corpus = %path.display(), "Position search cancelled");
            return Ok(None);
        }

        let record = SearchRecord {
            id: next_search_id(),
            requested_at,
            fen,
            corpus: path.display().to_string(),
            games_scanned: outcome.games_scanned,
            hits: outcome.hits,
            truncated: outcome.truncated,
        };

        {
            let mut history = self
                .inner
                .history
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            history.push(record.clone());
            if let Err(e) = history.save() {
                warn!(
                    path = %history.path().display(),
                    error = %e,
                    "Failed to persist search history"
                );
            }
        }

        self.inner.hub.publish(Event::SearchCompleted {
            result_ref: Identifier::new(record.id.clone()),
        });
        Ok(Some(record))
    }

    pub fn record(&self, id: &str) -> Option<SearchRecord> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn history_len(&self) -> usize {
        self.inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
