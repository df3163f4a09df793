//! Workbench CLI
//!
//! Loads one game from a PGN file into a session wired to the event hub,
//! prints its notation and the current position, and optionally searches the
//! configured corpus for that position.
//!
//! Usage: workbench <pgn-file> [--game N] [--jump PLY] [--search]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chess_core::pgn::open_pgn_file;
use chess_core::{RulesAdapter, StandardRules};
use event_hub::{Event, EventHub, EventKind, Handler, Identifier};
use tracing::{info, warn};
use workbench::search::corpus_files;
use workbench::{
    BoardMirror, GameSession, Navigation, NotationView, SearchHistory, SearchService,
    SessionError, WorkbenchConfig,
};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(300);

struct CliArgs {
    pgn: PathBuf,
    game: usize,
    jump: Option<usize>,
    search: bool,
}

/// Parse `<pgn-file> [--game N] [--jump PLY] [--search]` from CLI args
fn parse_args() -> Option<CliArgs> {
    let args: Vec<String> = std::env::args().collect();
    let pgn = PathBuf::from(args.get(1)?);

    let mut parsed = CliArgs {
        pgn,
        game: 1,
        jump: None,
        search: false,
    };
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--game" => {
                parsed.game = args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(1);
                i += 2;
            }
            "--jump" => {
                parsed.jump = args.get(i + 1).and_then(|s| s.parse().ok());
                i += 2;
            }
            "--search" => {
                parsed.search = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    Some(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let Some(args) = parse_args() else {
        eprintln!("Usage: workbench <pgn-file> [--game N] [--jump PLY] [--search]");
        std::process::exit(1);
    };

    let rules: Arc<dyn RulesAdapter> = Arc::new(StandardRules);
    let config = WorkbenchConfig::from_env(rules.as_ref())?;
    info!(
        history = %config.search_history_path.display(),
        limit = config.search_limit,
        "Workbench config loaded"
    );

    // Wiring: every component gets the same hub
    let hub = EventHub::new();
    let view = NotationView::attach(&hub);
    let board = BoardMirror::attach(&hub);
    let history = SearchHistory::load(&config.search_history_path)?;
    let search = SearchService::new(hub.clone(), rules.clone(), history, &config);

    let (completed_tx, mut completed_rx) = tokio::sync::mpsc::unbounded_channel();
    hub.register(
        "cli",
        [(
            EventKind::SearchCompleted,
            Handler::sync(move |event| {
                if let Event::SearchCompleted { result_ref } = event {
                    completed_tx
                        .send(result_ref.clone())
                        .map_err(|_| anyhow::anyhow!("cli stopped listening"))?;
                }
                Ok(())
            }),
        )],
    );

    let mut session = GameSession::new(
        hub.clone(),
        rules.clone(),
        config.start_position(rules.as_ref()),
    );

    // Games are read lazily; only the requested one is parsed into a tree
    let game = open_pgn_file(&args.pgn)?
        .nth(args.game.saturating_sub(1))
        .ok_or(SessionError::GameNotFound(args.game))??;
    session.load_game(&game)?;
    info!(
        game = args.game,
        white = game.headers.white(),
        black = game.headers.black(),
        plies = game.main_line_len(),
        "Game loaded"
    );

    if let Some(ply) = args.jump {
        let target = match ply {
            0 => Navigation::Start,
            n => match session.tree().main_line().get(n - 1) {
                Some(id) => Navigation::Jump(*id),
                None => {
                    warn!(ply = n, "Main line is shorter, jumping to its end");
                    Navigation::End
                }
            },
        };
        session.navigate(target)?;
    }

    let rendered = view.refresh(&session)?;
    println!("{}", rendered.to_pgn());
    println!(
        "FEN: {}",
        board.fen().unwrap_or_else(|| session.current_fen())
    );

    if args.search {
        search.attach();
        let corpus = config
            .corpus
            .clone()
            .unwrap_or_else(|| args.pgn.clone());
        let files = corpus_files(&corpus)?;
        info!(corpus = %corpus.display(), files = files.len(), "Searching corpus");
        session.request_search(Identifier::new(corpus.display().to_string()));

        match tokio::time::timeout(SEARCH_TIMEOUT, completed_rx.recv()).await {
            Ok(Some(result_ref)) => match search.record(result_ref.as_str()) {
                Some(record) => {
                    println!(
                        "Search {}: {} hits in {} games{}",
                        record.id,
                        record.hits.len(),
                        record.games_scanned,
                        if record.truncated { " (truncated)" } else { "" }
                    );
                    for hit in &record.hits {
                        println!(
                            "  #{:<5} {} - {} ({}) {} at ply {}",
                            hit.game, hit.white, hit.black, hit.event, hit.result, hit.ply
                        );
                    }
                }
                None => warn!(id = %result_ref, "Search result not in history"),
            },
            Ok(None) => warn!("Search listener closed"),
            Err(_) => {
                search.cancel_running();
                warn!("Search timed out");
            }
        }
    }

    Ok(())
}
