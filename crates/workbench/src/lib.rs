pub mod config;
pub mod error;
pub mod observers;
pub mod search;
pub mod session;

pub use config::WorkbenchConfig;
pub use error::{ConfigError, SearchError, SessionError};
pub use observers::{BoardMirror, NotationView};
pub use search::{CancelFlag, SearchHistory, SearchRecord, SearchService};
pub use session::{GameSession, Navigation};
