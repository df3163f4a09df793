//! Typed publish/subscribe hub connecting board, notation, engine and
//! database components.
//!
//! The hub is an ordinary value: construct one, hand clones to each component
//! at wiring time, and register handlers there.

pub mod error;
pub mod event;
pub mod hub;

pub use error::HubError;
pub use event::{ArgType, ArgValue, Event, EventKind, Identifier};
pub use hub::{Delivery, EventHub, Handler, HandlerFailure};
