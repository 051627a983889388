//! Deckhand Source - asynchronous retrieval of value layers
//!
//! Loading layers is the only I/O a render performs. It happens here, before
//! merging, so that a render can time out or be cancelled while waiting on
//! its sources and never proceeds with a partial layer set.

pub mod error;
pub mod loader;
pub mod source;

pub use error::{Result, SourceError};
pub use loader::{LayerLoader, LoaderConfig};
pub use source::{source_for, FileSource, HttpSource, InlineSource, LayerSource};
