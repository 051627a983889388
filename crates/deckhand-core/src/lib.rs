//! Deckhand Core - configuration model for the manifest renderer
//!
//! This crate provides the types every render invocation is built from:
//! - `ConfigNode`: the typed configuration tree
//! - `Layer`: one named source of overrides
//! - `SchemaStore`: recognized keys, types and defaults
//! - `OverlayMerger` / `ResolvedConfig`: merged and validated values
//! - `LoadedChart`: chart metadata, defaults and environment profiles

pub mod builtin;
pub mod chart;
pub mod error;
pub mod layer;
pub mod merge;
pub mod node;
pub mod schema;

pub use chart::{ChartMetadata, LoadedChart};
pub use error::{CoreError, Result};
pub use layer::{Layer, LayerOrigin};
pub use merge::{OverlayMerger, ResolvedConfig};
pub use node::{ConfigNode, Mapping};
pub use schema::{FieldSpec, FieldType, Rule, SchemaMode, SchemaStore};
