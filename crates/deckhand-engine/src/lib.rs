//! Deckhand Engine - renders resolved configuration into Kubernetes resources
//!
//! The renderer is a pure function of a [`deckhand_core::ResolvedConfig`],
//! the chart metadata and the release identity. It never talks to a cluster.

pub mod env;
pub mod error;
pub mod naming;
pub mod ports;
mod project;
pub mod renderer;
pub mod resource;

pub use env::{EnvAssembly, EnvSource};
pub use error::{EngineError, Result};
pub use naming::{Naming, Release};
pub use ports::PortSpec;
pub use renderer::ManifestRenderer;
pub use resource::{to_yaml, HttpRoute, ResourceSpec};
