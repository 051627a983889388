//! CLI commands

pub mod flavors;
pub mod schema;
pub mod template;
pub mod validate;
