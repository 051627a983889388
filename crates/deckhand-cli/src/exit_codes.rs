//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - a layer or the resolved values violate the schema
pub const VALIDATION_ERROR: i32 = 2;

/// Render error - resolved values cannot be turned into resources
pub const RENDER_ERROR: i32 = 3;

/// Chart error - invalid chart structure, chart.yaml or extension schema
pub const CHART_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Source error - a value layer could not be retrieved
pub const SOURCE_ERROR: i32 = 6;
