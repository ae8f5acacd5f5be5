//! Command handlers for the Delve CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod docs;
pub mod report;
pub mod sessions;
pub mod status;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use docs::DocsCommand;
pub use report::ReportCommand;
pub use sessions::SessionsCommand;
pub use status::StatusCommand;
