//! Prompt and template system for Delve.
//!
//! This crate provides:
//! - YAML-based template definitions, with built-in defaults
//! - Workspace overrides from `.delve/prompts/<id>.yml`
//! - Handlebars rendering for the synthesis prompt and the research report

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_prompt, render_template};
pub use builtin::{REPORT_TEMPLATE_ID, SYNTHESIS_PROMPT_ID};
pub use loader::{list_prompts, load_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
