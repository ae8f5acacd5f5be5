//! Prompt types for Delve.

use serde::{Deserialize, Serialize};

/// A template definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique template identifier (e.g., "research.synthesis")
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// System message sent alongside the rendered template (prompts only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Template string with Handlebars syntax
    pub template: String,

    /// Output format of the rendered text (e.g., "text", "markdown")
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "text".to_string()
}

/// A fully rendered template ready for use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// Rendered template body
    pub user: String,

    /// Metadata about the rendering
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a rendered template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source template ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Output format inherited from the definition
    pub format: String,

    /// Top-level context keys supplied to the template
    #[serde(rename = "resolvedVariables")]
    pub resolved_variables: Vec<String>,
}
