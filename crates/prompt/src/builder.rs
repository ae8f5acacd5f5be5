//! Prompt builder for rendering templates against a JSON context.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use delve_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::Value;

/// Build a prompt from a definition and a template context.
///
/// The context is usually produced with `serde_json::json!` or by
/// serializing a view struct. Missing keys render as empty strings.
///
/// # Example
/// ```no_run
/// use delve_prompt::{build_prompt, load_prompt, SYNTHESIS_PROMPT_ID};
/// use serde_json::json;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = load_prompt(None, SYNTHESIS_PROMPT_ID)?;
/// let built = build_prompt(&def, &json!({ "question": "What is Rust?", "sources": [] }))?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(definition: &PromptDefinition, context: &Value) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let user = render_template(&definition.template, context)?;

    let system = match &definition.system {
        Some(system) => Some(render_template(system, context)?.trim_end().to_string()),
        None => None,
    };

    let resolved_variables = match context {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            format: definition.format.clone(),
            resolved_variables,
        },
    })
}

/// Render a Handlebars template with a JSON context.
pub fn render_template(template: &str, context: &Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Output is plain text or markdown, never HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", context)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
