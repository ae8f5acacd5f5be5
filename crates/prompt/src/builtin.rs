//! Built-in template definitions.
//!
//! Used whenever the workspace has no override in `.delve/prompts/`.

/// Prompt used by the answer synthesizer.
pub const SYNTHESIS_PROMPT_ID: &str = "research.synthesis";

/// Markdown template used by the report generator.
pub const REPORT_TEMPLATE_ID: &str = "research.report";

const SYNTHESIS_YAML: &str = r#"
id: research.synthesis
title: Cited research answer
apiVersion: "1.0"
format: markdown
system: |
  You are an expert research assistant. You answer questions using only the
  numbered sources you are given, combining local documents and web results.
  You never invent sources and you keep every claim traceable.
template: |
  Question: {{question}}

  Sources:
  {{#each sources}}
  [{{this.index}}] ({{this.provenance}}) {{this.title}}
  {{this.content}}

  {{/each}}
  Instructions:
  - Answer the question using only the sources above.
  - End every factual sentence with at least one citation like [1] or [2, 3], using the source numbers above.
  - Never cite a number that is not in the list.
  - Start with bullet points for the key findings, then a short summary.
  - If sources disagree, point out the discrepancy.
  - If the sources do not answer the question, say so plainly.
"#;

const REPORT_YAML: &str = r#"
id: research.report
title: Research report
apiVersion: "1.0"
format: markdown
template: |
  # Research Report

  ## Question
  {{question}}

  ## Executive Summary
  {{answer}}

  ## Research Process
  - **Research ID**: {{research_id}}
  - **Status**: {{status}}
  - **Started**: {{created_at}}
  - **Completed**: {{completed_at}}
  - **Confidence Level**: {{confidence}}
  - **Sources Consulted**: {{source_count}}

  ## Sources Used
  {{#each sources}}
  {{this.index}}. [{{this.provenance}}] {{this.title}}{{#if this.location}} ({{this.location}}){{/if}} (quality {{this.quality}})
  {{else}}
  No sources were used.
  {{/each}}

  ## Research Steps
  Total research iterations: {{step_count}}

  {{#each steps}}
  ### Step {{this.sequence}}: {{this.tool}}
  **Query**: {{this.query}}
  **Status**: {{this.status}}{{#if this.cached}} (cached){{/if}}
  **Result**: {{this.summary}}

  {{/each}}
  ---
  *Generated by Delve Research Engine*
"#;

/// Return the YAML source of a built-in definition.
pub fn builtin_source(id: &str) -> Option<&'static str> {
    match id {
        SYNTHESIS_PROMPT_ID => Some(SYNTHESIS_YAML),
        REPORT_TEMPLATE_ID => Some(REPORT_YAML),
        _ => None,
    }
}

/// IDs of every built-in definition.
pub fn builtin_ids() -> [&'static str; 2] {
    [SYNTHESIS_PROMPT_ID, REPORT_TEMPLATE_ID]
}
