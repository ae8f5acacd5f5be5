//! Status command handler.

use clap::Args;
use delve_core::AppResult;
use delve_research::ResearchEngine;

/// Show corpus and provider status
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, engine: &ResearchEngine) -> AppResult<()> {
        tracing::info!("Executing status command");
        let status = engine.status().await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }

        println!("Documents:  {}", status.documents);
        println!("Chunks:     {}", status.chunks);
        println!("Sessions:   {}", status.sessions);
        println!();
        println!("Generation: {} ({})", status.llm_provider, status.llm_model);
        match status.dimensions {
            Some(dims) => println!(
                "Embeddings: {} ({}, {} dims)",
                status.embedding_provider, status.embedding_model, dims
            ),
            None => println!(
                "Embeddings: {} ({})",
                status.embedding_provider, status.embedding_model
            ),
        }
        println!(
            "Web search: {}",
            status.web_provider.as_deref().unwrap_or("disabled")
        );
        Ok(())
    }
}
