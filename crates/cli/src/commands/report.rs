//! Report command handler.

use clap::Args;
use delve_core::AppResult;
use delve_research::ResearchEngine;

/// Write the Markdown report of a finished research session
#[derive(Args, Debug)]
pub struct ReportCommand {
    /// Research id printed by `delve ask`
    pub research_id: String,
}

impl ReportCommand {
    pub async fn execute(&self, engine: &ResearchEngine) -> AppResult<()> {
        tracing::info!("Executing report command");

        let handle = engine.generate_report(&self.research_id).await?;
        println!("Report written to {}", handle.path.display());
        println!("Suggested file name: {}", handle.file_name);
        Ok(())
    }
}
