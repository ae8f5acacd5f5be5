//! Sessions command handler.

use clap::{Args, Subcommand};
use delve_core::AppResult;
use delve_research::ResearchEngine;

/// List or purge saved research sessions
#[derive(Args, Debug)]
pub struct SessionsCommand {
    #[command(subcommand)]
    pub action: SessionsAction,
}

#[derive(Subcommand, Debug)]
pub enum SessionsAction {
    /// List sessions, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a session and its report
    Purge {
        /// Research id to delete
        research_id: String,
    },
}

impl SessionsCommand {
    pub async fn execute(&self, engine: &ResearchEngine) -> AppResult<()> {
        tracing::info!("Executing sessions command");

        match &self.action {
            SessionsAction::List { json } => {
                let sessions = engine.list_sessions().await;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&sessions)?);
                } else if sessions.is_empty() {
                    println!("No research sessions yet.");
                } else {
                    for s in &sessions {
                        println!(
                            "{}  {}  {:<11} {:<9} {}",
                            s.research_id,
                            s.created_at.format("%Y-%m-%d %H:%M"),
                            s.status.as_str(),
                            s.confidence.as_str(),
                            s.question
                        );
                    }
                }
            }
            SessionsAction::Purge { research_id } => {
                engine.purge(research_id).await?;
                println!("Purged {}", research_id);
            }
        }
        Ok(())
    }
}
