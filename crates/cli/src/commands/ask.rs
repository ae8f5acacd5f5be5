//! Ask command handler.
//!
//! Runs a research session and prints the cited answer.

use clap::Args;
use delve_core::AppResult;
use delve_research::{CancellationToken, ResearchEngine, ResearchOutcome, ResearchState};

/// Research a question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to research
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the Markdown report
    #[arg(long)]
    pub report: bool,
}

impl AskCommand {
    pub async fn execute(&self, engine: &ResearchEngine) -> AppResult<()> {
        let question = self.question.join(" ");
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        // Ctrl-C stops the session between steps instead of killing it mid-write
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current step");
                    cancel.cancel();
                }
            })
        };

        let outcome = engine.research(&question, &cancel).await;
        watcher.abort();
        let outcome = outcome?;

        let report = if self.report {
            Some(engine.generate_report(&outcome.research_id).await?)
        } else {
            None
        };

        if self.json {
            let mut output = serde_json::to_value(&outcome)?;
            if let (Some(report), Some(map)) = (&report, output.as_object_mut()) {
                map.insert("report".to_string(), serde_json::to_value(report)?);
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_outcome(&outcome);
            if let Some(report) = report {
                println!();
                println!("Report: {}", report.path.display());
            }
        }

        Ok(())
    }
}

fn print_outcome(outcome: &ResearchOutcome) {
    println!("{}", outcome.content);

    if !outcome.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in outcome.sources.iter().enumerate() {
            println!(
                "  [{}] ({}) {} - {}",
                i + 1,
                source.provenance,
                source.title,
                source.location()
            );
        }
    }

    println!();
    println!("Confidence: {}", outcome.confidence);
    println!("Steps: {}", outcome.research_steps.len());
    if outcome.status == ResearchState::Failed {
        let reason = outcome
            .failure_reason
            .map(|r| r.as_str())
            .unwrap_or("unknown");
        println!("Status: FAILED ({})", reason);
    }
    println!("Research ID: {}", outcome.research_id);
}
