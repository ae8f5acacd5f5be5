//! Docs command handler.
//!
//! Adds, lists and removes documents in the local corpus.

use clap::{Args, Subcommand};
use delve_core::AppResult;
use delve_research::ResearchEngine;
use std::path::PathBuf;

/// Manage the local document corpus
#[derive(Args, Debug)]
pub struct DocsCommand {
    #[command(subcommand)]
    pub action: DocsAction,
}

#[derive(Subcommand, Debug)]
pub enum DocsAction {
    /// Ingest files or directories
    Add {
        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Declared document type (pdf, markdown, text); files only
        #[arg(long = "type")]
        doc_type: Option<String>,
    },

    /// List ingested documents
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a document and all of its chunks
    Remove {
        /// Document name as shown by `docs list`
        name: String,
    },
}

impl DocsCommand {
    pub async fn execute(&self, engine: &ResearchEngine) -> AppResult<()> {
        tracing::info!("Executing docs command");

        match &self.action {
            DocsAction::Add { paths, doc_type } => add(engine, paths, doc_type.as_deref()).await,
            DocsAction::List { json } => list(engine, *json).await,
            DocsAction::Remove { name } => {
                let removed = engine.delete_document(name).await?;
                println!(
                    "Removed {} ({} chunks)",
                    removed.name, removed.chunk_count
                );
                Ok(())
            }
        }
    }
}

async fn add(engine: &ResearchEngine, paths: &[PathBuf], doc_type: Option<&str>) -> AppResult<()> {
    let mut ingested = 0usize;
    let mut failed = 0usize;

    for path in paths {
        if path.is_dir() {
            let summary = engine.ingest_dir(path).await?;
            for doc in &summary.ingested {
                println!("  + {} ({}, {} chunks)", doc.name, doc.doc_type, doc.chunk_count);
            }
            for (name, reason) in &summary.skipped {
                println!("  ! {}: {}", name, reason);
            }
            ingested += summary.ingested.len();
            failed += summary.skipped.len();
            continue;
        }

        // One bad file should not abort the rest of the batch
        match engine.ingest_path(path, doc_type).await {
            Ok(doc) => {
                println!("  + {} ({}, {} chunks)", doc.name, doc.doc_type, doc.chunk_count);
                ingested += 1;
            }
            Err(e) => {
                tracing::warn!("Failed to ingest {}: {}", path.display(), e);
                println!("  ! {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    println!();
    println!("Ingested {} document(s), {} failed", ingested, failed);
    Ok(())
}

async fn list(engine: &ResearchEngine, json: bool) -> AppResult<()> {
    let documents = engine.list_documents().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
        return Ok(());
    }

    if documents.is_empty() {
        println!("No documents ingested yet. Use `delve docs add <path>`.");
        return Ok(());
    }

    println!("{:<40} {:<10} {:>10} {:>7}  INGESTED", "NAME", "TYPE", "BYTES", "CHUNKS");
    for doc in &documents {
        println!(
            "{:<40} {:<10} {:>10} {:>7}  {}",
            doc.name,
            doc.doc_type.as_str(),
            doc.size_bytes,
            doc.chunk_count,
            doc.ingested_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
