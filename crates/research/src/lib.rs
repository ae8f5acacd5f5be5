//! Research orchestration for Delve.
//!
//! Answers questions by planning a bounded sequence of local and web
//! searches, scoring and deduplicating what comes back, and synthesizing a
//! cited answer with a confidence label.
//!
//! # Example
//! ```no_run
//! use delve_core::AppConfig;
//! use delve_research::{CancellationToken, ResearchEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let engine = ResearchEngine::open(&config).await?;
//! let outcome = engine
//!     .research("How does photosynthesis work?", &CancellationToken::new())
//!     .await?;
//! println!("{} ({})", outcome.content, outcome.confidence);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cache;
pub mod cancel;
pub mod confidence;
pub mod engine;
pub mod planner;
pub mod quality;
pub mod report;
pub mod session;
pub mod synthesizer;
pub mod types;
pub mod web;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use engine::{EngineComponents, EngineOptions, EngineStatus, ResearchEngine};
pub use planner::{decide, PlannerAction, PlannerContext, StopReason};
pub use session::{FailureReason, ResearchOutcome, ResearchSession, ResearchState, SessionSummary};
pub use types::{
    Answer, ConfidenceLabel, Provenance, ReportHandle, ResearchStep, Source, StepStatus, ToolKind,
    WebResult,
};
pub use web::{WebSearchConnector, WebSearchProvider};
