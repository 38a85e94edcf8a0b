//! `artifactor-pipeline` — the Inference Pipeline described in
//! SPEC_FULL.md §4.2: five ordered stages (Preprocess, Classify, Tag,
//! Embed, Postprocess) behind priority scheduling, request coalescing,
//! and a two-tier cache.

pub mod batch;
pub mod coalesce;
pub mod engine;
pub mod error;
pub mod queue;
pub mod stages;

pub use batch::batch_process;
pub use engine::{PipelineEngine, SubmitOutcome};
pub use error::{PipelineError, Result};
pub use queue::{PriorityQueues, QueueReceivers};
