//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to follow a
//! run as it moves through its stages. Callers can forward events to a
//! terminal spinner, a WebSocket, or a job-status row without the library
//! knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_flashcards::{GenerationConfig, GenerationProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct PrintStages;
//!
//! impl GenerationProgressCallback for PrintStages {
//!     fn on_stage_start(&self, stage: Stage) {
//!         eprintln!("→ {stage}");
//!     }
//! }
//!
//! let config = GenerationConfig::builder()
//!     .progress_callback(Arc::new(PrintStages))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::sync::Arc;

/// Called by the pipeline as a run progresses.
///
/// All methods default to no-ops so implementations override only what they
/// need. Implementations must be `Send + Sync`; one callback may be shared by
/// concurrent runs.
pub trait GenerationProgressCallback: Send + Sync {
    /// A stage is about to begin.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// A stage finished without error.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }

    /// A flashcard was accepted by the store.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in the reply
    /// * `total`: number of drafts in the reply
    fn on_flashcard_saved(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// A stage failed; the run is over.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }

    /// The run finished and `saved` flashcards were persisted.
    fn on_run_complete(&self, saved: usize) {
        let _ = saved;
    }
}

/// A callback that ignores every event.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
