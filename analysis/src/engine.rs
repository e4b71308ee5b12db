use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use goban::{Board, Vertex};
use model::{Completeness, MoveCandidate};

use crate::errors::EngineError;

/// A progress report emitted while an analysis is in flight.
#[derive(Clone, Debug)]
pub struct Progress {
    pub visits: u32,
    pub win_probability: f32,
    pub score_lead: f32,
    pub best_vertex: Vertex,
}

/// The terminal payload of one engine invocation.
#[derive(Clone, Debug)]
pub struct EngineOutput {
    /// Candidates in the queried board's own orientation.
    pub candidates: Vec<MoveCandidate>,
    /// Visits actually performed, which may fall short of the request.
    pub visits: u32,
    pub completeness: Completeness,
    pub compute_seconds: f32,
    pub engine_label: String,
}

/// The receiving side of one engine invocation: zero or more progress
/// events followed by exactly one terminal result or error. Cancellable at
/// any point; a cancelled invocation terminates with
/// [`EngineError::Cancelled`] and releases the engine-side work.
pub struct AnalysisHandle {
    pub progress: mpsc::UnboundedReceiver<Progress>,
    pub result: oneshot::Receiver<Result<EngineOutput, EngineError>>,
    cancel: Arc<AtomicBool>,
}

impl AnalysisHandle {
    /// Creates the paired handle and worker sides of an invocation.
    pub fn channel() -> (AnalysisHandle, AnalysisWork) {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let cancel = Arc::new(AtomicBool::new(false));

        let handle = AnalysisHandle {
            progress: progress_rx,
            result: result_rx,
            cancel: cancel.clone(),
        };

        let work = AnalysisWork {
            progress: progress_tx,
            result: result_tx,
            cancel,
        };

        (handle, work)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// The sending side handed to an engine implementation.
pub struct AnalysisWork {
    pub progress: mpsc::UnboundedSender<Progress>,
    pub result: oneshot::Sender<Result<EngineOutput, EngineError>>,
    cancel: Arc<AtomicBool>,
}

impl AnalysisWork {
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn report_progress(&self, progress: Progress) {
        // The receiver may have been dropped by a caller that only cares
        // about the terminal result.
        let _ = self.progress.send(progress);
    }
}

/// The capability interface of an external analysis engine.
///
/// Concrete backends are selected at construction time; the orchestrator
/// only ever sees this trait. The engine is opaque: how it searches is its
/// own business, this seam only carries positions in and candidates out.
pub trait Engine {
    fn start(&mut self) -> Result<(), EngineError>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    fn label(&self) -> &str;

    /// Begins analyzing `board` up to `max_visits` of effort. Returns
    /// immediately; the work proceeds in the background and reports through
    /// the handle.
    fn request_analysis(
        &self,
        board: &Board,
        max_visits: u32,
    ) -> Result<AnalysisHandle, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_delivers_terminal_result() {
        let (handle, work) = AnalysisHandle::channel();

        work.report_progress(Progress {
            visits: 10,
            win_probability: 0.5,
            score_lead: 0.0,
            best_vertex: Vertex::Pass,
        });
        work.result
            .send(Err(EngineError::ProcessExited))
            .ok()
            .unwrap();

        let mut handle = handle;
        let progress = handle.progress.recv().await.unwrap();
        assert_eq!(progress.visits, 10);

        let result = handle.result.await.unwrap();
        assert!(matches!(result, Err(EngineError::ProcessExited)));
    }

    #[tokio::test]
    async fn test_cancel_is_visible_to_worker() {
        let (handle, work) = AnalysisHandle::channel();

        assert!(!work.cancelled());
        handle.cancel();
        assert!(work.cancelled());
    }

    #[tokio::test]
    async fn test_progress_send_after_receiver_drop_is_ignored() {
        let (handle, work) = AnalysisHandle::channel();
        drop(handle);

        // Must not panic.
        work.report_progress(Progress {
            visits: 1,
            win_probability: 0.5,
            score_lead: 0.0,
            best_vertex: Vertex::Pass,
        });
    }
}
