use crate::upload::types::UploadEvent;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::trace;

/// Aggregate percentage for a batch of `total` files where file `index`
/// (0-based) is internally at `file_percent`.
pub fn overall_percent(index: usize, total: usize, file_percent: u8) -> u8 {
    if total == 0 {
        return 100;
    }
    let p = f64::from(file_percent.min(100)) / 100.0;
    (((index as f64 + p) / total as f64) * 100.0).round() as u8
}

/// Tracks one batch's aggregate progress and emits progress events.
///
/// Transfer paths report per-file percentages through callbacks that can fire
/// from any task, so the cursor lives behind a mutex. The emitted aggregate is
/// clamped to be non-decreasing: a path re-reporting a lower percentage after
/// a retry never shows up as the bar moving backward.
#[derive(Clone)]
pub struct BatchProgressTracker {
    batch_id: String,
    total_files: usize,
    state: Arc<Mutex<TrackerState>>,
    tx: mpsc::UnboundedSender<UploadEvent>,
}

struct TrackerState {
    current_index: usize,
    last_overall: u8,
}

impl BatchProgressTracker {
    pub fn new(
        batch_id: String,
        total_files: usize,
        tx: mpsc::UnboundedSender<UploadEvent>,
    ) -> Self {
        Self {
            batch_id,
            total_files,
            state: Arc::new(Mutex::new(TrackerState {
                current_index: 0,
                last_overall: 0,
            })),
            tx,
        }
    }

    /// Record a tick from the file currently transferring and emit the
    /// recomputed aggregate.
    pub fn on_file_progress(&self, file_percent: u8) {
        let overall = {
            let mut state = self.state.lock().unwrap();
            let raw = overall_percent(state.current_index, self.total_files, file_percent);
            state.last_overall = state.last_overall.max(raw);
            state.last_overall
        };

        trace!("Batch {}: {}% overall", self.batch_id, overall);

        let _ = self.tx.send(UploadEvent::Progress {
            batch_id: self.batch_id.clone(),
            percent: overall,
        });
    }

    /// Move the cursor past the file that just reached a terminal state.
    pub fn on_file_complete(&self) {
        let mut state = self.state.lock().unwrap();
        if state.current_index < self.total_files {
            state.current_index += 1;
        }
    }

    /// Latest emitted aggregate.
    pub fn current(&self) -> u8 {
        self.state.lock().unwrap().last_overall
    }
}
