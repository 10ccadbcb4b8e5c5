//! Initialization tracking across session lifetimes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct InitRecord {
    started: Instant,
    torn_down: bool,
}

/// Remembers which canvases were recently initialized.
///
/// Mounting the same canvas twice in quick succession (a re-render, say)
/// must not run two initializations. A second [`begin_init`] within
/// `cooldown` of the first is refused unless the first session was torn down
/// in between.
///
/// [`begin_init`]: CanvasRegistry::begin_init
#[derive(Debug)]
pub struct CanvasRegistry {
    /// Window in which a repeated initialization is suppressed.
    pub cooldown: Duration,
    records: Mutex<HashMap<String, InitRecord>>,
}

impl CanvasRegistry {
    /// Creates a registry with the given cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Claims an initialization slot. Returns false if suppressed.
    pub fn begin_init(&self, canvas_id: &str) -> bool {
        let mut records = self.records.lock();
        if let Some(record) = records.get(canvas_id) {
            if !record.torn_down && record.started.elapsed() < self.cooldown {
                return false;
            }
        }
        records.insert(
            canvas_id.to_string(),
            InitRecord {
                started: Instant::now(),
                torn_down: false,
            },
        );
        true
    }

    /// Records that the canvas's session was torn down.
    pub fn mark_torn_down(&self, canvas_id: &str) {
        if let Some(record) = self.records.lock().get_mut(canvas_id) {
            record.torn_down = true;
        }
    }

    /// Drops the record so the next mount initializes again.
    pub fn abandon(&self, canvas_id: &str) {
        self.records.lock().remove(canvas_id);
    }

    /// Returns true if the canvas has a live initialization record.
    pub fn is_tracked(&self, canvas_id: &str) -> bool {
        self.records
            .lock()
            .get(canvas_id)
            .is_some_and(|record| !record.torn_down)
    }
}
