// Bounded undo/redo over timeline states.
//
// User-initiated mutations (reorder, label edit, soft delete) record the
// previous state; initial loads and reconciliations do not.

use crate::timeline::ProjectTimeline;

const DEFAULT_CAPACITY: usize = 50;

pub struct TimelineHistory {
    past: Vec<ProjectTimeline>,
    future: Vec<ProjectTimeline>,
    capacity: usize,
}

impl TimelineHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            past: Vec::new(),
            future: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record the state being replaced by a user mutation. Clears the redo
    /// stack and drops the oldest state past the capacity cap.
    pub fn record(&mut self, previous: ProjectTimeline) {
        self.future.clear();
        self.past.push(previous);
        if self.past.len() > self.capacity {
            self.past.remove(0);
        }
    }

    /// Step back: the present moves onto the redo stack, the returned state
    /// becomes the present.
    pub fn undo(&mut self, present: ProjectTimeline) -> Option<ProjectTimeline> {
        let restored = self.past.pop()?;
        self.future.push(present);
        Some(restored)
    }

    /// Inverse of [`TimelineHistory::undo`].
    pub fn redo(&mut self, present: ProjectTimeline) -> Option<ProjectTimeline> {
        let restored = self.future.pop()?;
        self.past.push(present);
        Some(restored)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }
}

impl Default for TimelineHistory {
    fn default() -> Self {
        Self::new()
    }
}
