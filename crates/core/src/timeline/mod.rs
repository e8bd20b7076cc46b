use std::collections::HashSet;

use tracing::debug;

use crate::ids::{EntryId, HitObjectId};

/// Host playback clock in milliseconds.
#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    current_time: f64,
    seeking: bool,
}

impl PlaybackClock {
    pub fn new(current_time: f64) -> Self {
        Self {
            current_time,
            seeking: false,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Whether the last move was a jump rather than normal playback.
    pub fn is_seeking(&self) -> bool {
        self.seeking
    }

    pub fn reset(&mut self) {
        self.seek(0.0);
    }

    pub fn advance(&mut self, delta: f64) {
        self.current_time += delta;
        self.seeking = false;
    }

    pub fn seek(&mut self, time: f64) {
        debug!(from = self.current_time, to = time, "seek");
        self.current_time = time;
        self.seeking = true;
    }
}

/// Deferred work run at the start of the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameTask {
    /// Re-sync an entity whose defaults were re-applied.
    ApplyDefaults(HitObjectId),
    /// Recompute layout for one entry.
    InvalidateLayout(EntryId),
}

/// Queue of "at most once per frame" tasks.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    tasks: Vec<FrameTask>,
    pending: HashSet<FrameTask>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queues a task unless an identical one is already pending.
    pub fn add_once(&mut self, task: FrameTask) -> bool {
        if !self.pending.insert(task) {
            return false;
        }
        self.tasks.push(task);
        true
    }

    /// Takes the pending tasks in the order they were first queued.
    pub fn take(&mut self) -> Vec<FrameTask> {
        self.pending.clear();
        std::mem::take(&mut self.tasks)
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Arena;

    #[test]
    fn seek_sets_the_flag_until_playback_resumes() {
        let mut clock = PlaybackClock::new(100.0);
        clock.seek(20.0);
        assert!(clock.is_seeking());
        assert_eq!(clock.current_time(), 20.0);

        clock.advance(16.0);
        assert!(!clock.is_seeking());
        assert_eq!(clock.current_time(), 36.0);
    }

    #[test]
    fn duplicate_tasks_are_coalesced_within_a_frame() {
        let mut arena: Arena<HitObjectId, ()> = Arena::new();
        let a = arena.insert(());
        let b = arena.insert(());

        let mut scheduler = FrameScheduler::new();
        assert!(scheduler.add_once(FrameTask::ApplyDefaults(a)));
        assert!(scheduler.add_once(FrameTask::ApplyDefaults(b)));
        assert!(!scheduler.add_once(FrameTask::ApplyDefaults(a)));

        assert_eq!(
            scheduler.take(),
            vec![FrameTask::ApplyDefaults(a), FrameTask::ApplyDefaults(b)]
        );
        assert!(scheduler.is_empty());
        assert!(scheduler.add_once(FrameTask::ApplyDefaults(a)));
    }
}
