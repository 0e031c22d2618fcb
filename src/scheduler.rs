use crate::types::Event;
use log::trace;
use std::cmp::Ordering;

/// Whether the pending events are ready for time-ordered extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Events were added since the last sort.
    Unsorted,
    /// Pending events are sorted by descending `(onset, id)`.
    Sorted,
}

/// Holds pending events and releases them as playback time passes their onset.
///
/// Events are kept sorted in *descending* `(onset, id)` order so the next due
/// event is always at the end of the vector and popping it is O(1). Sorting
/// is lazy: `add` only marks the queue unsorted, and the next `pop_due` sorts
/// once before extracting.
#[derive(Debug, Clone)]
pub struct EventScheduler {
    pending: Vec<Event>,
    state: SchedulerState,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            state: SchedulerState::Sorted,
        }
    }

    pub fn add(&mut self, event: Event) {
        self.pending.push(event);
        self.state = SchedulerState::Unsorted;
    }

    /// Release every pending event with `onset <= current_time`, earliest
    /// first. Events sharing an onset come out in id order.
    pub fn pop_due(&mut self, current_time: f64) -> Vec<Event> {
        self.prime();

        let mut due = Vec::new();
        while let Some(next) = self.pending.last() {
            if next.onset() > current_time {
                break;
            }
            if let Some(event) = self.pending.pop() {
                due.push(event);
            }
        }

        if !due.is_empty() {
            trace!(
                "pop_due({:.3}): {} released, {} pending",
                current_time,
                due.len(),
                self.pending.len()
            );
        }
        due
    }

    /// Earliest pending onset, if any.
    pub fn next_onset(&mut self) -> Option<f64> {
        self.prime();
        self.pending.last().map(|e| e.onset())
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn prime(&mut self) {
        if self.state == SchedulerState::Unsorted {
            self.pending.sort_by(descending_onset_then_id);
            self.state = SchedulerState::Sorted;
        }
    }
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<Event> for EventScheduler {
    fn extend<I: IntoIterator<Item = Event>>(&mut self, iter: I) {
        let before = self.pending.len();
        self.pending.extend(iter);
        if self.pending.len() != before {
            self.state = SchedulerState::Unsorted;
        }
    }
}

impl FromIterator<Event> for EventScheduler {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let mut s = Self::new();
        s.extend(iter);
        s
    }
}

// Onsets are validated finite at ingestion, so total_cmp is a plain numeric order.
fn descending_onset_then_id(a: &Event, b: &Event) -> Ordering {
    b.onset()
        .total_cmp(&a.onset())
        .then_with(|| b.id().cmp(&a.id()))
}
