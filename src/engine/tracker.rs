use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::models::Window;

/// Windows that already produced an executable decision, per trading day
///
/// Keyed by the local calendar date. Marking a day drops every earlier day,
/// so a long-lived engine only keeps the current one. Reset between
/// independent runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionTracker {
    executed: BTreeMap<NaiveDate, BTreeSet<Window>>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_executed(&mut self, day: NaiveDate, window: Window) {
        self.executed.retain(|d, _| *d >= day);
        self.executed.entry(day).or_default().insert(window);
    }

    /// Window A already executed on `day`
    pub fn is_executed(&self, day: NaiveDate) -> bool {
        self.is_window_executed(day, Window::A)
    }

    pub fn is_window_executed(&self, day: NaiveDate, window: Window) -> bool {
        self.executed.get(&day).is_some_and(|w| w.contains(&window))
    }

    pub fn executed_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.executed.keys().copied()
    }

    pub fn reset(&mut self) {
        self.executed.clear();
    }
}
