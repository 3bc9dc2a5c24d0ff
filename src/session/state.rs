use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATION_SECONDS: u64 = 25 * 60;

/// One pause second is granted for every twelve seconds of session length.
pub const PAUSE_ALLOWANCE_DIVISOR: u64 = 12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Paused,
    CompletionSelect,
    Reporting,
    Quiz,
    Reward,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Running => "Running",
            SessionState::Paused => "Paused",
            SessionState::CompletionSelect => "CompletionSelect",
            SessionState::Reporting => "Reporting",
            SessionState::Quiz => "Quiz",
            SessionState::Reward => "Reward",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub selected_duration_seconds: u64,
    pub total_seconds: u64,
    pub remaining_seconds: u64,
    pub focus_seconds: u64,
    pub distraction_seconds: u64,
    pub pause_allowance_seconds: u64,
    pub selected_subtask_ids: BTreeSet<String>,
    pub completed_subtask_ids: BTreeSet<String>,
    pub last_backgrounded_at: Option<DateTime<Utc>>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            selected_duration_seconds: DEFAULT_DURATION_SECONDS,
            total_seconds: 0,
            remaining_seconds: 0,
            focus_seconds: 0,
            distraction_seconds: 0,
            pause_allowance_seconds: 0,
            selected_subtask_ids: BTreeSet::new(),
            completed_subtask_ids: BTreeSet::new(),
            last_backgrounded_at: None,
        }
    }
}

impl SessionSnapshot {
    /// Takes the duration snapshot and enters `Running`.
    pub fn begin_session(&mut self) {
        let total = self.selected_duration_seconds;
        self.state = SessionState::Running;
        self.total_seconds = total;
        self.remaining_seconds = total;
        self.pause_allowance_seconds = total / PAUSE_ALLOWANCE_DIVISOR;
        self.focus_seconds = 0;
        self.distraction_seconds = 0;
        self.completed_subtask_ids.clear();
        self.last_backgrounded_at = None;
    }

    /// Consumes one running second. Returns true once the countdown hits zero.
    pub fn tick_countdown(&mut self) -> bool {
        if self.remaining_seconds > 0 {
            self.remaining_seconds -= 1;
            self.focus_seconds += 1;
        }
        self.remaining_seconds == 0
    }

    /// Consumes one second of pause budget. Returns true once it is used up.
    pub fn tick_pause_allowance(&mut self) -> bool {
        self.pause_allowance_seconds = self.pause_allowance_seconds.saturating_sub(1);
        self.pause_allowance_seconds == 0
    }

    /// Charges time spent in the background against the countdown.
    /// Returns true if the countdown is exhausted as a result.
    pub fn charge_distraction(&mut self, elapsed_seconds: u64) -> bool {
        if elapsed_seconds > 0 {
            self.distraction_seconds = self.distraction_seconds.saturating_add(elapsed_seconds);
            self.remaining_seconds = self.remaining_seconds.saturating_sub(elapsed_seconds);
        }
        self.remaining_seconds == 0
    }

    pub fn toggle_selection(&mut self, subtask_id: &str) -> bool {
        if !self.selected_subtask_ids.remove(subtask_id) {
            self.selected_subtask_ids.insert(subtask_id.to_string());
            return true;
        }
        false
    }

    /// Ids outside the session's selection are ignored.
    pub fn toggle_completion(&mut self, subtask_id: &str) -> bool {
        if !self.selected_subtask_ids.contains(subtask_id) {
            return false;
        }
        if !self.completed_subtask_ids.remove(subtask_id) {
            self.completed_subtask_ids.insert(subtask_id.to_string());
        }
        true
    }

    /// Returns to `Idle`. The chosen duration survives as the user's preference.
    pub fn reset(&mut self) {
        *self = Self {
            selected_duration_seconds: self.selected_duration_seconds,
            ..Self::default()
        };
    }

    pub fn progress(&self) -> f64 {
        if self.total_seconds == 0 {
            return 0.0;
        }
        (self.total_seconds - self.remaining_seconds) as f64 / self.total_seconds as f64
    }
}
