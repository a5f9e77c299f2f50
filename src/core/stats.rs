use std::collections::VecDeque;

use crate::sequencer::Stage;

const RECENT_WINDOW: usize = 200;

/// Running counts for one block.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub completed: u32,
    pub rewarded: u32,
    /// Aborts per stage: `[stage 1, stage 2]`.
    pub aborted: [u32; 2],
    pub recent: VecDeque<bool>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            completed: 0,
            rewarded: 0,
            aborted: [0; 2],
            recent: VecDeque::with_capacity(RECENT_WINDOW),
        }
    }

    pub fn record_completed(&mut self, rewarded: bool) {
        self.completed += 1;
        if rewarded {
            self.rewarded += 1;
        }

        self.recent.push_back(rewarded);
        if self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
    }

    pub fn record_aborted(&mut self, stage: Stage) {
        self.aborted[stage.index()] += 1;
    }

    pub fn total_aborted(&self) -> u32 {
        self.aborted[0] + self.aborted[1]
    }

    pub fn attempts(&self) -> u32 {
        self.completed + self.total_aborted()
    }

    /// Fraction of completed trials that paid out.
    pub fn reward_rate(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.rewarded as f64 / self.completed as f64
        }
    }

    pub fn recent_reward_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let hits = self.recent.iter().filter(|&&r| r).count();
        hits as f64 / self.recent.len() as f64
    }

    pub fn abort_rate(&self) -> f64 {
        let attempts = self.attempts();
        if attempts == 0 {
            0.0
        } else {
            self.total_aborted() as f64 / attempts as f64
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}
