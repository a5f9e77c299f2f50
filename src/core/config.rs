use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Seed used for tutorial blocks so every participant sees the same reward paths.
pub const TUTORIAL_SEED: u64 = 12345;

/// Longest accepted deadline or delay, in seconds (one day).
pub const MAX_WAIT_SECS: f64 = 86_400.0;

/// Options recognized by the trial engine.
///
/// Every field has a default, so a config file only needs the values it changes.
/// Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Completed trials required to finish a block.
    #[serde(default = "default_ntrials")]
    pub ntrials: u32,
    /// Probability of the common transition.
    #[serde(default = "default_ptrans")]
    pub ptrans: f64,
    #[serde(default = "default_preward_low")]
    pub preward_low: f64,
    #[serde(default = "default_preward_high")]
    pub preward_high: f64,
    /// Standard deviation of the reward-path Gaussian step.
    #[serde(default = "default_preward_sd")]
    pub preward_sd: f64,
    /// Response deadline at each stage.
    #[serde(default = "default_tlimitchoice")]
    pub tlimitchoice: f64,
    /// Mean of the exponential inter-trial interval.
    #[serde(default = "default_ititime")]
    pub ititime: f64,

    #[serde(default = "default_t_transition")]
    pub t_transition: f64,
    #[serde(default = "default_t_selected")]
    pub t_selected: f64,
    #[serde(default = "default_t_feedback")]
    pub t_feedback: f64,
    #[serde(default = "default_t_abort")]
    pub t_abort: f64,

    /// Upper bound on attempts (completed + aborted). Unlimited when absent.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub tutorial: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Seconds to `Duration`, capped at [`MAX_WAIT_SECS`]. Negative or NaN waits are zero.
pub fn wait_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_WAIT_SECS)).unwrap_or(Duration::ZERO)
}

fn default_ntrials() -> u32 {
    201
}

fn default_ptrans() -> f64 {
    0.7
}

fn default_preward_low() -> f64 {
    0.25
}

fn default_preward_high() -> f64 {
    0.75
}

fn default_preward_sd() -> f64 {
    0.025
}

fn default_tlimitchoice() -> f64 {
    3.0
}

fn default_ititime() -> f64 {
    1.0
}

fn default_t_transition() -> f64 {
    0.4
}

fn default_t_selected() -> f64 {
    0.2
}

fn default_t_feedback() -> f64 {
    2.0
}

fn default_t_abort() -> f64 {
    2.0
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            ntrials: default_ntrials(),
            ptrans: default_ptrans(),
            preward_low: default_preward_low(),
            preward_high: default_preward_high(),
            preward_sd: default_preward_sd(),
            tlimitchoice: default_tlimitchoice(),
            ititime: default_ititime(),
            t_transition: default_t_transition(),
            t_selected: default_t_selected(),
            t_feedback: default_t_feedback(),
            t_abort: default_t_abort(),
            max_attempts: None,
            tutorial: false,
            seed: None,
        }
    }
}

impl TaskConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ntrials == 0 {
            return Err(ConfigError::NoTrials);
        }
        if !(self.ptrans > 0.5 && self.ptrans <= 1.0) {
            return Err(ConfigError::TransitionProbability(self.ptrans));
        }
        let (low, high) = (self.preward_low, self.preward_high);
        if !(0.0 <= low && low < high && high <= 1.0) {
            return Err(ConfigError::RewardBounds { low, high });
        }

        for (name, value) in [
            ("preward_sd", self.preward_sd),
            ("tlimitchoice", self.tlimitchoice),
            ("ititime", self.ititime),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }
        for (name, value) in [
            ("t_transition", self.t_transition),
            ("t_selected", self.t_selected),
            ("t_feedback", self.t_feedback),
            ("t_abort", self.t_abort),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Negative { name, value });
            }
        }
        for (name, value) in self.waits() {
            if value > MAX_WAIT_SECS {
                return Err(ConfigError::TooLong {
                    name,
                    value,
                    max: MAX_WAIT_SECS,
                });
            }
        }

        if let Some(max_attempts) = self.max_attempts {
            if max_attempts < self.ntrials {
                return Err(ConfigError::AttemptCap {
                    ntrials: self.ntrials,
                    max_attempts,
                });
            }
        }
        Ok(())
    }

    fn waits(&self) -> [(&'static str, f64); 6] {
        [
            ("tlimitchoice", self.tlimitchoice),
            ("ititime", self.ititime),
            ("t_transition", self.t_transition),
            ("t_selected", self.t_selected),
            ("t_feedback", self.t_feedback),
            ("t_abort", self.t_abort),
        ]
    }

    /// Seed for the session's random stream, if it should be reproducible.
    pub fn effective_seed(&self) -> Option<u64> {
        self.seed
            .or_else(|| self.tutorial.then_some(TUTORIAL_SEED))
    }

    pub fn choice_deadline(&self) -> Duration {
        wait_duration(self.tlimitchoice)
    }

    pub fn transition_delay(&self) -> Duration {
        wait_duration(self.t_transition)
    }

    pub fn selected_delay(&self) -> Duration {
        wait_duration(self.t_selected)
    }

    pub fn feedback_delay(&self) -> Duration {
        wait_duration(self.t_feedback)
    }

    pub fn abort_delay(&self) -> Duration {
        wait_duration(self.t_abort)
    }
}
