use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::TaskConfig;
use crate::error::ConfigError;

/// Whether a first-stage choice led to its linked second-stage state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Common,
    Rare,
}

impl TransitionKind {
    pub fn is_common(self) -> bool {
        matches!(self, TransitionKind::Common)
    }

    pub fn index(self) -> usize {
        match self {
            TransitionKind::Common => 0,
            TransitionKind::Rare => 1,
        }
    }
}

/// Second-stage state reached on the common branch, indexed by first-stage choice.
///
/// Choice 0 commonly leads to state 1; choice 1 is the mirror.
const COMMON_STATE: [usize; 2] = [1, 0];

/// Fixed asymmetric first-stage → second-stage transition table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionModel {
    p_common: f64,
}

impl TransitionModel {
    pub fn new(p_common: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&p_common) {
            return Err(ConfigError::Probability {
                name: "p_common",
                value: p_common,
            });
        }
        Ok(Self { p_common })
    }

    pub fn from_config(cfg: &TaskConfig) -> Result<Self, ConfigError> {
        Self::new(cfg.ptrans)
    }

    pub fn p_common(&self) -> f64 {
        self.p_common
    }

    /// Probability of reaching each second-stage state from `choice`. Rows sum to 1.
    pub fn row(&self, choice: usize) -> [f64; 2] {
        let mut row = [1.0 - self.p_common; 2];
        row[COMMON_STATE[choice]] = self.p_common;
        row
    }

    /// Draws common vs rare, then maps to the concrete state.
    pub fn sample<R: Rng>(&self, choice: usize, rng: &mut R) -> (usize, TransitionKind) {
        let kind = if rng.gen_bool(self.p_common) {
            TransitionKind::Common
        } else {
            TransitionKind::Rare
        };
        (Self::resolve(choice, kind), kind)
    }

    pub fn resolve(choice: usize, kind: TransitionKind) -> usize {
        match kind {
            TransitionKind::Common => COMMON_STATE[choice],
            TransitionKind::Rare => 1 - COMMON_STATE[choice],
        }
    }

    pub fn kind_of(choice: usize, state: usize) -> TransitionKind {
        if COMMON_STATE[choice] == state {
            TransitionKind::Common
        } else {
            TransitionKind::Rare
        }
    }
}
