use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::config::TaskConfig;

/// Reward probability of each second-stage option, indexed `[state][option]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardPath {
    cells: [[f64; 2]; 2],
}

impl RewardPath {
    pub fn new(cells: [[f64; 2]; 2]) -> Self {
        Self { cells }
    }

    /// Builds a path from the flat order `(0,0), (0,1), (1,0), (1,1)`.
    pub fn from_flat(p: [f64; 4]) -> Self {
        Self {
            cells: [[p[0], p[1]], [p[2], p[3]]],
        }
    }

    #[inline]
    pub fn probability(&self, state: usize, option: usize) -> f64 {
        self.cells[state][option]
    }

    pub fn flat(&self) -> [f64; 4] {
        [
            self.cells[0][0],
            self.cells[0][1],
            self.cells[1][0],
            self.cells[1][1],
        ]
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells.iter().flat_map(|s| s.iter().copied())
    }
}

/// Bounded Gaussian random walk driving the four reward probabilities.
///
/// Steps are clamped to `[low, high]`, not reflected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardPathModel {
    low: f64,
    high: f64,
    sd: f64,
}

impl RewardPathModel {
    pub fn new(low: f64, high: f64, sd: f64) -> Self {
        Self { low, high, sd }
    }

    pub fn from_config(cfg: &TaskConfig) -> Self {
        Self::new(cfg.preward_low, cfg.preward_high, cfg.preward_sd)
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    pub fn sd(&self) -> f64 {
        self.sd
    }

    /// Four i.i.d. uniform draws within the bounds.
    pub fn initial<R: Rng>(&self, rng: &mut R) -> RewardPath {
        let mut draw = || rng.gen_range(self.low..=self.high);
        RewardPath::from_flat([draw(), draw(), draw(), draw()])
    }

    pub fn step<R: Rng>(&self, current: &RewardPath, rng: &mut R) -> RewardPath {
        let mut noise = [0.0f64; 4];
        for z in noise.iter_mut() {
            *z = StandardNormal.sample(rng);
        }
        self.step_with_noise(current, noise)
    }

    /// One walk step given standard-normal draws in flat order.
    pub fn step_with_noise(&self, current: &RewardPath, noise: [f64; 4]) -> RewardPath {
        let cur = current.flat();
        let mut next = [0.0f64; 4];
        for i in 0..4 {
            let moved = cur[i] + self.sd * noise[i];
            // NaN would poison the path for the rest of the session.
            next[i] = if moved.is_nan() {
                cur[i]
            } else {
                moved.clamp(self.low, self.high)
            };
        }
        RewardPath::from_flat(next)
    }

    pub fn contains(&self, path: &RewardPath) -> bool {
        path.iter().all(|p| p >= self.low && p <= self.high)
    }
}
