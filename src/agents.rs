//! Simulated participants.
//!
//! These stand in for a person at the keyboard so a block can be run headless
//! (pilot runs, benchmarks, checking the stay analysis). They see only what a
//! participant would: the prompt, and the outcome of each completed trial.

use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::sequencer::{ChoiceEvent, ChoicePrompt, ChoiceSource, Stage};

/// Log-normal reaction times plus an occasional missed response.
#[derive(Debug, Clone, Copy)]
pub struct ResponseTiming {
    /// Median reaction time in seconds.
    pub median_rt: f64,
    /// Standard deviation of log RT.
    pub spread: f64,
    /// Probability of not responding at all.
    pub lapse: f64,
}

impl Default for ResponseTiming {
    fn default() -> Self {
        Self {
            median_rt: 0.6,
            spread: 0.35,
            lapse: 0.02,
        }
    }
}

impl ResponseTiming {
    fn respond<R: Rng>(
        &self,
        rng: &mut R,
        prompt: &ChoicePrompt,
        deadline: Duration,
        option: usize,
    ) -> Option<ChoiceEvent> {
        if self.lapse > 0.0 && rng.gen_bool(self.lapse.min(1.0)) {
            return None;
        }
        let z: f64 = StandardNormal.sample(rng);
        let rt = self.median_rt * (self.spread * z).exp();
        if rt > deadline.as_secs_f64() {
            return None;
        }
        Some(ChoiceEvent {
            side: prompt.layout.side_of(option),
            timestamp: prompt.onset + rt,
        })
    }
}

/// Picks a side uniformly at random.
#[derive(Debug)]
pub struct RandomAgent<R> {
    rng: R,
    timing: ResponseTiming,
}

impl<R: Rng> RandomAgent<R> {
    pub fn new(rng: R, timing: ResponseTiming) -> Self {
        Self { rng, timing }
    }
}

impl<R: Rng> ChoiceSource for RandomAgent<R> {
    fn collect_choice(&mut self, prompt: &ChoicePrompt, deadline: Duration) -> Option<ChoiceEvent> {
        let option = if self.rng.gen_bool(0.5) { 1 } else { 0 };
        self.timing.respond(&mut self.rng, prompt, deadline, option)
    }
}

/// Parameters of the hybrid model-free / model-based learner.
#[derive(Debug, Clone, Copy)]
pub struct LearnerParams {
    /// Learning rate.
    pub alpha: f64,
    /// Softmax inverse temperature.
    pub beta: f64,
    /// Eligibility trace carrying the stage-2 prediction error back to stage 1.
    pub lambda: f64,
    /// Model-based weight: 0 is purely model-free, 1 purely model-based.
    pub w: f64,
    /// The agent's belief about the common transition probability.
    pub p_common: f64,
}

impl Default for LearnerParams {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 5.0,
            lambda: 1.0,
            w: 0.5,
            p_common: 0.7,
        }
    }
}

/// SARSA(λ) learner mixed with a model-based planner over the transition table.
#[derive(Debug)]
pub struct LearningAgent<R> {
    rng: R,
    params: LearnerParams,
    timing: ResponseTiming,
    q1: [f64; 2],
    q2: [[f64; 2]; 2],
    a1: Option<usize>,
    stage2: Option<(usize, usize)>,
}

impl<R: Rng> LearningAgent<R> {
    pub fn new(rng: R, params: LearnerParams, timing: ResponseTiming) -> Self {
        Self {
            rng,
            params,
            timing,
            q1: [0.0; 2],
            q2: [[0.0; 2]; 2],
            a1: None,
            stage2: None,
        }
    }

    pub fn model_free(rng: R, timing: ResponseTiming) -> Self {
        let params = LearnerParams {
            w: 0.0,
            ..LearnerParams::default()
        };
        Self::new(rng, params, timing)
    }

    pub fn model_based(rng: R, timing: ResponseTiming) -> Self {
        let params = LearnerParams {
            w: 1.0,
            ..LearnerParams::default()
        };
        Self::new(rng, params, timing)
    }

    /// Stage-1 values blended from cached (model-free) and planned (model-based) estimates.
    fn stage_one_values(&self) -> [f64; 2] {
        let best = [
            self.q2[0][0].max(self.q2[0][1]),
            self.q2[1][0].max(self.q2[1][1]),
        ];
        let p = self.params.p_common;
        // Choice 0 commonly reaches state 1, choice 1 commonly reaches state 0.
        let mb = [p * best[1] + (1.0 - p) * best[0], p * best[0] + (1.0 - p) * best[1]];
        let w = self.params.w;
        [
            w * mb[0] + (1.0 - w) * self.q1[0],
            w * mb[1] + (1.0 - w) * self.q1[1],
        ]
    }

    fn softmax_pick(&mut self, q: [f64; 2]) -> usize {
        let p1 = 1.0 / (1.0 + (-self.params.beta * (q[1] - q[0])).exp());
        if self.rng.gen_bool(p1.clamp(0.0, 1.0)) {
            1
        } else {
            0
        }
    }
}

impl<R: Rng> ChoiceSource for LearningAgent<R> {
    fn collect_choice(&mut self, prompt: &ChoicePrompt, deadline: Duration) -> Option<ChoiceEvent> {
        let option = match (prompt.stage, prompt.state) {
            (Stage::One, _) => {
                self.stage2 = None;
                let a1 = self.softmax_pick(self.stage_one_values());
                self.a1 = Some(a1);
                a1
            }
            (Stage::Two, Some(state)) => {
                let a2 = self.softmax_pick(self.q2[state]);
                self.stage2 = Some((state, a2));
                a2
            }
            (Stage::Two, None) => return None,
        };
        self.timing.respond(&mut self.rng, prompt, deadline, option)
    }

    fn outcome(&mut self, rewarded: bool) {
        let (Some(a1), Some((s, a2))) = (self.a1.take(), self.stage2.take()) else {
            return;
        };
        let LearnerParams { alpha, lambda, .. } = self.params;
        let r = if rewarded { 1.0 } else { 0.0 };

        let delta1 = self.q2[s][a2] - self.q1[a1];
        self.q1[a1] += alpha * delta1;
        let delta2 = r - self.q2[s][a2];
        self.q2[s][a2] += alpha * delta2;
        self.q1[a1] += alpha * lambda * delta2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::config::TaskConfig;
    use crate::sequencer::{NullPresenter, Rig, TrialSequencer};
    use crate::transition::TransitionKind;
    use crate::trial_log::TrialLog;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn simulate(agent: &mut dyn ChoiceSource, ntrials: u32, seed: u64) -> TrialLog {
        let cfg = TaskConfig {
            ntrials,
            ..TaskConfig::default()
        };
        let mut seq = TrialSequencer::new(cfg, ChaCha20Rng::seed_from_u64(seed)).unwrap();
        let mut presenter = NullPresenter;
        let mut clock = VirtualClock::new();
        let mut rig = Rig::new(agent, &mut presenter, &mut clock);
        seq.run(&mut rig);
        seq.into_log()
    }

    #[test]
    fn random_agent_completes_block() {
        let mut agent = RandomAgent::new(ChaCha20Rng::seed_from_u64(1), ResponseTiming::default());
        let log = simulate(&mut agent, 100, 1);
        assert_eq!(log.completed().count(), 100);
        for r in log.completed() {
            assert!(r.stage1_rt.unwrap() <= 3.0);
            assert!(r.stage2_rt.unwrap() <= 3.0);
        }
    }

    #[test]
    fn lapses_produce_aborts() {
        let timing = ResponseTiming {
            lapse: 0.5,
            ..ResponseTiming::default()
        };
        let mut agent = RandomAgent::new(ChaCha20Rng::seed_from_u64(2), timing);
        let log = simulate(&mut agent, 50, 2);
        assert_eq!(log.completed().count(), 50);
        assert!(log.export().iter().any(|r| r.aborted));
    }

    #[test]
    fn model_free_agent_repeats_rewarded_choices() {
        let timing = ResponseTiming {
            lapse: 0.0,
            ..ResponseTiming::default()
        };
        let mut agent = LearningAgent::model_free(ChaCha20Rng::seed_from_u64(3), timing);
        let table = simulate(&mut agent, 4000, 3).stay_table();

        let pooled = |rewarded: bool| {
            let c = table.cell(rewarded, TransitionKind::Common);
            let r = table.cell(rewarded, TransitionKind::Rare);
            (c.stays + r.stays) as f64 / (c.total + r.total) as f64
        };
        assert!(pooled(true) > pooled(false) + 0.05);
    }

    #[test]
    fn model_based_agent_shows_transition_interaction() {
        let timing = ResponseTiming {
            lapse: 0.0,
            ..ResponseTiming::default()
        };
        let params = LearnerParams {
            w: 1.0,
            beta: 8.0,
            ..LearnerParams::default()
        };
        let mut agent = LearningAgent::new(ChaCha20Rng::seed_from_u64(4), params, timing);
        let table = simulate(&mut agent, 4000, 4).stay_table();

        let common = table.cell(true, TransitionKind::Common).probability().unwrap();
        let rare = table.cell(true, TransitionKind::Rare).probability().unwrap();
        assert!(common > rare + 0.1, "common {common} rare {rare}");
    }

    #[test]
    fn learner_update_moves_values_toward_reward() {
        let mut agent = LearningAgent::model_free(
            ChaCha20Rng::seed_from_u64(5),
            ResponseTiming::default(),
        );
        agent.a1 = Some(0);
        agent.stage2 = Some((1, 1));
        agent.outcome(true);
        assert!((agent.q2[1][1] - 0.5).abs() < 1e-12);
        assert!((agent.q1[0] - 0.5).abs() < 1e-12);
        assert_eq!(agent.q1[1], 0.0);

        // No pending choices: nothing to learn from.
        agent.outcome(true);
        assert!((agent.q2[1][1] - 0.5).abs() < 1e-12);
    }
}
