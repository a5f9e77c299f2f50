use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::config::{wait_duration, TaskConfig};
use crate::error::ConfigError;
use crate::reward_path::{RewardPath, RewardPathModel};
use crate::stats::SessionStats;
use crate::transition::{TransitionKind, TransitionModel};
use crate::trial_log::{TrialLog, TrialRecord};

// ─────────────────────────────────────────────────────────────────────────
// Collaborator boundary: input, display and time are owned by the host.
// ─────────────────────────────────────────────────────────────────────────

/// Screen side of a response. Serialized as the response key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "f")]
    Left,
    #[serde(rename = "j")]
    Right,
}

impl Side {
    pub fn key(self) -> char {
        match self {
            Side::Left => 'f',
            Side::Right => 'j',
        }
    }

    pub fn from_key(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'f' => Some(Side::Left),
            'j' => Some(Side::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    One,
    Two,
}

impl Stage {
    pub fn index(self) -> usize {
        match self {
            Stage::One => 0,
            Stage::Two => 1,
        }
    }
}

/// Which option is drawn on the left; the other goes on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    left: usize,
}

impl Layout {
    pub fn new(left: usize) -> Self {
        Self { left: left & 1 }
    }

    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::new(if rng.gen_bool(0.5) { 0 } else { 1 })
    }

    pub fn option_at(self, side: Side) -> usize {
        match side {
            Side::Left => self.left,
            Side::Right => 1 - self.left,
        }
    }

    pub fn side_of(self, option: usize) -> Side {
        if option == self.left {
            Side::Left
        } else {
            Side::Right
        }
    }
}

/// What the participant is being asked to choose between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChoicePrompt {
    pub stage: Stage,
    /// Second-stage state; `None` at stage one.
    pub state: Option<usize>,
    pub layout: Layout,
    /// Clock timestamp at which the options appeared.
    pub onset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChoiceEvent {
    pub side: Side,
    /// Clock timestamp of the response.
    pub timestamp: f64,
}

/// Source of participant responses.
pub trait ChoiceSource {
    /// Blocks until one of the two sides is chosen or `deadline` elapses.
    fn collect_choice(&mut self, prompt: &ChoicePrompt, deadline: Duration) -> Option<ChoiceEvent>;

    /// Outcome of a completed trial, for sources that learn.
    fn outcome(&mut self, _rewarded: bool) {}

    /// True once the source can no longer produce responses (closed stdin, empty script).
    fn exhausted(&self) -> bool {
        false
    }
}

/// What the display layer is asked to show. Fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Fixation,
    Choice(ChoicePrompt),
    Selected {
        stage: Stage,
        side: Side,
    },
    Transition {
        choice: usize,
        state: usize,
        kind: TransitionKind,
    },
    Outcome {
        state: usize,
        option: usize,
        rewarded: bool,
    },
    TooSlow {
        stage: Stage,
    },
}

pub trait Presenter {
    fn present(&mut self, screen: &Screen);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&mut self, _screen: &Screen) {}
}

/// The host-side collaborators for a block.
pub struct Rig<'a> {
    pub input: &'a mut dyn ChoiceSource,
    pub presenter: &'a mut dyn Presenter,
    pub clock: &'a mut dyn Clock,
}

impl<'a> Rig<'a> {
    pub fn new(
        input: &'a mut dyn ChoiceSource,
        presenter: &'a mut dyn Presenter,
        clock: &'a mut dyn Clock,
    ) -> Self {
        Self {
            input,
            presenter,
            clock,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Trial state machine
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Iti,
    StageOneWait,
    Transition { choice: usize },
    StageTwoWait { state: usize },
    Reward { state: usize, option: usize },
    Aborted(Stage),
    Done,
}

/// Runs two-step trials against injected collaborators.
///
/// Owns the reward path exclusively; only the reward phase of a completed
/// trial advances it. An aborted attempt leaves the path untouched and does
/// not count toward `ntrials`, so the slot is replayed with the same
/// probabilities.
#[derive(Debug)]
pub struct TrialSequencer<R> {
    config: TaskConfig,
    rng: R,
    reward_model: RewardPathModel,
    transitions: TransitionModel,
    iti: Exp<f64>,
    current: RewardPath,
    scripted: VecDeque<TransitionKind>,
    attempt: u32,
    log: TrialLog,
    stats: SessionStats,
}

impl<R: Rng> TrialSequencer<R> {
    pub fn new(config: TaskConfig, mut rng: R) -> Result<Self, ConfigError> {
        config.validate()?;
        let iti = Exp::new(1.0 / config.ititime).map_err(|_| ConfigError::NotPositive {
            name: "ititime",
            value: config.ititime,
        })?;
        let reward_model = RewardPathModel::from_config(&config);
        let current = reward_model.initial(&mut rng);

        Ok(Self {
            transitions: TransitionModel::from_config(&config)?,
            config,
            rng,
            reward_model,
            iti,
            current,
            scripted: VecDeque::new(),
            attempt: 0,
            log: TrialLog::new(),
            stats: SessionStats::new(),
        })
    }

    /// Replaces the initial reward path (scripted tutorials, tests).
    pub fn with_reward_path(mut self, path: RewardPath) -> Result<Self, ConfigError> {
        if !self.reward_model.contains(&path) {
            let (low, high) = self.reward_model.bounds();
            return Err(ConfigError::PathOutOfBounds {
                path: path.flat(),
                low,
                high,
            });
        }
        self.current = path;
        Ok(self)
    }

    /// Queues common/rare outcomes for the next completed first stages, in order.
    /// Once the queue is empty transitions are drawn at `ptrans` again.
    pub fn with_scripted_transitions(
        mut self,
        kinds: impl IntoIterator<Item = TransitionKind>,
    ) -> Self {
        self.scripted.extend(kinds);
        self
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Probabilities the next trial will use.
    pub fn reward_path(&self) -> &RewardPath {
        &self.current
    }

    pub fn log(&self) -> &TrialLog {
        &self.log
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn into_log(self) -> TrialLog {
        self.log
    }

    pub fn is_finished(&self) -> bool {
        if self.stats.completed >= self.config.ntrials {
            return true;
        }
        matches!(self.config.max_attempts, Some(cap) if self.attempt >= cap)
    }

    /// Runs attempts until the block is finished or the input runs dry.
    pub fn run(&mut self, rig: &mut Rig<'_>) -> &TrialLog {
        info!(
            ntrials = self.config.ntrials,
            ptrans = self.config.ptrans,
            "block started"
        );
        while !self.is_finished() {
            if rig.input.exhausted() {
                warn!(
                    attempts = self.attempt,
                    completed = self.stats.completed,
                    "input exhausted; ending block early"
                );
                break;
            }
            self.run_trial(rig);
        }
        info!(
            completed = self.stats.completed,
            aborted = self.stats.total_aborted(),
            reward_rate = self.stats.reward_rate(),
            "block finished"
        );
        &self.log
    }

    /// Runs one attempt to completion or abort and appends its record.
    pub fn run_trial(&mut self, rig: &mut Rig<'_>) -> &TrialRecord {
        let mut rec = TrialRecord::begin(self.attempt, self.current);
        let mut phase = Phase::Iti;

        loop {
            trace!(trial = rec.trial, ?phase, "phase");
            phase = match phase {
                Phase::Iti => {
                    rig.presenter.present(&Screen::Fixation);
                    let wait = self.iti.sample(&mut self.rng);
                    rig.clock.sleep(wait_duration(wait));
                    Phase::StageOneWait
                }
                Phase::StageOneWait => match self.collect(rig, Stage::One, None) {
                    Some((option, side, rt)) => {
                        rec.stage1_choice = Some(option);
                        rec.stage1_key = Some(side);
                        rec.stage1_rt = Some(rt);
                        Phase::Transition { choice: option }
                    }
                    None => Phase::Aborted(Stage::One),
                },
                Phase::Transition { choice } => {
                    let (state, kind) = match self.scripted.pop_front() {
                        Some(kind) => (TransitionModel::resolve(choice, kind), kind),
                        None => self.transitions.sample(choice, &mut self.rng),
                    };
                    rec.stage2_state = Some(state);
                    rec.transition = Some(kind);
                    rig.presenter.present(&Screen::Transition {
                        choice,
                        state,
                        kind,
                    });
                    rig.clock.sleep(self.config.transition_delay());
                    Phase::StageTwoWait { state }
                }
                Phase::StageTwoWait { state } => {
                    match self.collect(rig, Stage::Two, Some(state)) {
                        Some((option, side, rt)) => {
                            rec.stage2_choice = Some(option);
                            rec.stage2_key = Some(side);
                            rec.stage2_rt = Some(rt);
                            Phase::Reward { state, option }
                        }
                        None => Phase::Aborted(Stage::Two),
                    }
                }
                Phase::Reward { state, option } => {
                    // Sampled from the snapshot taken before this trial's walk step.
                    let p = rec.reward_probs.probability(state, option);
                    let rewarded = self.rng.gen_bool(p);
                    rec.reward = Some(rewarded as u8);

                    rig.clock.sleep(self.config.transition_delay());
                    rig.presenter.present(&Screen::Outcome {
                        state,
                        option,
                        rewarded,
                    });
                    rig.input.outcome(rewarded);
                    rig.clock.sleep(self.config.feedback_delay());

                    self.current = self.reward_model.step(&self.current, &mut self.rng);
                    self.stats.record_completed(rewarded);
                    Phase::Done
                }
                Phase::Aborted(stage) => {
                    rec.aborted = true;
                    rig.presenter.present(&Screen::TooSlow { stage });
                    rig.clock.sleep(self.config.abort_delay());
                    self.stats.record_aborted(stage);
                    Phase::Done
                }
                Phase::Done => break,
            };
        }

        debug!(
            trial = rec.trial,
            aborted = rec.aborted,
            a1 = ?rec.stage1_choice,
            s2 = ?rec.stage2_state,
            a2 = ?rec.stage2_choice,
            r = ?rec.reward,
            "trial recorded"
        );

        self.attempt += 1;
        let idx = self.log.len();
        self.log.append(rec);
        &self.log.export()[idx]
    }

    /// Presents a randomized pair and waits for a response within the deadline.
    ///
    /// Returns `(option, side, reaction time)`.
    fn collect(
        &mut self,
        rig: &mut Rig<'_>,
        stage: Stage,
        state: Option<usize>,
    ) -> Option<(usize, Side, f64)> {
        let deadline = self.config.choice_deadline();
        let prompt = ChoicePrompt {
            stage,
            state,
            layout: Layout::random(&mut self.rng),
            onset: rig.clock.now(),
        };
        rig.presenter.present(&Screen::Choice(prompt));

        let limit = deadline.as_secs_f64();
        let Some(event) = rig.input.collect_choice(&prompt, deadline) else {
            rig.clock.observe(prompt.onset + limit);
            return None;
        };
        rig.clock.observe(event.timestamp);

        let rt = event.timestamp - prompt.onset;
        if !(0.0..=limit).contains(&rt) {
            debug!(?stage, rt, "response outside the choice window");
            return None;
        }

        rig.presenter.present(&Screen::Selected {
            stage,
            side: event.side,
        });
        rig.clock.sleep(self.config.selected_delay());
        Some((prompt.layout.option_at(event.side), event.side, rt))
    }
}
