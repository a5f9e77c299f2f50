#[path = "core/config.rs"]
pub mod config;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/reward_path.rs"]
pub mod reward_path;

#[path = "core/transition.rs"]
pub mod transition;

#[path = "core/clock.rs"]
pub mod clock;

#[path = "core/stats.rs"]
pub mod stats;

#[path = "core/trial_log.rs"]
pub mod trial_log;

#[path = "core/sequencer.rs"]
pub mod sequencer;

pub mod agents;
pub mod paths;

// Keyboard input needs a tokio runtime for the response deadline.
#[cfg(feature = "terminal")]
pub mod terminal;

pub use config::TaskConfig;
pub use error::{ConfigError, ExportError};
pub use reward_path::{RewardPath, RewardPathModel};
pub use sequencer::{ChoiceEvent, ChoicePrompt, ChoiceSource, Presenter, Rig, Screen, TrialSequencer};
pub use transition::{TransitionKind, TransitionModel};
pub use trial_log::{TrialLog, TrialRecord};
