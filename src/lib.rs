pub mod capture;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod matcher;
pub mod state_extractor;
pub mod templates;
pub mod types;

#[cfg(test)]
mod test_util;

pub use capture::{KeyInput, RecordingKeys, ReplayCapture, ScreenCapture};
pub use env::{
    Action, CorrectiveTable, EpisodePhase, EpisodicEnv, Key, LaneRunnerEnv, ResetInfo, StepInfo,
    StepResult, TerminationReason,
};
pub use error::PerceptionError;
pub use eval::{run_eval, EvalStats, LaneDodgePolicy, Policy};
pub use state_extractor::{classify_lane, StateExtractor};
pub use templates::{ControlMarker, ObstacleCatalog, Template, TemplateClass, TemplateStore};
pub use types::{ClassId, ColorMode, Config, Detection, Frame, Observation, Region};
