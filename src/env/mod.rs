// src/env/mod.rs
//
// Episode layer: reset/step over the live game view.
//
//   capture → matcher → state_extractor → LaneRunnerEnv → harness
//
// The harness sees exactly `reset()` and `step(action)`.

mod actions;
mod episode;

pub use actions::{Action, CorrectiveTable, Key};
pub use episode::{EpisodePhase, LaneRunnerEnv};

use crate::types::{ClassId, Observation};
use serde::Serialize;

/// Single-agent episodic interaction contract.
pub trait EpisodicEnv {
    fn reset(&mut self) -> (Observation, ResetInfo);
    fn step(&mut self, action: Action) -> StepResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    GameOver,
    LethalObstacle,
    CaptureFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetInfo {
    pub episode: u64,
    pub lane: usize,
    pub attempts: u32,
    /// False when the restart could not be confirmed and we carried on anyway
    pub start_confirmed: bool,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepInfo {
    pub episode: u64,
    pub step: u64,
    pub lane: usize,
    pub action: Action,
    /// Class observed in the agent's lane after the action
    pub lane_class: ClassId,
    pub reason: Option<TerminationReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}
