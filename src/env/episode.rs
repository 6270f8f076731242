// src/env/episode.rs
//
// Episode state machine.
//
//   Uninitialized ──reset──▶ Running ──step (terminal)──▶ Terminated
//                               ▲                            │
//                               └───────────reset────────────┘
//
// Failure policy:
//   - reset fails OPEN: if the restart can't be confirmed within the retry
//     bound we log a warning and start the episode anyway.
//   - step fails CLOSED: a missing frame ends the episode with the crash
//     penalty.
// Neither path returns an error to the caller.

use super::{
    Action, CorrectiveTable, EpisodicEnv, ResetInfo, StepInfo, StepResult, TerminationReason,
};
use crate::capture::{KeyInput, ScreenCapture};
use crate::matcher;
use crate::state_extractor::StateExtractor;
use crate::templates::{ControlMarker, ObstacleCatalog, TemplateStore};
use crate::types::{ColorMode, Config, Frame, Observation, MIDDLE_LANE, NUM_LANES};
use anyhow::{Context, Result};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    Uninitialized,
    Running,
    Terminated,
}

#[derive(Debug, Clone)]
struct EpisodeState {
    lane: usize,
    episode: u64,
    steps: u64,
    last_frame: Option<Frame>,
}

impl Default for EpisodeState {
    fn default() -> Self {
        Self {
            lane: MIDDLE_LANE,
            episode: 0,
            steps: 0,
            last_frame: None,
        }
    }
}

pub struct LaneRunnerEnv<C, K> {
    config: Config,
    templates: TemplateStore,
    catalog: ObstacleCatalog,
    corrective: CorrectiveTable,
    extractor: StateExtractor,
    capture: C,
    input: K,
    state: EpisodeState,
    phase: EpisodePhase,
    last_observation: Option<Observation>,
}

impl<C: ScreenCapture, K: KeyInput> LaneRunnerEnv<C, K> {
    /// Load templates from `config.detection.template_dir` and build the env.
    pub fn from_config(config: Config, capture: C, input: K) -> Result<Self> {
        config.validate()?;
        let catalog = ObstacleCatalog::from_config(&config);
        let templates = TemplateStore::load(&config.detection.template_dir, &catalog)
            .context("Failed to load templates")?;
        Self::new(config, templates, capture, input)
    }

    pub fn new(config: Config, templates: TemplateStore, capture: C, input: K) -> Result<Self> {
        config.validate()?;
        let catalog = ObstacleCatalog::from_config(&config);
        let corrective = CorrectiveTable::from_rules(&config.corrective, &catalog);
        let extractor = StateExtractor::new(&config);

        info!(
            "✓ Environment ready: {} templates, match threshold {:.2}, critical {:.2}",
            templates.len(),
            config.detection.match_threshold,
            config.detection.critical_threshold
        );

        Ok(Self {
            config,
            templates,
            catalog,
            corrective,
            extractor,
            capture,
            input,
            state: EpisodeState::default(),
            phase: EpisodePhase::Uninitialized,
            last_observation: None,
        })
    }

    pub fn reset(&mut self) -> (Observation, ResetInfo) {
        info!(
            "----- Resetting environment (episode {}) -----",
            self.state.episode + 1
        );
        sleep_ms(self.config.timing.focus_delay_ms);

        let max_attempts = self.config.reset.max_attempts;
        let mut attempts = 0;
        let mut start_confirmed = false;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            info!("Attempting restart ({}/{})", attempt, max_attempts);
            self.input.press_start();
            sleep_ms(self.config.timing.restart_settle_ms);

            if !self.refresh_frame() {
                continue;
            }

            let game_over = self.control_visible(ControlMarker::GameOver);
            let start_screen = self.control_visible(ControlMarker::StartScreen);
            if !game_over && !start_screen {
                start_confirmed = true;
                break;
            }

            debug!(
                "Still on a control screen (game_over={}, start_screen={})",
                game_over, start_screen
            );
            sleep_ms(self.config.timing.retry_pause_ms);
        }

        let warning = if start_confirmed {
            None
        } else {
            let msg = format!(
                "could not confirm game start after {} attempts",
                max_attempts
            );
            warn!("⚠️  {}, continuing anyway", msg);
            Some(msg)
        };

        self.state.lane = MIDDLE_LANE;
        self.state.episode += 1;
        self.state.steps = 0;
        self.phase = EpisodePhase::Running;

        let observation = self.observe().unwrap_or_else(|| self.extractor.all_clear());
        self.last_observation = Some(observation);

        (
            observation,
            ResetInfo {
                episode: self.state.episode,
                lane: self.state.lane,
                attempts,
                start_confirmed,
                warning,
            },
        )
    }

    pub fn step(&mut self, action: Action) -> StepResult {
        match self.phase {
            EpisodePhase::Uninitialized => warn!("step() called before reset()"),
            EpisodePhase::Terminated => warn!("step() called on a terminated episode"),
            EpisodePhase::Running => {}
        }

        if let Some(key) = action.key() {
            self.input.press(key);
        }
        if action.is_lateral() {
            let lane = self.state.lane as i32 + action.lane_delta();
            self.state.lane = lane.clamp(0, NUM_LANES as i32 - 1) as usize;
        }
        self.state.steps += 1;

        sleep_ms(self.config.timing.action_settle_ms);

        let rewards = self.config.rewards.clone();
        let lane = self.state.lane;

        let Some(observation) = self.observe() else {
            warn!(
                "Capture failed after {:?} (episode {}, step {}), ending episode",
                action, self.state.episode, self.state.steps
            );
            let observation = self.extractor.all_clear();
            return self.finish(
                observation,
                rewards.crash,
                action,
                Some(TerminationReason::CaptureFailed),
            );
        };

        let lane_class = observation[lane];
        let reason = if self.control_visible(ControlMarker::GameOver) {
            Some(TerminationReason::GameOver)
        } else if self.catalog.is_lethal(lane_class)
            && !self.corrective.corrects(lane_class, action)
        {
            Some(TerminationReason::LethalObstacle)
        } else {
            None
        };

        let reward = if reason.is_some() {
            rewards.crash
        } else if self.catalog.is_collectible(lane_class) {
            rewards.survive + rewards.coin
        } else {
            rewards.survive
        };

        self.finish(observation, reward, action, reason)
    }

    fn finish(
        &mut self,
        observation: Observation,
        reward: f32,
        action: Action,
        reason: Option<TerminationReason>,
    ) -> StepResult {
        let terminated = reason.is_some();
        if let Some(reason) = reason {
            info!(
                "💥 Episode {} terminated after {} steps: {:?} (lane {})",
                self.state.episode, self.state.steps, reason, self.state.lane
            );
            self.phase = EpisodePhase::Terminated;
        }

        debug!(
            "step {}: {:?} → lane {} obs {:?} reward {:.2}",
            self.state.steps, action, self.state.lane, observation, reward
        );
        self.last_observation = Some(observation);

        StepResult {
            observation,
            reward,
            terminated,
            truncated: false,
            info: StepInfo {
                episode: self.state.episode,
                step: self.state.steps,
                lane: self.state.lane,
                action,
                lane_class: observation[self.state.lane],
                reason,
            },
        }
    }

    /// Capture a fresh grayscale frame into `last_frame`.
    fn refresh_frame(&mut self) -> bool {
        match self
            .capture
            .capture(&self.config.capture.region, ColorMode::Gray)
        {
            Ok(frame) => {
                self.state.last_frame = Some(frame);
                true
            }
            Err(e) => {
                warn!("{}", e);
                self.state.last_frame = None;
                false
            }
        }
    }

    fn observe(&mut self) -> Option<Observation> {
        self.refresh_frame();
        self.extractor.extract(
            self.state.last_frame.as_ref(),
            self.templates.obstacle_templates(),
        )
    }

    fn control_visible(&self, marker: ControlMarker) -> bool {
        let (Some(frame), Some(template)) =
            (self.state.last_frame.as_ref(), self.templates.control(marker))
        else {
            return false;
        };
        matcher::is_visible(
            frame,
            &template.image,
            self.config.detection.critical_threshold,
        )
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn current_lane(&self) -> usize {
        self.state.lane
    }

    pub fn episode(&self) -> u64 {
        self.state.episode
    }

    pub fn steps(&self) -> u64 {
        self.state.steps
    }

    pub fn last_observation(&self) -> Option<&Observation> {
        self.last_observation.as_ref()
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.state.last_frame.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn catalog(&self) -> &ObstacleCatalog {
        &self.catalog
    }

    pub fn corrective(&self) -> &CorrectiveTable {
        &self.corrective
    }

    pub fn input(&self) -> &K {
        &self.input
    }
}

impl<C: ScreenCapture, K: KeyInput> EpisodicEnv for LaneRunnerEnv<C, K> {
    fn reset(&mut self) -> (Observation, ResetInfo) {
        LaneRunnerEnv::reset(self)
    }

    fn step(&mut self, action: Action) -> StepResult {
        LaneRunnerEnv::step(self, action)
    }
}

fn sleep_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
