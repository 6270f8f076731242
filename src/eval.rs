// src/eval.rs

use crate::env::{Action, CorrectiveTable, EpisodicEnv};
use crate::templates::ObstacleCatalog;
use crate::types::{ClassId, Observation, NUM_LANES};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub trait Policy {
    fn act(&mut self, observation: &Observation, lane: usize) -> Action;
}

/// Rule-based baseline: counter what's in the lane if we know how,
/// otherwise sidestep into a safe neighbour, preferring coins.
pub struct LaneDodgePolicy {
    catalog: ObstacleCatalog,
    corrective: CorrectiveTable,
}

impl LaneDodgePolicy {
    pub fn new(catalog: ObstacleCatalog, corrective: CorrectiveTable) -> Self {
        Self {
            catalog,
            corrective,
        }
    }

    fn neighbours(lane: usize) -> impl Iterator<Item = (usize, Action)> {
        let left = lane.checked_sub(1).map(|l| (l, Action::Left));
        let right = (lane + 1 < NUM_LANES).then_some((lane + 1, Action::Right));
        left.into_iter().chain(right)
    }

    fn best_neighbour(&self, observation: &Observation, lane: usize) -> Option<Action> {
        let safe: Vec<(ClassId, Action)> = Self::neighbours(lane)
            .map(|(l, action)| (observation[l], action))
            .filter(|(class, _)| !self.catalog.is_lethal(*class))
            .collect();

        safe.iter()
            .find(|(class, _)| self.catalog.is_collectible(*class))
            .or_else(|| safe.first())
            .map(|(_, action)| *action)
    }
}

impl Policy for LaneDodgePolicy {
    fn act(&mut self, observation: &Observation, lane: usize) -> Action {
        let here = observation[lane];

        if self.catalog.is_lethal(here) {
            if let Some(&fix) = self.corrective.actions_for(here).first() {
                return fix;
            }
            return self.best_neighbour(observation, lane).unwrap_or(Action::Noop);
        }

        if self.catalog.is_collectible(here) {
            return Action::Noop;
        }

        Self::neighbours(lane)
            .find(|(l, _)| self.catalog.is_collectible(observation[*l]))
            .map(|(_, action)| action)
            .unwrap_or(Action::Noop)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalStats {
    pub episodes: usize,
    pub total_reward: f64,
    pub avg_reward: f64,
    pub best_reward: f64,
    pub avg_steps: f64,
    pub truncated: usize,
    /// Termination reason → count
    pub terminations: BTreeMap<String, usize>,
}

pub fn run_eval<E, P>(env: &mut E, policy: &mut P, episodes: usize, max_steps: u64) -> EvalStats
where
    E: EpisodicEnv,
    P: Policy,
{
    if episodes == 0 {
        warn!("Evaluation asked for 0 episodes, nothing to run");
        return EvalStats::default();
    }

    let eval_episodes = episodes;
    let mut stats = EvalStats {
        best_reward: f64::NEG_INFINITY,
        ..Default::default()
    };
    let mut total_steps = 0u64;

    info!("Starting evaluation for {} episodes", eval_episodes);

    for episode in 0..eval_episodes {
        let (mut observation, reset_info) = env.reset();
        let mut lane = reset_info.lane;
        let mut ep_reward = 0.0f64;
        let mut ep_steps = 0u64;

        loop {
            let action = policy.act(&observation, lane);
            let result = env.step(action);
            ep_reward += result.reward as f64;
            ep_steps += 1;
            observation = result.observation;
            lane = result.info.lane;

            if result.terminated {
                let reason = result
                    .info
                    .reason
                    .map(|r| format!("{:?}", r))
                    .unwrap_or_else(|| "unknown".to_string());
                *stats.terminations.entry(reason).or_insert(0) += 1;
                break;
            }
            if result.truncated || ep_steps >= max_steps {
                stats.truncated += 1;
                break;
            }
        }

        info!(
            "--- Episode {}/{} finished: {} steps, reward {:.2} ---",
            episode + 1,
            eval_episodes,
            ep_steps,
            ep_reward
        );

        stats.total_reward += ep_reward;
        stats.best_reward = stats.best_reward.max(ep_reward);
        total_steps += ep_steps;
    }

    let denom = eval_episodes as f64;
    stats.episodes = eval_episodes;
    stats.avg_reward = stats.total_reward / denom;
    stats.avg_steps = total_steps as f64 / denom;

    info!(
        "Average reward over {} episodes: {:.2}",
        eval_episodes, stats.avg_reward
    );
    stats
}
