// src/env/actions.rs

use crate::templates::ObstacleCatalog;
use crate::types::{ClassId, CorrectiveRule};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Discrete action space. Indices match the policy's output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Action {
    Left = 0,
    Right = 1,
    /// Jump
    Up = 2,
    /// Roll
    Down = 3,
    Noop = 4,
}

impl Action {
    pub const COUNT: usize = 5;
    pub const ALL: [Action; Self::COUNT] = [
        Action::Left,
        Action::Right,
        Action::Up,
        Action::Down,
        Action::Noop,
    ];

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn key(self) -> Option<Key> {
        match self {
            Action::Left => Some(Key::Left),
            Action::Right => Some(Key::Right),
            Action::Up => Some(Key::Up),
            Action::Down => Some(Key::Down),
            Action::Noop => None,
        }
    }

    pub fn lane_delta(self) -> i32 {
        match self {
            Action::Left => -1,
            Action::Right => 1,
            _ => 0,
        }
    }

    pub fn is_lateral(self) -> bool {
        self.lane_delta() != 0
    }
}

/// Abstract key understood by the input collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    /// Start / restart
    Space,
}

/// Which actions get the player past a lethal obstacle class.
#[derive(Debug, Clone, Default)]
pub struct CorrectiveTable {
    rules: HashMap<ClassId, Vec<Action>>,
}

impl CorrectiveTable {
    /// Rules naming classes the catalog doesn't know are dropped; config
    /// validation rejects those up front.
    pub fn from_rules(rules: &[CorrectiveRule], catalog: &ObstacleCatalog) -> Self {
        let mut table = Self::default();
        for rule in rules {
            if let Some(class) = catalog.class_id(&rule.obstacle) {
                table.insert(class, rule.action);
            }
        }
        table
    }

    pub fn insert(&mut self, class: ClassId, action: Action) {
        let actions = self.rules.entry(class).or_default();
        if !actions.contains(&action) {
            actions.push(action);
        }
    }

    pub fn corrects(&self, class: ClassId, action: Action) -> bool {
        self.rules
            .get(&class)
            .map(|actions| actions.contains(&action))
            .unwrap_or(false)
    }

    pub fn actions_for(&self, class: ClassId) -> &[Action] {
        self.rules.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }
}
