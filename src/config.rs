use crate::env::Action;
use crate::error::PerceptionError;
use crate::types::{
    CaptureConfig, Config, ControlConfig, CorrectiveRule, DetectionConfig, EvalConfig,
    LoggingConfig, ObstacleClassConfig, ObstacleConfig, Region, ResetConfig, RewardConfig,
    TimingConfig,
};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {path}"))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {path}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PerceptionError> {
        let invalid = |msg: String| Err(PerceptionError::InvalidConfig(msg));
        let d = &self.detection;

        for (name, t) in [
            ("match_threshold", d.match_threshold),
            ("critical_threshold", d.critical_threshold),
        ] {
            if !(t > 0.0 && t <= 1.0) {
                return invalid(format!("{name} must be in (0, 1], got {t}"));
            }
        }
        if !(0.0 <= d.danger_zone_y_start
            && d.danger_zone_y_start < d.danger_zone_y_end
            && d.danger_zone_y_end <= 1.0)
        {
            return invalid(format!(
                "danger zone [{}, {}] must satisfy 0 <= start < end <= 1",
                d.danger_zone_y_start, d.danger_zone_y_end
            ));
        }

        let control = [&self.control.game_over, &self.control.start_screen];
        if control[0] == control[1] {
            return invalid("game_over and start_screen templates share a name".to_string());
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for class in &self.obstacles.classes {
            if class.id == self.obstacles.clear_id {
                return invalid(format!(
                    "class '{}' reuses the clear id {}",
                    class.name, class.id
                ));
            }
            if control.contains(&&class.name) {
                return invalid(format!("class '{}' collides with a control name", class.name));
            }
            if !names.insert(class.name.as_str()) {
                return invalid(format!("duplicate class name '{}'", class.name));
            }
            if !ids.insert(class.id) {
                return invalid(format!("duplicate class id {}", class.id));
            }
        }

        for rule in &self.corrective {
            if !names.contains(rule.obstacle.as_str()) {
                return invalid(format!(
                    "corrective rule names unknown class '{}'",
                    rule.obstacle
                ));
            }
        }

        if self.eval.episodes == 0 || self.eval.max_steps == 0 {
            return invalid(format!(
                "eval.episodes and eval.max_steps must be at least 1, got {} and {}",
                self.eval.episodes, self.eval.max_steps
            ));
        }
        if self.reset.max_attempts == 0 {
            return invalid("reset.max_attempts must be at least 1".to_string());
        }
        if self.capture.region.is_empty() {
            return invalid("capture region is empty".to_string());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            detection: DetectionConfig::default(),
            obstacles: ObstacleConfig::default(),
            control: ControlConfig::default(),
            corrective: vec![
                CorrectiveRule {
                    obstacle: "barrier_low".to_string(),
                    action: Action::Up,
                },
                CorrectiveRule {
                    obstacle: "barrier_high".to_string(),
                    action: Action::Down,
                },
            ],
            rewards: RewardConfig::default(),
            timing: TimingConfig::default(),
            reset: ResetConfig::default(),
            eval: EvalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            region: Region::new(296, 173, 1045, 587),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            template_dir: "assets".to_string(),
            match_threshold: 0.75,
            critical_threshold: 0.80,
            danger_zone_y_start: 0.40,
            danger_zone_y_end: 0.95,
        }
    }
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        let class = |name: &str, id: u8, lethal: bool, collectible: bool| ObstacleClassConfig {
            name: name.to_string(),
            id,
            lethal,
            collectible,
        };

        Self {
            clear_id: 0,
            classes: vec![
                class("barrier_low", 1, true, false),
                class("barrier_high", 2, true, false),
                class("train", 3, true, false),
                class("coin", 4, false, true),
            ],
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            game_over: "game_over".to_string(),
            start_screen: "start_game".to_string(),
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            survive: 0.1,
            coin: 0.5,
            crash: -10.0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            focus_delay_ms: 5000,
            restart_settle_ms: 2000,
            retry_pause_ms: 1000,
            action_settle_ms: 100,
        }
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            episodes: 10,
            max_steps: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let yaml = r#"
detection:
  template_dir: sprites
  match_threshold: 0.7
  critical_threshold: 0.9
  danger_zone_y_start: 0.3
  danger_zone_y_end: 0.9
corrective:
  - obstacle: train
    action: left
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.template_dir, "sprites");
        assert_eq!(config.corrective.len(), 1);
        assert_eq!(config.corrective[0].action, Action::Left);
        assert_eq!(config.reset.max_attempts, 5);
        assert_eq!(config.obstacles.classes.len(), 4);
    }

    #[test]
    fn test_partial_section_keeps_other_fields() {
        let yaml = r#"
timing:
  action_settle_ms: 50
detection:
  match_threshold: 0.6
capture:
  region: { left: 0, top: 0, width: 640, height: 360 }
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.action_settle_ms, 50);
        assert_eq!(config.timing.focus_delay_ms, 5000);
        assert_eq!(config.timing.restart_settle_ms, 2000);
        assert_eq!(config.detection.match_threshold, 0.6);
        assert_eq!(config.detection.critical_threshold, 0.80);
        assert_eq!(config.detection.template_dir, "assets");
        assert_eq!(config.capture.region.width, 640);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let shipped = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.yaml")).unwrap();
        let defaults = Config::default();
        assert_eq!(shipped.capture.region, defaults.capture.region);
        assert_eq!(shipped.detection.match_threshold, 0.75);
        assert_eq!(shipped.obstacles.classes.len(), 4);
        assert!(shipped.obstacles.classes[3].collectible);
        assert_eq!(shipped.corrective[1].action, Action::Down);
        assert_eq!(shipped.timing.focus_delay_ms, 5000);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::load("/nonexistent/lane_runner.yaml").is_err());
    }

    #[test]
    fn test_rejects_class_using_clear_id() {
        let mut config = Config::default();
        config.obstacles.classes[0].id = 0;
        assert!(matches!(
            config.validate(),
            Err(PerceptionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_danger_zone() {
        let mut config = Config::default();
        config.detection.danger_zone_y_start = 0.9;
        config.detection.danger_zone_y_end = 0.4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_eval_episodes() {
        let mut config = Config::default();
        config.eval.episodes = 0;
        assert!(matches!(
            config.validate(),
            Err(PerceptionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_corrective_class() {
        let mut config = Config::default();
        config.corrective.push(CorrectiveRule {
            obstacle: "hoverboard".to_string(),
            action: Action::Up,
        });
        assert!(config.validate().is_err());
    }
}
