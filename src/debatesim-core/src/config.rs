//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::DebateError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub debate: DebateParams,
    #[serde(default)]
    pub poi: PoiParams,
    #[serde(default)]
    pub judging: JudgingParams,
    /// RNG seed for the POI acceptance gate. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// One model endpoint with its sampling settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelSpec {
    fn new(name: &str, temperature: f32, max_tokens: u32) -> Self {
        Self {
            name: name.to_string(),
            temperature,
            max_tokens,
        }
    }
}

/// Which model handles which kind of call.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Speech generation. Needs room for a full-length speech.
    pub speaker: ModelSpec,
    /// Structured extraction (definitions, speech metadata, claims, rebuttals).
    pub analysis: ModelSpec,
    /// Rubric scoring.
    pub judge: ModelSpec,
    /// Engagement-verdict judges. High temperature so the panel
    /// produces genuinely independent opinions.
    pub engagement: ModelSpec,
    /// POI offers and responses. Short, fast calls.
    pub poi: ModelSpec,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            speaker: ModelSpec::new("gpt-4o", 0.9, 8192),
            analysis: ModelSpec::new("gpt-4o", 0.3, 4096),
            judge: ModelSpec::new("gpt-4o", 0.3, 4096),
            engagement: ModelSpec::new("gpt-4o", 0.8, 4096),
            poi: ModelSpec::new("gpt-4o-mini", 0.7, 1024),
        }
    }
}

/// Parameters of the debate phase.
#[derive(Debug, Clone, Deserialize)]
pub struct DebateParams {
    /// Target speech length in words (~7 minutes at speaking pace).
    pub speech_word_target: u32,
    /// Attempts per speech before the run fails fatally.
    pub max_speech_attempts: u32,
}

impl Default for DebateParams {
    fn default() -> Self {
        Self {
            speech_word_target: 1_350,
            max_speech_attempts: 3,
        }
    }
}

/// POI acceptance-gate parameters.
///
/// The acceptance probability starts at `base_rate` and only ever goes
/// down: each already-accepted POI in the current speech subtracts
/// `per_accepted_penalty`, and each speaking position after the first
/// subtracts `per_position_penalty` (later speakers guard their time).
/// The result is clamped to `[floor, base_rate]`.
#[derive(Debug, Clone, Deserialize)]
pub struct PoiParams {
    pub base_rate: f64,
    pub per_accepted_penalty: f64,
    pub per_position_penalty: f64,
    pub floor: f64,
    /// Cap on recorded POIs per speech.
    pub max_per_speech: usize,
}

impl Default for PoiParams {
    fn default() -> Self {
        Self {
            base_rate: 0.45,
            per_accepted_penalty: 0.15,
            per_position_penalty: 0.04,
            floor: 0.05,
            max_per_speech: 2,
        }
    }
}

/// Verdict-engine parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct JudgingParams {
    /// Judges per anonymization pass. Must be odd.
    pub judges_per_pass: usize,
    /// Minimum spread between best and worst rubric totals before
    /// recalibration kicks in.
    pub rubric_min_spread: f64,
}

impl Default for JudgingParams {
    fn default() -> Self {
        Self {
            judges_per_pass: 3,
            rubric_min_spread: 2.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models: ModelsConfig::default(),
            debate: DebateParams::default(),
            poi: PoiParams::default(),
            judging: JudgingParams::default(),
            seed: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::Config(format!("Failed to read config: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Load configuration from string content.
    pub fn from_toml(content: &str) -> Result<Self, DebateError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| DebateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DebateError> {
        if self.judging.judges_per_pass % 2 == 0 {
            return Err(DebateError::Config(format!(
                "judges_per_pass must be odd, got {}",
                self.judging.judges_per_pass
            )));
        }
        if !(0.0..=1.0).contains(&self.poi.base_rate) {
            return Err(DebateError::Config(format!(
                "poi.base_rate must be in [0, 1], got {}",
                self.poi.base_rate
            )));
        }
        if self.poi.floor > self.poi.base_rate {
            return Err(DebateError::Config(
                "poi.floor must not exceed poi.base_rate".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.judging.judges_per_pass, 3);
        assert_eq!(config.poi.max_per_speech, 2);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = Config::from_toml(
            r#"
            seed = 7

            [poi]
            base_rate = 0.3
            per_accepted_penalty = 0.1
            per_position_penalty = 0.05
            floor = 0.05
            max_per_speech = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.poi.max_per_speech, 1);
        assert_eq!(config.debate.speech_word_target, 1_350);
    }

    #[test]
    fn test_even_panel_rejected() {
        let result = Config::from_toml(
            r#"
            [judging]
            judges_per_pass = 4
            rubric_min_spread = 2.0
            "#,
        );
        assert!(matches!(result, Err(DebateError::Config(_))));
    }

    #[test]
    fn test_floor_above_base_rejected() {
        let result = Config::from_toml(
            r#"
            [poi]
            base_rate = 0.2
            per_accepted_penalty = 0.1
            per_position_penalty = 0.05
            floor = 0.5
            max_per_speech = 2
            "#,
        );
        assert!(matches!(result, Err(DebateError::Config(_))));
    }
}
