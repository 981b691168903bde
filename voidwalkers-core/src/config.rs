//! Engine configuration.

use crate::dice::{DiceError, DiceExpression};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },

    #[error("Invalid damage dice: {0}")]
    DamageDice(#[from] DiceError),
}

/// How much of an opponent's health the rules oracle gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosurePolicy {
    /// Exact current and maximum HP.
    Full,
    /// Only a condition band such as "bloodied".
    #[default]
    Banded,
    /// Nothing about HP at all.
    Hidden,
}

impl FromStr for DisclosurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(DisclosurePolicy::Full),
            "banded" => Ok(DisclosurePolicy::Banded),
            "hidden" => Ok(DisclosurePolicy::Hidden),
            _ => Err(()),
        }
    }
}

/// Tunables for adjudication, oracles and narration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Difficulty for fallback attack checks.
    pub attack_difficulty: i32,
    pub flee_difficulty: i32,
    pub custom_difficulty: i32,
    /// Extra damage rolled on a successful fallback attack.
    pub damage_dice: Option<DiceExpression>,
    pub max_damage_per_action: u32,
    pub max_healing_per_action: u32,
    pub disclosure: DisclosurePolicy,
    pub rules_timeout: Duration,
    pub narrative_timeout: Duration,
    /// Narration is cut to this many characters.
    pub narration_cap: usize,
    pub narration_seed_cap: usize,
    /// Fixed seed for reproducible sessions. A random seed is used otherwise.
    pub dice_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attack_difficulty: 12,
            flee_difficulty: 12,
            custom_difficulty: 10,
            damage_dice: None,
            max_damage_per_action: 50,
            max_healing_per_action: 50,
            disclosure: DisclosurePolicy::Banded,
            rules_timeout: Duration::from_secs(10),
            narrative_timeout: Duration::from_secs(15),
            narration_cap: 1200,
            narration_seed_cap: 280,
            dice_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `VOIDWALKERS_*` overrides from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary key source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = read(&lookup, "VOIDWALKERS_ATTACK_DIFFICULTY")? {
            config.attack_difficulty = v;
        }
        if let Some(v) = read(&lookup, "VOIDWALKERS_FLEE_DIFFICULTY")? {
            config.flee_difficulty = v;
        }
        if let Some(v) = read(&lookup, "VOIDWALKERS_CUSTOM_DIFFICULTY")? {
            config.custom_difficulty = v;
        }
        if let Some(notation) = lookup("VOIDWALKERS_DAMAGE_DICE") {
            if !notation.trim().is_empty() {
                config.damage_dice = Some(DiceExpression::parse(&notation)?);
            }
        }
        if let Some(v) = read(&lookup, "VOIDWALKERS_MAX_DAMAGE")? {
            config.max_damage_per_action = v;
        }
        if let Some(v) = read(&lookup, "VOIDWALKERS_MAX_HEALING")? {
            config.max_healing_per_action = v;
        }
        if let Some(v) = read(&lookup, "VOIDWALKERS_DISCLOSURE")? {
            config.disclosure = v;
        }
        if let Some(ms) = read::<u64, _>(&lookup, "VOIDWALKERS_RULES_TIMEOUT_MS")? {
            config.rules_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read::<u64, _>(&lookup, "VOIDWALKERS_NARRATIVE_TIMEOUT_MS")? {
            config.narrative_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = read(&lookup, "VOIDWALKERS_NARRATION_CAP")? {
            config.narration_cap = v;
        }
        if let Some(v) = read(&lookup, "VOIDWALKERS_NARRATION_SEED_CAP")? {
            config.narration_seed_cap = v;
        }
        if let Some(v) = read(&lookup, "VOIDWALKERS_SEED")? {
            config.dice_seed = Some(v);
        }

        Ok(config)
    }

    pub fn with_attack_difficulty(mut self, difficulty: i32) -> Self {
        self.attack_difficulty = difficulty;
        self
    }

    pub fn with_flee_difficulty(mut self, difficulty: i32) -> Self {
        self.flee_difficulty = difficulty;
        self
    }

    pub fn with_custom_difficulty(mut self, difficulty: i32) -> Self {
        self.custom_difficulty = difficulty;
        self
    }

    pub fn with_damage_dice(mut self, dice: DiceExpression) -> Self {
        self.damage_dice = Some(dice);
        self
    }

    pub fn with_max_damage(mut self, max: u32) -> Self {
        self.max_damage_per_action = max;
        self
    }

    pub fn with_max_healing(mut self, max: u32) -> Self {
        self.max_healing_per_action = max;
        self
    }

    pub fn with_disclosure(mut self, policy: DisclosurePolicy) -> Self {
        self.disclosure = policy;
        self
    }

    pub fn with_rules_timeout(mut self, timeout: Duration) -> Self {
        self.rules_timeout = timeout;
        self
    }

    pub fn with_narrative_timeout(mut self, timeout: Duration) -> Self {
        self.narrative_timeout = timeout;
        self
    }

    pub fn with_narration_cap(mut self, cap: usize) -> Self {
        self.narration_cap = cap;
        self
    }

    pub fn with_narration_seed_cap(mut self, cap: usize) -> Self {
        self.narration_seed_cap = cap;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.dice_seed = Some(seed);
        self
    }
}

fn read<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
    }
}
