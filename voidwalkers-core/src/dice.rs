//! Seedable, replayable dice.
//!
//! Every face consumes exactly one 64-bit draw from a ChaCha8 stream, so a
//! source is fully described by `(seed, draws)`. Restoring seeks straight to
//! the stream position instead of replaying earlier draws.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on dice rolled by a single request.
pub const MAX_DICE_PER_ROLL: u32 = 100;

/// Largest die accepted in notation and rolls.
pub const MAX_DIE_SIDES: u32 = 1000;

/// ChaCha counts its stream in 32-bit words.
const WORDS_PER_DRAW: u128 = 2;

/// Error type for dice parsing and rolling.
#[derive(Debug, Error, PartialEq)]
pub enum DiceError {
    #[error("Invalid dice parameters: {count}d{sides}")]
    InvalidParameter { sides: u32, count: u32 },
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("No dice specified")]
    NoDice,
}

/// Persistable position of a seeded source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceState {
    pub seed: u64,
    pub draws: u64,
}

/// Where faces come from.
pub trait DieSource: Send {
    /// Produce one face in `1..=sides`. `sides` is always at least 1.
    fn face(&mut self, sides: u32) -> u32;

    /// Snapshot of the source, if it can be persisted.
    fn state(&self) -> Option<DiceState> {
        None
    }

    /// Rewind or fast-forward to a previously captured state.
    fn restore(&mut self, _state: &DiceState) {}
}

/// A ChaCha8 stream seeded from a `u64`, counting its draws.
pub struct SeededSource {
    seed: u64,
    draws: u64,
    rng: ChaCha8Rng,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            draws: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_state(state: &DiceState) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(state.seed);
        rng.set_word_pos(u128::from(state.draws) * WORDS_PER_DRAW);
        Self {
            seed: state.seed,
            draws: state.draws,
            rng,
        }
    }
}

impl DieSource for SeededSource {
    fn face(&mut self, sides: u32) -> u32 {
        self.draws += 1;
        (self.rng.next_u64() % u64::from(sides)) as u32 + 1
    }

    fn state(&self) -> Option<DiceState> {
        Some(DiceState {
            seed: self.seed,
            draws: self.draws,
        })
    }

    fn restore(&mut self, state: &DiceState) {
        *self = SeededSource::from_state(state);
    }
}

/// The dice roller handed to adjudicators.
pub struct Dice {
    source: Box<dyn DieSource>,
}

impl Dice {
    pub fn new(source: Box<dyn DieSource>) -> Self {
        Self { source }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Box::new(SeededSource::new(seed)))
    }

    /// Seeded from the thread RNG; the seed is still recorded in `state()`.
    pub fn random() -> Self {
        Self::seeded(rand::thread_rng().gen())
    }

    pub fn from_state(state: &DiceState) -> Self {
        Self::new(Box::new(SeededSource::from_state(state)))
    }

    pub fn state(&self) -> Option<DiceState> {
        self.source.state()
    }

    pub fn restore(&mut self, state: &DiceState) {
        self.source.restore(state);
    }

    /// Roll `count` dice with `sides` faces and add `modifier`.
    pub fn roll(&mut self, sides: u32, count: u32, modifier: i32) -> Result<RollResult, DiceError> {
        if !(1..=MAX_DIE_SIDES).contains(&sides) || !(1..=MAX_DICE_PER_ROLL).contains(&count) {
            return Err(DiceError::InvalidParameter { sides, count });
        }
        let rolls: Vec<u32> = (0..count).map(|_| self.source.face(sides)).collect();
        let total = rolls.iter().map(|&r| r as i32).sum::<i32>().saturating_add(modifier);
        Ok(RollResult {
            sides,
            rolls,
            modifier,
            total,
        })
    }

    /// A single d20 plus modifier.
    pub fn d20(&mut self, modifier: i32) -> RollResult {
        let face = self.source.face(20);
        RollResult {
            sides: 20,
            rolls: vec![face],
            modifier,
            total: (face as i32).saturating_add(modifier),
        }
    }

    /// Roll every component of a parsed expression.
    pub fn roll_expression(&mut self, expr: &DiceExpression) -> RollResult {
        let mut rolls = Vec::new();
        let mut total = expr.modifier;
        for component in &expr.components {
            for _ in 0..component.count {
                let face = self.source.face(component.sides);
                total = total.saturating_add(component.sign * face as i32);
                rolls.push(face);
            }
        }
        RollResult {
            sides: expr.components.first().map(|c| c.sides).unwrap_or(0),
            rolls,
            modifier: expr.modifier,
            total,
        }
    }

    /// Pick an index in `0..len` with one die. `len` of zero yields zero.
    pub fn pick(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (self.source.face(len as u32) - 1) as usize
    }
}

impl fmt::Debug for Dice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dice").field("state", &self.state()).finish()
    }
}

/// `roll ≥ difficulty`.
pub fn check_succeeds(roll: i32, difficulty: i32) -> bool {
    roll >= difficulty
}

/// Outcome of one roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub sides: u32,
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
}

impl RollResult {
    pub fn meets(&self, difficulty: i32) -> bool {
        check_succeeds(self.total, difficulty)
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let faces = self
            .rolls
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match self.modifier {
            0 => write!(f, "[{faces}] = {}", self.total),
            m if m > 0 => write!(f, "[{faces}] + {m} = {}", self.total),
            m => write!(f, "[{faces}] - {} = {}", m.abs(), self.total),
        }
    }
}

// ============================================================================
// Notation
// ============================================================================

/// One `NdS` term of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceComponent {
    pub count: u32,
    pub sides: u32,
    pub sign: i32,
}

/// A parsed expression such as `2d6+1d4-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub components: Vec<DiceComponent>,
    pub modifier: i32,
    pub original: String,
}

impl DiceExpression {
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut components = Vec::new();
        let mut modifier: i32 = 0;
        let mut current = String::new();
        let mut sign: i32 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_term(&current, sign, &mut components, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_term(&current, sign, &mut components, &mut modifier)?;
        }

        if components.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression {
            components,
            modifier,
            original: notation,
        })
    }

    fn parse_term(
        s: &str,
        sign: i32,
        components: &mut Vec<DiceComponent>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(s.to_string());

        if let Some((count_str, sides_str)) = s.split_once('d') {
            let count: u32 = if count_str.is_empty() {
                1
            } else {
                count_str.parse().map_err(|_| invalid())?
            };
            let sides: u32 = sides_str.parse().map_err(|_| invalid())?;
            if !(1..=MAX_DIE_SIDES).contains(&sides) || !(1..=MAX_DICE_PER_ROLL).contains(&count) {
                return Err(DiceError::InvalidParameter { sides, count });
            }
            components.push(DiceComponent { count, sides, sign });
        } else {
            let value: i32 = s.parse().map_err(|_| invalid())?;
            *modifier = modifier.checked_add(sign * value).ok_or_else(invalid)?;
        }
        Ok(())
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}
