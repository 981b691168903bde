//! The live game state and its session log.
//!
//! `StateStore` is the single owner of a session's `GameState`. Turns work on
//! a staged copy and only `commit` it once the turn has been persisted, so a
//! failed or abandoned turn never leaves the live state half-updated.

use crate::action::ActionRequest;
use crate::dice::DiceState;
use crate::rules::{Contestant, ResolutionResult};
use crate::world::{Character, CombatantId, Encounter, HitPoints, StatusEffect, WorldError, WorldState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("World is inconsistent: {0}")]
    World(#[from] WorldError),

    #[error("Hit points out of bounds for {0}")]
    HitPoints(String),

    #[error("Encounter turn order is inconsistent")]
    Encounter,
}

/// One completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u64,
    pub actor: String,
    /// The player's request; `None` for turns the engine generated.
    pub request: Option<ActionRequest>,
    pub result: ResolutionResult,
    pub narration: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub entries: Vec<TurnRecord>,
}

impl SessionLog {
    pub fn push(&mut self, record: TurnRecord) {
        self.entries.push(record);
    }

    pub fn last(&self) -> Option<&TurnRecord> {
        self.entries.last()
    }

    /// The most recent `count` entries, oldest first.
    pub fn recent(&self, count: usize) -> &[TurnRecord] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything that is saved: character, world, active encounter, log, dice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub character: Character,
    pub world: WorldState,
    pub encounter: Option<Encounter>,
    pub log: SessionLog,
    /// Number of committed turns.
    pub turn: u64,
    pub dice: DiceState,
}

impl GameState {
    pub fn new(character: Character, world: WorldState, dice: DiceState) -> Self {
        Self {
            character,
            world,
            encounter: None,
            log: SessionLog::default(),
            turn: 0,
            dice,
        }
    }

    pub fn in_combat(&self) -> bool {
        self.encounter.is_some()
    }

    /// The name, HP and effects of a combatant. Outside combat only the
    /// player resolves.
    pub fn vitals_mut(
        &mut self,
        id: CombatantId,
    ) -> Option<(String, &mut HitPoints, &mut BTreeSet<StatusEffect>)> {
        if id.is_player() {
            let character = &mut self.character;
            return Some((
                character.name.clone(),
                &mut character.hit_points,
                &mut character.status_effects,
            ));
        }
        let enemy = self.encounter.as_mut()?.enemy_mut(id)?;
        Some((enemy.name.clone(), &mut enemy.hit_points, &mut enemy.status_effects))
    }

    pub fn contestant(&self, id: CombatantId) -> Option<Contestant> {
        if id.is_player() {
            let character = &self.character;
            return Some(Contestant {
                id,
                name: character.name.clone(),
                attributes: character.attributes,
                hit_points: character.hit_points,
                status_effects: character.status_effects.clone(),
            });
        }
        let encounter = self.encounter.as_ref()?;
        let enemy = encounter.enemy(id)?;
        Some(Contestant {
            id,
            name: encounter.name_of(id).to_string(),
            attributes: enemy.attributes,
            hit_points: enemy.hit_points,
            status_effects: enemy.status_effects.clone(),
        })
    }

    /// Check every structural invariant. Run on load.
    pub fn validate(&self) -> Result<(), StateError> {
        self.world.validate()?;
        check_hp(&self.character.name, &self.character.hit_points)?;

        if let Some(encounter) = &self.encounter {
            for (_, enemy) in encounter.enemies() {
                check_hp(&enemy.name, &enemy.hit_points)?;
            }
            let mut seen = BTreeSet::new();
            for id in &encounter.order {
                if encounter.combatant(*id).is_none() || !seen.insert(*id) {
                    return Err(StateError::Encounter);
                }
            }
            if !encounter.is_over() && encounter.cursor > encounter.order.len() {
                return Err(StateError::Encounter);
            }
        }
        Ok(())
    }
}

fn check_hp(name: &str, hp: &HitPoints) -> Result<(), StateError> {
    if hp.current < 0 || hp.current > hp.maximum || hp.maximum < 1 {
        return Err(StateError::HitPoints(name.to_string()));
    }
    Ok(())
}

/// Owner of one session's live state.
#[derive(Debug, Clone)]
pub struct StateStore {
    state: GameState,
}

impl StateStore {
    pub fn new(state: GameState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// A private copy for a turn to mutate.
    pub fn stage(&self) -> GameState {
        self.state.clone()
    }

    /// Replace the live state with a persisted staged copy.
    pub fn commit(&mut self, staged: GameState) {
        self.state = staged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_state;

    #[test]
    fn test_stage_does_not_touch_live_state() {
        let store = StateStore::new(sample_state());
        let mut staged = store.stage();
        staged.character.hit_points.take_damage(5);
        staged.turn += 1;

        assert_ne!(&staged, store.state());
        assert_eq!(store.state().turn, 0);
    }

    #[test]
    fn test_commit_replaces_state() {
        let mut store = StateStore::new(sample_state());
        let mut staged = store.stage();
        staged.turn = 3;
        store.commit(staged);
        assert_eq!(store.state().turn, 3);
    }

    #[test]
    fn test_validate_rejects_bad_hp() {
        let mut state = sample_state();
        assert!(state.validate().is_ok());
        state.character.hit_points.current = state.character.hit_points.maximum + 1;
        assert!(matches!(state.validate(), Err(StateError::HitPoints(_))));
    }

    #[test]
    fn test_player_is_only_contestant_outside_combat() {
        let state = sample_state();
        assert!(state.contestant(CombatantId::PLAYER).is_some());
        assert!(state.contestant(CombatantId(1)).is_none());
    }

    #[test]
    fn test_log_recent() {
        let log = SessionLog::default();
        assert!(log.recent(5).is_empty());
        assert!(log.is_empty());
    }
}
