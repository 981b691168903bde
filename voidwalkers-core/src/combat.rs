//! Encounter lifecycle: initiative, rounds and termination.
//!
//! `Encounter` itself only tracks whose turn it is. The `CombatController`
//! drives enemy turns through the `TurnEngine` and closes the encounter with
//! a summary result once it ends.

use crate::engine::{TurnEngine, TurnError, TurnOutcome};
use crate::rules::{EncounterSummary, ResolutionResult, StateDelta};
use crate::store::{GameState, StateStore};
use crate::world::{
    Character, CombatLogEntry, CombatPhase, Combatant, CombatantId, CombatantKind, Encounter, EncounterOutcome,
    Enemy, InitiativeRoll, Item,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Initiative order: highest roll first, then highest Dexterity, then
/// input order.
pub fn order_initiative(rolls: &[InitiativeRoll]) -> Vec<CombatantId> {
    let mut sorted: Vec<&InitiativeRoll> = rolls.iter().collect();
    // stable, so equal rolls and dexterity keep input order
    sorted.sort_by(|a, b| b.roll.cmp(&a.roll).then(b.dexterity.cmp(&a.dexterity)));
    sorted.into_iter().map(|r| r.combatant).collect()
}

/// Give enemies that share a name a number each ("Wolf 1", "Wolf 2").
fn distinct_names(enemies: &mut [Enemy]) {
    let mut totals: HashMap<String, usize> = HashMap::new();
    for enemy in enemies.iter() {
        *totals.entry(enemy.name.clone()).or_default() += 1;
    }
    let mut seen: HashMap<String, usize> = HashMap::new();
    for enemy in enemies.iter_mut() {
        if totals[&enemy.name] > 1 {
            let n = seen.entry(enemy.name.clone()).or_default();
            *n += 1;
            enemy.name = format!("{} {}", enemy.name, n);
        }
    }
}

impl Encounter {
    /// Gather combatants and order them by initiative.
    /// Combatants without a roll act last, in input order.
    pub fn begin(player: &Character, mut enemies: Vec<Enemy>, initiative: &[InitiativeRoll]) -> Self {
        distinct_names(&mut enemies);

        let mut combatants = vec![Combatant {
            id: CombatantId::PLAYER,
            name: player.name.clone(),
            kind: CombatantKind::Player,
        }];
        for (i, enemy) in enemies.into_iter().enumerate() {
            let id = CombatantId(i as u32 + 1);
            combatants.push(Combatant {
                id,
                name: enemy.name.clone(),
                kind: CombatantKind::Enemy(enemy),
            });
        }

        let mut encounter = Self {
            id: Uuid::new_v4(),
            combatants,
            initiative: Vec::new(),
            order: Vec::new(),
            cursor: 0,
            round: 0,
            phase: CombatPhase::EncounterStart,
            escaped: false,
            outcome: None,
            log: Vec::new(),
        };

        encounter.phase = CombatPhase::RollInitiative;
        let mut rolls: Vec<InitiativeRoll> = initiative
            .iter()
            .filter(|r| encounter.combatant(r.combatant).is_some())
            .copied()
            .collect();
        for combatant in &encounter.combatants {
            if !rolls.iter().any(|r| r.combatant == combatant.id) {
                tracing::warn!(combatant = %combatant.name, "no initiative roll, acting last");
                rolls.push(InitiativeRoll {
                    combatant: combatant.id,
                    roll: i32::MIN,
                    dexterity: i32::MIN,
                });
            }
        }
        encounter.order = order_initiative(&rolls);
        encounter.initiative = rolls;

        encounter.phase = CombatPhase::RoundActive;
        encounter.round = 1;
        tracing::debug!(
            encounter = %encounter.id,
            order = ?encounter.order,
            "encounter started"
        );
        encounter
    }

    /// Close the current combatant's turn: drop the dead from the order,
    /// check for the end of the fight and wrap into the next round.
    ///
    /// Defeat takes precedence over victory, victory over escape.
    pub fn finish_turn(&mut self, player_dead: bool) {
        if self.phase != CombatPhase::RoundActive {
            return;
        }
        self.cursor += 1;

        let mut index = 0;
        while index < self.order.len() {
            let id = self.order[index];
            let dead = if id.is_player() {
                player_dead
            } else {
                self.enemy(id).map(|e| e.hit_points.is_dead()).unwrap_or(true)
            };
            if dead {
                self.order.remove(index);
                if index < self.cursor {
                    self.cursor -= 1;
                }
            } else {
                index += 1;
            }
        }

        self.phase = CombatPhase::RoundResolution;
        let outcome = if player_dead {
            Some(EncounterOutcome::Defeat)
        } else if self.living_enemies().next().is_none() {
            Some(EncounterOutcome::Victory)
        } else if self.escaped {
            Some(EncounterOutcome::Escape)
        } else {
            None
        };
        if let Some(outcome) = outcome {
            tracing::debug!(encounter = %self.id, %outcome, round = self.round, "encounter over");
            self.outcome = Some(outcome);
            self.phase = CombatPhase::EncounterEnd;
            return;
        }

        if self.cursor >= self.order.len() {
            self.round += 1;
            self.cursor = 0;
        }
        self.phase = CombatPhase::RoundActive;
    }

    /// Record a resolved action.
    pub fn record(&mut self, entry: CombatLogEntry) {
        self.log.push(entry);
    }

    /// Closing report. Loot and experience are only awarded on victory.
    pub fn summary(&self) -> EncounterSummary {
        let outcome = self.outcome.unwrap_or(EncounterOutcome::Escape);
        let defeated: Vec<&Enemy> = self
            .enemies()
            .filter(|(_, e)| e.hit_points.is_dead())
            .map(|(_, e)| e)
            .collect();

        let (loot, experience): (Vec<Item>, u32) = if outcome == EncounterOutcome::Victory {
            (
                self.enemies().flat_map(|(_, e)| e.loot.iter().cloned()).collect(),
                defeated.iter().map(|e| e.experience).sum(),
            )
        } else {
            (Vec::new(), 0)
        };

        EncounterSummary {
            outcome,
            rounds: self.round,
            defeated: defeated.iter().map(|e| e.name.clone()).collect(),
            loot,
            experience,
        }
    }
}

/// The result that closes a finished encounter.
pub fn closing_result(state: &GameState) -> Option<ResolutionResult> {
    let encounter = state.encounter.as_ref().filter(|e| e.is_over())?;
    let summary = encounter.summary();

    let mut result = ResolutionResult::encounter_end(summary.clone(), &state.character.name);
    for item in summary.loot {
        result = result.with_delta(StateDelta::AddItem { item });
    }
    if summary.experience > 0 {
        result = result.with_delta(StateDelta::GainExperience {
            amount: summary.experience,
        });
    }
    Some(
        result
            .with_delta(StateDelta::ClearStatuses)
            .with_delta(StateDelta::EndEncounter),
    )
}

/// Runs everything between two player turns.
pub struct CombatController;

impl CombatController {
    /// Play enemy turns until the player is up again, then close the
    /// encounter if it ended. Returns the turns that were run.
    pub async fn advance(engine: &mut TurnEngine, store: &mut StateStore) -> Result<Vec<TurnOutcome>, TurnError> {
        let mut turns = Vec::new();
        loop {
            let Some(encounter) = store.state().encounter.as_ref() else {
                break;
            };
            if encounter.is_over() {
                if let Some(result) = closing_result(store.state()) {
                    turns.push(engine.run_resolved(store, result).await?);
                }
                break;
            }
            match encounter.current_actor() {
                Some(id) if !id.is_player() => turns.push(engine.run_enemy_turn(store, id).await?),
                _ => break,
            }
        }
        Ok(turns)
    }
}
