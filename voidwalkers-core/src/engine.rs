//! The per-action turn cycle.
//!
//! ```text
//! Idle -> Validating -> Adjudicating -> Mutating -> Narrating -> Persisted -> Idle
//!             \-> Aborted -> Idle
//! ```
//!
//! A turn mutates a staged copy of the state. The copy only replaces the
//! live state after the save that contains it has been written, so a failed
//! save, an invalid action or a dropped future all leave the live state and
//! the previous save exactly as they were.

use crate::action::{self, ActionIntent, ActionRequest};
use crate::config::EngineConfig;
use crate::dice::Dice;
use crate::oracle::{Narration, NarrationSource, NarrativeAdapter, Oracles, RulesAdapter};
use crate::persist::{PersistError, SaveSlot, SaveState, SaveStore};
use crate::rules::{apply_resolution, CheckContext, Clamp, ResolutionResult};
use crate::store::{GameState, StateStore, TurnRecord};
use crate::world::CombatantId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Could not save the turn: {0}")]
    Persistence(#[from] PersistError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    Idle,
    Validating,
    Adjudicating,
    Mutating,
    Narrating,
    Persisted,
    Aborted,
}

/// What one completed cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub turn: u64,
    pub result: ResolutionResult,
    pub narration: Narration,
    /// Phases entered, in order.
    pub phases: Vec<TurnPhase>,
    /// Every clamp made while validating and applying the result.
    pub clamps: Vec<Clamp>,
}

impl TurnOutcome {
    pub fn narration_source(&self) -> NarrationSource {
        self.narration.source
    }
}

/// Runs turn cycles for one session.
pub struct TurnEngine {
    rules: RulesAdapter,
    narrator: NarrativeAdapter,
    saves: Arc<dyn SaveStore>,
    slot: SaveSlot,
    dice: Dice,
    phase: TurnPhase,
    trace: Vec<TurnPhase>,
}

impl TurnEngine {
    pub fn new(config: EngineConfig, oracles: &Oracles, saves: Arc<dyn SaveStore>, slot: SaveSlot, dice: Dice) -> Self {
        Self {
            narrator: NarrativeAdapter::new(oracles.narrative.clone(), &config),
            rules: RulesAdapter::new(oracles.rules.clone(), config),
            saves,
            slot,
            dice,
            phase: TurnPhase::Idle,
            trace: Vec::new(),
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Phases entered by the most recent cycle.
    pub fn last_trace(&self) -> &[TurnPhase] {
        &self.trace
    }

    pub fn slot(&self) -> &SaveSlot {
        &self.slot
    }

    pub fn saves(&self) -> &Arc<dyn SaveStore> {
        &self.saves
    }

    pub fn dice_mut(&mut self) -> &mut Dice {
        &mut self.dice
    }

    pub fn rules(&self) -> &RulesAdapter {
        &self.rules
    }

    pub fn narrator(&self) -> &NarrativeAdapter {
        &self.narrator
    }

    fn enter(&mut self, phase: TurnPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "turn phase");
        self.phase = phase;
        self.trace.push(phase);
    }

    /// Start a cycle. A cycle that never reached `Idle` again was abandoned
    /// mid-way; its dice draws are rewound to the committed state.
    fn begin(&mut self, store: &StateStore) {
        if self.phase != TurnPhase::Idle {
            tracing::warn!(phase = ?self.phase, "previous turn was abandoned, discarding it");
            self.dice.restore(&store.state().dice);
        }
        self.phase = TurnPhase::Idle;
        self.trace.clear();
    }

    fn abort(&mut self, reason: String) -> TurnError {
        tracing::debug!(reason = %reason, "action rejected");
        self.enter(TurnPhase::Aborted);
        self.phase = TurnPhase::Idle;
        TurnError::InvalidAction(reason)
    }

    /// Run the player's action through a full cycle.
    pub async fn run_turn(&mut self, store: &mut StateStore, request: ActionRequest) -> Result<TurnOutcome, TurnError> {
        self.begin(store);
        self.enter(TurnPhase::Validating);

        let ctx = match action::parse(&request)
            .map_err(|e| e.to_string())
            .and_then(|intent| validate(store.state(), intent))
        {
            Ok(ctx) => ctx,
            Err(reason) => return Err(self.abort(reason)),
        };

        self.enter(TurnPhase::Adjudicating);
        let result = self.rules.adjudicate(ctx, store.state(), &mut self.dice).await;
        self.apply(store, Some(request), result).await
    }

    /// Run one enemy's turn. The enemy must be the current actor.
    pub async fn run_enemy_turn(&mut self, store: &mut StateStore, enemy: CombatantId) -> Result<TurnOutcome, TurnError> {
        self.begin(store);
        self.enter(TurnPhase::Validating);

        let current = store.state().encounter.as_ref().and_then(|e| e.current_actor());
        if enemy.is_player() || current != Some(enemy) {
            return Err(self.abort(format!("combatant {enemy} is not up")));
        }

        self.enter(TurnPhase::Adjudicating);
        let intent = self.rules.propose_enemy_action(store.state(), enemy).await;
        let ctx = match enemy_context(store.state(), enemy, intent) {
            Some(ctx) => ctx,
            None => return Err(self.abort(format!("combatant {enemy} cannot act"))),
        };
        let result = self.rules.adjudicate(ctx, store.state(), &mut self.dice).await;
        self.apply(store, None, result).await
    }

    /// Commit a result the engine produced itself, such as an encounter
    /// summary. Starts at `Mutating`.
    pub async fn run_resolved(&mut self, store: &mut StateStore, result: ResolutionResult) -> Result<TurnOutcome, TurnError> {
        self.begin(store);
        self.apply(store, None, result).await
    }

    async fn apply(
        &mut self,
        store: &mut StateStore,
        request: Option<ActionRequest>,
        result: ResolutionResult,
    ) -> Result<TurnOutcome, TurnError> {
        self.enter(TurnPhase::Mutating);
        let mut staged = store.stage();
        let mut clamps = result.clamps.clone();
        clamps.extend(apply_resolution(&mut staged, &result));

        self.enter(TurnPhase::Narrating);
        let narration = self.narrator.narrate(&result, &staged).await;

        staged.turn += 1;
        if let Some(dice) = self.dice.state() {
            staged.dice = dice;
        }
        staged.log.push(TurnRecord {
            turn: staged.turn,
            actor: result.actor_name.clone(),
            request,
            result: result.clone(),
            narration: narration.text.clone(),
        });

        let save = SaveState::capture(&self.slot, &staged);
        if let Err(e) = self.saves.save(&self.slot, &save).await {
            tracing::error!(error = %e, slot = %self.slot, turn = staged.turn, "turn not persisted, discarding it");
            self.dice.restore(&store.state().dice);
            self.phase = TurnPhase::Idle;
            return Err(e.into());
        }

        self.enter(TurnPhase::Persisted);
        let turn = staged.turn;
        store.commit(staged);
        self.phase = TurnPhase::Idle;
        tracing::info!(
            turn,
            actor = %result.actor_name,
            success = result.success,
            source = ?result.source,
            "turn persisted"
        );

        Ok(TurnOutcome {
            turn,
            result,
            narration,
            phases: self.trace.clone(),
            clamps,
        })
    }
}

/// Check an intent against the current state and gather what adjudication
/// needs. The error is a message for the player.
pub fn validate(state: &GameState, intent: ActionIntent) -> Result<CheckContext, String> {
    let character = &state.character;
    if character.is_dead() {
        return Err(format!("{} has fallen. Start a new game to play on.", character.name));
    }

    let mut target = None;
    match &state.encounter {
        Some(encounter) => {
            if encounter.current_actor() != Some(CombatantId::PLAYER) {
                return Err("It is not your turn.".to_string());
            }
            if !intent.is_combat_action() && !matches!(intent, ActionIntent::Custom { .. }) {
                return Err(format!("You can't {} in the middle of a fight.", intent.label().replace('_', " ")));
            }
            if let ActionIntent::Attack { target: wanted } = &intent {
                let mut living = encounter.living_enemies();
                let found = match wanted {
                    Some(name) => living.find(|(id, _)| encounter.name_of(*id).to_lowercase().contains(name.as_str())),
                    None => living.next(),
                };
                match found {
                    Some((id, _)) => target = Some(id),
                    None => {
                        return Err(format!(
                            "There is no {} to attack.",
                            wanted.as_deref().unwrap_or("enemy")
                        ))
                    }
                }
            }
        }
        None => {
            if intent.is_combat_action() {
                return Err("There is nothing to fight here.".to_string());
            }
            if let ActionIntent::CompleteQuest { quest } = &intent {
                match state.world.quest(*quest) {
                    Some(q) if q.is_active() => {}
                    Some(q) => return Err(format!("The quest {} is already over.", q.title)),
                    None => return Err("You have no such quest.".to_string()),
                }
            }
        }
    }

    let actor = state
        .contestant(CombatantId::PLAYER)
        .ok_or_else(|| "No character to act with.".to_string())?;
    Ok(CheckContext {
        in_combat: state.in_combat(),
        target: target.and_then(|id| state.contestant(id)),
        actor,
        intent,
        location_id: state.world.current_location,
        location: state.world.current_name().to_string(),
    })
}

fn enemy_context(state: &GameState, enemy: CombatantId, intent: ActionIntent) -> Option<CheckContext> {
    let actor = state.contestant(enemy)?;
    if actor.hit_points.is_dead() {
        return None;
    }
    let target = match intent {
        ActionIntent::Attack { .. } => Some(state.contestant(CombatantId::PLAYER)?),
        _ => None,
    };
    Some(CheckContext {
        intent,
        actor,
        target,
        in_combat: true,
        location_id: state.world.current_location,
        location: state.world.current_name().to_string(),
    })
}
