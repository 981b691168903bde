//! Resolution results and how they change the game.
//!
//! The pipeline is:
//! 1. An `ActionIntent` is adjudicated (by the rules oracle, or by
//!    `DiceAdjudicator` when the oracle can't be trusted) into a `CheckOutcome`
//! 2. `finalize_check` turns the outcome into a `ResolutionResult` holding
//!    an ordered list of `StateDelta`s
//! 3. `apply_resolution` applies those deltas to a staged `GameState`
//!
//! Out-of-range values are clamped to the nearest valid value and recorded
//! as `Clamp`s rather than rejected.

use crate::action::ActionIntent;
use crate::config::EngineConfig;
use crate::dice::{Dice, RollResult};
use crate::store::GameState;
use crate::world::{
    status_check_modifier, Attributes, CombatantId, Enemy, HitPoints, HpChange, InitiativeRoll,
    Item, Location, LocationId, Npc, Quest, QuestId, QuestStatus, StatusEffect,
};
use crate::world::{CombatLogEntry, Encounter, EncounterOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Results
// ============================================================================

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResolutionSource {
    Oracle,
    Fallback { reason: String },
    /// Computed by the engine without consulting anyone.
    Engine,
}

impl ResolutionSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ResolutionSource::Fallback { .. })
    }
}

/// A check roll made by the fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRoll {
    pub roll: RollResult,
    pub difficulty: i32,
}

/// A value that had to be forced back into range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clamp {
    pub field: String,
    pub requested: i64,
    pub applied: i64,
}

impl Clamp {
    pub fn new(field: impl Into<String>, requested: i64, applied: i64) -> Self {
        let clamp = Self {
            field: field.into(),
            requested,
            applied,
        };
        tracing::warn!(
            field = %clamp.field,
            requested = clamp.requested,
            applied = clamp.applied,
            "value out of bounds, clamped"
        );
        clamp
    }

    fn from_hp(field: String, change: &HpChange) -> Option<Self> {
        change
            .clamped()
            .then(|| Clamp::new(field, change.unclamped, i64::from(change.after)))
    }
}

/// A single state mutation. Deltas are applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "delta", rename_all = "snake_case")]
pub enum StateDelta {
    Damage { target: CombatantId, amount: u32 },
    Heal { target: CombatantId, amount: u32 },
    ApplyStatus { target: CombatantId, status: StatusEffect },
    /// Drop every status effect on everyone.
    ClearStatuses,
    AddItem { item: Item },
    GainExperience { amount: u32 },
    /// Append a location connected to the current one.
    DiscoverLocation { location: Location },
    MoveTo { location: LocationId },
    RegisterNpc { npc: Npc },
    AddQuest { quest: Quest },
    SetQuestStatus { quest: QuestId, status: QuestStatus },
    StartEncounter {
        enemies: Vec<Enemy>,
        initiative: Vec<InitiativeRoll>,
    },
    Escape,
    EndEncounter,
}

/// Closing report of an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterSummary {
    pub outcome: EncounterOutcome,
    pub rounds: u32,
    pub defeated: Vec<String>,
    pub loot: Vec<Item>,
    pub experience: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionKind {
    Action { intent: ActionIntent },
    EncounterEnd { summary: EncounterSummary },
}

/// The validated outcome of one action, ready to mutate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub kind: ResolutionKind,
    pub actor: CombatantId,
    pub actor_name: String,
    pub target: Option<CombatantId>,
    pub target_name: Option<String>,
    pub success: bool,
    pub check: Option<CheckRoll>,
    pub damage: u32,
    pub healing: u32,
    pub effects: Vec<StatusEffect>,
    pub deltas: Vec<StateDelta>,
    pub narration_seed: String,
    pub source: ResolutionSource,
    /// True when this result uses up the actor's slot in the initiative order.
    pub consumes_turn: bool,
    pub clamps: Vec<Clamp>,
}

impl ResolutionResult {
    /// A successful result with no check and no combat bookkeeping.
    pub fn engine(intent: ActionIntent, actor_name: impl Into<String>) -> Self {
        Self {
            kind: ResolutionKind::Action { intent },
            actor: CombatantId::PLAYER,
            actor_name: actor_name.into(),
            target: None,
            target_name: None,
            success: true,
            check: None,
            damage: 0,
            healing: 0,
            effects: Vec::new(),
            deltas: Vec::new(),
            narration_seed: String::new(),
            source: ResolutionSource::Engine,
            consumes_turn: false,
            clamps: Vec::new(),
        }
    }

    /// The closing result of an encounter. Succeeds only on victory.
    pub fn encounter_end(summary: EncounterSummary, actor_name: impl Into<String>) -> Self {
        let success = summary.outcome == EncounterOutcome::Victory;
        Self {
            success,
            kind: ResolutionKind::EncounterEnd { summary },
            ..Self::engine(ActionIntent::Defend, actor_name)
        }
    }

    pub fn with_delta(mut self, delta: StateDelta) -> Self {
        self.deltas.push(delta);
        self
    }

    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.narration_seed = seed.into();
        self
    }

    pub fn with_source(mut self, source: ResolutionSource) -> Self {
        self.source = source;
        self
    }

    pub fn intent(&self) -> Option<&ActionIntent> {
        match &self.kind {
            ResolutionKind::Action { intent } => Some(intent),
            ResolutionKind::EncounterEnd { .. } => None,
        }
    }

    pub fn summary(&self) -> Option<&EncounterSummary> {
        match &self.kind {
            ResolutionKind::EncounterEnd { summary } => Some(summary),
            ResolutionKind::Action { .. } => None,
        }
    }
}

// ============================================================================
// Checks
// ============================================================================

/// Read-only view of one side of a check.
#[derive(Debug, Clone, PartialEq)]
pub struct Contestant {
    pub id: CombatantId,
    pub name: String,
    pub attributes: Attributes,
    pub hit_points: HitPoints,
    pub status_effects: BTreeSet<StatusEffect>,
}

/// Everything an adjudicator may look at for one check.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub intent: ActionIntent,
    pub actor: Contestant,
    pub target: Option<Contestant>,
    pub in_combat: bool,
    pub location_id: LocationId,
    pub location: String,
}

/// Raw adjudication, before it is turned into deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub success: bool,
    pub damage: u32,
    pub healing: u32,
    pub effects: Vec<StatusEffect>,
    pub narration_seed: String,
    pub check: Option<CheckRoll>,
    pub clamps: Vec<Clamp>,
}

/// Oracle-independent adjudication from dice and configured formulas.
pub struct DiceAdjudicator<'a> {
    config: &'a EngineConfig,
}

impl<'a> DiceAdjudicator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn adjudicate(&self, ctx: &CheckContext, dice: &mut Dice) -> CheckOutcome {
        let actor = &ctx.actor;
        let status = status_check_modifier(&actor.status_effects);

        match &ctx.intent {
            ActionIntent::Attack { .. } => {
                let roll = dice.d20(actor.attributes.strength + status);
                let difficulty = self.config.attack_difficulty;
                let success = roll.meets(difficulty);
                let damage = if success { self.damage_for(actor, dice) } else { 0 };
                let target = ctx.target.as_ref().map(|t| t.name.as_str()).unwrap_or("the air");
                let seed = if success {
                    format!("{} hits {target} ({} vs {difficulty})", actor.name, roll.total)
                } else {
                    format!("{} misses {target} ({} vs {difficulty})", actor.name, roll.total)
                };
                outcome(success, damage, seed, Some(CheckRoll { roll, difficulty }))
            }
            ActionIntent::Defend => outcome(true, 0, format!("{} braces for impact", actor.name), None),
            ActionIntent::Flee => {
                let roll = dice.d20(actor.attributes.dexterity + status);
                let difficulty = self.config.flee_difficulty;
                let success = roll.meets(difficulty);
                let seed = format!(
                    "{} {} ({} vs {difficulty})",
                    actor.name,
                    if success { "breaks away" } else { "is cut off" },
                    roll.total
                );
                outcome(success, 0, seed, Some(CheckRoll { roll, difficulty }))
            }
            ActionIntent::Custom { text } => {
                let roll = dice.d20(0);
                let difficulty = self.config.custom_difficulty;
                let success = roll.meets(difficulty);
                let seed = format!(
                    "{} {} to {text} ({} vs {difficulty})",
                    actor.name,
                    if success { "manages" } else { "fails" },
                    roll.total
                );
                outcome(success, 0, seed, Some(CheckRoll { roll, difficulty }))
            }
            // Not checks; adjudicated elsewhere.
            _ => outcome(true, 0, String::new(), None),
        }
    }

    fn damage_for(&self, actor: &Contestant, dice: &mut Dice) -> u32 {
        let bonus = self
            .config
            .damage_dice
            .as_ref()
            .map(|expr| dice.roll_expression(expr).total)
            .unwrap_or(0);
        (actor.attributes.strength + bonus).max(0) as u32
    }
}

fn discard(field: &str, value: &mut u32, clamps: &mut Vec<Clamp>) {
    if *value > 0 {
        clamps.push(Clamp::new(field, i64::from(*value), 0));
        *value = 0;
    }
}

fn outcome(success: bool, damage: u32, narration_seed: String, check: Option<CheckRoll>) -> CheckOutcome {
    CheckOutcome {
        success,
        damage,
        healing: 0,
        effects: Vec::new(),
        narration_seed,
        check,
        clamps: Vec::new(),
    }
}

/// Turn a check outcome into deltas, enforcing what each intent can do.
///
/// Attacks only hurt the target on success. Custom actions heal the actor on
/// success and hurt the actor on failure. Beneficial effects land on the
/// actor; harmful ones land on the target of a successful check, or on the
/// actor after a failure.
pub fn finalize_check(ctx: &CheckContext, mut outcome: CheckOutcome, source: ResolutionSource) -> ResolutionResult {
    let actor = ctx.actor.id;
    let target = ctx.target.as_ref().map(|t| t.id);
    let mut deltas = Vec::new();

    match &ctx.intent {
        ActionIntent::Attack { .. } => {
            discard("healing", &mut outcome.healing, &mut outcome.clamps);
            match target {
                Some(target) if outcome.success => {
                    if outcome.damage > 0 {
                        deltas.push(StateDelta::Damage {
                            target,
                            amount: outcome.damage,
                        });
                    }
                }
                _ => discard("damage", &mut outcome.damage, &mut outcome.clamps),
            }
        }
        ActionIntent::Defend => {
            discard("damage", &mut outcome.damage, &mut outcome.clamps);
            discard("healing", &mut outcome.healing, &mut outcome.clamps);
            if outcome.success {
                deltas.push(StateDelta::ApplyStatus {
                    target: actor,
                    status: StatusEffect::Guarded,
                });
            }
        }
        ActionIntent::Flee => {
            discard("damage", &mut outcome.damage, &mut outcome.clamps);
            discard("healing", &mut outcome.healing, &mut outcome.clamps);
            if outcome.success {
                deltas.push(StateDelta::Escape);
            }
        }
        ActionIntent::Custom { .. } => {
            if outcome.success {
                discard("damage", &mut outcome.damage, &mut outcome.clamps);
                if outcome.healing > 0 {
                    deltas.push(StateDelta::Heal {
                        target: actor,
                        amount: outcome.healing,
                    });
                }
            } else {
                discard("healing", &mut outcome.healing, &mut outcome.clamps);
                if outcome.damage > 0 {
                    deltas.push(StateDelta::Damage {
                        target: actor,
                        amount: outcome.damage,
                    });
                }
            }
        }
        _ => {
            discard("damage", &mut outcome.damage, &mut outcome.clamps);
            discard("healing", &mut outcome.healing, &mut outcome.clamps);
        }
    }

    let mut applied_effects = Vec::new();
    for effect in outcome.effects.iter().copied() {
        let recipient = if effect.is_beneficial() {
            actor
        } else {
            match target {
                Some(target) if outcome.success => target,
                _ if !outcome.success => actor,
                // harmful effect on a successful target-less action
                _ => continue,
            }
        };
        if applied_effects.contains(&effect) {
            continue;
        }
        applied_effects.push(effect);
        deltas.push(StateDelta::ApplyStatus {
            target: recipient,
            status: effect,
        });
    }

    ResolutionResult {
        kind: ResolutionKind::Action {
            intent: ctx.intent.clone(),
        },
        actor,
        actor_name: ctx.actor.name.clone(),
        target,
        target_name: ctx.target.as_ref().map(|t| t.name.clone()),
        success: outcome.success,
        check: outcome.check,
        damage: outcome.damage,
        healing: outcome.healing,
        effects: applied_effects,
        deltas,
        narration_seed: outcome.narration_seed,
        source,
        consumes_turn: ctx.in_combat,
        clamps: outcome.clamps,
    }
}

// ============================================================================
// Applying results
// ============================================================================

/// Apply every delta of `result` to `state`, then advance the encounter if
/// the result used up a combat turn. Returns the clamps made along the way.
pub fn apply_resolution(state: &mut GameState, result: &ResolutionResult) -> Vec<Clamp> {
    let mut clamps = Vec::new();
    for delta in &result.deltas {
        apply_delta(state, delta, &mut clamps);
    }

    if result.consumes_turn {
        let player_dead = state.character.is_dead();
        if let Some(encounter) = state.encounter.as_mut() {
            encounter.record(CombatLogEntry {
                round: encounter.round,
                actor: result.actor,
                target: result.target,
                success: result.success,
                damage: result.damage,
            });
            encounter.finish_turn(player_dead);
        }
    }
    clamps
}

fn apply_delta(state: &mut GameState, delta: &StateDelta, clamps: &mut Vec<Clamp>) {
    match delta {
        StateDelta::Damage { target, amount } => {
            let Some((name, hp, effects)) = state.vitals_mut(*target) else {
                dropped(delta, "unknown combatant");
                return;
            };
            let amount = if effects.remove(&StatusEffect::Guarded) {
                amount / 2
            } else {
                *amount
            };
            let change = hp.take_damage(amount);
            clamps.extend(Clamp::from_hp(format!("{name}.hp"), &change));
        }
        StateDelta::Heal { target, amount } => {
            let Some((name, hp, _)) = state.vitals_mut(*target) else {
                dropped(delta, "unknown combatant");
                return;
            };
            let change = hp.heal(*amount);
            clamps.extend(Clamp::from_hp(format!("{name}.hp"), &change));
        }
        StateDelta::ApplyStatus { target, status } => match state.vitals_mut(*target) {
            Some((_, _, effects)) => {
                effects.insert(*status);
            }
            None => dropped(delta, "unknown combatant"),
        },
        StateDelta::ClearStatuses => {
            state.character.status_effects.clear();
            if let Some(encounter) = state.encounter.as_mut() {
                let ids: Vec<_> = encounter.enemies().map(|(id, _)| id).collect();
                for id in ids {
                    if let Some(enemy) = encounter.enemy_mut(id) {
                        enemy.status_effects.clear();
                    }
                }
            }
        }
        StateDelta::AddItem { item } => state.character.inventory.add_item(item.clone()),
        StateDelta::GainExperience { amount } => {
            let levels = state.character.gain_experience(*amount);
            if levels > 0 {
                tracing::info!(
                    character = %state.character.name,
                    level = state.character.level,
                    "character leveled up"
                );
            }
        }
        StateDelta::DiscoverLocation { location } => {
            let from = state.world.current_location;
            if let Err(e) = state.world.add_location(location.clone(), Some(from)) {
                dropped(delta, &e.to_string());
            }
        }
        StateDelta::MoveTo { location } => {
            if let Err(e) = state.world.move_to(*location) {
                dropped(delta, &e.to_string());
            }
        }
        StateDelta::RegisterNpc { npc } => {
            if let Err(e) = state.world.add_npc(npc.clone()) {
                dropped(delta, &e.to_string());
            }
        }
        StateDelta::AddQuest { quest } => {
            if let Err(e) = state.world.add_quest(quest.clone()) {
                dropped(delta, &e.to_string());
            }
        }
        StateDelta::SetQuestStatus { quest, status } => {
            if let Err(e) = state.world.set_quest_status(*quest, *status) {
                dropped(delta, &e.to_string());
            }
        }
        StateDelta::StartEncounter {
            enemies,
            initiative,
        } => {
            if state.encounter.is_some() {
                dropped(delta, "an encounter is already running");
                return;
            }
            state.encounter = Some(Encounter::begin(
                &state.character,
                enemies.clone(),
                initiative,
            ));
        }
        StateDelta::Escape => match state.encounter.as_mut() {
            Some(encounter) => encounter.escaped = true,
            None => dropped(delta, "no encounter"),
        },
        StateDelta::EndEncounter => {
            if state.encounter.take().is_none() {
                dropped(delta, "no encounter");
            }
        }
    }
}

fn dropped(delta: &StateDelta, reason: &str) {
    tracing::warn!(?delta, reason, "state delta dropped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_state, LoadedDice};
    use crate::world::{Archetype, Character, LocationKind};

    fn contestant(id: CombatantId, name: &str, strength: i32, hp: i32) -> Contestant {
        Contestant {
            id,
            name: name.to_string(),
            attributes: Attributes::new(strength, 5, 5, 5, 10),
            hit_points: HitPoints::new(hp),
            status_effects: BTreeSet::new(),
        }
    }

    fn attack_ctx() -> CheckContext {
        CheckContext {
            intent: ActionIntent::Attack { target: None },
            actor: contestant(CombatantId::PLAYER, "Ash", 5, 10),
            target: Some(contestant(CombatantId(1), "Ghoul", 3, 8)),
            in_combat: true,
            location_id: LocationId::new(),
            location: "Crypt".to_string(),
        }
    }

    #[test]
    fn test_fallback_attack_hits_on_threshold() {
        let config = EngineConfig::default();
        let mut dice = LoadedDice::dice(&[7]);
        let outcome = DiceAdjudicator::new(&config).adjudicate(&attack_ctx(), &mut dice);

        // 7 + 5 = 12 meets 12
        assert!(outcome.success);
        assert_eq!(outcome.damage, 5);
        assert_eq!(outcome.check.as_ref().unwrap().roll.total, 12);
    }

    #[test]
    fn test_fallback_attack_misses_below_threshold() {
        let config = EngineConfig::default();
        let mut dice = LoadedDice::dice(&[6]);
        let outcome = DiceAdjudicator::new(&config).adjudicate(&attack_ctx(), &mut dice);
        assert!(!outcome.success);
        assert_eq!(outcome.damage, 0);
    }

    #[test]
    fn test_status_modifiers_shift_fallback_checks() {
        let config = EngineConfig::default();
        let mut ctx = attack_ctx();
        ctx.actor.status_effects.insert(StatusEffect::Weakened);
        let mut dice = LoadedDice::dice(&[8]);
        // 8 + 5 - 2 = 11
        assert!(!DiceAdjudicator::new(&config).adjudicate(&ctx, &mut dice).success);
    }

    #[test]
    fn test_damage_dice_adds_to_strength() {
        let config = EngineConfig::default()
            .with_damage_dice(crate::dice::DiceExpression::parse("1d4").unwrap());
        let mut dice = LoadedDice::dice(&[15, 3]);
        let outcome = DiceAdjudicator::new(&config).adjudicate(&attack_ctx(), &mut dice);
        assert_eq!(outcome.damage, 8);
    }

    #[test]
    fn test_missed_attack_cannot_deal_damage() {
        let ctx = attack_ctx();
        let raw = CheckOutcome {
            success: false,
            damage: 9,
            healing: 0,
            effects: vec![StatusEffect::Poisoned, StatusEffect::Blessed],
            narration_seed: "miss".to_string(),
            check: None,
            clamps: Vec::new(),
        };
        let result = finalize_check(&ctx, raw, ResolutionSource::Oracle);

        assert_eq!(result.damage, 0);
        assert_eq!(result.clamps.len(), 1);
        assert_eq!(result.clamps[0].field, "damage");
        // poison turns on the attacker after a failure, the blessing stays with them too
        assert_eq!(
            result.deltas,
            vec![
                StateDelta::ApplyStatus {
                    target: CombatantId::PLAYER,
                    status: StatusEffect::Poisoned
                },
                StateDelta::ApplyStatus {
                    target: CombatantId::PLAYER,
                    status: StatusEffect::Blessed
                },
            ]
        );
    }

    #[test]
    fn test_custom_failure_hurts_actor() {
        let mut ctx = attack_ctx();
        ctx.intent = ActionIntent::Custom {
            text: "leap the chasm".to_string(),
        };
        ctx.target = None;
        let raw = CheckOutcome {
            success: false,
            damage: 4,
            healing: 2,
            effects: vec![],
            narration_seed: String::new(),
            check: None,
            clamps: Vec::new(),
        };
        let result = finalize_check(&ctx, raw, ResolutionSource::Oracle);
        assert_eq!(
            result.deltas,
            vec![StateDelta::Damage {
                target: CombatantId::PLAYER,
                amount: 4
            }]
        );
        assert_eq!(result.healing, 0);
    }

    #[test]
    fn test_damage_never_drops_hp_below_zero() {
        let mut state = sample_state();
        state.character.hit_points = HitPoints::new(10);
        let result = ResolutionResult::engine(ActionIntent::Defend, "trap").with_delta(StateDelta::Damage {
            target: CombatantId::PLAYER,
            amount: 999,
        });

        let clamps = apply_resolution(&mut state, &result);
        assert_eq!(state.character.hit_points.current, 0);
        assert_eq!(clamps.len(), 1);
        assert_eq!(clamps[0].requested, -989);
        assert_eq!(clamps[0].applied, 0);
    }

    #[test]
    fn test_healing_never_exceeds_max() {
        let mut state = sample_state();
        state.character.hit_points = HitPoints::with_current(3, 10);
        let result = ResolutionResult::engine(ActionIntent::Defend, "potion").with_delta(StateDelta::Heal {
            target: CombatantId::PLAYER,
            amount: 50,
        });
        apply_resolution(&mut state, &result);
        assert_eq!(state.character.hit_points.current, 10);
    }

    #[test]
    fn test_guarded_halves_damage_once() {
        let mut state = sample_state();
        state.character.hit_points = HitPoints::new(20);
        state.character.status_effects.insert(StatusEffect::Guarded);
        let hit = StateDelta::Damage {
            target: CombatantId::PLAYER,
            amount: 6,
        };
        let result = ResolutionResult::engine(ActionIntent::Defend, "x").with_delta(hit.clone());
        apply_resolution(&mut state, &result);
        apply_resolution(&mut state, &result);
        assert_eq!(state.character.hit_points.current, 20 - 3 - 6);
        assert!(!state.character.status_effects.contains(&StatusEffect::Guarded));
    }

    #[test]
    fn test_dangling_references_are_dropped() {
        let mut state = sample_state();
        let before = state.clone();
        let result = ResolutionResult::engine(ActionIntent::Explore, "Ash")
            .with_delta(StateDelta::MoveTo {
                location: LocationId::new(),
            })
            .with_delta(StateDelta::SetQuestStatus {
                quest: QuestId::new(),
                status: QuestStatus::Completed,
            })
            .with_delta(StateDelta::Damage {
                target: CombatantId(7),
                amount: 3,
            });

        apply_resolution(&mut state, &result);
        assert_eq!(state, before);
        assert!(state.world.validate().is_ok());
    }

    #[test]
    fn test_entities_appended_before_reference() {
        let mut state = sample_state();
        let ruins = Location::new("Hollow Ruins", LocationKind::Ruins);
        let ruins_id = ruins.id;
        let npc = Npc::new("Veyra", "wanderer", ruins_id);
        let mut quest = Quest::new("The Hollow Bell", "Ring it");
        quest.giver = Some(npc.id);

        let result = ResolutionResult::engine(ActionIntent::Explore, "Ash")
            .with_delta(StateDelta::DiscoverLocation { location: ruins })
            .with_delta(StateDelta::MoveTo { location: ruins_id })
            .with_delta(StateDelta::RegisterNpc { npc })
            .with_delta(StateDelta::AddQuest { quest });

        apply_resolution(&mut state, &result);
        assert_eq!(state.world.current_location, ruins_id);
        assert_eq!(state.world.quests.len(), 1);
        assert!(state.world.validate().is_ok());
    }

    #[test]
    fn test_loot_and_experience() {
        let mut state = sample_state();
        state.character = Character::new("Ash", Archetype::Rogue);
        let result = ResolutionResult::engine(ActionIntent::Explore, "Ash")
            .with_delta(StateDelta::AddItem {
                item: Item::new("Void Essence"),
            })
            .with_delta(StateDelta::GainExperience { amount: 120 });
        apply_resolution(&mut state, &result);
        assert!(state.character.inventory.has_item("Void Essence"));
        assert_eq!(state.character.level, 2);
    }
}
