//! Rules oracle adapter.
//!
//! Every question goes out as an `OracleRequest`, every answer is parsed
//! against a strict schema and forced into range. When the oracle times out,
//! fails or answers off-schema the adapter switches to a deterministic
//! fallback driven by the session dice, so a result is always produced.

use super::{
    parse_reply, truncate_chars, within, ActorView, Condition, OracleError, OracleRequest, RulesOracle, TargetView,
};
use crate::action::ActionIntent;
use crate::config::{DisclosurePolicy, EngineConfig};
use crate::dice::Dice;
use crate::rules::{
    finalize_check, CheckContext, CheckOutcome, Clamp, Contestant, DiceAdjudicator, ResolutionResult,
    ResolutionSource, StateDelta,
};
use crate::store::GameState;
use crate::world::{
    Archetype, Attributes, Character, CombatantId, Disposition, Enemy, HitPoints, InitiativeRoll, Item, Location,
    LocationKind, Npc, Quest, QuestId, QuestStatus, StatusEffect,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

/// Experience awarded for completing a quest.
pub const QUEST_EXPERIENCE: u32 = 50;
/// Most enemies a single encounter may hold.
pub const MAX_ENEMIES: usize = 4;
const MAX_NAME_LEN: usize = 60;
const MAX_LIST_LEN: usize = 3;

// ============================================================================
// Reply schemas
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CheckReply {
    success: bool,
    damage: i64,
    #[serde(default)]
    healing: i64,
    effects: Vec<StatusEffect>,
    narration_seed: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EnemyMove {
    Attack,
    Defend,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnemyActionReply {
    intent: EnemyMove,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CharacterReply {
    hit_points: i64,
    strength: i64,
    dexterity: i64,
    intelligence: i64,
    charisma: i64,
    defense: i64,
    #[serde(default)]
    abilities: Vec<String>,
    #[serde(default)]
    inventory: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocationReply {
    name: String,
    kind: LocationKind,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NpcReply {
    name: String,
    role: String,
    #[serde(default)]
    persona: String,
    disposition: Disposition,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuestReply {
    title: String,
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct EnemyReply {
    name: String,
    #[serde(default)]
    description: String,
    hit_points: i64,
    attack: i64,
    defense: i64,
    dexterity: i64,
    #[serde(default)]
    abilities: Vec<String>,
    #[serde(default)]
    loot: Vec<String>,
    #[serde(default)]
    experience: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EncounterReply {
    enemies: Vec<EnemyReply>,
}

/// Force `value` into `lo..=hi`, recording a clamp when it moved.
fn ranged(field: &str, value: i64, lo: i64, hi: i64, clamps: &mut Vec<Clamp>) -> i64 {
    let applied = value.clamp(lo, hi);
    if applied != value {
        clamps.push(Clamp::new(field, value, applied));
    }
    applied
}

fn required(field: &str, value: String) -> Result<String, OracleError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(OracleError::SchemaViolation(format!("{field} is empty")));
    }
    Ok(truncate_chars(value, MAX_NAME_LEN).unwrap_or_else(|| value.to_string()))
}

fn names(list: Vec<String>) -> Vec<String> {
    list.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_LIST_LEN)
        .collect()
}

impl EnemyReply {
    fn into_enemy(self, clamps: &mut Vec<Clamp>) -> Result<Enemy, OracleError> {
        let name = required("enemy name", self.name)?;
        let hp = ranged(&format!("{name}.hit_points"), self.hit_points, 1, 80, clamps);
        let attack = ranged(&format!("{name}.attack"), self.attack, 1, 20, clamps);
        let defense = ranged(&format!("{name}.defense"), self.defense, 5, 15, clamps);
        let dexterity = ranged(&format!("{name}.dexterity"), self.dexterity, 1, 10, clamps);

        let mut enemy = Enemy::new(name, hp as i32, attack as i32, defense as i32).with_dexterity(dexterity as i32);
        enemy.description = self.description.trim().to_string();
        enemy.abilities = names(self.abilities);
        for item in names(self.loot) {
            enemy = enemy.with_loot(item);
        }
        if let Some(experience) = self.experience {
            enemy.experience = ranged(&format!("{}.experience", enemy.name), experience, 0, 200, clamps) as u32;
        }
        Ok(enemy)
    }
}

// ============================================================================
// Fallback tables
// ============================================================================

const PLACE_PREFIXES: &[&str] = &[
    "Ashen",
    "Hollow",
    "Sunken",
    "Whispering",
    "Shattered",
    "Gloam",
    "Forsaken",
    "Umbral",
];

fn place_noun(kind: LocationKind) -> (&'static str, &'static str) {
    match kind {
        LocationKind::Village => ("Hamlet", "A huddle of houses with shuttered windows."),
        LocationKind::Ruins => ("Ruins", "Broken walls lean together under a colorless sky."),
        LocationKind::Forest => ("Wood", "Grey trees crowd the path, their leaves unmoving."),
        LocationKind::Cave => ("Caverns", "Cold air breathes out of a crack in the hillside."),
        LocationKind::Shrine => ("Shrine", "A weathered altar still holds a guttering candle."),
        LocationKind::Dungeon => ("Depths", "Stairs spiral down into a dark that swallows torchlight."),
    }
}

const NPC_NAMES: &[&str] = &["Veyra", "Tomas", "Old Maren", "Silas Dray", "Ilsa", "Brother Cael"];

const NPC_ROLES: &[(&str, &str, Disposition)] = &[
    ("merchant", "Counts every coin twice and trusts no one who pays in silver.", Disposition::Neutral),
    ("wanderer", "Has walked too far from home to remember the way back.", Disposition::Friendly),
    ("cultist", "Speaks of the Void as though it were listening.", Disposition::Unfriendly),
    ("guard", "Keeps one hand on the hilt and both eyes on the horizon.", Disposition::Neutral),
    ("mysterious figure", "Answers questions with questions.", Disposition::Neutral),
];

const QUESTS: &[(&str, &str)] = &[
    ("The Hollow Bell", "A bell rings at midnight where no bell hangs. Find its source and silence it."),
    ("Ashes of the Old Watch", "The watchtower burned a week ago. Learn who lit the fire."),
    ("Lost Lantern", "A lantern-bearer vanished on the road. Bring back the light, or what is left of it."),
    ("The Void Seed", "Something black is growing beneath the shrine. Cut it out before it flowers."),
];

/// Default starting village.
pub fn starting_location() -> Location {
    Location::new("Emberfall", LocationKind::Village)
        .with_description("The last lit village before the Void. Its forge never goes cold.")
}

/// The enemy used when no encounter can be generated.
pub fn void_creature(level: u32) -> Enemy {
    let hp = 30 + 5 * level.saturating_sub(1) as i32;
    let mut enemy = Enemy::new("Void Creature", hp, 6, 8)
        .with_dexterity(4)
        .with_loot("Void Essence");
    enemy.description = "A shape cut out of the world, edges trembling.".to_string();
    enemy.abilities = vec!["Shadow Strike".to_string()];
    enemy.experience = 40;
    enemy
}

fn fallback_location(dice: &mut Dice, known: &[Location]) -> Location {
    let kinds = LocationKind::wilderness();
    let kind = kinds[dice.pick(kinds.len())];
    let prefix = PLACE_PREFIXES[dice.pick(PLACE_PREFIXES.len())];
    let (noun, description) = place_noun(kind);

    let mut name = format!("{prefix} {noun}");
    if known.iter().any(|l| l.name == name) {
        name = format!("{name} {}", known.len() + 1);
    }
    Location::new(name, kind).with_description(description)
}

// ============================================================================
// Adapter
// ============================================================================

/// Turns intents into validated results using the rules oracle, or dice
/// when the oracle can't be used.
#[derive(Clone)]
pub struct RulesAdapter {
    oracle: Arc<dyn RulesOracle>,
    config: EngineConfig,
}

impl RulesAdapter {
    pub fn new(oracle: Arc<dyn RulesOracle>, config: EngineConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn ask<T: DeserializeOwned>(&self, request: &OracleRequest) -> Result<T, OracleError> {
        let raw = within(self.config.rules_timeout, self.oracle.consult(request)).await?;
        parse_reply(&raw)
    }

    fn fallback(request: &OracleRequest, error: &OracleError) -> ResolutionSource {
        tracing::warn!(request = request.kind(), error = %error, "rules oracle unusable, falling back");
        ResolutionSource::Fallback {
            reason: error.to_string(),
        }
    }

    /// Resolve one validated intent.
    pub async fn adjudicate(&self, ctx: CheckContext, state: &GameState, dice: &mut Dice) -> ResolutionResult {
        match &ctx.intent {
            ActionIntent::Attack { .. } | ActionIntent::Flee | ActionIntent::Custom { .. } => {
                self.check(&ctx, dice).await
            }
            // always succeeds, nothing to ask
            ActionIntent::Defend => {
                let outcome = DiceAdjudicator::new(&self.config).adjudicate(&ctx, dice);
                finalize_check(&ctx, outcome, ResolutionSource::Engine)
            }
            ActionIntent::Explore => self.explore(&ctx, state, dice).await,
            ActionIntent::Meet => self.meet(&ctx, dice).await,
            ActionIntent::SeekQuest => self.seek_quest(&ctx, state, dice).await,
            ActionIntent::SeekCombat => self.seek_combat(&ctx, state, dice).await,
            ActionIntent::CompleteQuest { quest } => complete_quest(&ctx, state, *quest),
        }
    }

    // ------------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------------

    async fn check(&self, ctx: &CheckContext, dice: &mut Dice) -> ResolutionResult {
        let request = OracleRequest::Adjudicate {
            intent: ctx.intent.clone(),
            actor: actor_view(&ctx.actor),
            target: ctx.target.as_ref().map(|t| self.target_view(t)),
            in_combat: ctx.in_combat,
            location: ctx.location.clone(),
        };

        match self.ask::<CheckReply>(&request).await {
            Ok(reply) => {
                let outcome = self.bound_check(reply);
                finalize_check(ctx, outcome, ResolutionSource::Oracle)
            }
            Err(e) => {
                let source = Self::fallback(&request, &e);
                let outcome = DiceAdjudicator::new(&self.config).adjudicate(ctx, dice);
                finalize_check(ctx, outcome, source)
            }
        }
    }

    fn bound_check(&self, reply: CheckReply) -> CheckOutcome {
        let mut clamps = Vec::new();
        let damage = ranged(
            "damage",
            reply.damage,
            0,
            i64::from(self.config.max_damage_per_action),
            &mut clamps,
        ) as u32;
        let healing = ranged(
            "healing",
            reply.healing,
            0,
            i64::from(self.config.max_healing_per_action),
            &mut clamps,
        ) as u32;

        let seed = reply.narration_seed.trim();
        let narration_seed = match truncate_chars(seed, self.config.narration_seed_cap) {
            Some(cut) => {
                clamps.push(Clamp::new(
                    "narration_seed",
                    seed.chars().count() as i64,
                    self.config.narration_seed_cap as i64,
                ));
                cut
            }
            None => seed.to_string(),
        };

        CheckOutcome {
            success: reply.success,
            damage,
            healing,
            effects: reply.effects,
            narration_seed,
            check: None,
            clamps,
        }
    }

    /// What the oracle may know about the receiving side. The player is
    /// always shown exactly; opponents follow the disclosure policy.
    fn target_view(&self, target: &Contestant) -> TargetView {
        let hp = target.hit_points;
        let condition = match self.config.disclosure {
            _ if target.id.is_player() => Condition::Exact {
                current: hp.current,
                maximum: hp.maximum,
            },
            DisclosurePolicy::Full => Condition::Exact {
                current: hp.current,
                maximum: hp.maximum,
            },
            DisclosurePolicy::Banded => Condition::Banded { band: hp.band() },
            DisclosurePolicy::Hidden => Condition::Hidden,
        };
        TargetView {
            name: target.name.clone(),
            defense: target.attributes.defense,
            condition,
            status_effects: target.status_effects.iter().copied().collect(),
        }
    }

    /// What an enemy does on its turn. Attacks the player when in doubt.
    pub async fn propose_enemy_action(&self, state: &GameState, enemy: CombatantId) -> ActionIntent {
        let attack = ActionIntent::Attack { target: None };
        let (Some(actor), Some(player), Some(encounter)) = (
            state.contestant(enemy),
            state.contestant(CombatantId::PLAYER),
            state.encounter.as_ref(),
        ) else {
            return attack;
        };

        let request = OracleRequest::ProposeEnemyAction {
            enemy: actor_view(&actor),
            opponent: self.target_view(&player),
            round: encounter.round,
        };
        match self.ask::<EnemyActionReply>(&request).await {
            Ok(EnemyActionReply {
                intent: EnemyMove::Defend,
            }) => ActionIntent::Defend,
            Ok(_) => attack,
            Err(e) => {
                Self::fallback(&request, &e);
                attack
            }
        }
    }

    // ------------------------------------------------------------------------
    // World content
    // ------------------------------------------------------------------------

    async fn explore(&self, ctx: &CheckContext, state: &GameState, dice: &mut Dice) -> ResolutionResult {
        let request = OracleRequest::GenerateLocation {
            from: Some(ctx.location.clone()),
            known: state.world.locations.iter().map(|l| l.name.clone()).collect(),
            level: state.character.level,
        };
        let reply = self.ask::<LocationReply>(&request).await.and_then(|r| {
            Ok(Location::new(required("location name", r.name)?, r.kind).with_description(r.description.trim()))
        });
        let (location, source) = match reply {
            Ok(location) => (location, ResolutionSource::Oracle),
            Err(e) => (
                fallback_location(dice, &state.world.locations),
                Self::fallback(&request, &e),
            ),
        };

        let id = location.id;
        let name = location.name.clone();
        let mut result = ResolutionResult::engine(ctx.intent.clone(), &ctx.actor.name)
            .with_seed(format!("{} leaves {} and discovers {name}", ctx.actor.name, ctx.location))
            .with_delta(StateDelta::DiscoverLocation { location })
            .with_delta(StateDelta::MoveTo { location: id })
            .with_source(source);
        result.target_name = Some(name);
        result
    }

    async fn meet(&self, ctx: &CheckContext, dice: &mut Dice) -> ResolutionResult {
        let request = OracleRequest::GenerateNpc {
            location: ctx.location.clone(),
        };
        let here = ctx.location_id;
        let reply = self.ask::<NpcReply>(&request).await.and_then(|r| {
            let mut npc = Npc::new(required("npc name", r.name)?, required("npc role", r.role)?, here);
            npc.persona = r.persona.trim().to_string();
            npc.disposition = r.disposition;
            Ok(npc)
        });
        let (npc, source) = match reply {
            Ok(npc) => (npc, ResolutionSource::Oracle),
            Err(e) => {
                let source = Self::fallback(&request, &e);
                let name = NPC_NAMES[dice.pick(NPC_NAMES.len())];
                let (role, persona, disposition) = NPC_ROLES[dice.pick(NPC_ROLES.len())];
                let mut npc = Npc::new(name, role, here);
                npc.persona = persona.to_string();
                npc.disposition = disposition;
                (npc, source)
            }
        };

        let name = npc.name.clone();
        let mut result = ResolutionResult::engine(ctx.intent.clone(), &ctx.actor.name)
            .with_seed(format!("{} meets {name}, a {}", ctx.actor.name, npc.role))
            .with_delta(StateDelta::RegisterNpc { npc })
            .with_source(source);
        result.target_name = Some(name);
        result
    }

    async fn seek_quest(&self, ctx: &CheckContext, state: &GameState, dice: &mut Dice) -> ResolutionResult {
        let giver = state.world.npcs_at(ctx.location_id).next();
        let request = OracleRequest::GenerateQuest {
            location: ctx.location.clone(),
            giver: giver.map(|n| n.name.clone()),
        };
        let reply = self
            .ask::<QuestReply>(&request)
            .await
            .and_then(|r| Ok(Quest::new(required("quest title", r.title)?, r.description.trim())));
        let (mut quest, source) = match reply {
            Ok(quest) => (quest, ResolutionSource::Oracle),
            Err(e) => {
                let source = Self::fallback(&request, &e);
                let (title, description) = QUESTS[dice.pick(QUESTS.len())];
                (Quest::new(title, description), source)
            }
        };
        quest.giver = giver.map(|n| n.id);

        let title = quest.title.clone();
        let mut result = ResolutionResult::engine(ctx.intent.clone(), &ctx.actor.name)
            .with_seed(format!("{} takes up the quest {title}", ctx.actor.name))
            .with_delta(StateDelta::AddQuest { quest })
            .with_source(source);
        result.target_name = Some(title);
        result
    }

    async fn seek_combat(&self, ctx: &CheckContext, state: &GameState, dice: &mut Dice) -> ResolutionResult {
        let level = state.character.level;
        let request = OracleRequest::GenerateEncounter {
            location: ctx.location.clone(),
            level,
        };

        let mut clamps = Vec::new();
        let reply = self.ask::<EncounterReply>(&request).await.and_then(|r| {
            if r.enemies.is_empty() {
                return Err(OracleError::SchemaViolation("no enemies".to_string()));
            }
            let count = r.enemies.len();
            if count > MAX_ENEMIES {
                clamps.push(Clamp::new("enemies", count as i64, MAX_ENEMIES as i64));
            }
            r.enemies
                .into_iter()
                .take(MAX_ENEMIES)
                .map(|e| e.into_enemy(&mut clamps))
                .collect::<Result<Vec<_>, _>>()
        });
        let (enemies, source) = match reply {
            Ok(enemies) => (enemies, ResolutionSource::Oracle),
            Err(e) => {
                clamps.clear();
                (vec![void_creature(level)], Self::fallback(&request, &e))
            }
        };

        // one d20 per combatant, in input order: the player, then each enemy
        let mut initiative = vec![InitiativeRoll {
            combatant: CombatantId::PLAYER,
            roll: dice.d20(0).total,
            dexterity: state.character.attributes.dexterity,
        }];
        for (i, enemy) in enemies.iter().enumerate() {
            initiative.push(InitiativeRoll {
                combatant: CombatantId(i as u32 + 1),
                roll: dice.d20(0).total,
                dexterity: enemy.attributes.dexterity,
            });
        }

        let names = enemies.iter().map(|e| e.name.as_str()).collect::<Vec<_>>().join(", ");
        let mut result = ResolutionResult::engine(ctx.intent.clone(), &ctx.actor.name)
            .with_seed(format!("{names} close in on {}", ctx.actor.name))
            .with_delta(StateDelta::StartEncounter { enemies, initiative })
            .with_source(source);
        result.target_name = Some(names);
        result.clamps = clamps;
        result
    }

    // ------------------------------------------------------------------------
    // Session creation
    // ------------------------------------------------------------------------

    /// A new character. The archetype's baseline is used as the fallback.
    pub async fn generate_character(&self, name: &str, archetype: Archetype) -> Character {
        let mut character = Character::new(name, archetype);
        let request = OracleRequest::GenerateCharacter {
            name: name.to_string(),
            archetype,
        };

        match self.ask::<CharacterReply>(&request).await {
            Ok(reply) => {
                let mut clamps = Vec::new();
                let hp = ranged("hit_points", reply.hit_points, 20, 50, &mut clamps);
                let mut attribute = |field: &str, value: i64| ranged(field, value, 1, 10, &mut clamps) as i32;
                let strength = attribute("strength", reply.strength);
                let dexterity = attribute("dexterity", reply.dexterity);
                let intelligence = attribute("intelligence", reply.intelligence);
                let charisma = attribute("charisma", reply.charisma);
                let defense = ranged("defense", reply.defense, 5, 15, &mut clamps) as i32;

                character.hit_points = HitPoints::new(hp as i32);
                character.attributes = Attributes::new(strength, dexterity, intelligence, charisma, defense);
                let abilities = names(reply.abilities);
                if !abilities.is_empty() {
                    character.abilities = abilities;
                }
                for item in names(reply.inventory) {
                    character.inventory.add_item(Item::new(item));
                }
            }
            Err(e) => {
                Self::fallback(&request, &e);
            }
        }
        character
    }

    /// Where a new story begins.
    pub async fn generate_start_location(&self) -> Location {
        let request = OracleRequest::GenerateLocation {
            from: None,
            known: Vec::new(),
            level: 1,
        };
        let reply = self.ask::<LocationReply>(&request).await.and_then(|r| {
            Ok(Location::new(required("location name", r.name)?, r.kind).with_description(r.description.trim()))
        });
        match reply {
            Ok(location) => location,
            Err(e) => {
                Self::fallback(&request, &e);
                starting_location()
            }
        }
    }
}

fn actor_view(actor: &Contestant) -> ActorView {
    ActorView {
        name: actor.name.clone(),
        attributes: actor.attributes,
        hit_points: actor.hit_points,
        status_effects: actor.status_effects.iter().copied().collect(),
    }
}

fn complete_quest(ctx: &CheckContext, state: &GameState, quest: QuestId) -> ResolutionResult {
    let title = state
        .world
        .quest(quest)
        .map(|q| q.title.clone())
        .unwrap_or_else(|| "an old promise".to_string());
    let mut result = ResolutionResult::engine(ctx.intent.clone(), &ctx.actor.name)
        .with_seed(format!("{} completes {title}", ctx.actor.name))
        .with_delta(StateDelta::SetQuestStatus {
            quest,
            status: QuestStatus::Completed,
        })
        .with_delta(StateDelta::GainExperience {
            amount: QUEST_EXPERIENCE,
        });
    result.target_name = Some(title);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{check_context, sample_combat_state, sample_state, LoadedDice, ScriptedRulesOracle};
    use std::time::Duration;

    fn adapter(oracle: ScriptedRulesOracle) -> (RulesAdapter, Arc<ScriptedRulesOracle>) {
        adapter_with(oracle, EngineConfig::default())
    }

    fn adapter_with(oracle: ScriptedRulesOracle, config: EngineConfig) -> (RulesAdapter, Arc<ScriptedRulesOracle>) {
        let oracle = Arc::new(oracle);
        (RulesAdapter::new(oracle.clone(), config), oracle)
    }

    fn goblin_fight() -> GameState {
        sample_combat_state(vec![Enemy::new("Goblin", 8, 3, 9)], &[15, 5])
    }

    fn attack() -> ActionIntent {
        ActionIntent::Attack { target: None }
    }

    #[tokio::test]
    async fn test_oracle_attack_is_applied() {
        let (rules, _) = adapter(ScriptedRulesOracle::new().reply(
            r#"{"success": true, "damage": 4, "effects": ["bleeding"], "narrationSeed": "A clean cut"}"#,
        ));
        let state = goblin_fight();
        let ctx = check_context(&state, attack(), Some(CombatantId(1)));
        let mut dice = LoadedDice::dice(&[]);

        let result = rules.adjudicate(ctx, &state, &mut dice).await;
        assert_eq!(result.source, ResolutionSource::Oracle);
        assert_eq!(result.damage, 4);
        assert_eq!(
            result.deltas,
            vec![
                StateDelta::Damage {
                    target: CombatantId(1),
                    amount: 4
                },
                StateDelta::ApplyStatus {
                    target: CombatantId(1),
                    status: StatusEffect::Bleeding
                },
            ]
        );
        assert!(result.consumes_turn);
    }

    #[tokio::test]
    async fn test_off_schema_reply_falls_back_to_dice() {
        for reply in [
            "The goblin reels from your blow!",
            r#"{"success": true, "damage": 4, "effects": [], "narrationSeed": "x", "crit": true}"#,
            r#"{"success": true, "damage": 4, "effects": ["cursed"], "narrationSeed": "x"}"#,
            r#"{"success": true, "effects": [], "narrationSeed": "x"}"#,
        ] {
            let (rules, _) = adapter(ScriptedRulesOracle::new().reply(reply));
            let state = goblin_fight();
            let ctx = check_context(&state, attack(), Some(CombatantId(1)));
            let mut dice = LoadedDice::dice(&[15]);

            let result = rules.adjudicate(ctx, &state, &mut dice).await;
            assert!(result.source.is_fallback(), "{reply}");
            assert!(result.success);
            assert_eq!(result.check.as_ref().unwrap().roll.total, 20);
            assert_eq!(result.damage, 5);
        }
    }

    #[tokio::test]
    async fn test_fenced_reply_is_accepted() {
        let (rules, _) = adapter(ScriptedRulesOracle::new().reply(
            "```json\n{\"success\": false, \"damage\": 0, \"effects\": [], \"narrationSeed\": \"Whiff\"}\n```",
        ));
        let state = goblin_fight();
        let ctx = check_context(&state, attack(), Some(CombatantId(1)));
        let result = rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[])).await;
        assert_eq!(result.source, ResolutionSource::Oracle);
        assert!(!result.success);
        assert!(result.deltas.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_values_are_clamped() {
        let config = EngineConfig::default().with_max_damage(10);
        let (rules, _) = adapter_with(
            ScriptedRulesOracle::new().reply(
                r#"{"success": true, "damage": 400, "healing": -3, "effects": [], "narrationSeed": "Boom"}"#,
            ),
            config,
        );
        let state = goblin_fight();
        let ctx = check_context(&state, attack(), Some(CombatantId(1)));
        let result = rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[])).await;

        assert_eq!(result.damage, 10);
        let fields: Vec<_> = result.clamps.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["damage", "healing"]);
    }

    #[tokio::test]
    async fn test_long_seed_is_truncated() {
        let seed = "a".repeat(400);
        let (rules, _) = adapter(ScriptedRulesOracle::new().reply(format!(
            r#"{{"success": true, "damage": 1, "effects": [], "narrationSeed": "{seed}"}}"#
        )));
        let state = goblin_fight();
        let ctx = check_context(&state, attack(), Some(CombatantId(1)));
        let result = rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[])).await;
        assert_eq!(result.narration_seed.chars().count(), 280);
    }

    #[tokio::test]
    async fn test_slow_oracle_times_out_to_fallback() {
        let config = EngineConfig::default().with_rules_timeout(Duration::from_millis(20));
        let (rules, _) = adapter_with(
            ScriptedRulesOracle::new().slow(
                Duration::from_millis(500),
                r#"{"success": true, "damage": 9, "effects": [], "narrationSeed": "late"}"#,
            ),
            config,
        );
        let state = goblin_fight();
        let ctx = check_context(&state, attack(), Some(CombatantId(1)));
        let result = rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[2])).await;
        assert!(result.source.is_fallback());
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_disclosure_policy_shapes_request() {
        for (policy, expected) in [
            (DisclosurePolicy::Full, "exact"),
            (DisclosurePolicy::Banded, "banded"),
            (DisclosurePolicy::Hidden, "hidden"),
        ] {
            let (rules, oracle) = adapter_with(
                ScriptedRulesOracle::new(),
                EngineConfig::default().with_disclosure(policy),
            );
            let state = goblin_fight();
            let ctx = check_context(&state, attack(), Some(CombatantId(1)));
            rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[1])).await;

            let sent = serde_json::to_value(&oracle.requests()[0]).unwrap();
            assert_eq!(sent["target"]["condition"]["disclosure"], expected);
            assert_eq!(sent["target"]["defense"], 9);
            assert_eq!(sent["actor"]["hit_points"]["current"], 10);
        }
    }

    #[tokio::test]
    async fn test_player_target_is_always_exact() {
        let (rules, oracle) = adapter_with(
            ScriptedRulesOracle::new(),
            EngineConfig::default().with_disclosure(DisclosurePolicy::Hidden),
        );
        let mut state = goblin_fight();
        state.encounter.as_mut().unwrap().cursor = 1;
        let ctx = check_context_for(&state, CombatantId(1), attack(), Some(CombatantId::PLAYER));
        rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[1])).await;

        let sent = serde_json::to_value(&oracle.requests()[0]).unwrap();
        assert_eq!(sent["target"]["condition"]["disclosure"], "exact");
    }

    fn check_context_for(
        state: &GameState,
        actor: CombatantId,
        intent: ActionIntent,
        target: Option<CombatantId>,
    ) -> CheckContext {
        let mut ctx = check_context(state, intent, target);
        ctx.actor = state.contestant(actor).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_defend_never_consults_oracle() {
        let (rules, oracle) = adapter(ScriptedRulesOracle::new());
        let state = goblin_fight();
        let ctx = check_context(&state, ActionIntent::Defend, None);
        let result = rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[])).await;

        assert!(oracle.requests().is_empty());
        assert_eq!(result.source, ResolutionSource::Engine);
        assert_eq!(
            result.deltas,
            vec![StateDelta::ApplyStatus {
                target: CombatantId::PLAYER,
                status: StatusEffect::Guarded
            }]
        );
    }

    #[tokio::test]
    async fn test_encounter_generation_is_bounded() {
        let (rules, _) = adapter(ScriptedRulesOracle::new().reply(
            r#"{"enemies": [
                {"name": "Wolf", "hitPoints": 500, "attack": 3, "defense": 2, "dexterity": 7},
                {"name": "Wolf", "hitPoints": 10, "attack": 3, "defense": 8, "dexterity": 7},
                {"name": "Wolf", "hitPoints": 10, "attack": 3, "defense": 8, "dexterity": 7},
                {"name": "Wolf", "hitPoints": 10, "attack": 3, "defense": 8, "dexterity": 7},
                {"name": "Wolf", "hitPoints": 10, "attack": 3, "defense": 8, "dexterity": 7}
            ]}"#,
        ));
        let state = sample_state();
        let ctx = check_context(&state, ActionIntent::SeekCombat, None);
        let mut dice = LoadedDice::dice(&[10, 9, 8, 7, 6]);
        let result = rules.adjudicate(ctx, &state, &mut dice).await;

        let StateDelta::StartEncounter { enemies, initiative } = &result.deltas[0] else {
            panic!("expected an encounter, got {:?}", result.deltas);
        };
        assert_eq!(enemies.len(), MAX_ENEMIES);
        assert_eq!(enemies[0].hit_points.maximum, 80);
        assert_eq!(enemies[0].attributes.defense, 5);
        assert_eq!(initiative.len(), MAX_ENEMIES + 1);
        assert_eq!(initiative[0].combatant, CombatantId::PLAYER);
        assert_eq!(initiative[0].roll, 10);
        assert_eq!(result.clamps.len(), 3);
    }

    #[tokio::test]
    async fn test_encounter_fallback_is_void_creature() {
        let (rules, _) = adapter(ScriptedRulesOracle::new().reply(r#"{"enemies": []}"#));
        let state = sample_state();
        let ctx = check_context(&state, ActionIntent::SeekCombat, None);
        let result = rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[12, 3])).await;

        assert!(result.source.is_fallback());
        let StateDelta::StartEncounter { enemies, initiative } = &result.deltas[0] else {
            panic!("expected an encounter");
        };
        assert_eq!(enemies[0].name, "Void Creature");
        assert_eq!(enemies[0].hit_points.maximum, 30);
        assert_eq!(initiative.iter().map(|r| r.roll).collect::<Vec<_>>(), vec![12, 3]);
    }

    #[tokio::test]
    async fn test_explore_fallback_adds_and_moves() {
        let (rules, _) = adapter(ScriptedRulesOracle::new().fail(OracleError::Unavailable("down".to_string())));
        let state = sample_state();
        let ctx = check_context(&state, ActionIntent::Explore, None);
        let result = rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[2, 1])).await;

        let StateDelta::DiscoverLocation { location } = &result.deltas[0] else {
            panic!("expected a discovery");
        };
        assert_eq!(location.kind, LocationKind::Forest);
        assert_eq!(location.name, "Ashen Wood");
        assert_eq!(result.deltas[1], StateDelta::MoveTo { location: location.id });
        assert!(!result.consumes_turn);
    }

    #[tokio::test]
    async fn test_meet_uses_oracle_npc() {
        let (rules, _) = adapter(ScriptedRulesOracle::new().reply(
            r#"{"name": "Oren", "role": "smith", "persona": "Gruff", "disposition": "friendly"}"#,
        ));
        let state = sample_state();
        let ctx = check_context(&state, ActionIntent::Meet, None);
        let result = rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[])).await;

        let StateDelta::RegisterNpc { npc } = &result.deltas[0] else {
            panic!("expected an npc");
        };
        assert_eq!(npc.name, "Oren");
        assert_eq!(npc.disposition, Disposition::Friendly);
        assert_eq!(npc.location, state.world.current_location);
    }

    #[tokio::test]
    async fn test_quest_given_by_local_npc() {
        let (rules, oracle) = adapter(ScriptedRulesOracle::new());
        let mut state = sample_state();
        let npc = Npc::new("Veyra", "wanderer", state.world.current_location);
        let npc_id = npc.id;
        state.world.add_npc(npc).unwrap();

        let ctx = check_context(&state, ActionIntent::SeekQuest, None);
        let result = rules.adjudicate(ctx, &state, &mut LoadedDice::dice(&[1])).await;

        let StateDelta::AddQuest { quest } = &result.deltas[0] else {
            panic!("expected a quest");
        };
        assert_eq!(quest.giver, Some(npc_id));
        assert_eq!(quest.title, "The Hollow Bell");
        let sent = serde_json::to_value(&oracle.requests()[0]).unwrap();
        assert_eq!(sent["giver"], "Veyra");
    }

    #[tokio::test]
    async fn test_enemy_action_proposal() {
        let state = goblin_fight();
        let (rules, _) = adapter(ScriptedRulesOracle::new().reply(r#"{"intent": "defend"}"#));
        assert_eq!(
            rules.propose_enemy_action(&state, CombatantId(1)).await,
            ActionIntent::Defend
        );

        let (rules, _) = adapter(ScriptedRulesOracle::new().reply(r#"{"intent": "dance"}"#));
        assert_eq!(
            rules.propose_enemy_action(&state, CombatantId(1)).await,
            ActionIntent::Attack { target: None }
        );
    }

    #[tokio::test]
    async fn test_generated_character_is_clamped() {
        let (rules, _) = adapter(ScriptedRulesOracle::new().reply(
            r#"{"hitPoints": 99, "strength": 12, "dexterity": 4, "intelligence": 0, "charisma": 5, "defense": 9,
                "abilities": ["Riposte"], "inventory": ["Rope", "Rope"]}"#,
        ));
        let character = rules.generate_character("Ash", Archetype::Rogue).await;
        assert_eq!(character.hit_points, HitPoints::new(50));
        assert_eq!(character.attributes.strength, 10);
        assert_eq!(character.attributes.intelligence, 1);
        assert_eq!(character.abilities, vec!["Riposte".to_string()]);
        assert_eq!(character.inventory.find_item("rope").unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_generation_fallbacks_without_oracle() {
        let (rules, _) = adapter(ScriptedRulesOracle::new());
        let character = rules.generate_character("Ash", Archetype::Mage).await;
        assert_eq!(character.hit_points.maximum, Archetype::Mage.base_hit_points());
        assert_eq!(rules.generate_start_location().await.name, "Emberfall");
    }
}
