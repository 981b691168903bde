//! Testing utilities for Voidwalkers.
//!
//! This module provides tools for deterministic testing without network
//! access:
//! - `LoadedDice` for fixed die faces
//! - `ScriptedRulesOracle` / `ScriptedNarrator` for canned oracle replies
//! - `MemorySaveStore` with failure injection
//! - `TestHarness` for scripted game scenarios, plus assertion helpers

use crate::action::{ActionIntent, ActionRequest};
use crate::config::EngineConfig;
use crate::dice::{Dice, DiceState, DieSource};
use crate::engine::TurnEngine;
use crate::oracle::{NarrationRequest, NarrativeOracle, OracleError, OracleRequest, Oracles, RulesOracle};
use crate::persist::{PersistError, SaveInfo, SaveSlot, SaveState, SaveStore};
use crate::rules::CheckContext;
use crate::session::{GameSession, Response, SessionError};
use crate::store::GameState;
use crate::world::{
    Archetype, Attributes, Character, CombatantId, Encounter, Enemy, HitPoints, InitiativeRoll, Location,
    LocationKind, WorldState,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::Poll;
use std::time::Duration;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Dice
// ============================================================================

/// Dice that produce a fixed sequence of faces, cycling when exhausted.
///
/// Faces are clamped to the die being rolled. An empty sequence always
/// rolls 1.
pub struct LoadedDice {
    faces: Vec<u32>,
    seed: u64,
    pos: usize,
}

impl LoadedDice {
    pub fn new(faces: &[u32]) -> Self {
        Self {
            faces: faces.to_vec(),
            seed: 0,
            pos: 0,
        }
    }

    pub fn dice(faces: &[u32]) -> Dice {
        Dice::new(Box::new(Self::new(faces)))
    }
}

impl DieSource for LoadedDice {
    fn face(&mut self, sides: u32) -> u32 {
        let face = if self.faces.is_empty() {
            1
        } else {
            self.faces[self.pos % self.faces.len()]
        };
        self.pos += 1;
        face.clamp(1, sides)
    }

    fn state(&self) -> Option<DiceState> {
        Some(DiceState {
            seed: self.seed,
            draws: self.pos as u64,
        })
    }

    fn restore(&mut self, state: &DiceState) {
        self.seed = state.seed;
        self.pos = state.draws as usize;
    }
}

// ============================================================================
// Oracles
// ============================================================================

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(OracleError),
    Slow(Duration, String),
}

/// Shared script and request log of both scripted oracles.
struct Script<R> {
    steps: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<R>>,
}

impl<R: Clone> Script<R> {
    fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, step: Scripted) {
        locked(&self.steps).push_back(step);
    }

    async fn answer(&self, request: &R) -> Result<String, OracleError> {
        locked(&self.requests).push(request.clone());
        let step = locked(&self.steps).pop_front();
        match step {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(e)) => Err(e),
            Some(Scripted::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(OracleError::Unavailable("script exhausted".to_string())),
        }
    }

    fn requests(&self) -> Vec<R> {
        locked(&self.requests).clone()
    }
}

/// A rules oracle that replays canned replies in order.
///
/// Once the script runs out every call is `Unavailable`.
pub struct ScriptedRulesOracle {
    script: Script<OracleRequest>,
}

impl ScriptedRulesOracle {
    pub fn new() -> Self {
        Self { script: Script::new() }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push_reply(text);
        self
    }

    pub fn fail(self, error: OracleError) -> Self {
        self.script.push(Scripted::Fail(error));
        self
    }

    /// Answer with `text` after sleeping for `delay`.
    pub fn slow(self, delay: Duration, text: impl Into<String>) -> Self {
        self.script.push(Scripted::Slow(delay, text.into()));
        self
    }

    /// Queue a reply on a shared oracle.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.script.push(Scripted::Reply(text.into()));
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<OracleRequest> {
        self.script.requests()
    }
}

impl Default for ScriptedRulesOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RulesOracle for ScriptedRulesOracle {
    async fn consult(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.script.answer(request).await
    }
}

/// A narrative oracle that replays canned narration in order.
pub struct ScriptedNarrator {
    script: Script<NarrationRequest>,
}

impl ScriptedNarrator {
    pub fn new() -> Self {
        Self { script: Script::new() }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push_reply(text);
        self
    }

    pub fn fail(self, error: OracleError) -> Self {
        self.script.push(Scripted::Fail(error));
        self
    }

    pub fn slow(self, delay: Duration, text: impl Into<String>) -> Self {
        self.script.push(Scripted::Slow(delay, text.into()));
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.script.push(Scripted::Reply(text.into()));
    }

    pub fn requests(&self) -> Vec<NarrationRequest> {
        self.script.requests()
    }
}

impl Default for ScriptedNarrator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NarrativeOracle for ScriptedNarrator {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String, OracleError> {
        self.script.answer(request).await
    }
}

// ============================================================================
// Saves
// ============================================================================

/// In-memory save store. Saves can be made to fail on demand.
#[derive(Default)]
pub struct MemorySaveStore {
    slots: Mutex<BTreeMap<SaveSlot, SaveState>>,
    failing: AtomicBool,
    fail_after: Mutex<Option<usize>>,
    writes: AtomicUsize,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every `save` fails with an IO error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Let `writes` more saves succeed, then fail every one after that.
    /// `None` lifts the limit.
    pub fn fail_after(&self, writes: Option<usize>) {
        *locked(&self.fail_after) = writes.map(|n| self.writes() + n);
    }

    /// Number of successful saves.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn stored(&self, slot: &SaveSlot) -> Option<SaveState> {
        locked(&self.slots).get(slot).cloned()
    }
}

#[async_trait]
impl SaveStore for MemorySaveStore {
    async fn save(&self, slot: &SaveSlot, save: &SaveState) -> Result<(), PersistError> {
        let limit_reached = locked(&self.fail_after).is_some_and(|limit| self.writes() >= limit);
        if self.failing.load(Ordering::SeqCst) || limit_reached {
            return Err(PersistError::Io(std::io::Error::other("injected save failure")));
        }
        locked(&self.slots).insert(slot.clone(), save.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, slot: &SaveSlot) -> Result<SaveState, PersistError> {
        let save = self.stored(slot).ok_or_else(|| PersistError::NotFound(slot.clone()))?;
        save.state.validate()?;
        Ok(save)
    }

    async fn exists(&self, slot: &SaveSlot) -> bool {
        locked(&self.slots).contains_key(slot)
    }

    async fn list(&self) -> Result<Vec<SaveInfo>, PersistError> {
        let mut saves: Vec<SaveInfo> = locked(&self.slots)
            .values()
            .map(|save| SaveInfo {
                slot: save.slot.clone(),
                metadata: save.metadata.clone(),
            })
            .collect();
        saves.sort_by(|a, b| b.metadata.saved_at.cmp(&a.metadata.saved_at));
        Ok(saves)
    }

    async fn delete(&self, slot: &SaveSlot) -> Result<(), PersistError> {
        locked(&self.slots)
            .remove(slot)
            .map(|_| ())
            .ok_or_else(|| PersistError::NotFound(slot.clone()))
    }
}

/// Poll a future once and drop it, the way a caller that gives up mid-turn
/// would. `None` if it was still pending.
pub async fn poll_once<F: Future>(fut: F) -> Option<F::Output> {
    let mut fut = std::pin::pin!(fut);
    std::future::poll_fn(|cx| match fut.as_mut().poll(cx) {
        Poll::Ready(v) => Poll::Ready(Some(v)),
        Poll::Pending => Poll::Ready(None),
    })
    .await
}

// ============================================================================
// Sample state
// ============================================================================

/// Ash, a level 1 Rogue with 10/10 HP, Strength 5 and Dexterity 9, standing
/// in the village of Emberfall.
pub fn sample_state() -> GameState {
    let mut character = Character::new("Ash", Archetype::Rogue);
    character.hit_points = HitPoints::new(10);
    character.attributes = Attributes::new(5, 9, 4, 6, 10);

    let start = Location::new("Emberfall", LocationKind::Village)
        .with_description("Smoke curls from a dozen chimneys under a bruised violet sky.");
    GameState::new(character, WorldState::new(start), DiceState { seed: 7, draws: 0 })
}

/// `sample_state` with an encounter against `enemies`. `rolls` are initiative
/// rolls, the player's first and then each enemy's in order.
pub fn sample_combat_state(enemies: Vec<Enemy>, rolls: &[i32]) -> GameState {
    let mut state = sample_state();
    let mut dexterities = vec![state.character.attributes.dexterity];
    dexterities.extend(enemies.iter().map(|e| e.attributes.dexterity));

    let initiative: Vec<InitiativeRoll> = rolls
        .iter()
        .zip(dexterities)
        .enumerate()
        .map(|(i, (roll, dexterity))| InitiativeRoll {
            combatant: CombatantId(i as u32),
            roll: *roll,
            dexterity,
        })
        .collect();
    state.encounter = Some(Encounter::begin(&state.character, enemies, &initiative));
    state
}

/// A check context for the player acting in `state`.
pub fn check_context(state: &GameState, intent: ActionIntent, target: Option<CombatantId>) -> CheckContext {
    let actor = match state.contestant(CombatantId::PLAYER) {
        Some(actor) => actor,
        None => panic!("sample state has no player"),
    };
    CheckContext {
        intent,
        actor,
        target: target.and_then(|id| state.contestant(id)),
        in_combat: state.in_combat(),
        location_id: state.world.current_location,
        location: state.world.current_name().to_string(),
    }
}

// ============================================================================
// Harness
// ============================================================================

fn harness_slot() -> SaveSlot {
    match SaveSlot::new("harness") {
        Ok(slot) => slot,
        Err(e) => panic!("harness slot: {e}"),
    }
}

/// Test harness for running game scenarios against scripted oracles.
pub struct TestHarness {
    pub rules: Arc<ScriptedRulesOracle>,
    pub narrator: Arc<ScriptedNarrator>,
    pub saves: Arc<MemorySaveStore>,
    pub session: GameSession,
}

impl TestHarness {
    /// A harness around `sample_state` with dice that always roll `faces`.
    pub fn new(faces: &[u32]) -> Self {
        Self::with_state(sample_state(), faces)
    }

    pub fn with_state(state: GameState, faces: &[u32]) -> Self {
        Self::with_config(state, faces, EngineConfig::default())
    }

    pub fn with_config(state: GameState, faces: &[u32], config: EngineConfig) -> Self {
        let rules = Arc::new(ScriptedRulesOracle::new());
        let narrator = Arc::new(ScriptedNarrator::new());
        let saves = Arc::new(MemorySaveStore::new());
        let oracles = Oracles::new(rules.clone(), narrator.clone());

        let mut dice = LoadedDice::dice(faces);
        dice.restore(&state.dice);
        let engine = TurnEngine::new(config, &oracles, saves.clone(), harness_slot(), dice);

        Self {
            rules,
            narrator,
            saves,
            session: GameSession::from_parts(state, engine),
        }
    }

    /// Queue a rules oracle reply.
    pub fn expect_rules(&mut self, reply: impl Into<String>) -> &mut Self {
        self.rules.push_reply(reply);
        self
    }

    /// Queue a narration.
    pub fn expect_narration(&mut self, text: impl Into<String>) -> &mut Self {
        self.narrator.push_reply(text);
        self
    }

    /// Send free-form player input.
    pub async fn input(&mut self, text: &str) -> Result<Response, SessionError> {
        self.session.act(ActionRequest::text(text)).await
    }

    pub async fn act(&mut self, request: impl Into<ActionRequest>) -> Result<Response, SessionError> {
        self.session.act(request.into()).await
    }

    pub fn state(&self) -> &GameState {
        self.session.state()
    }

    pub fn player_hp(&self) -> (i32, i32) {
        self.session.hp_status()
    }

    pub fn in_combat(&self) -> bool {
        self.session.in_combat()
    }

    /// Current HP of the named enemy in the active encounter.
    pub fn enemy_hp(&self, name: &str) -> Option<i32> {
        let encounter = self.state().encounter.as_ref()?;
        encounter
            .enemies()
            .find(|(id, _)| encounter.name_of(*id) == name)
            .map(|(_, enemy)| enemy.hit_points.current)
    }

    /// Narration of the most recent turn.
    pub fn last_narration(&self) -> Option<&str> {
        self.state().log.last().map(|r| r.narration.as_str())
    }

    /// The saved state in the harness slot.
    pub fn saved(&self) -> Option<GameState> {
        self.saves.stored(&harness_slot()).map(|s| s.state)
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert player HP is at expected values.
#[track_caller]
pub fn assert_hp(harness: &TestHarness, current: i32, max: i32) {
    let (actual_current, actual_max) = harness.player_hp();
    assert_eq!(
        (actual_current, actual_max),
        (current, max),
        "Expected HP {current}/{max}, got {actual_current}/{actual_max}"
    );
}

#[track_caller]
pub fn assert_in_combat(harness: &TestHarness) {
    assert!(harness.in_combat(), "Expected to be in combat");
}

#[track_caller]
pub fn assert_not_in_combat(harness: &TestHarness) {
    assert!(!harness.in_combat(), "Expected to NOT be in combat");
}

/// Assert the live state matches what was last saved.
#[track_caller]
pub fn assert_persisted(harness: &TestHarness) {
    assert_eq!(
        harness.saved().as_ref(),
        Some(harness.state()),
        "Expected the live state to be saved"
    );
}

#[track_caller]
pub fn assert_has_item(harness: &TestHarness, name: &str) {
    assert!(
        harness.state().character.inventory.has_item(name),
        "Expected '{name}' in the inventory"
    );
}
