//! GameSession - the primary public API for Voidwalkers.
//!
//! A session owns the live state of one save slot and the turn engine that
//! advances it. Lifecycle: create or load, then any number of `act` calls.
//! Every committed turn is already on disk when `act` returns.

use crate::action::ActionRequest;
use crate::combat::CombatController;
use crate::config::{ConfigError, EngineConfig};
use crate::dice::Dice;
use crate::engine::{TurnEngine, TurnError, TurnOutcome};
use crate::oracle::Oracles;
use crate::persist::{PersistError, SaveInfo, SaveSlot, SaveState, SaveStore};
use crate::store::{GameState, StateStore};
use crate::world::{Archetype, CombatantId, WorldState};
use std::sync::Arc;
use thiserror::Error;

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    InvalidAction(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<TurnError> for SessionError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::InvalidAction(reason) => SessionError::InvalidAction(reason),
            TurnError::Persistence(e) => SessionError::Persistence(e),
        }
    }
}

/// Configuration for creating or loading a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Save slot the session reads and writes.
    pub slot: SaveSlot,

    /// Name for a newly created character.
    pub character_name: String,

    pub archetype: Archetype,

    pub engine: EngineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slot: SaveSlot::autosave(),
            character_name: "Wanderer".to_string(),
            archetype: Archetype::Warrior,
            engine: EngineConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(slot: SaveSlot) -> Self {
        Self {
            slot,
            ..Self::default()
        }
    }

    /// Default session settings with engine overrides read from the
    /// environment.
    pub fn from_env(slot: SaveSlot) -> Result<Self, SessionError> {
        Ok(Self::new(slot).with_engine_config(EngineConfig::from_env()?))
    }

    pub fn with_character_name(mut self, name: impl Into<String>) -> Self {
        self.character_name = name.into();
        self
    }

    pub fn with_archetype(mut self, archetype: Archetype) -> Self {
        self.archetype = archetype;
        self
    }

    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

/// What one player action produced.
#[derive(Debug, Clone)]
pub struct Response {
    /// Narration of every turn that ran, in order.
    pub narrative: String,

    /// The player's turn followed by any enemy or encounter-closing turns.
    pub turns: Vec<TurnOutcome>,

    pub in_combat: bool,

    pub is_player_turn: bool,

    /// (current, maximum)
    pub hp: (i32, i32),
}

/// One playable session bound to a save slot.
pub struct GameSession {
    store: StateStore,
    engine: TurnEngine,
}

impl GameSession {
    /// Start a new game in the configured slot, replacing any save there.
    ///
    /// The character and starting location come from the rules oracle when
    /// it answers and from the built-in tables otherwise.
    pub async fn create(config: SessionConfig, oracles: &Oracles, saves: Arc<dyn SaveStore>) -> Result<Self, SessionError> {
        let dice = match config.engine.dice_seed {
            Some(seed) => Dice::seeded(seed),
            None => Dice::random(),
        };
        let dice_state = dice.state().ok_or_else(|| ConfigError::Invalid {
            key: "dice".to_string(),
            value: "unseeded".to_string(),
        })?;

        let mut engine = TurnEngine::new(config.engine, oracles, saves, config.slot, dice);
        let character = engine
            .rules()
            .generate_character(&config.character_name, config.archetype)
            .await;
        let start = engine.rules().generate_start_location().await;
        let mut state = GameState::new(character, WorldState::new(start), dice_state);
        state.world.intro = engine.narrator().introduce(&state).await.text;

        let save = SaveState::capture(engine.slot(), &state);
        engine.saves().save(engine.slot(), &save).await?;
        // keep the engine's dice in step with what was saved
        engine.dice_mut().restore(&state.dice);

        tracing::info!(
            slot = %engine.slot(),
            character = %state.character.name,
            archetype = %state.character.archetype,
            location = %state.world.current_name(),
            "new game created"
        );
        Ok(Self {
            store: StateStore::new(state),
            engine,
        })
    }

    /// Resume the game saved in the configured slot.
    pub async fn load(config: SessionConfig, oracles: &Oracles, saves: Arc<dyn SaveStore>) -> Result<Self, SessionError> {
        let save = saves.load(&config.slot).await?;
        let dice = Dice::from_state(&save.state.dice);
        tracing::info!(slot = %config.slot, turn = save.state.turn, "game loaded");

        let mut session = Self {
            store: StateStore::new(save.state),
            engine: TurnEngine::new(config.engine, oracles, saves, config.slot, dice),
        };
        // a failure here is retried by the next `act`
        if let Err(e) = session.settle().await {
            tracing::warn!(error = %e, "could not catch up on pending combat turns");
        }
        Ok(session)
    }

    /// Load the slot if it holds a save, otherwise create a new game there.
    pub async fn create_or_load(
        config: SessionConfig,
        oracles: &Oracles,
        saves: Arc<dyn SaveStore>,
    ) -> Result<Self, SessionError> {
        if saves.exists(&config.slot).await {
            Self::load(config, oracles, saves).await
        } else {
            Self::create(config, oracles, saves).await
        }
    }

    /// Assemble a session from an existing state and engine.
    pub fn from_parts(state: GameState, engine: TurnEngine) -> Self {
        Self {
            store: StateStore::new(state),
            engine,
        }
    }

    /// Run one player action, then every enemy turn up to the player's next
    /// turn, closing the encounter if it ended.
    ///
    /// Enemy turns still owed from an interrupted `act` or a resumed save run
    /// first and are included in the response.
    pub async fn act(&mut self, request: ActionRequest) -> Result<Response, SessionError> {
        let mut turns = self.settle().await?;
        turns.push(self.engine.run_turn(&mut self.store, request).await?);
        turns.extend(CombatController::advance(&mut self.engine, &mut self.store).await?);

        let narrative = turns
            .iter()
            .map(|t| t.narration.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(Response {
            narrative,
            turns,
            in_combat: self.in_combat(),
            is_player_turn: self.is_player_turn(),
            hp: self.hp_status(),
        })
    }

    /// Play out whatever stands between the committed state and the
    /// player's turn: enemies that are up, or a decided encounter that was
    /// never closed. Does nothing outside combat.
    pub async fn settle(&mut self) -> Result<Vec<TurnOutcome>, SessionError> {
        let turns = CombatController::advance(&mut self.engine, &mut self.store).await?;
        if !turns.is_empty() {
            tracing::info!(turns = turns.len(), turn = self.store.state().turn, "caught up on pending combat turns");
        }
        Ok(turns)
    }

    /// Convenience for free-form text input.
    pub async fn act_text(&mut self, input: &str) -> Result<Response, SessionError> {
        self.act(ActionRequest::text(input)).await
    }

    /// Replace this session's game with a fresh one in the same slot.
    pub async fn new_game(&mut self, config: SessionConfig, oracles: &Oracles) -> Result<(), SessionError> {
        let config = SessionConfig {
            slot: self.engine.slot().clone(),
            ..config
        };
        *self = Self::create(config, oracles, self.engine.saves().clone()).await?;
        Ok(())
    }

    pub async fn list_saves(&self) -> Result<Vec<SaveInfo>, SessionError> {
        Ok(self.engine.saves().list().await?)
    }

    pub fn state(&self) -> &GameState {
        self.store.state()
    }

    pub fn intro(&self) -> &str {
        &self.store.state().world.intro
    }

    pub fn slot(&self) -> &SaveSlot {
        self.engine.slot()
    }

    pub fn engine(&self) -> &TurnEngine {
        &self.engine
    }

    pub fn in_combat(&self) -> bool {
        self.store.state().in_combat()
    }

    /// True outside combat, or when the player is the current actor.
    pub fn is_player_turn(&self) -> bool {
        match &self.store.state().encounter {
            Some(encounter) => encounter.current_actor() == Some(CombatantId::PLAYER),
            None => true,
        }
    }

    pub fn hp_status(&self) -> (i32, i32) {
        let hp = &self.store.state().character.hit_points;
        (hp.current, hp.maximum)
    }

    pub fn is_over(&self) -> bool {
        self.store.state().character.is_dead()
    }
}
