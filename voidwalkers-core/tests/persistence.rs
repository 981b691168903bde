//! Sessions saved to disk and resumed.
//!
//! Run with: `cargo test -p voidwalkers-core --test persistence`

use std::sync::Arc;
use tempfile::TempDir;
use voidwalkers_core::action::ActionTag;
use voidwalkers_core::persist::{PersistError, SaveState};
use voidwalkers_core::testing::sample_combat_state;
use voidwalkers_core::world::Enemy;
use voidwalkers_core::{Archetype, EngineConfig, FileSaveStore, GameSession, Oracles, SaveSlot, SaveStore, SessionConfig, SessionError};

fn config(slot: &str) -> SessionConfig {
    SessionConfig::new(SaveSlot::new(slot).unwrap())
        .with_character_name("Ash")
        .with_archetype(Archetype::Ranger)
        .with_engine_config(EngineConfig::default().with_seed(1234))
}

#[tokio::test]
async fn test_resume_from_disk() {
    let dir = TempDir::new().unwrap();
    let saves = Arc::new(FileSaveStore::new(dir.path()));

    let mut session = GameSession::create(config("ranger"), &Oracles::offline(), saves.clone())
        .await
        .unwrap();
    session.act(ActionTag::Explore.into()).await.unwrap();
    session.act(ActionTag::Meet.into()).await.unwrap();
    session.act(ActionTag::SeekQuest.into()).await.unwrap();
    let played = session.state().clone();
    drop(session);

    let resumed = GameSession::create_or_load(config("ranger"), &Oracles::offline(), saves)
        .await
        .unwrap();
    assert_eq!(resumed.state(), &played);
    assert_eq!(resumed.state().turn, 3);
    assert_eq!(resumed.state().log.len(), 3);
    assert_eq!(resumed.state().world.quests.len(), 1);
}

#[tokio::test]
async fn test_resumed_dice_continue_the_sequence() {
    let dir = TempDir::new().unwrap();
    let saves = Arc::new(FileSaveStore::new(dir.path()));

    // one uninterrupted session
    let mut straight = GameSession::create(config("a"), &Oracles::offline(), saves.clone()).await.unwrap();
    straight.act(ActionTag::Explore.into()).await.unwrap();
    straight.act(ActionTag::Explore.into()).await.unwrap();

    // the same game, reloaded between turns
    let mut first = GameSession::create(config("b"), &Oracles::offline(), saves.clone()).await.unwrap();
    first.act(ActionTag::Explore.into()).await.unwrap();
    drop(first);
    let mut second = GameSession::load(config("b"), &Oracles::offline(), saves).await.unwrap();
    second.act(ActionTag::Explore.into()).await.unwrap();

    assert_eq!(straight.state().dice, second.state().dice);
    assert_eq!(
        straight.state().world.current_name(),
        second.state().world.current_name()
    );
}

#[tokio::test]
async fn test_resume_with_enemy_up_catches_up() {
    let dir = TempDir::new().unwrap();
    let saves = Arc::new(FileSaveStore::new(dir.path()));
    let slot = SaveSlot::new("ambush").unwrap();
    // saved after the player's turn, before the Goblin's
    let state = sample_combat_state(vec![Enemy::new("Goblin", 8, 3, 9)], &[5, 15]);
    saves.save(&slot, &SaveState::capture(&slot, &state)).await.unwrap();

    let mut session = GameSession::load(config("ambush"), &Oracles::offline(), saves.clone())
        .await
        .unwrap();
    assert_eq!(session.state().turn, 1);
    assert!(session.is_player_turn());

    for action in ["defend", "look around"] {
        let response = session.act_text(action).await.unwrap();
        assert_eq!(response.turns[0].result.actor_name, "Ash");
    }
    assert_eq!(saves.load(&slot).await.unwrap().state, session.state().clone());
}

#[tokio::test]
async fn test_failed_write_keeps_prior_save() {
    let dir = TempDir::new().unwrap();
    let saves = Arc::new(FileSaveStore::new(dir.path()));
    let mut session = GameSession::create(config("ranger"), &Oracles::offline(), saves.clone())
        .await
        .unwrap();
    let before = saves.load(&SaveSlot::new("ranger").unwrap()).await.unwrap();

    // a directory where the temp file should go makes the write fail
    std::fs::create_dir(dir.path().join("ranger.json.tmp")).unwrap();
    let result = session.act(ActionTag::Explore.into()).await;

    assert!(matches!(result, Err(SessionError::Persistence(_))));
    assert_eq!(session.state().turn, 0);
    let after = saves.load(&SaveSlot::new("ranger").unwrap()).await.unwrap();
    assert_eq!(after.state, before.state);
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let saves = Arc::new(FileSaveStore::new(dir.path()));
    let session = GameSession::create(config("old"), &Oracles::offline(), saves.clone()).await.unwrap();

    let mut save = SaveState::capture(session.slot(), session.state());
    save.version = 99;
    std::fs::write(dir.path().join("old.json"), save.to_json().unwrap()).unwrap();

    let result = GameSession::load(config("old"), &Oracles::offline(), saves).await;
    assert!(matches!(
        result,
        Err(SessionError::Persistence(PersistError::VersionMismatch { found: 99, .. }))
    ));
}

#[tokio::test]
async fn test_slots_are_listed() {
    let dir = TempDir::new().unwrap();
    let saves = Arc::new(FileSaveStore::new(dir.path()));
    GameSession::create(config("one"), &Oracles::offline(), saves.clone()).await.unwrap();
    let session = GameSession::create(config("two"), &Oracles::offline(), saves.clone()).await.unwrap();

    let listed = session.list_saves().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|s| s.metadata.character_name == "Ash"));

    saves.delete(&SaveSlot::new("one").unwrap()).await.unwrap();
    assert!(!saves.exists(&SaveSlot::new("one").unwrap()).await);
}
