//! Integration tests that call real oracle endpoints.
//!
//! These tests require ANTHROPIC_API_KEY (or the RULES_ORACLE_* and
//! NARRATIVE_ORACLE_* variables) to be set, via .env file or environment.
//! Run with: `cargo test -p voidwalkers-core --test live_oracles -- --ignored --nocapture`

use std::sync::Arc;
use voidwalkers_core::action::ActionTag;
use voidwalkers_core::testing::MemorySaveStore;
use voidwalkers_core::{Archetype, GameSession, NarrationSource, Oracles, SaveSlot, SessionConfig};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok() || std::env::var("RULES_ORACLE_API_KEY").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_live_session_plays_a_fight() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: no oracle API key set");
        return;
    }

    let config = SessionConfig::new(SaveSlot::new("live").unwrap())
        .with_character_name("Ash")
        .with_archetype(Archetype::Mage);
    let mut session = GameSession::create(config, &Oracles::from_env(), Arc::new(MemorySaveStore::new()))
        .await
        .expect("session should start");
    println!("=== Intro ===\n{}", session.intro());

    let response = session.act(ActionTag::SeekCombat.into()).await.expect("turn should persist");
    println!("\n=== Seek combat ===\n{}", response.narrative);
    assert!(session.in_combat() || session.is_over());

    while session.in_combat() && !session.is_over() {
        let response = session.act_text("attack").await.expect("turn should persist");
        println!("\n=== Attack ===\n{}", response.narrative);
        let (hp, max) = response.hp;
        assert!((0..=max).contains(&hp));
    }
}

#[tokio::test]
#[ignore]
async fn test_live_narration_is_capped() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: no oracle API key set");
        return;
    }

    let config = SessionConfig::new(SaveSlot::new("live-narration").unwrap());
    let cap = config.engine.narration_cap;
    let mut session = GameSession::create(config, &Oracles::from_env(), Arc::new(MemorySaveStore::new()))
        .await
        .expect("session should start");

    let response = session.act_text("Study the old runes on the well").await.expect("turn should persist");
    let turn = &response.turns[0];
    println!("[{:?}] {}", turn.narration.source, turn.narration.text);
    assert!(turn.narration.text.chars().count() <= cap);
    if turn.narration.source == NarrationSource::Oracle {
        assert!(!turn.narration.text.trim().is_empty());
    }
}
