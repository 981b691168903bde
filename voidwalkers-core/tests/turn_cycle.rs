//! Turn cycle scenarios driven through `TestHarness`.
//!
//! Run with: `cargo test -p voidwalkers-core --test turn_cycle`

use voidwalkers_core::action::ActionTag;
use voidwalkers_core::rules::ResolutionSource;
use voidwalkers_core::testing::{
    assert_hp, assert_in_combat, assert_not_in_combat, assert_persisted, sample_combat_state, TestHarness,
};
use voidwalkers_core::world::{CombatantId, Enemy};
use voidwalkers_core::{NarrationSource, SessionError, TurnPhase};

fn goblin_fight(faces: &[u32]) -> TestHarness {
    TestHarness::with_state(sample_combat_state(vec![Enemy::new("Goblin", 8, 3, 9)], &[15, 5]), faces)
}

#[tokio::test]
async fn test_fallback_attack_reaches_persisted() {
    // HP 10/10, Strength 5, oracle unreachable, every d20 shows 15
    let mut harness = goblin_fight(&[15]);

    let response = harness.input("attack the goblin").await.unwrap();
    let player = &response.turns[0];

    assert!(player.result.source.is_fallback());
    assert!(player.result.success);
    assert_eq!(player.result.damage, 5);
    assert_eq!(player.phases.last(), Some(&TurnPhase::Persisted));
    assert_eq!(player.narration.source, NarrationSource::Template);
    assert_eq!(player.narration.text, "Ash attacks Goblin for 5 damage.");
    assert_eq!(harness.enemy_hp("Goblin"), Some(3));
}

#[tokio::test]
async fn test_enemy_acts_before_control_returns() {
    let mut harness = goblin_fight(&[15]);

    let response = harness.input("attack").await.unwrap();

    // the goblin answers with 15 + 3 against 12
    assert_eq!(response.turns.len(), 2);
    assert_eq!(response.turns[1].result.actor, CombatantId(1));
    assert!(response.is_player_turn);
    assert_hp(&harness, 7, 10);
    assert_in_combat(&harness);
    assert_eq!(harness.state().encounter.as_ref().unwrap().round, 2);
    assert_eq!(harness.state().turn, 2);
    assert_persisted(&harness);
}

#[tokio::test]
async fn test_oracle_reply_is_used() {
    let mut harness = goblin_fight(&[1]);
    harness
        .expect_rules(r#"{"success": true, "damage": 6, "effects": ["bleeding"], "narrationSeed": "A deep gash"}"#)
        .expect_narration("Steel bites deep.");

    let response = harness.input("attack").await.unwrap();
    let player = &response.turns[0];

    assert_eq!(player.result.source, ResolutionSource::Oracle);
    assert_eq!(player.narration.text, "Steel bites deep.");
    assert_eq!(harness.enemy_hp("Goblin"), Some(2));
    assert_eq!(harness.narrator.requests()[0].seed, "A deep gash");
}

#[tokio::test]
async fn test_malformed_reply_falls_back() {
    let mut harness = goblin_fight(&[15]);
    harness.expect_rules(r#"{"success": "maybe", "damage": 1000}"#);

    let response = harness.input("attack").await.unwrap();
    let player = &response.turns[0];

    assert!(player.result.source.is_fallback());
    assert_eq!(player.result.damage, 5);
}

#[tokio::test]
async fn test_oracle_damage_is_clamped() {
    let mut harness = goblin_fight(&[1]);
    harness.expect_rules(r#"{"success": true, "damage": 999, "effects": [], "narrationSeed": "Obliterated"}"#);

    let response = harness.input("attack").await.unwrap();
    let player = &response.turns[0];

    assert_eq!(player.result.damage, 50);
    assert!(!player.clamps.is_empty());
    // the goblin dies, so the encounter closes instead of the goblin acting
    assert_eq!(response.turns.len(), 2);
    assert!(response.turns[1].result.summary().is_some());
    assert_not_in_combat(&harness);
}

#[tokio::test]
async fn test_invalid_actions_reprompt() {
    let mut harness = TestHarness::new(&[10]);

    for input in ["", "attack", "defend"] {
        let result = harness.input(input).await;
        assert!(matches!(result, Err(SessionError::InvalidAction(_))), "{input:?}");
    }
    assert_eq!(harness.state().turn, 0);
    assert!(harness.saved().is_none());
}

#[tokio::test]
async fn test_explore_discovers_a_location() {
    let mut harness = TestHarness::new(&[2, 1]);
    harness.expect_rules(r#"{"name": "The Sunken Choir", "kind": "ruins", "description": "Bells under water."}"#);

    harness.act(ActionTag::Explore).await.unwrap();

    let world = &harness.state().world;
    assert_eq!(world.current_name(), "The Sunken Choir");
    assert_eq!(world.locations.len(), 2);
    assert_eq!(world.discovered.len(), 2);
    assert_not_in_combat(&harness);
}

#[tokio::test]
async fn test_narration_failure_keeps_committed_state() {
    let mut harness = goblin_fight(&[15]);
    harness.expect_rules(r#"{"success": true, "damage": 4, "effects": [], "narrationSeed": "Hit"}"#);

    let response = harness.input("attack").await.unwrap();

    // no narration was scripted, so every turn used its template
    assert!(response
        .turns
        .iter()
        .all(|t| t.narration.source == NarrationSource::Template));
    assert_eq!(harness.enemy_hp("Goblin"), Some(4));
    assert_persisted(&harness);
}

#[tokio::test]
async fn test_save_failure_leaves_state_and_prior_save() {
    let mut harness = TestHarness::new(&[3]);
    harness.act(ActionTag::Explore).await.unwrap();
    let committed = harness.state().clone();

    harness.saves.set_failing(true);
    let result = harness.act(ActionTag::Explore).await;

    assert!(matches!(result, Err(SessionError::Persistence(_))));
    assert_eq!(harness.state(), &committed);
    assert_eq!(harness.saved().as_ref(), Some(&committed));

    harness.saves.set_failing(false);
    harness.act(ActionTag::Explore).await.unwrap();
    assert_eq!(harness.state().turn, 2);
}
