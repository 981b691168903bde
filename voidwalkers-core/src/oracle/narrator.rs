//! Narrative oracle adapter.
//!
//! Narration is requested after a result has been applied, so the narrator
//! describes what actually happened. Its reply is display text only: the
//! engine trims it, caps it and never parses it. Any failure falls back to
//! a sentence built from the result's structured fields.

use super::{truncate_chars, within, NarrationRequest, NarrativeOracle};
use crate::action::ActionIntent;
use crate::config::EngineConfig;
use crate::rules::{EncounterSummary, ResolutionKind, ResolutionResult, StateDelta};
use crate::store::GameState;
use crate::world::EncounterOutcome;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// How many earlier narrations are sent along for continuity.
const RECENT_TURNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationSource {
    Oracle,
    Template,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narration {
    pub text: String,
    pub source: NarrationSource,
}

#[derive(Clone)]
pub struct NarrativeAdapter {
    oracle: Arc<dyn NarrativeOracle>,
    timeout: Duration,
    cap: usize,
}

impl NarrativeAdapter {
    pub fn new(oracle: Arc<dyn NarrativeOracle>, config: &EngineConfig) -> Self {
        Self {
            oracle,
            timeout: config.narrative_timeout,
            cap: config.narration_cap,
        }
    }

    /// Narrate an applied result against the state it produced.
    pub async fn narrate(&self, result: &ResolutionResult, state: &GameState) -> Narration {
        let request = NarrationRequest {
            introduction: false,
            character: state.character.name.clone(),
            location: state.world.current_name().to_string(),
            facts: template(result, state),
            seed: result.narration_seed.clone(),
            recent: state
                .log
                .recent(RECENT_TURNS)
                .iter()
                .map(|r| r.narration.clone())
                .collect(),
        };
        self.request(request).await
    }

    /// Opening narration for a new session.
    pub async fn introduce(&self, state: &GameState) -> Narration {
        let character = &state.character;
        let mut facts = format!(
            "{} the {} arrives at {}.",
            character.name,
            character.archetype,
            state.world.current_name()
        );
        if let Some(location) = state.world.current().filter(|l| !l.description.is_empty()) {
            facts.push(' ');
            facts.push_str(&location.description);
        }

        let request = NarrationRequest {
            introduction: true,
            character: character.name.clone(),
            location: state.world.current_name().to_string(),
            facts,
            seed: String::new(),
            recent: Vec::new(),
        };
        self.request(request).await
    }

    async fn request(&self, request: NarrationRequest) -> Narration {
        match within(self.timeout, self.oracle.narrate(&request)).await {
            Ok(text) if !text.trim().is_empty() => Narration {
                text: self.capped(text.trim()),
                source: NarrationSource::Oracle,
            },
            Ok(_) => {
                tracing::warn!("narrative oracle returned nothing, using template");
                self.fallback(request)
            }
            Err(e) => {
                tracing::warn!(error = %e, "narrative oracle unusable, using template");
                self.fallback(request)
            }
        }
    }

    fn fallback(&self, request: NarrationRequest) -> Narration {
        Narration {
            text: self.capped(&request.facts),
            source: NarrationSource::Template,
        }
    }

    fn capped(&self, text: &str) -> String {
        truncate_chars(text, self.cap).unwrap_or_else(|| text.to_string())
    }
}

/// A plain sentence describing an applied result.
pub fn template(result: &ResolutionResult, state: &GameState) -> String {
    let actor = result.actor_name.as_str();
    let target = result.target_name.as_deref().unwrap_or("nothing");

    let intent = match &result.kind {
        ResolutionKind::EncounterEnd { summary } => return summary_text(summary, actor),
        ResolutionKind::Action { intent } => intent,
    };

    let mut text = match intent {
        ActionIntent::Attack { .. } if result.success => {
            let mut line = format!("{actor} attacks {target} for {} damage.", result.damage);
            if target_down(result, state) {
                line.push_str(&format!(" {target} falls."));
            }
            line
        }
        ActionIntent::Attack { .. } => format!("{actor} attacks {target} but misses."),
        ActionIntent::Defend => format!("{actor} takes a defensive stance."),
        ActionIntent::Flee if result.success => format!("{actor} breaks away and escapes."),
        ActionIntent::Flee => format!("{actor} tries to flee but is cut off."),
        ActionIntent::Explore => format!("{actor} sets out and discovers {target}."),
        ActionIntent::Meet => format!("{actor} meets {target}."),
        ActionIntent::SeekQuest => format!("{actor} takes up a new quest: {target}."),
        ActionIntent::SeekCombat => {
            let names = state
                .encounter
                .as_ref()
                .map(|e| e.enemies().map(|(_, enemy)| enemy.name.as_str()).collect::<Vec<_>>().join(", "))
                .unwrap_or_else(|| target.to_string());
            format!("{names} close in on {actor}. Roll for initiative!")
        }
        ActionIntent::CompleteQuest { .. } => format!("{actor} completes the quest {target}."),
        ActionIntent::Custom { text } => {
            let attempt = lowercase_first(text);
            if result.success && result.healing > 0 {
                format!("{actor} tries to {attempt} and succeeds, recovering {} HP.", result.healing)
            } else if result.success {
                format!("{actor} tries to {attempt} and succeeds.")
            } else if result.damage > 0 {
                format!("{actor} tries to {attempt} but fails, taking {} damage.", result.damage)
            } else {
                format!("{actor} tries to {attempt} but fails.")
            }
        }
    };

    for delta in &result.deltas {
        if let StateDelta::ApplyStatus { target, status } = delta {
            if *intent == ActionIntent::Defend {
                continue;
            }
            let name = state
                .contestant(*target)
                .map(|c| c.name)
                .unwrap_or_else(|| "someone".to_string());
            text.push_str(&format!(" {name} is {status}."));
        }
    }
    text
}

fn target_down(result: &ResolutionResult, state: &GameState) -> bool {
    result
        .target
        .and_then(|id| state.contestant(id))
        .map(|c| c.hit_points.is_dead())
        .unwrap_or(false)
}

fn summary_text(summary: &EncounterSummary, actor: &str) -> String {
    match summary.outcome {
        EncounterOutcome::Victory => {
            let rounds = if summary.rounds == 1 { "round" } else { "rounds" };
            let mut text = format!(
                "Victory! {} defeated in {} {rounds}. {actor} gains {} experience.",
                summary.defeated.join(", "),
                summary.rounds,
                summary.experience
            );
            if !summary.loot.is_empty() {
                let loot: Vec<_> = summary.loot.iter().map(|i| i.name.as_str()).collect();
                text.push_str(&format!(" Loot: {}.", loot.join(", ")));
            }
            text
        }
        EncounterOutcome::Defeat => format!("{actor} has fallen. The Void claims another soul."),
        EncounterOutcome::Escape => format!("{actor} escapes the fight."),
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
