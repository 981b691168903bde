//! The two untrusted text services and the adapters that tame them.
//!
//! The rules oracle is asked structured questions and must answer with JSON
//! that matches a strict schema; anything else is a `SchemaViolation` and the
//! engine falls back to dice. The narrative oracle returns opaque prose.
//! Neither is ever allowed to block play or corrupt state.

pub mod adjudicator;
pub mod http;
pub mod narrator;

pub use adjudicator::RulesAdapter;
pub use http::{HttpNarrativeOracle, HttpRulesOracle};
pub use narrator::{Narration, NarrationSource, NarrativeAdapter};

use crate::action::ActionIntent;
use crate::world::{Archetype, Attributes, HealthBand, HitPoints, StatusEffect};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why an oracle answer could not be used.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle reply violates the schema: {0}")]
    SchemaViolation(String),
}

impl From<oracle_client::Error> for OracleError {
    fn from(e: oracle_client::Error) -> Self {
        match e {
            oracle_client::Error::Timeout(limit) => OracleError::Timeout(limit),
            other => OracleError::Unavailable(other.to_string()),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// The acting side of a check. Always fully disclosed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorView {
    pub name: String,
    pub attributes: Attributes,
    pub hit_points: HitPoints,
    pub status_effects: Vec<StatusEffect>,
}

/// How much of a target's health is shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "disclosure", rename_all = "snake_case")]
pub enum Condition {
    Exact { current: i32, maximum: i32 },
    Banded { band: HealthBand },
    Hidden,
}

/// The receiving side of a check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetView {
    pub name: String,
    pub defense: i32,
    pub condition: Condition,
    pub status_effects: Vec<StatusEffect>,
}

/// A question for the rules oracle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum OracleRequest {
    Adjudicate {
        intent: ActionIntent,
        actor: ActorView,
        target: Option<TargetView>,
        in_combat: bool,
        location: String,
    },
    ProposeEnemyAction {
        enemy: ActorView,
        opponent: TargetView,
        round: u32,
    },
    GenerateCharacter {
        name: String,
        archetype: Archetype,
    },
    GenerateLocation {
        from: Option<String>,
        known: Vec<String>,
        level: u32,
    },
    GenerateNpc {
        location: String,
    },
    GenerateQuest {
        location: String,
        giver: Option<String>,
    },
    GenerateEncounter {
        location: String,
        level: u32,
    },
}

impl OracleRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            OracleRequest::Adjudicate { .. } => "adjudicate",
            OracleRequest::ProposeEnemyAction { .. } => "propose_enemy_action",
            OracleRequest::GenerateCharacter { .. } => "generate_character",
            OracleRequest::GenerateLocation { .. } => "generate_location",
            OracleRequest::GenerateNpc { .. } => "generate_npc",
            OracleRequest::GenerateQuest { .. } => "generate_quest",
            OracleRequest::GenerateEncounter { .. } => "generate_encounter",
        }
    }
}

/// A request for prose about something that already happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrationRequest {
    pub introduction: bool,
    pub character: String,
    pub location: String,
    /// The structured outcome, already rendered as a plain sentence.
    pub facts: String,
    pub seed: String,
    /// Narration of the last few turns, oldest first.
    pub recent: Vec<String>,
}

// ============================================================================
// Oracle traits
// ============================================================================

/// Answers structured rules and content questions with raw JSON text.
#[async_trait]
pub trait RulesOracle: Send + Sync {
    async fn consult(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Produces display prose.
#[async_trait]
pub trait NarrativeOracle: Send + Sync {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String, OracleError>;
}

/// An oracle that is never there. Play proceeds entirely on fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineOracle;

#[async_trait]
impl RulesOracle for OfflineOracle {
    async fn consult(&self, _request: &OracleRequest) -> Result<String, OracleError> {
        Err(OracleError::Unavailable("offline".to_string()))
    }
}

#[async_trait]
impl NarrativeOracle for OfflineOracle {
    async fn narrate(&self, _request: &NarrationRequest) -> Result<String, OracleError> {
        Err(OracleError::Unavailable("offline".to_string()))
    }
}

/// The pair of oracles a session talks to.
#[derive(Clone)]
pub struct Oracles {
    pub rules: Arc<dyn RulesOracle>,
    pub narrative: Arc<dyn NarrativeOracle>,
}

impl Oracles {
    pub fn new(rules: Arc<dyn RulesOracle>, narrative: Arc<dyn NarrativeOracle>) -> Self {
        Self { rules, narrative }
    }

    pub fn offline() -> Self {
        Self::new(Arc::new(OfflineOracle), Arc::new(OfflineOracle))
    }

    /// HTTP oracles configured from `RULES_ORACLE_*` and `NARRATIVE_ORACLE_*`.
    /// An oracle that can't be configured is replaced by `OfflineOracle`.
    pub fn from_env() -> Self {
        let rules: Arc<dyn RulesOracle> = match HttpRulesOracle::from_env() {
            Ok(oracle) => Arc::new(oracle),
            Err(e) => {
                tracing::warn!(error = %e, "rules oracle not configured, adjudicating with dice");
                Arc::new(OfflineOracle)
            }
        };
        let narrative: Arc<dyn NarrativeOracle> = match HttpNarrativeOracle::from_env() {
            Ok(oracle) => Arc::new(oracle),
            Err(e) => {
                tracing::warn!(error = %e, "narrative oracle not configured, narrating from templates");
                Arc::new(OfflineOracle)
            }
        };
        Self { rules, narrative }
    }
}

impl std::fmt::Debug for Oracles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oracles").finish_non_exhaustive()
    }
}

// ============================================================================
// Reply helpers
// ============================================================================

/// Run an oracle call with a deadline.
pub(crate) async fn within<T, F>(limit: Duration, call: F) -> Result<T, OracleError>
where
    F: Future<Output = Result<T, OracleError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(limit)),
    }
}

/// Strip a surrounding Markdown code fence, if any.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening line
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

/// `text` cut to `cap` characters, or `None` if it already fits.
pub(crate) fn truncate_chars(text: &str, cap: usize) -> Option<String> {
    text.char_indices()
        .nth(cap)
        .map(|(end, _)| text[..end].trim_end().to_string())
}

/// Parse a reply against a strict schema.
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T, OracleError> {
    serde_json::from_str(strip_code_fence(reply)).map_err(|e| OracleError::SchemaViolation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Probe {
        ok: bool,
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"ok\": true}\n```"), "{\"ok\": true}");
        assert_eq!(strip_code_fence("  {\"ok\": true} "), "{\"ok\": true}");
        assert_eq!(strip_code_fence("```{}```"), "{}");
    }

    #[test]
    fn test_parse_reply_is_strict() {
        assert_eq!(parse_reply::<Probe>("{\"ok\": true}"), Ok(Probe { ok: true }));
        assert!(matches!(
            parse_reply::<Probe>("{\"ok\": true, \"extra\": 1}"),
            Err(OracleError::SchemaViolation(_))
        ));
        assert!(matches!(
            parse_reply::<Probe>("The goblin is hit!"),
            Err(OracleError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("short", 10), None);
        assert_eq!(truncate_chars("ééééé", 3), Some("ééé".to_string()));
    }

    #[tokio::test]
    async fn test_within_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, OracleError>(())
        };
        assert_eq!(
            within(Duration::from_millis(10), slow).await,
            Err(OracleError::Timeout(Duration::from_millis(10)))
        );
    }

    #[tokio::test]
    async fn test_offline_is_unavailable() {
        let request = OracleRequest::GenerateNpc {
            location: "Emberfall".to_string(),
        };
        assert!(matches!(
            OfflineOracle.consult(&request).await,
            Err(OracleError::Unavailable(_))
        ));
    }

    #[test]
    fn test_request_serializes_with_tag() {
        let request = OracleRequest::GenerateEncounter {
            location: "Crypt".to_string(),
            level: 2,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["request"], "generate_encounter");
        assert_eq!(request.kind(), "generate_encounter");
    }
}
