//! Oracles reached over a Messages-API endpoint.

use super::{NarrationRequest, NarrativeOracle, OracleError, OracleRequest, RulesOracle};
use async_trait::async_trait;
use oracle_client::{Endpoint, MessagesClient, Prompt};

/// Environment prefix for the rules oracle endpoint.
pub const RULES_ORACLE_PREFIX: &str = "RULES_ORACLE";
/// Environment prefix for the narrative oracle endpoint.
pub const NARRATIVE_ORACLE_PREFIX: &str = "NARRATIVE_ORACLE";

const RULES_MAX_TOKENS: usize = 1024;
const NARRATIVE_MAX_TOKENS: usize = 400;

fn rules_system_prompt(request: &OracleRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/rules_base.txt"));
    prompt.push('\n');
    prompt.push_str(match request {
        OracleRequest::Adjudicate { .. } => include_str!("prompts/adjudicate.txt"),
        OracleRequest::ProposeEnemyAction { .. } => include_str!("prompts/enemy_action.txt"),
        OracleRequest::GenerateCharacter { .. } => include_str!("prompts/character.txt"),
        OracleRequest::GenerateLocation { .. } => include_str!("prompts/location.txt"),
        OracleRequest::GenerateNpc { .. } => include_str!("prompts/npc.txt"),
        OracleRequest::GenerateQuest { .. } => include_str!("prompts/quest.txt"),
        OracleRequest::GenerateEncounter { .. } => include_str!("prompts/encounter.txt"),
    });
    prompt
}

/// Rules oracle backed by an HTTP completion endpoint.
#[derive(Clone)]
pub struct HttpRulesOracle {
    client: MessagesClient,
}

impl HttpRulesOracle {
    pub fn new(endpoint: Endpoint) -> Result<Self, oracle_client::Error> {
        Ok(Self {
            client: MessagesClient::new(endpoint)?,
        })
    }

    /// Configure from `RULES_ORACLE_URL`, `RULES_ORACLE_MODEL` and
    /// `RULES_ORACLE_API_KEY`.
    pub fn from_env() -> Result<Self, oracle_client::Error> {
        Self::new(Endpoint::from_env(RULES_ORACLE_PREFIX)?)
    }
}

#[async_trait]
impl RulesOracle for HttpRulesOracle {
    async fn consult(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let user = serde_json::to_string_pretty(request)
            .map_err(|e| OracleError::Unavailable(format!("request not serializable: {e}")))?;
        let prompt = Prompt::new(user)
            .with_system(rules_system_prompt(request))
            .with_max_tokens(RULES_MAX_TOKENS)
            .with_temperature(0.7);

        tracing::debug!(request = request.kind(), model = %self.client.endpoint().model, "consulting rules oracle");
        let completion = self.client.complete(prompt).await?;
        Ok(completion.text)
    }
}

/// Narrative oracle backed by an HTTP completion endpoint.
#[derive(Clone)]
pub struct HttpNarrativeOracle {
    client: MessagesClient,
}

impl HttpNarrativeOracle {
    pub fn new(endpoint: Endpoint) -> Result<Self, oracle_client::Error> {
        Ok(Self {
            client: MessagesClient::new(endpoint)?,
        })
    }

    /// Configure from `NARRATIVE_ORACLE_URL`, `NARRATIVE_ORACLE_MODEL` and
    /// `NARRATIVE_ORACLE_API_KEY`.
    pub fn from_env() -> Result<Self, oracle_client::Error> {
        Self::new(Endpoint::from_env(NARRATIVE_ORACLE_PREFIX)?)
    }
}

#[async_trait]
impl NarrativeOracle for HttpNarrativeOracle {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String, OracleError> {
        let user = serde_json::to_string_pretty(request)
            .map_err(|e| OracleError::Unavailable(format!("request not serializable: {e}")))?;
        let prompt = Prompt::new(user)
            .with_system(include_str!("prompts/narrator.txt"))
            .with_max_tokens(NARRATIVE_MAX_TOKENS)
            .with_temperature(0.9);

        let completion = self.client.complete(prompt).await?;
        Ok(completion.text)
    }
}
