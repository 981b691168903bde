//! Player action requests and the parser that narrows them to intents.

use crate::world::QuestId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest free-form action accepted.
pub const MAX_ACTION_LEN: usize = 500;

#[derive(Debug, Error, PartialEq)]
pub enum ActionError {
    #[error("Nothing to do: the action is empty")]
    Empty,
    #[error("Action is too long ({0} characters, limit {MAX_ACTION_LEN})")]
    TooLong(usize),
    #[error("Action contains unreadable characters")]
    Unparseable,
}

/// Fixed actions offered by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionTag {
    Attack,
    Defend,
    Flee,
    Explore,
    Meet,
    SeekQuest,
    SeekCombat,
    CompleteQuest(QuestId),
}

/// What the player asked for, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionRequest {
    Text(String),
    Tag(ActionTag),
}

impl ActionRequest {
    pub fn text(text: impl Into<String>) -> Self {
        ActionRequest::Text(text.into())
    }
}

impl From<ActionTag> for ActionRequest {
    fn from(tag: ActionTag) -> Self {
        ActionRequest::Tag(tag)
    }
}

/// The closed set of things an actor can attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionIntent {
    Attack { target: Option<String> },
    Defend,
    Flee,
    Explore,
    Meet,
    SeekQuest,
    SeekCombat,
    CompleteQuest { quest: QuestId },
    Custom { text: String },
}

impl ActionIntent {
    pub fn is_combat_action(&self) -> bool {
        matches!(
            self,
            ActionIntent::Attack { .. } | ActionIntent::Defend | ActionIntent::Flee
        )
    }

    /// Short label used in logs and oracle requests.
    pub fn label(&self) -> &'static str {
        match self {
            ActionIntent::Attack { .. } => "attack",
            ActionIntent::Defend => "defend",
            ActionIntent::Flee => "flee",
            ActionIntent::Explore => "explore",
            ActionIntent::Meet => "meet",
            ActionIntent::SeekQuest => "seek_quest",
            ActionIntent::SeekCombat => "seek_combat",
            ActionIntent::CompleteQuest { .. } => "complete_quest",
            ActionIntent::Custom { .. } => "custom",
        }
    }
}

/// Narrow a request to an intent. Does not look at game state.
pub fn parse(request: &ActionRequest) -> Result<ActionIntent, ActionError> {
    match request {
        ActionRequest::Tag(tag) => Ok(from_tag(*tag)),
        ActionRequest::Text(text) => parse_text(text),
    }
}

fn from_tag(tag: ActionTag) -> ActionIntent {
    match tag {
        ActionTag::Attack => ActionIntent::Attack { target: None },
        ActionTag::Defend => ActionIntent::Defend,
        ActionTag::Flee => ActionIntent::Flee,
        ActionTag::Explore => ActionIntent::Explore,
        ActionTag::Meet => ActionIntent::Meet,
        ActionTag::SeekQuest => ActionIntent::SeekQuest,
        ActionTag::SeekCombat => ActionIntent::SeekCombat,
        ActionTag::CompleteQuest(quest) => ActionIntent::CompleteQuest { quest },
    }
}

fn parse_text(text: &str) -> Result<ActionIntent, ActionError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ActionError::Empty);
    }
    let len = text.chars().count();
    if len > MAX_ACTION_LEN {
        return Err(ActionError::TooLong(len));
    }
    if text.chars().any(|c| c.is_control()) {
        return Err(ActionError::Unparseable);
    }

    let lower = text.to_lowercase();
    let (verb, rest) = match lower.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (lower.as_str(), ""),
    };

    let intent = match (verb, rest) {
        ("attack" | "strike" | "hit", _) => ActionIntent::Attack {
            target: target_phrase(rest),
        },
        ("defend" | "block" | "guard", "") => ActionIntent::Defend,
        ("flee" | "run" | "escape" | "retreat", _) => ActionIntent::Flee,
        ("explore", _) => ActionIntent::Explore,
        ("meet", _) => ActionIntent::Meet,
        ("quest", "") => ActionIntent::SeekQuest,
        ("seek", "quest" | "a quest") => ActionIntent::SeekQuest,
        ("seek", "combat" | "a fight" | "battle" | "trouble") => ActionIntent::SeekCombat,
        ("fight", "") | ("hunt", _) => ActionIntent::SeekCombat,
        _ => ActionIntent::Custom {
            text: text.to_string(),
        },
    };
    Ok(intent)
}

fn target_phrase(rest: &str) -> Option<String> {
    let rest = rest.strip_prefix("the ").unwrap_or(rest).trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}
