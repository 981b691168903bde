//! Game state types.
//!
//! Characters, the location graph, NPCs, quests and encounters. Everything
//! here is plain serializable data; the rules that mutate it live in
//! `rules` and `combat`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(pub Uuid);

impl LocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for NPCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NpcId(pub Uuid);

impl NpcId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NpcId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for quests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestId(pub Uuid);

impl QuestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QuestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a combatant within one encounter. The player is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombatantId(pub u32);

impl CombatantId {
    pub const PLAYER: CombatantId = CombatantId(0);

    pub fn is_player(self) -> bool {
        self == Self::PLAYER
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Attributes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub strength: i32,
    pub dexterity: i32,
    pub intelligence: i32,
    pub charisma: i32,
    pub defense: i32,
}

impl Attributes {
    pub fn new(strength: i32, dexterity: i32, intelligence: i32, charisma: i32, defense: i32) -> Self {
        Self {
            strength,
            dexterity,
            intelligence,
            charisma,
            defense,
        }
    }
}

impl Default for Attributes {
    fn default() -> Self {
        Self::new(5, 5, 5, 5, 10)
    }
}

// ============================================================================
// Hit Points
// ============================================================================

/// Hit points. `0 <= current <= maximum` holds after every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
}

/// What an HP operation did, including whether it had to clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HpChange {
    pub before: i32,
    pub after: i32,
    /// The value the operation would have produced without clamping.
    pub unclamped: i64,
}

impl HpChange {
    pub fn clamped(&self) -> bool {
        self.unclamped != i64::from(self.after)
    }
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        let maximum = maximum.max(1);
        Self {
            current: maximum,
            maximum,
        }
    }

    /// Build from stored values, forcing the invariant.
    pub fn with_current(current: i32, maximum: i32) -> Self {
        let maximum = maximum.max(1);
        Self {
            current: current.clamp(0, maximum),
            maximum,
        }
    }

    pub fn take_damage(&mut self, amount: u32) -> HpChange {
        let before = self.current;
        let unclamped = i64::from(before) - i64::from(amount);
        self.current = unclamped.max(0) as i32;
        HpChange {
            before,
            after: self.current,
            unclamped,
        }
    }

    pub fn heal(&mut self, amount: u32) -> HpChange {
        let before = self.current;
        let unclamped = i64::from(before) + i64::from(amount);
        self.current = unclamped.min(i64::from(self.maximum)) as i32;
        HpChange {
            before,
            after: self.current,
            unclamped,
        }
    }

    pub fn raise_maximum(&mut self, amount: i32) {
        self.maximum = (self.maximum + amount).max(1);
        self.current = self.current.clamp(0, self.maximum);
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0
    }

    pub fn ratio(&self) -> f32 {
        (self.current as f32 / self.maximum as f32).max(0.0)
    }

    pub fn band(&self) -> HealthBand {
        let ratio = self.ratio();
        if self.current <= 0 {
            HealthBand::Down
        } else if self.current >= self.maximum {
            HealthBand::Uninjured
        } else if ratio >= 0.75 {
            HealthBand::LightlyWounded
        } else if ratio >= 0.4 {
            HealthBand::Bloodied
        } else if ratio >= 0.15 {
            HealthBand::BadlyWounded
        } else {
            HealthBand::NearDeath
        }
    }
}

/// Coarse condition reported instead of exact HP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBand {
    Uninjured,
    LightlyWounded,
    Bloodied,
    BadlyWounded,
    NearDeath,
    Down,
}

impl fmt::Display for HealthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HealthBand::Uninjured => "uninjured",
            HealthBand::LightlyWounded => "lightly wounded",
            HealthBand::Bloodied => "bloodied",
            HealthBand::BadlyWounded => "badly wounded",
            HealthBand::NearDeath => "near death",
            HealthBand::Down => "down",
        };
        write!(f, "{text}")
    }
}

// ============================================================================
// Status Effects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEffect {
    Poisoned,
    Stunned,
    Burning,
    Bleeding,
    Weakened,
    Blessed,
    Guarded,
}

impl StatusEffect {
    /// Beneficial effects always land on whoever acted.
    pub fn is_beneficial(&self) -> bool {
        matches!(self, StatusEffect::Blessed | StatusEffect::Guarded)
    }

    /// Bonus applied to fallback checks while the effect is active.
    pub fn check_modifier(&self) -> i32 {
        match self {
            StatusEffect::Blessed => 2,
            StatusEffect::Weakened => -2,
            _ => 0,
        }
    }
}

impl fmt::Display for StatusEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusEffect::Poisoned => "poisoned",
            StatusEffect::Stunned => "stunned",
            StatusEffect::Burning => "burning",
            StatusEffect::Bleeding => "bleeding",
            StatusEffect::Weakened => "weakened",
            StatusEffect::Blessed => "blessed",
            StatusEffect::Guarded => "guarded",
        };
        write!(f, "{text}")
    }
}

/// Sum of check modifiers from a set of effects.
pub fn status_check_modifier(effects: &BTreeSet<StatusEffect>) -> i32 {
    effects.iter().map(|e| e.check_modifier()).sum()
}

// ============================================================================
// Items
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub quantity: u32,
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: 1,
        }
    }
}

/// Ordered inventory. Items stack by case-insensitive name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<Item>,
}

impl Inventory {
    pub fn add_item(&mut self, item: Item) {
        if let Some(existing) = self.find_item_mut(&item.name) {
            existing.quantity += item.quantity;
            return;
        }
        self.items.push(item);
    }

    pub fn find_item(&self, name: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|i| i.name.to_lowercase() == name.to_lowercase())
    }

    fn find_item_mut(&mut self, name: &str) -> Option<&mut Item> {
        self.items
            .iter_mut()
            .find(|i| i.name.to_lowercase() == name.to_lowercase())
    }

    pub fn has_item(&self, name: &str) -> bool {
        self.find_item(name).is_some()
    }
}

// ============================================================================
// Characters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Archetype {
    Warrior,
    Mage,
    Rogue,
    Cleric,
    Ranger,
    Paladin,
}

impl Archetype {
    pub fn all() -> &'static [Archetype] {
        &[
            Archetype::Warrior,
            Archetype::Mage,
            Archetype::Rogue,
            Archetype::Cleric,
            Archetype::Ranger,
            Archetype::Paladin,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Archetype::Warrior => "Warrior",
            Archetype::Mage => "Mage",
            Archetype::Rogue => "Rogue",
            Archetype::Cleric => "Cleric",
            Archetype::Ranger => "Ranger",
            Archetype::Paladin => "Paladin",
        }
    }

    pub fn from_name(name: &str) -> Option<Archetype> {
        Self::all()
            .iter()
            .copied()
            .find(|a| a.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Starting maximum HP used when no generated stat block is available.
    pub fn base_hit_points(&self) -> i32 {
        match self {
            Archetype::Warrior => 40,
            Archetype::Mage => 24,
            Archetype::Rogue => 28,
            Archetype::Cleric => 32,
            Archetype::Ranger => 30,
            Archetype::Paladin => 36,
        }
    }

    pub fn base_attributes(&self) -> Attributes {
        match self {
            Archetype::Warrior => Attributes::new(8, 5, 3, 4, 12),
            Archetype::Mage => Attributes::new(3, 5, 9, 6, 8),
            Archetype::Rogue => Attributes::new(5, 9, 5, 6, 9),
            Archetype::Cleric => Attributes::new(5, 4, 7, 8, 11),
            Archetype::Ranger => Attributes::new(6, 8, 5, 4, 10),
            Archetype::Paladin => Attributes::new(7, 4, 4, 7, 13),
        }
    }

    pub fn base_abilities(&self) -> Vec<String> {
        let names: &[&str] = match self {
            Archetype::Warrior => &["Cleave", "Shield Bash", "Battle Cry"],
            Archetype::Mage => &["Void Bolt", "Arcane Ward", "Focus"],
            Archetype::Rogue => &["Backstab", "Vanish", "Pick Lock"],
            Archetype::Cleric => &["Mend", "Smite", "Sanctuary"],
            Archetype::Ranger => &["Aimed Shot", "Track", "Snare"],
            Archetype::Paladin => &["Holy Strike", "Lay on Hands", "Aegis"],
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Experience needed per level.
pub const XP_PER_LEVEL: u32 = 100;
/// Max HP gained per level.
pub const HP_PER_LEVEL: i32 = 5;

/// The player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub archetype: Archetype,
    pub hit_points: HitPoints,
    pub attributes: Attributes,
    pub abilities: Vec<String>,
    pub inventory: Inventory,
    pub status_effects: BTreeSet<StatusEffect>,
    pub experience: u32,
    pub level: u32,
}

impl Character {
    /// A character with the archetype's baseline stats.
    pub fn new(name: impl Into<String>, archetype: Archetype) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            archetype,
            hit_points: HitPoints::new(archetype.base_hit_points()),
            attributes: archetype.base_attributes(),
            abilities: archetype.base_abilities(),
            inventory: Inventory::default(),
            status_effects: BTreeSet::new(),
            experience: 0,
            level: 1,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.hit_points.is_dead()
    }

    /// Award experience, returning the number of levels gained.
    pub fn gain_experience(&mut self, amount: u32) -> u32 {
        self.experience = self.experience.saturating_add(amount);
        let target_level = 1 + self.experience / XP_PER_LEVEL;
        let gained = target_level.saturating_sub(self.level);
        for _ in 0..gained {
            self.level += 1;
            self.hit_points.raise_maximum(HP_PER_LEVEL);
            self.hit_points.heal(HP_PER_LEVEL as u32);
        }
        gained
    }
}

// ============================================================================
// Locations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Village,
    Ruins,
    Forest,
    Cave,
    Shrine,
    Dungeon,
}

impl LocationKind {
    /// Kinds a newly discovered location can have.
    pub fn wilderness() -> &'static [LocationKind] {
        &[
            LocationKind::Ruins,
            LocationKind::Forest,
            LocationKind::Cave,
            LocationKind::Shrine,
            LocationKind::Dungeon,
        ]
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LocationKind::Village => "village",
            LocationKind::Ruins => "ruins",
            LocationKind::Forest => "forest",
            LocationKind::Cave => "cave",
            LocationKind::Shrine => "shrine",
            LocationKind::Dungeon => "dungeon",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub kind: LocationKind,
    pub description: String,
    pub connections: Vec<LocationId>,
}

impl Location {
    pub fn new(name: impl Into<String>, kind: LocationKind) -> Self {
        Self {
            id: LocationId::new(),
            name: name.into(),
            kind,
            description: String::new(),
            connections: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ============================================================================
// NPCs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Hostile,
    Unfriendly,
    Neutral,
    Friendly,
    Helpful,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Npc {
    pub id: NpcId,
    pub name: String,
    pub role: String,
    pub persona: String,
    pub disposition: Disposition,
    pub location: LocationId,
}

impl Npc {
    pub fn new(name: impl Into<String>, role: impl Into<String>, location: LocationId) -> Self {
        Self {
            id: NpcId::new(),
            name: name.into(),
            role: role.into(),
            persona: String::new(),
            disposition: Disposition::Neutral,
            location,
        }
    }
}

// ============================================================================
// Quests
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub title: String,
    pub description: String,
    pub giver: Option<NpcId>,
    pub status: QuestStatus,
}

impl Quest {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: QuestId::new(),
            title: title.into(),
            description: description.into(),
            giver: None,
            status: QuestStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == QuestStatus::Active
    }
}

// ============================================================================
// World
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum WorldError {
    #[error("Unknown location: {0}")]
    UnknownLocation(LocationId),
    #[error("Unknown NPC: {0}")]
    UnknownNpc(NpcId),
    #[error("Unknown quest: {0}")]
    UnknownQuest(QuestId),
    #[error("Duplicate id: {0}")]
    DuplicateId(String),
}

/// Everything outside the character: the location graph, NPCs and quests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub intro: String,
    pub current_location: LocationId,
    /// Append-only.
    pub locations: Vec<Location>,
    pub discovered: BTreeSet<LocationId>,
    pub quests: Vec<Quest>,
    pub npcs: BTreeMap<NpcId, Npc>,
}

impl WorldState {
    pub fn new(start: Location) -> Self {
        let id = start.id;
        Self {
            intro: String::new(),
            current_location: id,
            locations: vec![start],
            discovered: BTreeSet::from([id]),
            quests: Vec::new(),
            npcs: BTreeMap::new(),
        }
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub fn current(&self) -> Option<&Location> {
        self.location(self.current_location)
    }

    pub fn current_name(&self) -> &str {
        self.current().map(|l| l.name.as_str()).unwrap_or("the void")
    }

    /// Append a location, optionally linking it both ways with `from`.
    pub fn add_location(&mut self, mut location: Location, from: Option<LocationId>) -> Result<(), WorldError> {
        if self.location(location.id).is_some() {
            return Err(WorldError::DuplicateId(location.id.to_string()));
        }
        for link in &location.connections {
            if self.location(*link).is_none() {
                return Err(WorldError::UnknownLocation(*link));
            }
        }
        if let Some(from) = from {
            let origin = self
                .locations
                .iter_mut()
                .find(|l| l.id == from)
                .ok_or(WorldError::UnknownLocation(from))?;
            if !origin.connections.contains(&location.id) {
                origin.connections.push(location.id);
            }
            if !location.connections.contains(&from) {
                location.connections.push(from);
            }
        }
        self.discovered.insert(location.id);
        self.locations.push(location);
        Ok(())
    }

    pub fn move_to(&mut self, id: LocationId) -> Result<(), WorldError> {
        if self.location(id).is_none() {
            return Err(WorldError::UnknownLocation(id));
        }
        self.current_location = id;
        self.discovered.insert(id);
        Ok(())
    }

    pub fn add_npc(&mut self, npc: Npc) -> Result<(), WorldError> {
        if self.location(npc.location).is_none() {
            return Err(WorldError::UnknownLocation(npc.location));
        }
        if self.npcs.contains_key(&npc.id) {
            return Err(WorldError::DuplicateId(npc.id.to_string()));
        }
        self.npcs.insert(npc.id, npc);
        Ok(())
    }

    pub fn npcs_at(&self, location: LocationId) -> impl Iterator<Item = &Npc> {
        self.npcs.values().filter(move |n| n.location == location)
    }

    pub fn add_quest(&mut self, quest: Quest) -> Result<(), WorldError> {
        if let Some(giver) = quest.giver {
            if !self.npcs.contains_key(&giver) {
                return Err(WorldError::UnknownNpc(giver));
            }
        }
        if self.quest(quest.id).is_some() {
            return Err(WorldError::DuplicateId(quest.id.to_string()));
        }
        self.quests.push(quest);
        Ok(())
    }

    pub fn quest(&self, id: QuestId) -> Option<&Quest> {
        self.quests.iter().find(|q| q.id == id)
    }

    pub fn set_quest_status(&mut self, id: QuestId, status: QuestStatus) -> Result<(), WorldError> {
        let quest = self
            .quests
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or(WorldError::UnknownQuest(id))?;
        quest.status = status;
        Ok(())
    }

    pub fn active_quests(&self) -> impl Iterator<Item = &Quest> {
        self.quests.iter().filter(|q| q.is_active())
    }

    /// Check that every reference resolves.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.current().is_none() {
            return Err(WorldError::UnknownLocation(self.current_location));
        }
        for id in &self.discovered {
            if self.location(*id).is_none() {
                return Err(WorldError::UnknownLocation(*id));
            }
        }
        for location in &self.locations {
            for link in &location.connections {
                if self.location(*link).is_none() {
                    return Err(WorldError::UnknownLocation(*link));
                }
            }
        }
        for (id, npc) in &self.npcs {
            if *id != npc.id {
                return Err(WorldError::DuplicateId(id.to_string()));
            }
            if self.location(npc.location).is_none() {
                return Err(WorldError::UnknownLocation(npc.location));
            }
        }
        for quest in &self.quests {
            if let Some(giver) = quest.giver {
                if !self.npcs.contains_key(&giver) {
                    return Err(WorldError::UnknownNpc(giver));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Encounters
// ============================================================================

/// Stat block of a hostile combatant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub name: String,
    pub description: String,
    pub hit_points: HitPoints,
    /// Strength doubles as the enemy's attack rating.
    pub attributes: Attributes,
    pub abilities: Vec<String>,
    pub loot: Vec<Item>,
    pub experience: u32,
    pub status_effects: BTreeSet<StatusEffect>,
}

impl Enemy {
    pub fn new(name: impl Into<String>, hit_points: i32, attack: i32, defense: i32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            hit_points: HitPoints::new(hit_points),
            attributes: Attributes::new(attack, 5, 3, 3, defense),
            abilities: Vec::new(),
            loot: Vec::new(),
            experience: 25,
            status_effects: BTreeSet::new(),
        }
    }

    pub fn with_dexterity(mut self, dexterity: i32) -> Self {
        self.attributes.dexterity = dexterity;
        self
    }

    pub fn with_loot(mut self, item: impl Into<String>) -> Self {
        self.loot.push(Item::new(item));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatantKind {
    /// Stats live on the session's `Character`.
    Player,
    Enemy(Enemy),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub kind: CombatantKind,
}

impl Combatant {
    pub fn enemy(&self) -> Option<&Enemy> {
        match &self.kind {
            CombatantKind::Enemy(enemy) => Some(enemy),
            CombatantKind::Player => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatPhase {
    EncounterStart,
    RollInitiative,
    RoundActive,
    RoundResolution,
    EncounterEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterOutcome {
    Victory,
    Defeat,
    Escape,
}

impl fmt::Display for EncounterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EncounterOutcome::Victory => "victory",
            EncounterOutcome::Defeat => "defeat",
            EncounterOutcome::Escape => "escape",
        };
        write!(f, "{text}")
    }
}

/// One initiative roll, kept with the tie-breaking data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeRoll {
    pub combatant: CombatantId,
    pub roll: i32,
    pub dexterity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    pub round: u32,
    pub actor: CombatantId,
    pub target: Option<CombatantId>,
    pub success: bool,
    pub damage: u32,
}

/// A self-contained fight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: Uuid,
    /// Input order: the player first, then enemies as generated.
    pub combatants: Vec<Combatant>,
    pub initiative: Vec<InitiativeRoll>,
    /// Living combatants in initiative order.
    pub order: Vec<CombatantId>,
    pub cursor: usize,
    pub round: u32,
    pub phase: CombatPhase,
    pub escaped: bool,
    pub outcome: Option<EncounterOutcome>,
    pub log: Vec<CombatLogEntry>,
}

impl Encounter {
    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    pub fn enemy(&self, id: CombatantId) -> Option<&Enemy> {
        self.combatant(id).and_then(|c| c.enemy())
    }

    pub fn enemy_mut(&mut self, id: CombatantId) -> Option<&mut Enemy> {
        self.combatants
            .iter_mut()
            .find(|c| c.id == id)
            .and_then(|c| match &mut c.kind {
                CombatantKind::Enemy(enemy) => Some(enemy),
                CombatantKind::Player => None,
            })
    }

    pub fn enemies(&self) -> impl Iterator<Item = (CombatantId, &Enemy)> {
        self.combatants
            .iter()
            .filter_map(|c| c.enemy().map(|e| (c.id, e)))
    }

    pub fn living_enemies(&self) -> impl Iterator<Item = (CombatantId, &Enemy)> {
        self.enemies().filter(|(_, e)| !e.hit_points.is_dead())
    }

    pub fn current_actor(&self) -> Option<CombatantId> {
        if self.phase != CombatPhase::RoundActive {
            return None;
        }
        self.order.get(self.cursor).copied()
    }

    pub fn is_over(&self) -> bool {
        self.phase == CombatPhase::EncounterEnd
    }

    pub fn name_of(&self, id: CombatantId) -> &str {
        self.combatant(id).map(|c| c.name.as_str()).unwrap_or("someone")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_points_clamp() {
        let mut hp = HitPoints::new(10);
        let change = hp.take_damage(4);
        assert_eq!(hp.current, 6);
        assert!(!change.clamped());

        let change = hp.take_damage(50);
        assert_eq!(hp.current, 0);
        assert!(change.clamped());
        assert_eq!(change.unclamped, -44);
        assert!(hp.is_dead());

        let change = hp.heal(100);
        assert_eq!(hp.current, 10);
        assert!(change.clamped());
    }

    #[test]
    fn test_hit_points_with_current_forces_invariant() {
        assert_eq!(HitPoints::with_current(-3, 10).current, 0);
        assert_eq!(HitPoints::with_current(30, 10).current, 10);
        assert_eq!(HitPoints::with_current(5, 0).maximum, 1);
    }

    #[test]
    fn test_health_bands() {
        assert_eq!(HitPoints::with_current(10, 10).band(), HealthBand::Uninjured);
        assert_eq!(HitPoints::with_current(8, 10).band(), HealthBand::LightlyWounded);
        assert_eq!(HitPoints::with_current(5, 10).band(), HealthBand::Bloodied);
        assert_eq!(HitPoints::with_current(2, 10).band(), HealthBand::BadlyWounded);
        assert_eq!(HitPoints::with_current(1, 10).band(), HealthBand::NearDeath);
        assert_eq!(HitPoints::with_current(0, 10).band(), HealthBand::Down);
    }

    #[test]
    fn test_inventory_stacks_by_name() {
        let mut inventory = Inventory::default();
        inventory.add_item(Item::new("Void Essence"));
        inventory.add_item(Item::new("void essence"));
        inventory.add_item(Item::new("Rusty Key"));

        assert_eq!(inventory.items.len(), 2);
        assert_eq!(inventory.find_item("VOID ESSENCE").unwrap().quantity, 2);
        assert!(inventory.has_item("rusty key"));
    }

    #[test]
    fn test_character_levels_up() {
        let mut character = Character::new("Ash", Archetype::Warrior);
        let max_before = character.hit_points.maximum;

        assert_eq!(character.gain_experience(60), 0);
        assert_eq!(character.gain_experience(150), 2);
        assert_eq!(character.level, 3);
        assert_eq!(character.hit_points.maximum, max_before + 2 * HP_PER_LEVEL);
        assert!(character.hit_points.current <= character.hit_points.maximum);
    }

    #[test]
    fn test_archetype_from_name() {
        assert_eq!(Archetype::from_name(" paladin "), Some(Archetype::Paladin));
        assert_eq!(Archetype::from_name("bard"), None);
    }

    #[test]
    fn test_world_graph_is_linked_both_ways() {
        let start = Location::new("Emberfall", LocationKind::Village);
        let start_id = start.id;
        let mut world = WorldState::new(start);

        let ruins = Location::new("Sunken Ruins", LocationKind::Ruins);
        let ruins_id = ruins.id;
        world.add_location(ruins, Some(start_id)).unwrap();
        world.move_to(ruins_id).unwrap();

        assert_eq!(world.current_name(), "Sunken Ruins");
        assert!(world.location(start_id).unwrap().connections.contains(&ruins_id));
        assert!(world.location(ruins_id).unwrap().connections.contains(&start_id));
        assert!(world.discovered.contains(&ruins_id));
        assert!(world.validate().is_ok());
    }

    #[test]
    fn test_world_rejects_dangling_references() {
        let mut world = WorldState::new(Location::new("Emberfall", LocationKind::Village));
        let nowhere = LocationId::new();

        assert_eq!(world.move_to(nowhere), Err(WorldError::UnknownLocation(nowhere)));
        assert!(world.add_npc(Npc::new("Mira", "merchant", nowhere)).is_err());

        let mut quest = Quest::new("Lost Relic", "Find it");
        let ghost = NpcId::new();
        quest.giver = Some(ghost);
        assert_eq!(world.add_quest(quest), Err(WorldError::UnknownNpc(ghost)));

        let missing = QuestId::new();
        assert_eq!(
            world.set_quest_status(missing, QuestStatus::Completed),
            Err(WorldError::UnknownQuest(missing))
        );
        assert!(world.validate().is_ok());
    }

    #[test]
    fn test_validate_catches_corruption() {
        let mut world = WorldState::new(Location::new("Emberfall", LocationKind::Village));
        world.current_location = LocationId::new();
        assert!(matches!(world.validate(), Err(WorldError::UnknownLocation(_))));
    }
}
