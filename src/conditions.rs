//! Condition Registry and Status Tracking
//!
//! Two halves: a read-only catalog of condition definitions (mechanical
//! modifiers and behavioral flags, consumed by other rule logic rather than
//! evaluated here) and the per-combatant set of active condition instances
//! with countdown durations.
//!
//! The registry is injected configuration, not module state, so tests can
//! isolate it and alternate rulesets can be swapped in from JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CombatError, Result};

// ============================================================================
// Condition Definitions (registry entries)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionCategory {
    Physical,
    Mental,
    Magical,
    Status,
}

/// Mechanical effect bundle for a condition.
///
/// Numeric fields are flat modifiers; boolean flags describe behavior.
/// The engine itself only acts on `lose_hit_point` and `stabilization_check`
/// at the start of the owning combatant's turn; everything else is
/// descriptive data for attack/save resolution outside this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionEffects {
    #[serde(default)]
    pub attack_modifier: i32,
    #[serde(default)]
    pub armor_class_modifier: i32,
    #[serde(default)]
    pub save_modifier: i32,
    #[serde(default)]
    pub check_modifier: i32,
    #[serde(default)]
    pub cannot_act: bool,
    #[serde(default)]
    pub cannot_move: bool,
    #[serde(default)]
    pub loses_dex_bonus: bool,
    /// Save categories this condition automatically fails.
    #[serde(default)]
    pub auto_fail: Vec<String>,
    /// Bleeds 1 hit point at the start of each of the owner's turns.
    #[serde(default)]
    pub lose_hit_point: bool,
    /// Rolls d20 + Con modifier vs DC 10 at the start of each of the
    /// owner's turns; success swaps `dying` for `disabled`.
    #[serde(default)]
    pub stabilization_check: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub name: String,
    pub category: ConditionCategory,
    pub effects: ConditionEffects,
}

impl ConditionDefinition {
    fn new(name: &str, category: ConditionCategory) -> Self {
        Self {
            name: name.to_string(),
            category,
            effects: ConditionEffects::default(),
        }
    }

    fn attack(mut self, modifier: i32) -> Self {
        self.effects.attack_modifier = modifier;
        self
    }

    fn armor_class(mut self, modifier: i32) -> Self {
        self.effects.armor_class_modifier = modifier;
        self
    }

    fn saves(mut self, modifier: i32) -> Self {
        self.effects.save_modifier = modifier;
        self
    }

    fn checks(mut self, modifier: i32) -> Self {
        self.effects.check_modifier = modifier;
        self
    }

    fn cannot_act(mut self) -> Self {
        self.effects.cannot_act = true;
        self
    }

    fn cannot_move(mut self) -> Self {
        self.effects.cannot_move = true;
        self
    }

    fn loses_dex(mut self) -> Self {
        self.effects.loses_dex_bonus = true;
        self
    }

    fn auto_fail(mut self, saves: &[&str]) -> Self {
        self.effects.auto_fail = saves.iter().map(|s| s.to_string()).collect();
        self
    }

    fn bleeds(mut self) -> Self {
        self.effects.lose_hit_point = true;
        self
    }

    fn stabilizes(mut self) -> Self {
        self.effects.stabilization_check = true;
        self
    }

    fn notes(mut self, notes: &str) -> Self {
        self.effects.notes = notes.to_string();
        self
    }
}

// ============================================================================
// Condition Registry
// ============================================================================

/// Immutable catalog mapping a condition name to its definition.
///
/// Lookup is case-insensitive; names are stored lowercased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRegistry {
    definitions: HashMap<String, ConditionDefinition>,
}

impl ConditionRegistry {
    /// Build a registry from a list of definitions.
    pub fn new(definitions: impl IntoIterator<Item = ConditionDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.name.to_lowercase(), d))
                .collect(),
        }
    }

    /// Load an alternate ruleset from a JSON array of definitions.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let definitions: Vec<ConditionDefinition> = serde_json::from_str(json)?;
        Ok(Self::new(definitions))
    }

    pub fn get(&self, name: &str) -> Option<&ConditionDefinition> {
        self.definitions.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.values().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Standard d20 condition catalog.
    pub fn srd() -> Self {
        use ConditionCategory::*;

        Self::new([
            ConditionDefinition::new("blinded", Physical)
                .attack(-2)
                .armor_class(-2)
                .loses_dex()
                .auto_fail(&["sight"])
                .notes("Moves at half speed; all opponents have concealment"),
            ConditionDefinition::new("dazed", Mental)
                .cannot_act()
                .notes("Can take no actions but defends normally"),
            ConditionDefinition::new("dazzled", Physical)
                .attack(-1)
                .notes("-1 on sight-based Search and Spot checks"),
            ConditionDefinition::new("disabled", Status)
                .notes("At exactly 0 hp; a single move or standard action per turn"),
            ConditionDefinition::new("dying", Status)
                .cannot_act()
                .cannot_move()
                .bleeds()
                .stabilizes()
                .notes("Unconscious and losing hit points each round"),
            ConditionDefinition::new("dead", Status)
                .cannot_act()
                .cannot_move()
                .notes("Hit points at -10 or below"),
            ConditionDefinition::new("entangled", Physical)
                .attack(-2)
                .checks(-4)
                .notes("-4 effective Dexterity; half speed, no running or charging"),
            ConditionDefinition::new("exhausted", Physical)
                .attack(-6)
                .checks(-6)
                .notes("-6 effective Strength and Dexterity; half speed"),
            ConditionDefinition::new("fatigued", Physical)
                .attack(-2)
                .checks(-2)
                .notes("-2 effective Strength and Dexterity; no running or charging"),
            ConditionDefinition::new("frightened", Mental)
                .attack(-2)
                .saves(-2)
                .checks(-2)
                .notes("Flees from the source of its fear"),
            ConditionDefinition::new("grappled", Physical)
                .loses_dex()
                .notes("Cannot move or attack at range; -4 on attacks outside the grapple"),
            ConditionDefinition::new("nauseated", Physical)
                .cannot_act()
                .notes("Can take only a single move action per turn"),
            ConditionDefinition::new("panicked", Mental)
                .attack(-2)
                .saves(-2)
                .checks(-2)
                .notes("Drops held items and flees along a random path"),
            ConditionDefinition::new("paralyzed", Physical)
                .cannot_act()
                .cannot_move()
                .loses_dex()
                .auto_fail(&["reflex"])
                .notes("Effective Dexterity and Strength of 0; helpless"),
            ConditionDefinition::new("prone", Physical)
                .attack(-4)
                .armor_class(-4)
                .notes("AC penalty applies against melee only; +4 AC vs ranged"),
            ConditionDefinition::new("shaken", Mental)
                .attack(-2)
                .saves(-2)
                .checks(-2)
                .notes("Mildest fear condition"),
            ConditionDefinition::new("sickened", Physical)
                .attack(-2)
                .saves(-2)
                .checks(-2)
                .notes("-2 on weapon damage rolls"),
            ConditionDefinition::new("stunned", Mental)
                .cannot_act()
                .armor_class(-2)
                .loses_dex()
                .notes("Drops held items"),
            ConditionDefinition::new("unconscious", Status)
                .cannot_act()
                .cannot_move()
                .loses_dex()
                .auto_fail(&["reflex"])
                .notes("Knocked out and helpless"),
        ])
    }
}

// ============================================================================
// Condition Instances (per-combatant state)
// ============================================================================

/// One active condition on one combatant.
///
/// `duration` of `None` means permanent; otherwise `remaining` counts down
/// once per owning combatant's turn start and the instance is removed when
/// it reaches zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionInstance {
    pub name: String,
    pub applied_round: u32,
    pub duration: Option<u32>,
    pub remaining: Option<u32>,
    pub source: Option<String>,
}

/// The set of active conditions on a single combatant.
///
/// Identical conditions do not stack: re-applying a name overwrites the
/// prior instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionSet {
    instances: Vec<ConditionInstance>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a condition, overwriting any prior instance of the same name.
    pub fn apply(
        &mut self,
        name: &str,
        applied_round: u32,
        duration: Option<u32>,
        source: Option<String>,
    ) {
        let name = name.to_lowercase();
        self.instances.retain(|c| c.name != name);
        self.instances.push(ConditionInstance {
            name,
            applied_round,
            duration,
            remaining: duration,
            source,
        });
    }

    /// Remove a condition by name. Returns the removed instance, if any.
    pub fn remove(&mut self, name: &str) -> Option<ConditionInstance> {
        let name = name.to_lowercase();
        let pos = self.instances.iter().position(|c| c.name == name)?;
        Some(self.instances.remove(pos))
    }

    pub fn has(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.instances.iter().any(|c| c.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ConditionInstance> {
        let name = name.to_lowercase();
        self.instances.iter().find(|c| c.name == name)
    }

    pub fn instances(&self) -> &[ConditionInstance] {
        &self.instances
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Decrement timed durations by one turn; remove anything that hits
    /// zero. Permanent conditions are untouched. Returns the names of the
    /// expired conditions.
    pub fn tick(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        self.instances.retain_mut(|c| {
            match c.remaining {
                Some(0) => {
                    // Clamped-at-zero instance that was never cleaned up.
                    expired.push(c.name.clone());
                    false
                }
                Some(ref mut remaining) => {
                    *remaining -= 1;
                    if *remaining == 0 {
                        expired.push(c.name.clone());
                        false
                    } else {
                        true
                    }
                }
                None => true,
            }
        });
        expired
    }

}

/// Validate a condition name against the registry before applying it.
/// Unknown names are a hard error; warn-and-ignore would swallow rule
/// violations.
pub fn lookup<'a>(registry: &'a ConditionRegistry, name: &str) -> Result<&'a ConditionDefinition> {
    registry
        .get(name)
        .ok_or_else(|| CombatError::UnknownCondition(name.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
