//! Combatants and Health Status
//!
//! Combatant records owned by the session for the lifetime of an encounter,
//! plus the derived health state machine. Hit points are stored signed:
//! the dying (-1..-9) and dead (<= -10) thresholds need negative values,
//! while `displayed_hp()` is the zero-floored figure presentation layers
//! show. Health status is always derived from current HP, never persisted,
//! so it cannot desynchronize.

use serde::{Deserialize, Serialize};

use crate::conditions::ConditionSet;

// ============================================================================
// Input Contract
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatantKind {
    Player,
    Npc,
    Monster,
}

/// Combatant record handed in by character/equipment generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: String,
    pub name: String,
    pub kind: CombatantKind,
    pub initiative_modifier: i32,
    pub current_hit_points: i32,
    pub max_hit_points: i32,
    pub constitution: i32,
    #[serde(default)]
    pub damage_reduction: Option<i32>,
}

impl ParticipantRecord {
    pub fn new(id: &str, name: &str, kind: CombatantKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            initiative_modifier: 0,
            current_hit_points: 1,
            max_hit_points: 1,
            constitution: 10,
            damage_reduction: None,
        }
    }

    pub fn with_initiative_modifier(mut self, modifier: i32) -> Self {
        self.initiative_modifier = modifier;
        self
    }

    pub fn with_hit_points(mut self, current: i32, max: i32) -> Self {
        self.current_hit_points = current;
        self.max_hit_points = max;
        self
    }

    pub fn with_constitution(mut self, score: i32) -> Self {
        self.constitution = score;
        self
    }

    pub fn with_damage_reduction(mut self, reduction: i32) -> Self {
        self.damage_reduction = Some(reduction);
        self
    }
}

// ============================================================================
// Health Status
// ============================================================================

/// Derived health state: healthy above 0 hp, disabled at exactly 0, dying
/// between -1 and -9, dead at -10 or below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Disabled,
    Dying,
    Dead,
}

impl HealthStatus {
    pub fn from_hp(hit_points: i32) -> Self {
        if hit_points > 0 {
            Self::Healthy
        } else if hit_points == 0 {
            Self::Disabled
        } else if hit_points > -10 {
            Self::Dying
        } else {
            Self::Dead
        }
    }
}

// ============================================================================
// Combatant
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Combatant {
    pub id: String,
    pub name: String,
    pub kind: CombatantKind,
    pub initiative_modifier: i32,
    /// Signed hit points; may go negative to drive dying/death transitions.
    pub hit_points: i32,
    pub max_hit_points: i32,
    /// HP at the moment combat started, for the end-of-combat summary.
    pub starting_hp: i32,
    pub constitution: i32,
    pub damage_reduction: Option<i32>,
    #[serde(default)]
    pub conditions: ConditionSet,
}

impl Combatant {
    pub fn from_record(record: &ParticipantRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            kind: record.kind,
            initiative_modifier: record.initiative_modifier,
            hit_points: record.current_hit_points,
            max_hit_points: record.max_hit_points,
            starting_hp: record.current_hit_points,
            constitution: record.constitution,
            damage_reduction: record.damage_reduction,
            conditions: ConditionSet::new(),
        }
    }

    /// Constitution modifier derived from the ability score.
    pub fn constitution_modifier(&self) -> i32 {
        (self.constitution - 10).div_euclid(2)
    }

    /// Zero-floored hit points for presentation.
    pub fn displayed_hp(&self) -> i32 {
        self.hit_points.max(0)
    }

    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::from_hp(self.hit_points)
    }

    pub fn is_dead(&self) -> bool {
        self.health_status() == HealthStatus::Dead || self.conditions.has("dead")
    }

    /// Apply raw damage after reduction. Returns the amount actually taken.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        if amount <= 0 {
            return 0;
        }
        let reduced = match self.damage_reduction {
            Some(reduction) => (amount - reduction.max(0)).max(0),
            None => amount,
        };
        self.hit_points -= reduced;
        reduced
    }

    /// Heal up to max. Returns the new signed HP value.
    pub fn receive_healing(&mut self, amount: i32) -> i32 {
        if amount > 0 {
            self.hit_points = (self.hit_points + amount).min(self.max_hit_points);
        }
        self.hit_points
    }
}

// ============================================================================
// Tests
// ============================================================================
