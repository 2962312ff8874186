//! Encounter Core
//!
//! Turn-based combat simulation engine for tabletop RPG encounters:
//! initiative ordering, round/turn progression, condition lifecycles,
//! timed spell-effect decay, battlefield-grid distance math, and hit-point
//! state transitions. Character data, persistence, and presentation are
//! external collaborators; the engine consumes plain participant records
//! and emits state snapshots plus an append-only event log.

pub mod battlemap;
pub mod combatant;
pub mod conditions;
pub mod dice;
pub mod error;
pub mod initiative;
pub mod session;
pub mod spells;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use battlemap::{
    hex_distance, square_distance, Battlemap, GridConfig, GridShape, MoveReport, Position,
    RangeInfo,
};
pub use combatant::{Combatant, CombatantKind, HealthStatus, ParticipantRecord};
pub use conditions::{
    ConditionCategory, ConditionDefinition, ConditionEffects, ConditionInstance,
    ConditionRegistry, ConditionSet,
};
pub use dice::DiceRoller;
pub use error::{CombatError, Result};
pub use initiative::{InitiativeEntry, InitiativeOrder};
pub use session::{
    CombatEvent, CombatEventType, CombatSession, CombatState, CombatSummary, DamageReport,
    EncounterSnapshot, ReadiedAction,
};
pub use spells::{parse_duration, SpellData, SpellDuration, SpellTracker, TrackedSpell};
