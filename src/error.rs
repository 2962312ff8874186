//! Error Types
//!
//! Single error taxonomy for the combat engine. Validation failures are
//! recoverable and reported synchronously; an operation that returns an
//! error has made no change to session state.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CombatError {
    #[error("Combatant not found: {0}")]
    CombatantNotFound(String),

    #[error("Unknown condition: {0}")]
    UnknownCondition(String),

    #[error("Spell not found: {0}")]
    SpellNotFound(String),

    #[error("Combatant not placed on the battlemap: {0}")]
    NotPlaced(String),

    #[error("Position ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },

    #[error("Spell is not dismissible: {0}")]
    NotDismissible(String),

    #[error("Only the caster may dismiss spell: {0}")]
    NotCaster(String),

    #[error("Combat already in progress")]
    CombatAlreadyActive,

    #[error("No active combat")]
    NoCombatActive,

    #[error("Combatant has not delayed a turn: {0}")]
    NotDelayed(String),

    #[error("Combatant has already delayed a turn: {0}")]
    AlreadyDelayed(String),

    #[error("Combatant already registered: {0}")]
    DuplicateCombatant(String),
}

pub type Result<T> = std::result::Result<T, CombatError>;
