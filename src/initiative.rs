//! Initiative Order
//!
//! Pure ordering logic for the turn sequence: sorting rolled entries,
//! advancing the index, and the exact splice used when a delayed combatant
//! re-enters the order. Round bookkeeping and per-turn effects live in the
//! session, which drives this structure.
//!
//! Entries sort by initiative total (highest first), tie-broken by
//! modifier (highest first), then by roll-time sequence number. The
//! sequence key keeps re-splicing exact under repeated delays.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{CombatError, Result};

// ============================================================================
// Initiative Entries
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiativeEntry {
    pub combatant_id: String,
    pub name: String,
    /// Resolved total: d20 roll + modifier.
    pub total: i32,
    pub roll: u32,
    pub modifier: i32,
    /// Position in the roll sequence; the stable final tie-breaker.
    pub sequence: usize,
    #[serde(default)]
    pub delayed: bool,
    #[serde(default)]
    pub has_readied_action: bool,
}

impl InitiativeEntry {
    fn sort_key(&self, other: &Self) -> Ordering {
        other
            .total
            .cmp(&self.total)
            .then_with(|| other.modifier.cmp(&self.modifier))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

// ============================================================================
// Initiative Order
// ============================================================================

/// The sorted turn order plus the current-turn cursor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitiativeOrder {
    entries: Vec<InitiativeEntry>,
    current: usize,
}

impl InitiativeOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole order with freshly rolled entries and reset the
    /// cursor. Rolling again never merges with a prior order.
    pub fn rebuild(&mut self, mut entries: Vec<InitiativeEntry>) {
        entries.sort_by(|a, b| a.sort_key(b));
        self.entries = entries;
        self.current = 0;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[InitiativeEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&InitiativeEntry> {
        self.entries.get(self.current)
    }

    pub fn get(&self, combatant_id: &str) -> Option<&InitiativeEntry> {
        self.entries.iter().find(|e| e.combatant_id == combatant_id)
    }

    pub fn get_mut(&mut self, combatant_id: &str) -> Option<&mut InitiativeEntry> {
        self.entries.iter_mut().find(|e| e.combatant_id == combatant_id)
    }

    /// Step the cursor forward. Returns true when the order wrapped, which
    /// is the caller's signal to start a new round.
    pub fn advance(&mut self) -> bool {
        debug_assert!(!self.entries.is_empty(), "cannot advance an empty order");
        self.current += 1;
        if self.current >= self.entries.len() {
            self.current = 0;
            true
        } else {
            false
        }
    }

    /// Insert a late joiner at its sorted position without disturbing whose
    /// turn it is.
    pub fn insert_sorted(&mut self, entry: InitiativeEntry) {
        let pos = self
            .entries
            .iter()
            .position(|e| entry.sort_key(e) == Ordering::Less)
            .unwrap_or(self.entries.len());
        if pos <= self.current && !self.entries.is_empty() {
            self.current += 1;
        }
        self.entries.insert(pos, entry);
    }

    /// Remove an entry, keeping the cursor on the same combatant where
    /// possible and clamped into range otherwise.
    pub fn remove(&mut self, combatant_id: &str) -> Result<InitiativeEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.combatant_id == combatant_id)
            .ok_or_else(|| CombatError::CombatantNotFound(combatant_id.to_string()))?;

        let removed = self.entries.remove(pos);
        if pos < self.current && self.current > 0 {
            self.current -= 1;
        }
        self.current = self.current.min(self.entries.len().saturating_sub(1));
        Ok(removed)
    }

    /// Re-splice a delayed combatant immediately before the current slot,
    /// making it the new current entry ("acts now, then falls back into the
    /// order" at this position).
    pub fn splice_before_current(&mut self, combatant_id: &str) -> Result<()> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.combatant_id == combatant_id)
            .ok_or_else(|| CombatError::CombatantNotFound(combatant_id.to_string()))?;

        let entry = self.entries.remove(pos);
        if pos < self.current && self.current > 0 {
            self.current -= 1;
        }
        self.entries.insert(self.current, entry);
        Ok(())
    }

    /// Highest sequence number handed out so far; new rolls continue from
    /// here so late joiners keep a unique tie-breaker.
    pub fn next_sequence(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.sequence + 1)
            .max()
            .unwrap_or(0)
    }
}

// ============================================================================
// Tests
// ============================================================================
