//! Spell Duration Tracking
//!
//! Tracks timed spell effects independent of any single combatant (a spell
//! may have several targets), decrements them once per combatant turn, and
//! reports which spells ended so the session can strip the conditions they
//! granted.
//!
//! Duration text is converted at tabletop rates: 1 minute = 10 rounds,
//! 1 hour = 600 rounds. Unrecognized text falls back to a single round.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CombatError, Result};

// ============================================================================
// Durations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SpellDuration {
    Rounds(u32),
    Instantaneous,
    Permanent,
    /// Persists while the caster maintains it; never auto-decremented.
    Concentration,
}

impl SpellDuration {
    /// Rounds remaining for a timed duration; None for the sentinels.
    pub fn rounds(&self) -> Option<u32> {
        match self {
            Self::Rounds(n) => Some(*n),
            _ => None,
        }
    }
}

/// Parse a free-text duration into a structured one.
///
/// Case-insensitive keyword scan: "instant" wins over "permanent" wins
/// over "concentration", then
/// "N round(s)" / "N minute(s)" / "N hour(s)", defaulting to one round.
pub fn parse_duration(text: &str) -> SpellDuration {
    let text = text.trim().to_lowercase();

    if text.contains("instant") {
        return SpellDuration::Instantaneous;
    }
    if text.contains("permanent") {
        return SpellDuration::Permanent;
    }
    if text.contains("concentration") {
        return SpellDuration::Concentration;
    }

    let leading_number = text
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<u32>().ok());

    if let Some(n) = leading_number {
        if text.contains("round") {
            return SpellDuration::Rounds(n);
        }
        if text.contains("minute") {
            return SpellDuration::Rounds(n * 10);
        }
        if text.contains("hour") {
            return SpellDuration::Rounds(n * 600);
        }
    }

    SpellDuration::Rounds(1)
}

// ============================================================================
// Tracked Spells
// ============================================================================

/// Input record for tracking a spell effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellData {
    pub name: String,
    pub caster_id: String,
    pub target_ids: Vec<String>,
    /// Free-text duration as printed in the spell description.
    pub duration: String,
    #[serde(default)]
    pub dismissible: bool,
    /// Condition names the spell applies to its targets.
    #[serde(default)]
    pub granted_conditions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedSpell {
    pub id: String,
    pub name: String,
    pub caster_id: String,
    pub target_ids: Vec<String>,
    pub duration: SpellDuration,
    /// Countdown for `Rounds` durations; mirrors `duration` at creation.
    pub remaining_rounds: Option<u32>,
    pub concentration: bool,
    pub dismissible: bool,
    pub granted_conditions: Vec<String>,
}

/// Outcome of one duration tick, for the session to log and act on.
#[derive(Debug, Default)]
pub struct SpellTickReport {
    /// Spells removed this tick, with the conditions to strip per target.
    pub ended: Vec<TrackedSpell>,
    /// Spells at three or fewer rounds remaining: (id, name, remaining).
    pub expiring: Vec<(String, String, u32)>,
}

// ============================================================================
// Spell Tracker
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpellTracker {
    spells: HashMap<String, TrackedSpell>,
}

impl SpellTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a spell. The generated id is caster + name + creation millis,
    /// unique within a session.
    pub fn track(&mut self, data: SpellData) -> String {
        let duration = parse_duration(&data.duration);
        let base = format!(
            "{}-{}-{}",
            data.caster_id,
            data.name.to_lowercase().replace(' ', "-"),
            Utc::now().timestamp_millis()
        );
        let mut id = base.clone();
        let mut suffix = 1;
        while self.spells.contains_key(&id) {
            id = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        let spell = TrackedSpell {
            id: id.clone(),
            name: data.name,
            caster_id: data.caster_id,
            target_ids: data.target_ids,
            remaining_rounds: duration.rounds(),
            concentration: duration == SpellDuration::Concentration,
            dismissible: data.dismissible,
            granted_conditions: data.granted_conditions,
            duration,
        };

        log::debug!("tracking spell {} ({:?})", spell.id, spell.duration);
        self.spells.insert(id.clone(), spell);
        id
    }

    pub fn get(&self, spell_id: &str) -> Option<&TrackedSpell> {
        self.spells.get(spell_id)
    }

    pub fn spells(&self) -> &HashMap<String, TrackedSpell> {
        &self.spells
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }

    pub fn clear(&mut self) {
        self.spells.clear();
    }

    /// Decrement every round-based spell by one turn. Runs once per
    /// combatant turn start, not once per round. Concentration, permanent,
    /// and instantaneous spells are never auto-decremented.
    pub fn tick(&mut self) -> SpellTickReport {
        let mut report = SpellTickReport::default();

        let mut ended_ids = Vec::new();
        for spell in self.spells.values_mut() {
            let Some(remaining) = spell.remaining_rounds else {
                continue;
            };
            if remaining == 0 {
                ended_ids.push(spell.id.clone());
                continue;
            }
            let remaining = remaining - 1;
            spell.remaining_rounds = Some(remaining);
            if remaining == 0 {
                ended_ids.push(spell.id.clone());
            } else if remaining <= 3 {
                log::warn!(
                    "spell {} expiring in {} round(s)",
                    spell.name,
                    remaining
                );
                report
                    .expiring
                    .push((spell.id.clone(), spell.name.clone(), remaining));
            }
        }

        for id in ended_ids {
            if let Some(spell) = self.spells.remove(&id) {
                report.ended.push(spell);
            }
        }
        report
    }

    /// Remove a spell unconditionally. The session strips granted
    /// conditions from the returned spell's targets.
    pub fn end(&mut self, spell_id: &str) -> Result<TrackedSpell> {
        self.spells
            .remove(spell_id)
            .ok_or_else(|| CombatError::SpellNotFound(spell_id.to_string()))
    }

    /// Dismiss a spell early. Only the original caster may dismiss, and
    /// only if the spell was flagged dismissible; failures leave the spell
    /// untouched.
    pub fn dismiss(&mut self, spell_id: &str, caster_id: &str) -> Result<TrackedSpell> {
        let spell = self
            .spells
            .get(spell_id)
            .ok_or_else(|| CombatError::SpellNotFound(spell_id.to_string()))?;

        if !spell.dismissible {
            return Err(CombatError::NotDismissible(spell_id.to_string()));
        }
        if spell.caster_id != caster_id {
            return Err(CombatError::NotCaster(spell_id.to_string()));
        }
        self.end(spell_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_table() {
        assert_eq!(parse_duration("3 rounds"), SpellDuration::Rounds(3));
        assert_eq!(parse_duration("1 round"), SpellDuration::Rounds(1));
        assert_eq!(parse_duration("2 minutes"), SpellDuration::Rounds(20));
        assert_eq!(parse_duration("1 hour"), SpellDuration::Rounds(600));
        assert_eq!(parse_duration("Instantaneous"), SpellDuration::Instantaneous);
        assert_eq!(parse_duration("permanent"), SpellDuration::Permanent);
        assert_eq!(
            parse_duration("Concentration, up to 1 minute"),
            SpellDuration::Concentration
        );
        assert_eq!(parse_duration("see text"), SpellDuration::Rounds(1));
    }

    fn rounds_spell(name: &str, duration: &str) -> SpellData {
        SpellData {
            name: name.to_string(),
            caster_id: "wizard".to_string(),
            target_ids: vec!["goblin".to_string()],
            duration: duration.to_string(),
            dismissible: false,
            granted_conditions: vec![],
        }
    }

    #[test]
    fn test_tick_decrements_and_ends() {
        let mut tracker = SpellTracker::new();
        tracker.track(rounds_spell("Daze", "2 rounds"));

        let report = tracker.tick();
        assert!(report.ended.is_empty());
        assert_eq!(tracker.len(), 1);

        let report = tracker.tick();
        assert_eq!(report.ended.len(), 1);
        assert_eq!(report.ended[0].name, "Daze");
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_tick_warns_under_three_rounds() {
        let mut tracker = SpellTracker::new();
        tracker.track(rounds_spell("Haste", "5 rounds"));

        assert!(tracker.tick().expiring.is_empty()); // 4 left
        let report = tracker.tick(); // 3 left
        assert_eq!(report.expiring.len(), 1);
        assert_eq!(report.expiring[0].2, 3);
    }

    #[test]
    fn test_sentinel_durations_never_tick() {
        let mut tracker = SpellTracker::new();
        tracker.track(rounds_spell("Mage Armor", "permanent"));
        tracker.track(rounds_spell("Invisibility", "concentration"));

        for _ in 0..20 {
            let report = tracker.tick();
            assert!(report.ended.is_empty());
        }
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_dismiss_requires_flag_and_caster() {
        let mut tracker = SpellTracker::new();
        let mut data = rounds_spell("Web", "10 rounds");
        data.dismissible = true;
        let id = tracker.track(data);

        assert!(matches!(
            tracker.dismiss(&id, "goblin"),
            Err(CombatError::NotCaster(_))
        ));
        assert_eq!(tracker.len(), 1); // failure had no side effects

        tracker.dismiss(&id, "wizard").unwrap();
        assert!(tracker.is_empty());

        let id = tracker.track(rounds_spell("Grease", "10 rounds"));
        assert!(matches!(
            tracker.dismiss(&id, "wizard"),
            Err(CombatError::NotDismissible(_))
        ));
    }

    #[test]
    fn test_end_unknown_spell_is_error() {
        let mut tracker = SpellTracker::new();
        assert!(matches!(
            tracker.end("nope"),
            Err(CombatError::SpellNotFound(_))
        ));
    }
}
