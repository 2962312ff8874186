//! Combat Session
//!
//! The orchestrator for a single encounter: it owns the combatants, the
//! initiative order, active conditions, tracked spells, and the battlemap,
//! and exposes the public command surface. Every command runs to completion
//! before the next is accepted; callers sharing a session across threads
//! must serialize writes through a single-writer discipline.
//!
//! All externally consumable history goes through the append-only event
//! log: `{round, turn, timestamp, event, details}` records that are never
//! mutated after append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::battlemap::{Battlemap, GridConfig, MoveReport, RangeInfo};
use crate::combatant::{Combatant, HealthStatus, ParticipantRecord};
use crate::conditions::{lookup, ConditionInstance, ConditionRegistry};
use crate::dice::DiceRoller;
use crate::error::{CombatError, Result};
use crate::initiative::{InitiativeEntry, InitiativeOrder};
use crate::spells::{SpellData, SpellTracker, TrackedSpell};

// ============================================================================
// Event Log
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatEventType {
    CombatStarted,
    CombatEnded,
    InitiativeRolled,
    TurnStarted,
    TurnEnded,
    RoundStarted,
    TurnDelayed,
    DelayedTurnTaken,
    ActionReadied,
    Damage,
    Healing,
    ConditionApplied,
    ConditionRemoved,
    ConditionExpired,
    SpellTracked,
    SpellExpiring,
    SpellEnded,
    Movement,
    Death,
    Stabilized,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatEvent {
    pub round: u32,
    pub turn: usize,
    pub timestamp: DateTime<Utc>,
    pub event: CombatEventType,
    pub details: String,
}

// ============================================================================
// Session State
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatState {
    pub encounter_id: String,
    pub active: bool,
    pub round: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub events: Vec<CombatEvent>,
}

impl Default for CombatState {
    fn default() -> Self {
        Self {
            encounter_id: Uuid::new_v4().to_string(),
            active: false,
            round: 0,
            started_at: None,
            events: vec![],
        }
    }
}

/// An unresolved readied action. The engine records intent; trigger
/// evaluation belongs to the caller, who polls `readied_actions()` and
/// resolves entries as triggers fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadiedAction {
    pub combatant_id: String,
    pub action: String,
    pub trigger: String,
    pub recorded_round: u32,
}

/// Result of a damage application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DamageReport {
    /// Damage actually taken after reduction.
    pub taken: i32,
    /// Signed hit points after the hit.
    pub hit_points: i32,
    /// Zero-floored hit points for display.
    pub displayed_hp: i32,
    pub status: HealthStatus,
}

/// End-of-combat summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatSummary {
    pub encounter_id: String,
    pub rounds: u32,
    /// Combatants with HP above zero and no dead tag.
    pub survivors: Vec<String>,
}

/// Serializable snapshot of a whole encounter. Importing a snapshot
/// reproduces identical subsequent behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterSnapshot {
    pub state: CombatState,
    pub order: InitiativeOrder,
    pub combatants: HashMap<String, Combatant>,
    /// Registration order; combatants are keyed by id above.
    pub roster: Vec<String>,
    pub spells: SpellTracker,
    pub battlemap: Battlemap,
    pub delayed: Vec<String>,
    pub readied: Vec<ReadiedAction>,
    /// See `CombatSession::turn_effects_done`.
    #[serde(default)]
    pub turn_effects_done: Option<String>,
}

// ============================================================================
// Combat Session
// ============================================================================

pub struct CombatSession {
    registry: ConditionRegistry,
    roller: DiceRoller,
    state: CombatState,
    order: InitiativeOrder,
    combatants: HashMap<String, Combatant>,
    roster: Vec<String>,
    spells: SpellTracker,
    battlemap: Battlemap,
    delayed: Vec<String>,
    readied: Vec<ReadiedAction>,
    /// Combatant whose start-of-turn effects already ran for the current
    /// turn slot. A delayed-turn splice pushes that combatant back to
    /// "next", and advancing onto it again must not re-run its effects.
    turn_effects_done: Option<String>,
}

impl CombatSession {
    pub fn new(registry: ConditionRegistry, roller: DiceRoller) -> Self {
        Self::with_grid(registry, roller, GridConfig::default())
    }

    pub fn with_grid(registry: ConditionRegistry, roller: DiceRoller, grid: GridConfig) -> Self {
        Self {
            registry,
            roller,
            state: CombatState::default(),
            order: InitiativeOrder::new(),
            combatants: HashMap::new(),
            roster: vec![],
            spells: SpellTracker::new(),
            battlemap: Battlemap::new(grid),
            delayed: vec![],
            readied: vec![],
            turn_effects_done: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> &CombatState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn round(&self) -> u32 {
        self.state.round
    }

    pub fn current_turn_index(&self) -> usize {
        self.order.current_index()
    }

    pub fn events(&self) -> &[CombatEvent] {
        &self.state.events
    }

    pub fn initiative_order(&self) -> &[InitiativeEntry] {
        self.order.entries()
    }

    pub fn combatant(&self, combatant_id: &str) -> Result<&Combatant> {
        self.combatants
            .get(combatant_id)
            .ok_or_else(|| CombatError::CombatantNotFound(combatant_id.to_string()))
    }

    fn combatant_mut(&mut self, combatant_id: &str) -> Result<&mut Combatant> {
        self.combatants
            .get_mut(combatant_id)
            .ok_or_else(|| CombatError::CombatantNotFound(combatant_id.to_string()))
    }

    pub fn registry(&self) -> &ConditionRegistry {
        &self.registry
    }

    pub fn battlemap(&self) -> &Battlemap {
        &self.battlemap
    }

    pub fn battlemap_mut(&mut self) -> &mut Battlemap {
        &mut self.battlemap
    }

    pub fn tracked_spells(&self) -> &HashMap<String, TrackedSpell> {
        self.spells.spells()
    }

    pub fn readied_actions(&self) -> &[ReadiedAction] {
        &self.readied
    }

    pub fn delayed_combatants(&self) -> &[String] {
        &self.delayed
    }

    // ========================================================================
    // Event Logging
    // ========================================================================

    /// Append a record to the event log. Records are immutable once
    /// appended; this is the only externally consumable history.
    pub fn log_event(&mut self, event: CombatEventType, details: impl Into<String>) {
        self.state.events.push(CombatEvent {
            round: self.state.round,
            turn: self.order.current_index(),
            timestamp: Utc::now(),
            event,
            details: details.into(),
        });
    }

    // ========================================================================
    // Encounter Lifecycle
    // ========================================================================

    /// Activate the session: register every participant, set round 1, and
    /// roll initiative. Fails if combat is already in progress. A rejected
    /// participant list leaves the prior encounter state intact.
    pub fn start_combat(&mut self, participants: &[ParticipantRecord]) -> Result<()> {
        if self.state.active {
            return Err(CombatError::CombatAlreadyActive);
        }

        // Validate and build the roster before touching session state.
        let mut combatants = HashMap::with_capacity(participants.len());
        let mut roster = Vec::with_capacity(participants.len());
        for record in participants {
            if combatants.contains_key(&record.id) {
                return Err(CombatError::DuplicateCombatant(record.id.clone()));
            }
            combatants.insert(record.id.clone(), Combatant::from_record(record));
            roster.push(record.id.clone());
        }

        self.state = CombatState {
            encounter_id: Uuid::new_v4().to_string(),
            active: true,
            round: 1,
            started_at: Some(Utc::now()),
            events: vec![],
        };
        self.order.clear();
        self.combatants = combatants;
        self.roster = roster;
        self.spells.clear();
        self.delayed.clear();
        self.readied.clear();
        self.turn_effects_done = None;

        log::info!(
            "combat started: encounter {} with {} participants",
            self.state.encounter_id,
            participants.len()
        );
        self.log_event(
            CombatEventType::CombatStarted,
            format!("Combat started with {} participants", participants.len()),
        );
        self.roll_initiative();
        Ok(())
    }

    /// Deactivate the session and summarize. Tracked spells and the
    /// delayed/readied lists are cleared; combatants and the event log stay
    /// readable until the next `start_combat`.
    pub fn end_combat(&mut self) -> Result<CombatSummary> {
        if !self.state.active {
            return Err(CombatError::NoCombatActive);
        }

        let survivors: Vec<String> = self
            .roster
            .iter()
            .filter(|id| {
                self.combatants
                    .get(*id)
                    .map(|c| c.hit_points > 0 && !c.is_dead())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        self.spells.clear();
        self.delayed.clear();
        self.readied.clear();
        self.state.active = false;

        let rounds = self.state.round;
        log::info!("combat ended after {} round(s)", rounds);
        self.log_event(
            CombatEventType::CombatEnded,
            format!("Combat ended after {} round(s)", rounds),
        );

        Ok(CombatSummary {
            encounter_id: self.state.encounter_id.clone(),
            rounds,
            survivors,
        })
    }

    /// Register a late joiner. When initiative has been rolled, the
    /// newcomer rolls too and slots in by the ordering key without
    /// disturbing whose turn it is.
    pub fn add_combatant(&mut self, record: &ParticipantRecord) -> Result<()> {
        if self.combatants.contains_key(&record.id) {
            return Err(CombatError::DuplicateCombatant(record.id.clone()));
        }
        self.combatants
            .insert(record.id.clone(), Combatant::from_record(record));
        self.roster.push(record.id.clone());

        if !self.order.is_empty() {
            let roll = self.roller.d20();
            let entry = InitiativeEntry {
                combatant_id: record.id.clone(),
                name: record.name.clone(),
                total: roll as i32 + record.initiative_modifier,
                roll,
                modifier: record.initiative_modifier,
                sequence: self.order.next_sequence(),
                delayed: false,
                has_readied_action: false,
            };
            self.log_event(
                CombatEventType::InitiativeRolled,
                format!("{} joins at initiative {}", entry.name, entry.total),
            );
            self.order.insert_sorted(entry);
        }
        Ok(())
    }

    /// Remove a combatant from the encounter entirely: order, battlemap,
    /// delayed list, and readied queue.
    pub fn remove_combatant(&mut self, combatant_id: &str) -> Result<Combatant> {
        let combatant = self
            .combatants
            .remove(combatant_id)
            .ok_or_else(|| CombatError::CombatantNotFound(combatant_id.to_string()))?;

        self.roster.retain(|id| id != combatant_id);
        let _ = self.order.remove(combatant_id);
        self.battlemap.remove(combatant_id);
        self.delayed.retain(|id| id != combatant_id);
        self.readied.retain(|r| r.combatant_id != combatant_id);
        Ok(combatant)
    }

    // ========================================================================
    // Initiative
    // ========================================================================

    /// Roll d20 + modifier for every registered combatant and rebuild the
    /// order from scratch. Re-rolling fully replaces the prior order and
    /// clears any delay bookkeeping.
    pub fn roll_initiative(&mut self) {
        let mut entries = Vec::with_capacity(self.roster.len());
        for (sequence, id) in self.roster.iter().enumerate() {
            let Some(combatant) = self.combatants.get(id) else {
                continue;
            };
            let roll = self.roller.d20();
            entries.push(InitiativeEntry {
                combatant_id: id.clone(),
                name: combatant.name.clone(),
                total: roll as i32 + combatant.initiative_modifier,
                roll,
                modifier: combatant.initiative_modifier,
                sequence,
                delayed: false,
                has_readied_action: false,
            });
        }

        self.order.rebuild(entries);
        self.delayed.clear();
        self.turn_effects_done = None;

        let summary = self
            .order
            .entries()
            .iter()
            .map(|e| format!("{} {}", e.name, e.total))
            .collect::<Vec<_>>()
            .join(", ");
        self.log_event(
            CombatEventType::InitiativeRolled,
            format!("Initiative order: {}", summary),
        );
    }

    pub fn current_combatant(&self) -> Option<&InitiativeEntry> {
        self.order.current()
    }

    /// Advance to the next turn. No-op while combat is inactive or before
    /// initiative has been rolled. Crossing the end of the order starts a
    /// new round exactly once.
    pub fn next_turn(&mut self) -> Result<Option<InitiativeEntry>> {
        if !self.state.active || self.order.is_empty() {
            return Ok(None);
        }

        if let Some(ending) = self.order.current() {
            let ending_id = ending.combatant_id.clone();
            let ending_name = ending.name.clone();
            self.end_of_turn_effects(&ending_id);
            self.log_event(CombatEventType::TurnEnded, format!("{} ends turn", ending_name));
        }

        if self.order.advance() {
            self.start_new_round();
        }

        let current = self
            .order
            .current()
            .cloned()
            .ok_or(CombatError::NoCombatActive)?;
        debug_assert!(self.order.current_index() < self.order.len());

        if self.turn_effects_done.as_deref() == Some(current.combatant_id.as_str()) {
            self.turn_effects_done = None;
        } else {
            self.start_of_turn_effects(&current.combatant_id)?;
            self.turn_effects_done = Some(current.combatant_id.clone());
        }
        self.log_event(
            CombatEventType::TurnStarted,
            format!("{} starts turn", current.name),
        );

        Ok(self.order.current().cloned())
    }

    /// Increment the round and reset the turn cursor. Never skipped when
    /// the order wraps.
    fn start_new_round(&mut self) {
        self.state.round += 1;
        // Everyone gets a fresh turn slot in the new round.
        self.turn_effects_done = None;
        self.start_of_round_effects();
        log::debug!("round {} begins", self.state.round);
        self.log_event(
            CombatEventType::RoundStarted,
            format!("Round {} begins", self.state.round),
        );
    }

    /// Extension seam for effects that fire when a combatant's turn ends.
    fn end_of_turn_effects(&mut self, _combatant_id: &str) {}

    /// Extension seam for effects that fire when a new round begins.
    fn start_of_round_effects(&mut self) {}

    /// Start-of-turn processing for the new current combatant: condition
    /// countdowns, bleed, stabilization checks, and the global spell tick.
    fn start_of_turn_effects(&mut self, combatant_id: &str) -> Result<()> {
        self.tick_conditions(combatant_id)?;
        self.bleed_if_dying(combatant_id)?;
        self.attempt_stabilization(combatant_id)?;
        self.tick_spells();
        Ok(())
    }

    fn tick_conditions(&mut self, combatant_id: &str) -> Result<()> {
        let combatant = self.combatant_mut(combatant_id)?;
        let name = combatant.name.clone();
        let expired = combatant.conditions.tick();
        for condition in expired {
            self.log_event(
                CombatEventType::ConditionExpired,
                format!("{} expires on {}", condition, name),
            );
        }
        Ok(())
    }

    /// Apply 1 point of bleeding damage for each active condition whose
    /// definition loses a hit point per round (normally just `dying`).
    fn bleed_if_dying(&mut self, combatant_id: &str) -> Result<()> {
        let combatant = self.combatant(combatant_id)?;
        let bleeds = combatant
            .conditions
            .instances()
            .iter()
            .filter(|c| {
                self.registry
                    .get(&c.name)
                    .map(|d| d.effects.lose_hit_point)
                    .unwrap_or(false)
            })
            .count() as i32;
        if bleeds == 0 {
            return Ok(());
        }

        let combatant = self.combatant_mut(combatant_id)?;
        // Bleeding bypasses damage reduction.
        combatant.hit_points -= bleeds;
        let name = combatant.name.clone();
        self.log_event(
            CombatEventType::Damage,
            format!("{} loses {} hit point(s) (bleeding)", name, bleeds),
        );
        self.check_health(combatant_id)?;
        Ok(())
    }

    /// Roll d20 + Con modifier against DC 10 for a dying combatant whose
    /// conditions call for a stabilization check. Success swaps `dying`
    /// for `disabled`.
    fn attempt_stabilization(&mut self, combatant_id: &str) -> Result<()> {
        let combatant = self.combatant(combatant_id)?;
        let wants_check = combatant.conditions.instances().iter().any(|c| {
            self.registry
                .get(&c.name)
                .map(|d| d.effects.stabilization_check)
                .unwrap_or(false)
        });
        if !wants_check || !combatant.conditions.has("dying") {
            return Ok(());
        }

        let modifier = combatant.constitution_modifier();
        let result = self.roller.check(modifier);
        let round = self.state.round;
        let combatant = self.combatant_mut(combatant_id)?;
        let name = combatant.name.clone();

        if result >= 10 {
            combatant.conditions.remove("dying");
            combatant.conditions.apply("disabled", round, None, Some("stabilized".into()));
            self.log_event(
                CombatEventType::Stabilized,
                format!("{} stabilizes ({} vs DC 10)", name, result),
            );
        } else {
            self.log_event(
                CombatEventType::Other,
                format!("{} fails to stabilize ({} vs DC 10)", name, result),
            );
        }
        Ok(())
    }

    fn tick_spells(&mut self) {
        let report = self.spells.tick();
        for (_, name, remaining) in report.expiring {
            self.log_event(
                CombatEventType::SpellExpiring,
                format!("{} expires in {} round(s)", name, remaining),
            );
        }
        for spell in report.ended {
            self.strip_spell_conditions(&spell);
            self.log_event(
                CombatEventType::SpellEnded,
                format!("{} ends", spell.name),
            );
        }
    }

    // ========================================================================
    // Delayed and Readied Actions
    // ========================================================================

    /// Delay the named combatant's turn: flag it, record it, and advance.
    /// Delaying consumes the combatant's turn slot now.
    pub fn delay_turn(&mut self, combatant_id: &str) -> Result<Option<InitiativeEntry>> {
        if self.delayed.iter().any(|id| id == combatant_id) {
            return Err(CombatError::AlreadyDelayed(combatant_id.to_string()));
        }
        let entry = self
            .order
            .get_mut(combatant_id)
            .ok_or_else(|| CombatError::CombatantNotFound(combatant_id.to_string()))?;
        entry.delayed = true;
        let name = entry.name.clone();

        self.delayed.push(combatant_id.to_string());
        self.log_event(CombatEventType::TurnDelayed, format!("{} delays", name));
        self.next_turn()
    }

    /// A delayed combatant acts now: it re-splices into the order
    /// immediately before the current combatant and becomes the current
    /// entry.
    pub fn act_on_delayed_turn(&mut self, combatant_id: &str) -> Result<InitiativeEntry> {
        let pos = self
            .delayed
            .iter()
            .position(|id| id == combatant_id)
            .ok_or_else(|| CombatError::NotDelayed(combatant_id.to_string()))?;
        self.delayed.remove(pos);

        self.order.splice_before_current(combatant_id)?;
        let entry = self
            .order
            .get_mut(combatant_id)
            .ok_or_else(|| CombatError::CombatantNotFound(combatant_id.to_string()))?;
        entry.delayed = false;
        let entry = entry.clone();

        self.log_event(
            CombatEventType::DelayedTurnTaken,
            format!("{} acts on delayed turn", entry.name),
        );
        Ok(entry)
    }

    /// Record a readied action. The trigger is never evaluated here; the
    /// caller polls `readied_actions()` and resolves when it fires.
    pub fn ready_action(&mut self, combatant_id: &str, action: &str, trigger: &str) -> Result<()> {
        let round = self.state.round;
        let entry = self
            .order
            .get_mut(combatant_id)
            .ok_or_else(|| CombatError::CombatantNotFound(combatant_id.to_string()))?;
        entry.has_readied_action = true;
        let name = entry.name.clone();

        self.readied.push(ReadiedAction {
            combatant_id: combatant_id.to_string(),
            action: action.to_string(),
            trigger: trigger.to_string(),
            recorded_round: round,
        });
        self.log_event(
            CombatEventType::ActionReadied,
            format!("{} readies: {} (when {})", name, action, trigger),
        );
        Ok(())
    }

    /// Resolve (consume) a pending readied action for the combatant.
    pub fn resolve_readied_action(&mut self, combatant_id: &str) -> Result<ReadiedAction> {
        let pos = self
            .readied
            .iter()
            .position(|r| r.combatant_id == combatant_id)
            .ok_or_else(|| CombatError::CombatantNotFound(combatant_id.to_string()))?;
        let action = self.readied.remove(pos);

        if let Some(entry) = self.order.get_mut(combatant_id) {
            entry.has_readied_action = self
                .readied
                .iter()
                .any(|r| r.combatant_id == combatant_id);
        }
        Ok(action)
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    /// Apply a condition by name. Unknown names are a hard error; a prior
    /// instance of the same name is overwritten.
    pub fn apply_condition(
        &mut self,
        combatant_id: &str,
        name: &str,
        duration: Option<u32>,
        source: Option<String>,
    ) -> Result<()> {
        lookup(&self.registry, name)?;
        let round = self.state.round;
        let combatant = self.combatant_mut(combatant_id)?;
        combatant.conditions.apply(name, round, duration, source);
        let who = combatant.name.clone();
        self.log_event(
            CombatEventType::ConditionApplied,
            format!("{} gains condition: {}", who, name.to_lowercase()),
        );
        Ok(())
    }

    /// Remove a condition by name; silently a no-op when absent.
    pub fn remove_condition(&mut self, combatant_id: &str, name: &str) -> Result<()> {
        let combatant = self.combatant_mut(combatant_id)?;
        if combatant.conditions.remove(name).is_some() {
            let who = combatant.name.clone();
            self.log_event(
                CombatEventType::ConditionRemoved,
                format!("{} loses condition: {}", who, name.to_lowercase()),
            );
        }
        Ok(())
    }

    pub fn active_conditions(&self, combatant_id: &str) -> Result<&[ConditionInstance]> {
        Ok(self.combatant(combatant_id)?.conditions.instances())
    }

    // ========================================================================
    // Damage and Healing
    // ========================================================================

    /// Apply damage of the given type, honoring flat damage reduction, and
    /// re-derive health status.
    pub fn apply_damage(
        &mut self,
        combatant_id: &str,
        amount: i32,
        damage_type: &str,
    ) -> Result<DamageReport> {
        let combatant = self.combatant_mut(combatant_id)?;
        let taken = combatant.take_damage(amount);
        let name = combatant.name.clone();
        self.log_event(
            CombatEventType::Damage,
            format!("{} takes {} {} damage", name, taken, damage_type),
        );

        self.check_health(combatant_id)?;
        let combatant = self.combatant(combatant_id)?;
        Ok(DamageReport {
            taken,
            hit_points: combatant.hit_points,
            displayed_hp: combatant.displayed_hp(),
            status: combatant.health_status(),
        })
    }

    /// Heal up to max HP. Rising above zero clears the dying, disabled,
    /// and unconscious tags. Returns the displayed HP.
    pub fn apply_healing(&mut self, combatant_id: &str, amount: i32) -> Result<i32> {
        let combatant = self.combatant_mut(combatant_id)?;
        let before = combatant.hit_points;
        let hit_points = combatant.receive_healing(amount);
        let restored = hit_points - before;
        let name = combatant.name.clone();
        self.log_event(
            CombatEventType::Healing,
            format!("{} heals {} HP", name, restored),
        );

        if hit_points > 0 {
            for tag in ["dying", "disabled", "unconscious"] {
                self.remove_condition(combatant_id, tag)?;
            }
        } else {
            self.check_health(combatant_id)?;
        }
        Ok(self.combatant(combatant_id)?.displayed_hp())
    }

    /// Re-derive health status from signed HP and apply the matching
    /// condition tag. `dead` is terminal: applied once, never removed here.
    fn check_health(&mut self, combatant_id: &str) -> Result<()> {
        let round = self.state.round;
        let combatant = self.combatant_mut(combatant_id)?;
        let status = combatant.health_status();
        let name = combatant.name.clone();

        match status {
            HealthStatus::Healthy => {
                combatant.conditions.remove("dying");
                combatant.conditions.remove("disabled");
            }
            HealthStatus::Disabled => {
                combatant.conditions.remove("dying");
                if !combatant.conditions.has("disabled") {
                    combatant.conditions.apply("disabled", round, None, Some("health".into()));
                    self.log_event(
                        CombatEventType::ConditionApplied,
                        format!("{} is disabled", name),
                    );
                }
            }
            HealthStatus::Dying => {
                combatant.conditions.remove("disabled");
                if !combatant.conditions.has("dying") {
                    combatant.conditions.apply("dying", round, None, Some("health".into()));
                    self.log_event(
                        CombatEventType::ConditionApplied,
                        format!("{} is dying", name),
                    );
                }
            }
            HealthStatus::Dead => {
                combatant.conditions.remove("dying");
                combatant.conditions.remove("disabled");
                if !combatant.conditions.has("dead") {
                    combatant.conditions.apply("dead", round, None, Some("health".into()));
                    log::info!("{} has died", name);
                    self.log_event(CombatEventType::Death, format!("{} dies", name));
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Spells
    // ========================================================================

    /// Track a timed spell effect and apply its granted conditions to every
    /// target. Granted conditions live until the spell ends.
    pub fn track_spell(&mut self, data: SpellData) -> Result<String> {
        for name in &data.granted_conditions {
            lookup(&self.registry, name)?;
        }
        for target in &data.target_ids {
            self.combatant(target)?;
        }

        let spell_name = data.name.clone();
        let granted = data.granted_conditions.clone();
        let targets = data.target_ids.clone();
        let id = self.spells.track(data);

        let round = self.state.round;
        for target in &targets {
            for condition in &granted {
                if let Ok(combatant) = self.combatant_mut(target) {
                    combatant
                        .conditions
                        .apply(condition, round, None, Some(id.clone()));
                }
            }
        }

        self.log_event(
            CombatEventType::SpellTracked,
            format!("Tracking spell: {}", spell_name),
        );
        Ok(id)
    }

    /// End a tracked spell now, stripping the conditions it granted from
    /// every target.
    pub fn end_spell(&mut self, spell_id: &str) -> Result<()> {
        let spell = self.spells.end(spell_id)?;
        self.strip_spell_conditions(&spell);
        self.log_event(CombatEventType::SpellEnded, format!("{} ends", spell.name));
        Ok(())
    }

    /// Dismiss a spell early. Fails without side effects unless the spell
    /// is dismissible and the caller is the original caster.
    pub fn dismiss_spell(&mut self, spell_id: &str, caster_id: &str) -> Result<()> {
        let spell = self.spells.dismiss(spell_id, caster_id)?;
        self.strip_spell_conditions(&spell);
        self.log_event(
            CombatEventType::SpellEnded,
            format!("{} dismissed by caster", spell.name),
        );
        Ok(())
    }

    fn strip_spell_conditions(&mut self, spell: &TrackedSpell) {
        for target in &spell.target_ids {
            for condition in &spell.granted_conditions {
                if let Some(combatant) = self.combatants.get_mut(target) {
                    if combatant.conditions.remove(condition).is_some() {
                        let who = combatant.name.clone();
                        self.log_event(
                            CombatEventType::ConditionRemoved,
                            format!("{} loses condition: {}", who, condition.to_lowercase()),
                        );
                    }
                }
            }
        }
    }

    // ========================================================================
    // Battlemap
    // ========================================================================

    pub fn place_combatant(&mut self, combatant_id: &str, x: i32, y: i32) -> Result<()> {
        self.combatant(combatant_id)?;
        self.battlemap.place(combatant_id, x, y)
    }

    pub fn move_combatant(&mut self, combatant_id: &str, x: i32, y: i32) -> Result<MoveReport> {
        let name = self.combatant(combatant_id)?.name.clone();
        let report = self.battlemap.move_to(combatant_id, x, y)?;
        self.log_event(
            CombatEventType::Movement,
            format!("{} moves {} ft", name, report.feet),
        );
        Ok(report)
    }

    pub fn range_between(&self, a: &str, b: &str) -> Result<RangeInfo> {
        self.battlemap.range_between(a, b)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Export the full encounter state. The condition registry and dice
    /// roller are configuration, not state, and are supplied again on
    /// restore.
    pub fn snapshot(&self) -> EncounterSnapshot {
        EncounterSnapshot {
            state: self.state.clone(),
            order: self.order.clone(),
            combatants: self.combatants.clone(),
            roster: self.roster.clone(),
            spells: self.spells.clone(),
            battlemap: self.battlemap.clone(),
            delayed: self.delayed.clone(),
            readied: self.readied.clone(),
            turn_effects_done: self.turn_effects_done.clone(),
        }
    }

    /// Rebuild a session from a snapshot. Subsequent commands behave
    /// identically to the exporting session given the same roller stream.
    pub fn restore(
        snapshot: EncounterSnapshot,
        registry: ConditionRegistry,
        roller: DiceRoller,
    ) -> Self {
        Self {
            registry,
            roller,
            state: snapshot.state,
            order: snapshot.order,
            combatants: snapshot.combatants,
            roster: snapshot.roster,
            spells: snapshot.spells,
            battlemap: snapshot.battlemap,
            delayed: snapshot.delayed,
            readied: snapshot.readied,
            turn_effects_done: snapshot.turn_effects_done,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::CombatantKind;

    fn participant(id: &str, modifier: i32, hp: i32) -> ParticipantRecord {
        ParticipantRecord::new(id, id, CombatantKind::Player)
            .with_initiative_modifier(modifier)
            .with_hit_points(hp, hp)
            .with_constitution(12)
    }

    fn session_with(participants: &[ParticipantRecord]) -> CombatSession {
        let mut session = CombatSession::new(ConditionRegistry::srd(), DiceRoller::seeded(99));
        session.start_combat(participants).unwrap();
        session
    }

    #[test]
    fn test_start_combat_rolls_and_activates() {
        let session = session_with(&[participant("a", 2, 10), participant("b", 0, 10)]);

        assert!(session.is_active());
        assert_eq!(session.round(), 1);
        assert_eq!(session.current_turn_index(), 0);
        assert_eq!(session.initiative_order().len(), 2);
        assert!(session
            .events()
            .iter()
            .any(|e| e.event == CombatEventType::InitiativeRolled));
    }

    #[test]
    fn test_start_combat_twice_is_error() {
        let mut session = session_with(&[participant("a", 0, 10)]);
        assert!(matches!(
            session.start_combat(&[participant("b", 0, 10)]),
            Err(CombatError::CombatAlreadyActive)
        ));
    }

    #[test]
    fn test_initiative_order_is_sorted() {
        let session = session_with(&[
            participant("a", 5, 10),
            participant("b", 2, 10),
            participant("c", 2, 10),
        ]);

        let order = session.initiative_order();
        for pair in order.windows(2) {
            let (x, y) = (&pair[0], &pair[1]);
            assert!(
                x.total > y.total
                    || (x.total == y.total && x.modifier > y.modifier)
                    || (x.total == y.total && x.modifier == y.modifier && x.sequence < y.sequence)
            );
        }
        for entry in order {
            assert_eq!(entry.total, entry.roll as i32 + entry.modifier);
        }
    }

    #[test]
    fn test_next_turn_wraps_into_new_round() {
        let mut session = session_with(&[
            participant("a", 5, 10),
            participant("b", 2, 10),
            participant("c", 0, 10),
        ]);

        session.next_turn().unwrap();
        session.next_turn().unwrap();
        assert_eq!(session.round(), 1);

        session.next_turn().unwrap();
        assert_eq!(session.round(), 2);
        assert_eq!(session.current_turn_index(), 0);
        assert!(session
            .events()
            .iter()
            .any(|e| e.event == CombatEventType::RoundStarted));
    }

    #[test]
    fn test_next_turn_inactive_is_noop() {
        let mut session = CombatSession::new(ConditionRegistry::srd(), DiceRoller::seeded(1));
        assert!(session.next_turn().unwrap().is_none());
        assert_eq!(session.round(), 0);
    }

    #[test]
    fn test_condition_expires_on_nth_turn_start() {
        let mut session = session_with(&[participant("a", 5, 10), participant("b", 0, 10)]);
        let first = session.current_combatant().unwrap().combatant_id.clone();

        session.apply_condition(&first, "shaken", Some(2), None).unwrap();

        // One full cycle: first's next turn start ticks 2 -> 1.
        session.next_turn().unwrap();
        session.next_turn().unwrap();
        assert!(session.combatant(&first).unwrap().conditions.has("shaken"));

        // Second cycle: 1 -> 0, removed.
        session.next_turn().unwrap();
        session.next_turn().unwrap();
        assert!(!session.combatant(&first).unwrap().conditions.has("shaken"));
        assert!(session
            .events()
            .iter()
            .any(|e| e.event == CombatEventType::ConditionExpired));
    }

    #[test]
    fn test_unknown_condition_rejected() {
        let mut session = session_with(&[participant("a", 0, 10)]);
        assert!(matches!(
            session.apply_condition("a", "embiggened", None, None),
            Err(CombatError::UnknownCondition(_))
        ));
        assert!(session.combatant("a").unwrap().conditions.is_empty());
    }

    #[test]
    fn test_damage_drives_health_transitions() {
        let mut session = session_with(&[participant("a", 0, 5), participant("b", 0, 10)]);

        let report = session.apply_damage("a", 6, "slashing").unwrap();
        assert_eq!(report.hit_points, -1);
        assert_eq!(report.displayed_hp, 0);
        assert_eq!(report.status, HealthStatus::Dying);
        assert!(session.combatant("a").unwrap().conditions.has("dying"));

        let report = session.apply_damage("a", 9, "slashing").unwrap();
        assert_eq!(report.hit_points, -10);
        assert_eq!(report.status, HealthStatus::Dead);
        assert!(session.combatant("a").unwrap().conditions.has("dead"));
        assert!(!session.combatant("a").unwrap().conditions.has("dying"));
        assert!(session
            .events()
            .iter()
            .any(|e| e.event == CombatEventType::Death));
    }

    #[test]
    fn test_healing_clears_dying_and_disabled() {
        let mut session = session_with(&[participant("a", 0, 5), participant("b", 0, 10)]);
        session.apply_damage("a", 5, "bludgeoning").unwrap();
        assert!(session.combatant("a").unwrap().conditions.has("disabled"));

        let hp = session.apply_healing("a", 1).unwrap();
        assert_eq!(hp, 1);
        let conditions = session.combatant("a").unwrap();
        assert!(!conditions.conditions.has("disabled"));
        assert!(!conditions.conditions.has("dying"));
        assert_eq!(conditions.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_dying_combatant_bleeds_on_turn_start() {
        let mut session = session_with(&[participant("a", 10, 5), participant("b", -5, 10)]);
        let first = session.initiative_order()[0].combatant_id.clone();
        // Drop the first combatant to -3 regardless of who won initiative.
        let hp = session.combatant(&first).unwrap().hit_points;
        session.apply_damage(&first, hp + 3, "piercing").unwrap();
        let hp_before = session.combatant(&first).unwrap().hit_points;
        assert_eq!(hp_before, -3);

        // Cycle back to the dying combatant's turn.
        session.next_turn().unwrap();
        session.next_turn().unwrap();

        let combatant = session.combatant(&first).unwrap();
        let stabilized = combatant.conditions.has("disabled");
        if stabilized {
            // Stabilization check succeeded after the bleed.
            assert!(!combatant.conditions.has("dying"));
        } else {
            assert!(combatant.conditions.has("dying") || combatant.conditions.has("dead"));
        }
        assert!(combatant.hit_points <= hp_before - 1);
    }

    #[test]
    fn test_delay_and_act_on_delayed_turn() {
        let mut session = session_with(&[
            participant("a", 8, 10),
            participant("b", 4, 10),
            participant("c", 0, 10),
        ]);
        let first = session.current_combatant().unwrap().combatant_id.clone();

        let next = session.delay_turn(&first).unwrap().unwrap();
        assert_ne!(next.combatant_id, first);
        assert!(session.delayed_combatants().contains(&first));
        assert!(session.order.get(&first).unwrap().delayed);

        let acted = session.act_on_delayed_turn(&first).unwrap();
        assert_eq!(acted.combatant_id, first);
        assert!(!acted.delayed);
        assert!(session.delayed_combatants().is_empty());
        assert_eq!(
            session.current_combatant().unwrap().combatant_id,
            first
        );
        // Order length is unchanged by the splice.
        assert_eq!(session.initiative_order().len(), 3);
    }

    #[test]
    fn test_ready_action_queue() {
        let mut session = session_with(&[participant("a", 2, 10), participant("b", 0, 10)]);

        session
            .ready_action("a", "shoot", "an enemy enters the doorway")
            .unwrap();
        assert_eq!(session.readied_actions().len(), 1);
        assert!(session.order.get("a").unwrap().has_readied_action);

        let action = session.resolve_readied_action("a").unwrap();
        assert_eq!(action.action, "shoot");
        assert!(session.readied_actions().is_empty());
        assert!(!session.order.get("a").unwrap().has_readied_action);
    }

    #[test]
    fn test_spell_lifecycle_strips_granted_conditions() {
        let mut session = session_with(&[participant("caster", 9, 10), participant("target", 0, 10)]);

        let id = session
            .track_spell(SpellData {
                name: "Hold Person".into(),
                caster_id: "caster".into(),
                target_ids: vec!["target".into()],
                duration: "2 rounds".into(),
                dismissible: false,
                granted_conditions: vec!["paralyzed".into()],
            })
            .unwrap();
        assert!(session.combatant("target").unwrap().conditions.has("paralyzed"));
        assert_eq!(session.tracked_spells().len(), 1);

        session.end_spell(&id).unwrap();
        assert!(!session.combatant("target").unwrap().conditions.has("paralyzed"));
        assert!(session.tracked_spells().is_empty());
    }

    #[test]
    fn test_end_combat_reports_survivors() {
        let mut session = session_with(&[
            participant("a", 2, 10),
            participant("b", 1, 10),
            participant("c", 0, 10),
        ]);
        session.apply_damage("b", 25, "fire").unwrap(); // dead
        session.apply_damage("c", 10, "fire").unwrap(); // disabled, hp 0

        let summary = session.end_combat().unwrap();
        assert_eq!(summary.survivors, vec!["a".to_string()]);
        assert!(!session.is_active());
        assert!(session.tracked_spells().is_empty());

        // Lenient no-op after combat ends.
        assert!(session.next_turn().unwrap().is_none());
        assert!(matches!(
            session.end_combat(),
            Err(CombatError::NoCombatActive)
        ));
    }

    #[test]
    fn test_remove_combatant_cleans_everything() {
        let mut session = session_with(&[
            participant("a", 4, 10),
            participant("b", 2, 10),
            participant("c", 0, 10),
        ]);
        session.place_combatant("b", 1, 1).unwrap();
        session.ready_action("b", "attack", "anything moves").unwrap();

        session.remove_combatant("b").unwrap();
        assert_eq!(session.initiative_order().len(), 2);
        assert!(session.battlemap().position("b").is_none());
        assert!(session.readied_actions().is_empty());
        assert!(matches!(
            session.combatant("b"),
            Err(CombatError::CombatantNotFound(_))
        ));
    }

    #[test]
    fn test_late_joiner_keeps_current_turn() {
        let mut session = session_with(&[participant("a", 2, 10), participant("b", 0, 10)]);
        let current = session.current_combatant().unwrap().combatant_id.clone();

        session.add_combatant(&participant("late", 1, 8)).unwrap();
        assert_eq!(session.initiative_order().len(), 3);
        assert_eq!(
            session.current_combatant().unwrap().combatant_id,
            current
        );
    }

    #[test]
    fn test_failed_start_combat_has_no_effect() {
        let mut session = CombatSession::new(ConditionRegistry::srd(), DiceRoller::seeded(1));
        let result = session.start_combat(&[participant("a", 0, 10), participant("a", 0, 10)]);
        assert!(matches!(result, Err(CombatError::DuplicateCombatant(_))));
        assert!(!session.is_active());
        assert_eq!(session.round(), 0);
        assert!(session.initiative_order().is_empty());
        assert!(session.events().is_empty());
        assert!(matches!(
            session.combatant("a"),
            Err(CombatError::CombatantNotFound(_))
        ));

        // A rejected list also leaves a finished encounter readable.
        session
            .start_combat(&[participant("a", 2, 10), participant("b", 0, 10)])
            .unwrap();
        session.end_combat().unwrap();
        let events = session.events().len();
        assert!(session
            .start_combat(&[participant("c", 0, 10), participant("c", 0, 10)])
            .is_err());
        assert!(!session.is_active());
        assert_eq!(session.events().len(), events);
        assert!(session.combatant("a").is_ok());
    }

    #[test]
    fn test_delay_cycle_ticks_interrupted_combatant_once() {
        let mut session = session_with(&[participant("a", 10, 10), participant("b", -10, 10)]);
        assert_eq!(session.current_combatant().unwrap().combatant_id, "a");

        session.apply_condition("b", "shaken", Some(2), None).unwrap();
        let spell_id = session
            .track_spell(SpellData {
                name: "Daze".into(),
                caster_id: "a".into(),
                target_ids: vec!["b".into()],
                duration: "2 rounds".into(),
                dismissible: false,
                granted_conditions: vec![],
            })
            .unwrap();

        // a delays: b becomes current and its start-of-turn effects run.
        session.delay_turn("a").unwrap();
        assert_eq!(session.current_combatant().unwrap().combatant_id, "b");
        let shaken = session.combatant("b").unwrap().conditions.get("shaken").unwrap();
        assert_eq!(shaken.remaining, Some(1));

        // a acts on the delayed turn and passes back to b. b's effects
        // already ran for this turn slot and must not fire again.
        session.act_on_delayed_turn("a").unwrap();
        let next = session.next_turn().unwrap().unwrap();
        assert_eq!(next.combatant_id, "b");
        let shaken = session.combatant("b").unwrap().conditions.get("shaken").unwrap();
        assert_eq!(shaken.remaining, Some(1));
        assert_eq!(session.tracked_spells()[&spell_id].remaining_rounds, Some(1));

        // b passes; the wrap into round 2 ticks b again as normal.
        session.next_turn().unwrap();
        session.next_turn().unwrap();
        assert_eq!(session.round(), 2);
        assert_eq!(session.current_combatant().unwrap().combatant_id, "b");
        assert!(!session.combatant("b").unwrap().conditions.has("shaken"));
    }

    #[test]
    fn test_delay_twice_is_rejected() {
        let mut session = session_with(&[participant("a", 10, 10), participant("b", -10, 10)]);
        session.delay_turn("a").unwrap();
        let current = session.current_combatant().unwrap().combatant_id.clone();

        assert!(matches!(
            session.delay_turn("a"),
            Err(CombatError::AlreadyDelayed(_))
        ));
        assert_eq!(session.delayed_combatants(), ["a".to_string()]);
        // The rejected call did not advance the turn.
        assert_eq!(session.current_combatant().unwrap().combatant_id, current);
    }

    #[test]
    fn test_healing_event_logs_effective_amount() {
        let mut session = session_with(&[participant("a", 0, 20)]);
        session.apply_damage("a", 5, "slashing").unwrap();
        session.apply_healing("a", 50).unwrap();

        let healing = session
            .events()
            .iter()
            .rev()
            .find(|e| e.event == CombatEventType::Healing)
            .unwrap();
        assert_eq!(healing.details, "a heals 5 HP");
    }

    #[test]
    fn test_event_log_is_append_only_and_tagged() {
        let mut session = session_with(&[participant("a", 0, 10)]);
        let count = session.events().len();
        session.log_event(CombatEventType::Other, "GM note");
        assert_eq!(session.events().len(), count + 1);

        let last = session.events().last().unwrap();
        assert_eq!(last.round, 1);
        assert_eq!(last.details, "GM note");
    }
}
