//! Engine Scenario Tests
//!
//! Cross-module tests that drive a whole encounter through the public
//! `CombatSession` surface.
//!
//! Submodules:
//! - `scenario`: full encounter flow (initiative, rounds, spells, health)
//! - `snapshot`: export/import round-trip behavior
