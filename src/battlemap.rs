//! Battlemap and Distance Math
//!
//! Grid configuration, combatant placement, and the two distance formulas:
//! the alternating-diagonal rule for square grids (every second diagonal
//! costs two squares) and the axial-coordinate formula for hex grids.
//! Terrain and area-effect annotations ride along as opaque string maps for
//! the presentation layer; the engine only stores them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CombatError, Result};

// ============================================================================
// Grid Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridShape {
    Square,
    Hex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub shape: GridShape,
    pub cell_size_feet: i32,
    pub width: i32,
    pub height: i32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            shape: GridShape::Square,
            cell_size_feet: 5,
            width: 30,
            height: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

// ============================================================================
// Distance Formulas
// ============================================================================

/// Square-grid distance with the alternating-diagonal rule: diagonals cost
/// 1, 2, 1, 2... squares (the 3-for-2 rule).
pub fn square_distance(a: Position, b: Position) -> i32 {
    let dx = (a.x - b.x).abs();
    let dy = (a.y - b.y).abs();
    let diagonals = dx.min(dy);
    let straight = dx.max(dy) - diagonals;
    let diagonal_cost = (diagonals / 2) * 3 + diagonals % 2;
    straight + diagonal_cost
}

/// Hex-grid distance over axial coordinates.
pub fn hex_distance(a: Position, b: Position) -> i32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx.abs().max(dy.abs()).max((dx + dy).abs())
}

/// Distance in squares and feet between two positions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveReport {
    pub squares: i32,
    pub feet: i32,
}

/// Range data for a ranged attack between two placed combatants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RangeInfo {
    pub squares: i32,
    pub feet: i32,
    /// `ceil(feet / 100)`: range increments for ranged-attack penalties.
    pub range_increment: i32,
}

// ============================================================================
// Battlemap
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Battlemap {
    pub grid: GridConfig,
    positions: HashMap<String, Position>,
    /// Terrain annotations keyed "x,y"; opaque to the engine.
    #[serde(default)]
    terrain: HashMap<String, String>,
    /// Area-effect annotations keyed "x,y"; opaque to the engine.
    #[serde(default)]
    effects: HashMap<String, String>,
}

impl Battlemap {
    pub fn new(grid: GridConfig) -> Self {
        Self {
            grid,
            positions: HashMap::new(),
            terrain: HashMap::new(),
            effects: HashMap::new(),
        }
    }

    fn check_bounds(&self, x: i32, y: i32) -> Result<()> {
        if x < 0 || y < 0 || x >= self.grid.width || y >= self.grid.height {
            return Err(CombatError::OutOfBounds {
                x,
                y,
                width: self.grid.width,
                height: self.grid.height,
            });
        }
        Ok(())
    }

    fn distance(&self, a: Position, b: Position) -> i32 {
        match self.grid.shape {
            GridShape::Square => square_distance(a, b),
            GridShape::Hex => hex_distance(a, b),
        }
    }

    pub fn position(&self, combatant_id: &str) -> Option<Position> {
        self.positions.get(combatant_id).copied()
    }

    /// Place a combatant on the grid, replacing any prior position.
    pub fn place(&mut self, combatant_id: &str, x: i32, y: i32) -> Result<()> {
        self.check_bounds(x, y)?;
        self.positions
            .insert(combatant_id.to_string(), Position { x, y });
        Ok(())
    }

    /// Move a placed combatant, returning the distance covered.
    pub fn move_to(&mut self, combatant_id: &str, x: i32, y: i32) -> Result<MoveReport> {
        self.check_bounds(x, y)?;
        let from = self
            .position(combatant_id)
            .ok_or_else(|| CombatError::NotPlaced(combatant_id.to_string()))?;

        let to = Position { x, y };
        let squares = self.distance(from, to);
        self.positions.insert(combatant_id.to_string(), to);

        Ok(MoveReport {
            squares,
            feet: squares * self.grid.cell_size_feet,
        })
    }

    pub fn remove(&mut self, combatant_id: &str) -> Option<Position> {
        self.positions.remove(combatant_id)
    }

    /// Range between two placed combatants; errors when either is absent.
    pub fn range_between(&self, a: &str, b: &str) -> Result<RangeInfo> {
        let pos_a = self
            .position(a)
            .ok_or_else(|| CombatError::NotPlaced(a.to_string()))?;
        let pos_b = self
            .position(b)
            .ok_or_else(|| CombatError::NotPlaced(b.to_string()))?;

        let squares = self.distance(pos_a, pos_b);
        let feet = squares * self.grid.cell_size_feet;
        Ok(RangeInfo {
            squares,
            feet,
            range_increment: (feet + 99) / 100,
        })
    }

    // ------------------------------------------------------------------------
    // Terrain / effect annotations
    // ------------------------------------------------------------------------

    fn cell_key(x: i32, y: i32) -> String {
        format!("{},{}", x, y)
    }

    pub fn set_terrain(&mut self, x: i32, y: i32, terrain: &str) -> Result<()> {
        self.check_bounds(x, y)?;
        self.terrain.insert(Self::cell_key(x, y), terrain.to_string());
        Ok(())
    }

    pub fn terrain_at(&self, x: i32, y: i32) -> Option<&str> {
        self.terrain.get(&Self::cell_key(x, y)).map(String::as_str)
    }

    pub fn set_effect(&mut self, x: i32, y: i32, effect: &str) -> Result<()> {
        self.check_bounds(x, y)?;
        self.effects.insert(Self::cell_key(x, y), effect.to_string());
        Ok(())
    }

    pub fn effect_at(&self, x: i32, y: i32) -> Option<&str> {
        self.effects.get(&Self::cell_key(x, y)).map(String::as_str)
    }

    pub fn clear_effects(&mut self) {
        self.effects.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
