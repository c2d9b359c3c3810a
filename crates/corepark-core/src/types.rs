//! Shared types used across corepark crates.

use serde::{Deserialize, Serialize};

/// Index of a unit within the pool. Unit 0 is the anchor.
pub type UnitId = usize;

/// The always-active unit.
pub const ANCHOR: UnitId = 0;

/// Performance designation of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitClass {
    /// High-performance core.
    Performance,
    /// Efficiency-class core.
    Efficiency,
}

impl UnitClass {
    /// Lowercase name, as used in configuration and logs.
    pub fn label(&self) -> &'static str {
        match self {
            UnitClass::Performance => "performance",
            UnitClass::Efficiency => "efficiency",
        }
    }
}

/// Cumulative busy-time counters for a unit.
///
/// Both counters are monotonically increasing and share a unit of time.
/// Load is derived from the delta between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitTimes {
    /// Total elapsed time.
    pub wall: u64,
    /// Time spent idle (including I/O wait unless I/O wait counts as busy).
    pub idle: u64,
}

/// Edge notification from the pool-wide power state source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerEvent {
    Suspend,
    Resume,
}

/// Per-unit outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decision {
    #[default]
    Idle,
    Activate,
    Deactivate,
}

/// The batch of decisions produced by one tick, indexed by unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionVector(Vec<Decision>);

impl DecisionVector {
    pub fn new(pool_size: usize) -> Self {
        Self(vec![Decision::Idle; pool_size])
    }

    pub fn get(&self, unit: UnitId) -> Decision {
        self.0.get(unit).copied().unwrap_or_default()
    }

    pub fn set(&mut self, unit: UnitId, decision: Decision) {
        if let Some(slot) = self.0.get_mut(unit) {
            *slot = decision;
        }
    }

    /// Units to bring up, ascending. Never includes the anchor.
    pub fn activations(&self) -> Vec<UnitId> {
        self.matching(Decision::Activate)
    }

    /// Units to park, ascending. Never includes the anchor.
    pub fn deactivations(&self) -> Vec<UnitId> {
        self.matching(Decision::Deactivate)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|d| *d == Decision::Idle)
    }

    fn matching(&self, wanted: Decision) -> Vec<UnitId> {
        self.0
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, d)| **d == wanted)
            .map(|(unit, _)| unit)
            .collect()
    }
}

/// Snapshot of a unit's controller-side state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub unit: UnitId,
    pub class: UnitClass,
    pub active: bool,
    pub can_bring_up: bool,
    pub can_take_down: bool,
    pub up_counter: u32,
    pub down_counter: u32,
}

/// Snapshot of the whole controller, for logging and inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub enabled: bool,
    pub suspended: bool,
    pub min_active: usize,
    pub max_active: usize,
    pub active_count: usize,
    pub last_pressure: u32,
    pub units: Vec<UnitStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_label_matches_serialized_name() {
        for class in [UnitClass::Performance, UnitClass::Efficiency] {
            let json = serde_json::to_string(&class).unwrap();
            assert_eq!(json, format!("\"{}\"", class.label()));
        }
    }

    #[test]
    fn decision_vector_skips_anchor() {
        let mut decisions = DecisionVector::new(4);
        decisions.set(0, Decision::Deactivate);
        decisions.set(2, Decision::Deactivate);
        decisions.set(3, Decision::Activate);

        assert_eq!(decisions.deactivations(), vec![2]);
        assert_eq!(decisions.activations(), vec![3]);
    }

    #[test]
    fn decision_vector_out_of_range_is_idle() {
        let mut decisions = DecisionVector::new(2);
        decisions.set(9, Decision::Activate);
        assert_eq!(decisions.get(9), Decision::Idle);
        assert!(decisions.is_empty());
    }

    #[test]
    fn unit_class_serializes_lowercase() {
        let json = serde_json::to_string(&UnitClass::Efficiency).unwrap();
        assert_eq!(json, "\"efficiency\"");
    }
}
