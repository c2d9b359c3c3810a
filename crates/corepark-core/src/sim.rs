//! In-memory simulated pool.
//!
//! `SimPool` implements [`Platform`] with scripted signals so the
//! controller can be exercised without touching real hardware. Each call
//! to `unit_times` advances the unit's counters by one step of 100 time
//! units at the unit's configured load. Idle and I/O wait accumulate
//! separately, as in `/proc/stat`, and are combined per read.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::platform::Platform;
use crate::types::{UnitClass, UnitId, UnitTimes};

const STEP: u64 = 100;
const DEFAULT_FREQUENCY: u32 = 1_000_000;

/// A physical transition performed on the simulated pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub unit: UnitId,
    pub active: bool,
}

#[derive(Debug)]
struct SimState {
    classes: Vec<UnitClass>,
    active: Vec<bool>,
    load: Vec<u32>,
    iowait: Vec<u32>,
    counters: Vec<Counters>,
    frequency: Vec<Option<u32>>,
    unavailable: Vec<bool>,
    failing: HashSet<UnitId>,
    pending: u64,
    transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    wall: u64,
    idle: u64,
    iowait: u64,
}

/// Scripted pool for tests and dry runs.
#[derive(Debug)]
pub struct SimPool {
    state: Mutex<SimState>,
}

impl SimPool {
    /// A pool with every unit active, idle and at the default frequency.
    pub fn new(classes: Vec<UnitClass>) -> Self {
        let n = classes.len();
        Self {
            state: Mutex::new(SimState {
                classes,
                active: vec![true; n],
                load: vec![0; n],
                iowait: vec![0; n],
                counters: vec![Counters::default(); n],
                frequency: vec![Some(DEFAULT_FREQUENCY); n],
                unavailable: vec![false; n],
                failing: HashSet::new(),
                pending: 0,
                transitions: Vec::new(),
            }),
        }
    }

    /// Four performance units followed by four efficiency units.
    pub fn big_little() -> Self {
        use UnitClass::{Efficiency as E, Performance as P};
        Self::new(vec![P, P, P, P, E, E, E, E])
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Set a unit's physical state without recording a transition.
    pub fn set_active(&self, unit: UnitId, active: bool) {
        self.lock().active[unit] = active;
    }

    pub fn set_load(&self, unit: UnitId, load: u32) {
        self.lock().load[unit] = load.min(100);
    }

    pub fn set_all_loads(&self, load: u32) {
        self.lock().load.fill(load.min(100));
    }

    /// Share of each step spent waiting on I/O. Counted as idle unless the
    /// caller asks for I/O wait to be busy.
    pub fn set_iowait(&self, unit: UnitId, iowait: u32) {
        self.lock().iowait[unit] = iowait.min(100);
    }

    pub fn set_frequency(&self, unit: UnitId, frequency: Option<u32>) {
        self.lock().frequency[unit] = frequency;
    }

    pub fn set_all_frequencies(&self, frequency: u32) {
        self.lock().frequency.fill(Some(frequency));
    }

    /// Make a unit's time counters unavailable.
    pub fn set_unavailable(&self, unit: UnitId, unavailable: bool) {
        self.lock().unavailable[unit] = unavailable;
    }

    /// Make activate/deactivate calls on a unit fail.
    pub fn set_failing(&self, unit: UnitId, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing.insert(unit);
        } else {
            state.failing.remove(&unit);
        }
    }

    pub fn set_pending(&self, pending: u64) {
        self.lock().pending = pending;
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.iter().filter(|a| **a).count()
    }

    pub fn active_units(&self) -> Vec<UnitId> {
        let state = self.lock();
        (0..state.active.len()).filter(|u| state.active[*u]).collect()
    }

    /// Every transition performed so far, in order.
    pub fn transitions(&self) -> Vec<Transition> {
        self.lock().transitions.clone()
    }

    pub fn clear_transitions(&self) {
        self.lock().transitions.clear();
    }

    fn transition(&self, unit: UnitId, active: bool) -> anyhow::Result<()> {
        let mut state = self.lock();
        if state.failing.contains(&unit) {
            anyhow::bail!("unit {unit} refused transition");
        }
        state.active[unit] = active;
        state.transitions.push(Transition { unit, active });
        Ok(())
    }
}

impl Platform for SimPool {
    fn pool_size(&self) -> usize {
        self.lock().classes.len()
    }

    fn unit_class(&self, unit: UnitId) -> UnitClass {
        self.lock().classes[unit]
    }

    fn is_active(&self, unit: UnitId) -> bool {
        self.lock().active.get(unit).copied().unwrap_or(false)
    }

    fn activate(&self, unit: UnitId) -> anyhow::Result<()> {
        self.transition(unit, true)
    }

    fn deactivate(&self, unit: UnitId) -> anyhow::Result<()> {
        self.transition(unit, false)
    }

    fn unit_times(&self, unit: UnitId, io_is_busy: bool) -> Option<UnitTimes> {
        let mut state = self.lock();
        if state.unavailable[unit] {
            return None;
        }
        let busy = state.load[unit] as u64;
        // Load and I/O wait are set independently; busy time wins.
        let iowait = (state.iowait[unit] as u64).min(STEP - busy);
        let counters = &mut state.counters[unit];
        counters.wall += STEP;
        counters.idle += STEP - busy - iowait;
        counters.iowait += iowait;
        Some(UnitTimes {
            wall: counters.wall,
            idle: if io_is_busy {
                counters.idle
            } else {
                counters.idle + counters.iowait
            },
        })
    }

    fn unit_frequency(&self, unit: UnitId) -> Option<u32> {
        self.lock().frequency[unit]
    }

    fn pending_work(&self) -> u64 {
        self.lock().pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::derive_load;

    #[test]
    fn times_follow_configured_load() {
        let pool = SimPool::big_little();
        pool.set_load(2, 70);
        let first = pool.unit_times(2, false);
        let second = pool.unit_times(2, false).unwrap();
        assert_eq!(derive_load(first, second), Some(70));
    }

    #[test]
    fn iowait_counts_as_busy_on_request() {
        let pool = SimPool::big_little();
        pool.set_load(1, 30);
        pool.set_iowait(1, 40);
        let a = pool.unit_times(1, false);
        let b = pool.unit_times(1, false).unwrap();
        assert_eq!(derive_load(a, b), Some(30));
        let c = pool.unit_times(1, true);
        let d = pool.unit_times(1, true).unwrap();
        assert_eq!(derive_load(c, d), Some(70));
    }

    #[test]
    fn iowait_set_before_load_is_capped_by_busy_time() {
        let pool = SimPool::big_little();
        pool.set_iowait(1, 40);
        pool.set_load(1, 90);
        let a = pool.unit_times(1, true);
        let b = pool.unit_times(1, true).unwrap();
        assert_eq!(derive_load(a, b), Some(100));

        let c = pool.unit_times(1, false);
        let d = pool.unit_times(1, false).unwrap();
        assert_eq!(derive_load(c, d), Some(90));
    }

    #[test]
    fn mixing_accounting_modes_skews_load() {
        let pool = SimPool::big_little();
        pool.set_load(1, 30);
        pool.set_iowait(1, 40);
        let idle_view = pool.unit_times(1, false);
        let busy_view = pool.unit_times(1, true).unwrap();
        assert_eq!(derive_load(idle_view, busy_view), Some(100));
    }

    #[test]
    fn failing_unit_keeps_state() {
        let pool = SimPool::big_little();
        pool.set_failing(3, true);
        assert!(pool.deactivate(3).is_err());
        assert!(pool.is_active(3));
        assert!(pool.transitions().is_empty());

        pool.set_failing(3, false);
        pool.deactivate(3).unwrap();
        assert_eq!(pool.transitions(), vec![Transition { unit: 3, active: false }]);
    }
}
