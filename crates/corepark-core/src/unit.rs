//! Per-unit controller state.

use crate::config::UnitTunables;
use crate::types::{UnitClass, UnitTimes};

/// The controller's record for one pool slot.
///
/// Only ever touched under the controller lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitState {
    pub class: UnitClass,
    pub tunables: UnitTunables,
    /// Consecutive qualifying ticks toward activation, starting at 1.
    pub up_counter: u32,
    /// Consecutive qualifying ticks toward deactivation, starting at 1.
    pub down_counter: u32,
    pub can_take_down: bool,
    pub can_bring_up: bool,
    /// Previous time sample, used to derive load.
    pub prev_times: Option<UnitTimes>,
}

impl UnitState {
    pub fn new(class: UnitClass, tunables: UnitTunables) -> Self {
        Self {
            class,
            tunables,
            up_counter: 1,
            down_counter: 1,
            can_take_down: false,
            can_bring_up: true,
            prev_times: None,
        }
    }

    pub fn is_efficiency(&self) -> bool {
        self.class == UnitClass::Efficiency
    }

    pub fn reset_counters(&mut self) {
        self.up_counter = 1;
        self.down_counter = 1;
    }

    /// Drop counters that overran their depth after a reconfiguration.
    pub fn clamp_stale_counters(&mut self) {
        if self.up_counter > self.tunables.up_rate {
            self.up_counter = 1;
        }
        if self.down_counter > self.tunables.down_rate {
            self.down_counter = 1;
        }
    }

    /// Whether this tick completes an up-side hysteresis window.
    pub fn up_due(&self) -> bool {
        self.up_counter % self.tunables.up_rate == 0
    }

    /// Whether this tick completes a down-side hysteresis window.
    pub fn down_due(&self) -> bool {
        self.down_counter % self.tunables.down_rate == 0
    }
}
