//! Shared controller state guarded by the controller lock.

use crate::config::{self, ControllerConfig};
use crate::error::ConfigResult;
use crate::platform::Platform;
use crate::reservation::{recompute_bring_up, recompute_take_down};
use crate::types::{PoolStatus, UnitStatus};
use crate::unit::UnitState;

/// Global tunables plus the controller's own mode flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuners {
    pub sampling_rate_ms: u32,
    pub enabled: bool,
    pub min_active: usize,
    pub max_active: usize,
    pub max_active_suspended: usize,
    pub io_is_busy: bool,
    pub min_efficiency_load: u32,
    pub suspend_enabled: bool,
    pub suspended: bool,
    /// One-shot: the next tick treats every unit as below the floor.
    pub force_activation: bool,
}

impl Tuners {
    pub fn from_config(config: &ControllerConfig, pool_size: usize) -> Self {
        Self {
            sampling_rate_ms: config::clamp_sampling_rate(config.sampling_rate_ms),
            enabled: false,
            min_active: config::clamp_count(config.min_active, pool_size),
            max_active: config::clamp_count(config.max_active.unwrap_or(pool_size), pool_size),
            max_active_suspended: config::clamp_count(config.max_active_suspended, pool_size),
            io_is_busy: config.io_is_busy,
            min_efficiency_load: config::clamp_percent(config.min_efficiency_load),
            suspend_enabled: config.suspend_enabled,
            suspended: false,
            force_activation: false,
        }
    }

    /// The ceiling in force right now.
    pub fn effective_max(&self) -> usize {
        if self.suspended {
            self.max_active_suspended
        } else {
            self.max_active
        }
    }
}

/// Everything the controller lock protects.
#[derive(Debug)]
pub struct ControllerState {
    pub tuners: Tuners,
    pub units: Vec<UnitState>,
    pub last_pressure: u32,
}

impl ControllerState {
    pub fn new(config: &ControllerConfig, platform: &dyn Platform) -> ConfigResult<Self> {
        let pool_size = platform.pool_size();
        let classes = config.unit_classes(pool_size, |unit| platform.unit_class(unit))?;
        let tunables = config.unit_tunables(pool_size)?;

        let units = classes
            .into_iter()
            .zip(tunables)
            .map(|(class, tunables)| UnitState::new(class, tunables))
            .collect();

        let mut state = Self {
            tuners: Tuners::from_config(config, pool_size),
            units,
            last_pressure: 0,
        };
        state.recompute_maps();
        Ok(state)
    }

    pub fn pool_size(&self) -> usize {
        self.units.len()
    }

    /// Rebuild both reservation maps from the current bounds.
    pub fn recompute_maps(&mut self) {
        recompute_take_down(&mut self.units, self.tuners.min_active);
        recompute_bring_up(&mut self.units, self.tuners.effective_max());
    }

    /// Take a fresh time sample for every active unit so the next tick can
    /// derive load from it.
    pub fn prime_load_samples(&mut self, platform: &dyn Platform) {
        let io_is_busy = self.tuners.io_is_busy;
        for (index, unit) in self.units.iter_mut().enumerate() {
            unit.prev_times = if platform.is_active(index) {
                platform.unit_times(index, io_is_busy)
            } else {
                None
            };
        }
    }

    pub fn status(&self, platform: &dyn Platform) -> PoolStatus {
        let units: Vec<UnitStatus> = self
            .units
            .iter()
            .enumerate()
            .map(|(index, unit)| UnitStatus {
                unit: index,
                class: unit.class,
                active: platform.is_active(index),
                can_bring_up: unit.can_bring_up,
                can_take_down: unit.can_take_down,
                up_counter: unit.up_counter,
                down_counter: unit.down_counter,
            })
            .collect();

        PoolStatus {
            enabled: self.tuners.enabled,
            suspended: self.tuners.suspended,
            min_active: self.tuners.min_active,
            max_active: self.tuners.effective_max(),
            active_count: units.iter().filter(|u| u.active).count(),
            last_pressure: self.last_pressure,
            units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuners_clamp_config_values() {
        let config = ControllerConfig {
            sampling_rate_ms: 2,
            min_active: 0,
            max_active: Some(99),
            max_active_suspended: 0,
            min_efficiency_load: 140,
            ..Default::default()
        };
        let tuners = Tuners::from_config(&config, 8);
        assert_eq!(tuners.sampling_rate_ms, 10);
        assert_eq!(tuners.min_active, 1);
        assert_eq!(tuners.max_active, 8);
        assert_eq!(tuners.max_active_suspended, 1);
        assert_eq!(tuners.min_efficiency_load, 100);
    }

    #[test]
    fn effective_max_follows_suspend() {
        let mut tuners = Tuners::from_config(&ControllerConfig::default(), 8);
        assert_eq!(tuners.effective_max(), 8);
        tuners.suspended = true;
        assert_eq!(tuners.effective_max(), 1);
    }
}
