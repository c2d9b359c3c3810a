//! corepark.toml configuration and per-unit tunables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ANCHOR, UnitClass, UnitId};

/// Smallest accepted sampling interval.
pub const MIN_SAMPLING_RATE_MS: u32 = 10;

pub const DEFAULT_SAMPLING_RATE_MS: u32 = 32;
pub const DEFAULT_MIN_EFFICIENCY_LOAD: u32 = 85;

/// Trigger thresholds and hysteresis depths for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTunables {
    pub up_load: u32,
    pub down_load: u32,
    pub up_freq: u32,
    pub down_freq: u32,
    pub up_rq: u32,
    pub down_rq: u32,
    pub up_rate: u32,
    pub down_rate: u32,
}

// Reference profile for a 4+4 pool, as [down, up] pairs per position.
const PROFILE_FREQ: [[u32; 2]; 8] = [
    [0, 960_000],
    [1_094_400, 1_248_000],
    [1_209_600, 1_344_000],
    [1_248_000, 1_401_000],
    [768_000, 768_000],
    [768_000, 902_400],
    [902_400, 998_400],
    [998_400, 1_094_400],
];
const PROFILE_LOAD: [[u32; 2]; 8] = [
    [0, 60],
    [45, 65],
    [55, 75],
    [65, 0],
    [25, 45],
    [35, 55],
    [45, 65],
    [55, 0],
];
const PROFILE_RQ: [[u32; 2]; 8] = [
    [0, 100],
    [200, 400],
    [300, 500],
    [500, 0],
    [100, 200],
    [200, 300],
    [300, 400],
    [400, 0],
];
const PROFILE_RATE: [[u32; 2]; 8] = [
    [1, 1],
    [4, 2],
    [3, 3],
    [2, 4],
    [1, 1],
    [4, 1],
    [4, 1],
    [4, 1],
];

impl UnitTunables {
    /// Default tunables for a unit position.
    ///
    /// Pools wider than the reference profile reuse rows 1..8 cyclically
    /// for non-anchor units.
    pub fn for_position(unit: UnitId) -> Self {
        let row = if unit == ANCHOR { 0 } else { 1 + (unit - 1) % 7 };
        Self {
            up_load: PROFILE_LOAD[row][1],
            down_load: PROFILE_LOAD[row][0],
            up_freq: PROFILE_FREQ[row][1],
            down_freq: PROFILE_FREQ[row][0],
            up_rq: PROFILE_RQ[row][1],
            down_rq: PROFILE_RQ[row][0],
            up_rate: PROFILE_RATE[row][1],
            down_rate: PROFILE_RATE[row][0],
        }
    }

    fn apply(&mut self, o: &UnitOverride) {
        if let Some(v) = o.up_load {
            self.up_load = clamp_percent(v);
        }
        if let Some(v) = o.down_load {
            self.down_load = clamp_percent(v);
        }
        if let Some(v) = o.up_freq {
            self.up_freq = v;
        }
        if let Some(v) = o.down_freq {
            self.down_freq = v;
        }
        if let Some(v) = o.up_rq {
            self.up_rq = v;
        }
        if let Some(v) = o.down_rq {
            self.down_rq = v;
        }
        if let Some(v) = o.up_rate {
            self.up_rate = clamp_rate(v);
        }
        if let Some(v) = o.down_rate {
            self.down_rate = clamp_rate(v);
        }
    }
}

/// Optional per-unit override in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOverride {
    pub unit: UnitId,
    pub up_load: Option<u32>,
    pub down_load: Option<u32>,
    pub up_freq: Option<u32>,
    pub down_freq: Option<u32>,
    pub up_rq: Option<u32>,
    pub down_rq: Option<u32>,
    pub up_rate: Option<u32>,
    pub down_rate: Option<u32>,
}

impl UnitOverride {
    fn touches_down_side(&self) -> bool {
        self.down_load.is_some()
            || self.down_freq.is_some()
            || self.down_rq.is_some()
            || self.down_rate.is_some()
    }
}

/// Controller configuration as read from corepark.toml.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Tick interval in milliseconds.
    pub sampling_rate_ms: u32,
    /// Start the sampling loop as soon as the controller is built.
    pub enabled: bool,
    pub min_active: usize,
    /// Active ceiling; `None` means the whole pool.
    pub max_active: Option<usize>,
    /// Active ceiling while the pool is suspended.
    pub max_active_suspended: usize,
    /// Count I/O wait as busy time when deriving load.
    pub io_is_busy: bool,
    /// Below this load the selector prefers parked efficiency units.
    pub min_efficiency_load: u32,
    /// React to suspend/resume edges.
    pub suspend_enabled: bool,
    /// Overrides the platform's class for every unit, in index order.
    pub classes: Option<Vec<UnitClass>>,
    pub units: Vec<UnitOverride>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sampling_rate_ms: DEFAULT_SAMPLING_RATE_MS,
            enabled: false,
            min_active: 1,
            max_active: None,
            max_active_suspended: 1,
            io_is_busy: false,
            min_efficiency_load: DEFAULT_MIN_EFFICIENCY_LOAD,
            suspend_enabled: true,
            classes: None,
            units: Vec::new(),
        }
    }
}

impl ControllerConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve the tunables of every unit for a pool of `pool_size`.
    pub fn unit_tunables(&self, pool_size: usize) -> ConfigResult<Vec<UnitTunables>> {
        let mut tunables: Vec<UnitTunables> =
            (0..pool_size).map(UnitTunables::for_position).collect();

        for o in &self.units {
            let slot = tunables.get_mut(o.unit).ok_or(ConfigError::UnitOutOfRange {
                unit: o.unit,
                pool_size,
            })?;
            if o.unit == ANCHOR && o.touches_down_side() {
                return Err(ConfigError::AnchorNotTunable {
                    tunable: "down-side thresholds".to_string(),
                });
            }
            slot.apply(o);
        }
        Ok(tunables)
    }

    /// Resolve unit classes, preferring the configured override.
    pub fn unit_classes(
        &self,
        pool_size: usize,
        platform_class: impl Fn(UnitId) -> UnitClass,
    ) -> ConfigResult<Vec<UnitClass>> {
        match &self.classes {
            Some(classes) if classes.len() != pool_size => Err(ConfigError::ClassCount {
                expected: pool_size,
                got: classes.len(),
            }),
            Some(classes) => Ok(classes.clone()),
            None => Ok((0..pool_size).map(platform_class).collect()),
        }
    }
}

pub(crate) fn clamp_sampling_rate(v: u32) -> u32 {
    v.max(MIN_SAMPLING_RATE_MS)
}

pub(crate) fn clamp_count(v: usize, pool_size: usize) -> usize {
    v.clamp(1, pool_size.max(1))
}

pub(crate) fn clamp_percent(v: u32) -> u32 {
    v.min(100)
}

pub(crate) fn clamp_rate(v: u32) -> u32 {
    v.max(1)
}
