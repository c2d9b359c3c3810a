//! Tunable names for the string configuration surface.
//!
//! Global tunables use a bare name (`min_active`); per-unit tunables are
//! addressed as `unit<N>.<field>` (`unit3.up_load`).

use std::fmt;
use std::str::FromStr;

use crate::config::{UnitTunables, clamp_percent, clamp_rate};
use crate::error::{ConfigError, ConfigResult};
use crate::types::UnitId;

/// One of the eight per-unit thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitField {
    UpLoad,
    DownLoad,
    UpFreq,
    DownFreq,
    UpRq,
    DownRq,
    UpRate,
    DownRate,
}

impl UnitField {
    pub const ALL: [UnitField; 8] = [
        UnitField::UpLoad,
        UnitField::DownLoad,
        UnitField::UpFreq,
        UnitField::DownFreq,
        UnitField::UpRq,
        UnitField::DownRq,
        UnitField::UpRate,
        UnitField::DownRate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UnitField::UpLoad => "up_load",
            UnitField::DownLoad => "down_load",
            UnitField::UpFreq => "up_freq",
            UnitField::DownFreq => "down_freq",
            UnitField::UpRq => "up_rq",
            UnitField::DownRq => "down_rq",
            UnitField::UpRate => "up_rate",
            UnitField::DownRate => "down_rate",
        }
    }

    /// Down-side fields have no meaning on the anchor.
    pub fn is_down_side(&self) -> bool {
        matches!(
            self,
            UnitField::DownLoad | UnitField::DownFreq | UnitField::DownRq | UnitField::DownRate
        )
    }

    pub fn clamp(&self, value: u32) -> u32 {
        match self {
            UnitField::UpLoad | UnitField::DownLoad => clamp_percent(value),
            UnitField::UpRate | UnitField::DownRate => clamp_rate(value),
            _ => value,
        }
    }

    pub fn get(&self, t: &UnitTunables) -> u32 {
        match self {
            UnitField::UpLoad => t.up_load,
            UnitField::DownLoad => t.down_load,
            UnitField::UpFreq => t.up_freq,
            UnitField::DownFreq => t.down_freq,
            UnitField::UpRq => t.up_rq,
            UnitField::DownRq => t.down_rq,
            UnitField::UpRate => t.up_rate,
            UnitField::DownRate => t.down_rate,
        }
    }

    pub fn slot<'a>(&self, t: &'a mut UnitTunables) -> &'a mut u32 {
        match self {
            UnitField::UpLoad => &mut t.up_load,
            UnitField::DownLoad => &mut t.down_load,
            UnitField::UpFreq => &mut t.up_freq,
            UnitField::DownFreq => &mut t.down_freq,
            UnitField::UpRq => &mut t.up_rq,
            UnitField::DownRq => &mut t.down_rq,
            UnitField::UpRate => &mut t.up_rate,
            UnitField::DownRate => &mut t.down_rate,
        }
    }
}

/// A named tunable on the configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tunable {
    SamplingRate,
    Enabled,
    MinActive,
    MaxActive,
    MaxActiveSuspended,
    IoIsBusy,
    MinEfficiencyLoad,
    SuspendEnabled,
    Unit { unit: UnitId, field: UnitField },
}

impl Tunable {
    pub const GLOBAL: [Tunable; 8] = [
        Tunable::SamplingRate,
        Tunable::Enabled,
        Tunable::MinActive,
        Tunable::MaxActive,
        Tunable::MaxActiveSuspended,
        Tunable::IoIsBusy,
        Tunable::MinEfficiencyLoad,
        Tunable::SuspendEnabled,
    ];

    /// Parse a raw written value. Only non-negative integers are accepted.
    pub fn parse_value(&self, value: &str) -> ConfigResult<u32> {
        value.trim().parse::<u32>().map_err(|_| ConfigError::Malformed {
            tunable: self.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for Tunable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tunable::SamplingRate => "sampling_rate",
            Tunable::Enabled => "enabled",
            Tunable::MinActive => "min_active",
            Tunable::MaxActive => "max_active",
            Tunable::MaxActiveSuspended => "max_active_suspended",
            Tunable::IoIsBusy => "io_is_busy",
            Tunable::MinEfficiencyLoad => "min_efficiency_load",
            Tunable::SuspendEnabled => "suspend_enabled",
            Tunable::Unit { unit, field } => return write!(f, "unit{unit}.{}", field.name()),
        };
        f.write_str(name)
    }
}

impl FromStr for Tunable {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(global) = Tunable::GLOBAL.iter().find(|t| t.to_string() == s) {
            return Ok(*global);
        }

        let unknown = || ConfigError::UnknownTunable(s.to_string());
        let (unit, field) = s
            .strip_prefix("unit")
            .and_then(|rest| rest.split_once('.'))
            .ok_or_else(unknown)?;
        let unit = unit.parse::<UnitId>().map_err(|_| unknown())?;
        let field = UnitField::ALL
            .into_iter()
            .find(|f| f.name() == field)
            .ok_or_else(unknown)?;
        Ok(Tunable::Unit { unit, field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_global_names() {
        assert_eq!("min_active".parse::<Tunable>().unwrap(), Tunable::MinActive);
        assert_eq!(" enabled ".parse::<Tunable>().unwrap(), Tunable::Enabled);
    }

    #[test]
    fn parse_unit_names() {
        assert_eq!(
            "unit3.up_load".parse::<Tunable>().unwrap(),
            Tunable::Unit {
                unit: 3,
                field: UnitField::UpLoad
            }
        );
        assert!(matches!(
            "unit3.sideways".parse::<Tunable>(),
            Err(ConfigError::UnknownTunable(_))
        ));
        assert!(matches!(
            "unitx.up_load".parse::<Tunable>(),
            Err(ConfigError::UnknownTunable(_))
        ));
        assert!(matches!(
            "turbo".parse::<Tunable>(),
            Err(ConfigError::UnknownTunable(_))
        ));
    }

    #[test]
    fn names_roundtrip() {
        for t in Tunable::GLOBAL {
            assert_eq!(t.to_string().parse::<Tunable>().unwrap(), t);
        }
        for field in UnitField::ALL {
            let t = Tunable::Unit { unit: 5, field };
            assert_eq!(t.to_string().parse::<Tunable>().unwrap(), t);
        }
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert_eq!(Tunable::MinActive.parse_value(" 4\n").unwrap(), 4);
        assert!(matches!(
            Tunable::MinActive.parse_value("four"),
            Err(ConfigError::Malformed { .. })
        ));
        assert!(Tunable::MinActive.parse_value("-1").is_err());
    }

    #[test]
    fn field_clamping() {
        assert_eq!(UnitField::UpLoad.clamp(180), 100);
        assert_eq!(UnitField::DownRate.clamp(0), 1);
        assert_eq!(UnitField::UpFreq.clamp(3_000_000), 3_000_000);
    }
}
